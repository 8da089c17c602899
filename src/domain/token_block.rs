// ============================================================
// Layer 3 — TokenBlock Domain Type
// ============================================================
// One training example for causal language modelling: a
// contiguous run of token ids cut from a tokenised corpus.
//
// Every block in a dataset has the same length (the block size).
// The model learns to predict ids[i + 1] from ids[0..=i], so the
// labels are the block itself; no separate target is stored.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBlock {
    /// Token ids in corpus order
    pub ids: Vec<u32>,
}

impl TokenBlock {
    pub fn new(ids: Vec<u32>) -> Self {
        Self { ids }
    }

    /// Number of tokens in the block
    pub fn len(&self) -> usize {
        self.ids.len()
    }
}
