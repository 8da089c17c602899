// ============================================================
// Layer 4 — Causal LM Collator
// ============================================================
// Implements Burn's Batcher trait to stack TokenBlocks into
// tensors for next-token prediction.
//
//   Input:  Vec of N TokenBlocks, each of length S
//   Output: CausalLmBatch with input_ids and labels, both [N, S]
//
// Labels are a copy of the inputs. The one-position shift that
// turns "copy" into "next token" happens inside the loss, so the
// batch itself stays a plain stack.
//
// Blocks are all the same length, so no padding is needed and
// there is nothing to mask: the collator is the non-masked
// (causal) policy. Masked-LM collation is rejected.

use anyhow::{bail, Result};
use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};
use serde::{Deserialize, Serialize};

use crate::domain::token_block::TokenBlock;

// ─── CollatorConfig ───────────────────────────────────────────────────────────
/// Batching/masking policy for language-model training.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollatorConfig {
    /// Masked language modelling. Always false for causal models.
    pub mlm: bool,
}

impl CollatorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.mlm {
            bail!("Masked language modelling is not supported for causal language models; use mlm = false");
        }
        Ok(())
    }
}

// ─── CausalLmBatch ────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct CausalLmBatch<B: Backend> {
    /// Token ids — shape: [batch_size, block_size]
    pub input_ids: Tensor<B, 2, Int>,

    /// Prediction targets before shifting — shape: [batch_size, block_size]
    pub labels: Tensor<B, 2, Int>,
}

// ─── CausalLmBatcher ──────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct CausalLmBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> CausalLmBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<TokenBlock, CausalLmBatch<B>> for CausalLmBatcher<B> {
    fn batch(&self, items: Vec<TokenBlock>) -> CausalLmBatch<B> {
        let batch_size = items.len();
        let seq_len    = items.first().map(|b| b.len()).unwrap_or(0);

        // Burn Int tensors are built from i32
        let flat: Vec<i32> = items
            .iter()
            .flat_map(|b| b.ids.iter().map(|&id| id as i32))
            .collect();

        let input_ids = Tensor::<B, 1, Int>::from_ints(flat.as_slice(), &self.device)
            .reshape([batch_size, seq_len]);

        CausalLmBatch {
            labels: input_ids.clone(),
            input_ids,
        }
    }
}
