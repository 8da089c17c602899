// ============================================================
// Layer 4 — Block Chunker
// ============================================================
// Cuts a tokenised corpus into contiguous, non-overlapping blocks
// of exactly `block_size` ids.
//
// Example with block_size=4:
//   ids:    [a b c d e f g h i j]
//   Block 1: a b c d
//   Block 2: e f g h
//   (i j)   discarded, too short for a full block
//
// A corpus with fewer than block_size tokens produces no blocks
// at all. This is the documented behaviour for short files, not
// an error; the dataset builder logs a warning when it happens.

use anyhow::{bail, Result};

use crate::domain::token_block::TokenBlock;

pub struct BlockChunker {
    /// Tokens per block
    block_size: usize,
}

impl BlockChunker {
    /// Fails if `block_size` is zero.
    pub fn new(block_size: usize) -> Result<Self> {
        if block_size == 0 {
            bail!("block_size must be at least 1");
        }
        Ok(Self { block_size })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Split ids into full blocks, dropping the trailing remainder.
    pub fn chunk(&self, ids: &[u32]) -> Vec<TokenBlock> {
        ids.chunks_exact(self.block_size)
            .map(|c| TokenBlock::new(c.to_vec()))
            .collect()
    }

    /// Number of blocks `chunk` returns for `token_count` ids
    #[cfg(test)]
    pub fn num_blocks(&self, token_count: usize) -> usize {
        token_count / self.block_size
    }
}
