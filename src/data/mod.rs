// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Turns a flat text file into batches for the training loop.
//
//   text file
//       │
//       ▼
//   TextLoader          → reads the file as UTF-8
//       │
//       ▼
//   Tokenizer           → converts the whole text to token ids
//       │
//       ▼
//   BlockChunker        → cuts ids into fixed-length blocks
//       │
//       ▼
//   BlockCache          → remembers the blocks for next time
//       │
//       ▼
//   BlockDataset        → implements Burn's Dataset trait
//       │
//       ▼
//   CausalLmBatcher     → stacks blocks into tensor batches
//       │
//       ▼
//   DataLoader          → feeds batches to the training loop

/// Reads plain-text corpus files
pub mod loader;

/// Splits token streams into fixed-length blocks
pub mod chunker;

/// On-disk cache of tokenised blocks
pub mod cache;

/// Implements Burn's Dataset trait for token blocks
pub mod dataset;

/// Implements Burn's Batcher trait for causal LM batches
pub mod batcher;
