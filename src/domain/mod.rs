// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs and traits describing what a fine-tuning
// run is made of. Nothing in here touches Burn, tokenizers or
// the file system directly.
//
//   corpus.rs         — raw text read from a source file
//   token_block.rs    — one fixed-length training example
//   training_args.rs  — immutable run parameters
//   trainer_state.rs  — step counter and log history
//   traits.rs         — abstractions other layers implement

// Raw corpus text and its on-disk fingerprint
pub mod corpus;

// A fixed-length run of token ids
pub mod token_block;

// Hyperparameters and checkpoint policy for a run
pub mod training_args;

// Progress record written into every checkpoint
pub mod trainer_state;

// Core abstractions (traits) that other layers implement
pub mod traits;
