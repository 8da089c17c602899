// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Everything that touches files or the network on behalf of
// the other layers:
//
//   hub.rs             — Model resolution
//                        Local directory or Hugging Face Hub
//                        download through hf-hub's cache.
//
//   hf_config.rs       — config.json ⇄ CausalLmConfig for the
//                        gpt2 and gpt_neo model types.
//
//   weights.rs         — safetensors ⇄ CausalLm parameters,
//                        using the Hub's tensor names.
//
//   tokenizer_store.rs — Loading the pre-trained tokenizer and
//                        saving it next to fine-tuned weights.
//
//   checkpoint.rs      — checkpoint-<step>/ directories with
//                        model + optimizer records, plus
//                        rotation and resume.
//
//   metrics.rs         — metrics.csv of logged training events.

/// Local or Hub model file resolution
pub mod hub;

/// Hugging Face config.json parsing and writing
pub mod hf_config;

/// safetensors weight loading and saving
pub mod weights;

/// Tokenizer loading and saving
pub mod tokenizer_store;

/// Training checkpoints, rotation and resume
pub mod checkpoint;

/// Training metrics CSV logger
pub mod metrics;
