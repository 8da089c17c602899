// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// The Burn side of the program: the network, the loop that
// trains it and the loop that samples from it.
//
//   model.rs     — Decoder-only transformer (GPT-2 / GPT-Neo)
//                  • Token + learned position embeddings
//                  • Pre-LN blocks with causal self-attention,
//                    global or sliding-window per layer
//                  • tanh-GELU feed-forward networks
//                  • Final layer norm, LM head tied to wte
//                  • Shifted next-token cross entropy
//
//   trainer.rs   — The fine-tuning loop
//                  AdamW + linear schedule, periodic logging,
//                  step checkpoints with rotation, per-epoch
//                  evaluation, resume from checkpoint
//
//   grad_clip.rs — Global gradient-norm clipping
//
//   generator.rs — Autoregressive sampling
//                  Greedy or temperature/top-k sampling from
//                  the last-position logits
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Radford et al. (2019) GPT-2
//            Loshchilov & Hutter (2019) AdamW

/// Decoder-only causal language model
pub mod model;

/// Fine-tuning loop with evaluation and checkpointing
pub mod trainer;

/// Clip gradients by their norm across all parameters
pub mod grad_clip;

/// Text generation from a trained model
pub mod generator;
