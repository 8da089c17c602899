// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// a specific goal (fine-tuning or generating text).
//
// Rules for this layer:
//   - No ML math or model code here
//   - No UI or printing here (that's Layer 1)
//   - No direct file parsing (that's Layer 4 and 6)
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// The fine-tuning workflow
pub mod finetune_use_case;

// The text generation workflow
pub mod generate_use_case;
