// ============================================================
// Layer 3 — TrainingArguments
// ============================================================
// Every parameter of a training run, fixed before the run starts.
//
// Defaults reproduce the stock fine-tuning recipe:
//   output_dir            ./results
//   overwrite_output_dir  true
//   num_train_epochs      3
//   per-device batch      4
//   save_steps            10 000
//   save_total_limit      2
//   eval_strategy         no
//
// The remaining optimiser defaults (AdamW, lr 5e-5, no weight
// decay, clip at 1.0, linear decay, no warmup) match what the
// stock trainer uses when nothing else is specified.
//
// The struct is serialised to <output_dir>/training_args.json at
// the start of every run so a results directory documents itself.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// When the evaluation set is scored during training
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalStrategy {
    /// Never evaluate
    No,
    /// Evaluate at the end of every epoch
    Epoch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingArguments {
    /// Where checkpoints, metrics and training_args.json are written
    pub output_dir: String,

    /// When false, refuse to start if output_dir already holds checkpoints
    pub overwrite_output_dir: bool,

    /// Number of full passes over the training set
    pub num_train_epochs: usize,

    /// Blocks per optimiser step
    pub per_device_train_batch_size: usize,

    /// Blocks per evaluation forward pass
    pub per_device_eval_batch_size: usize,

    /// Peak learning rate, reached after warmup
    pub learning_rate: f64,

    /// Decoupled AdamW weight decay
    pub weight_decay: f64,

    /// Steps of linear warmup from 0 to learning_rate
    pub warmup_steps: usize,

    /// Global gradient-norm clip; 0 disables clipping
    pub max_grad_norm: f64,

    /// Emit a training-loss log line every N optimiser steps
    pub logging_steps: usize,

    /// Write a checkpoint every N optimiser steps
    pub save_steps: usize,

    /// Keep at most this many checkpoints (oldest are deleted)
    pub save_total_limit: Option<usize>,

    /// Scoring the eval set during training is opt-in
    pub eval_strategy: EvalStrategy,

    /// Seeds weight-independent randomness: shuffling and dropout
    pub seed: u64,

    /// Background workers for the data loader; 0 batches on the caller's thread
    pub dataloader_num_workers: usize,

    /// Checkpoint directory to continue from
    pub resume_from_checkpoint: Option<String>,
}

impl Default for TrainingArguments {
    fn default() -> Self {
        Self {
            output_dir:                  "./results".to_string(),
            overwrite_output_dir:        true,
            num_train_epochs:            3,
            per_device_train_batch_size: 4,
            per_device_eval_batch_size:  8,
            learning_rate:               5e-5,
            weight_decay:                0.0,
            warmup_steps:                0,
            max_grad_norm:               1.0,
            logging_steps:               500,
            save_steps:                  10_000,
            save_total_limit:            Some(2),
            eval_strategy:               EvalStrategy::No,
            seed:                        42,
            dataloader_num_workers:      0,
            resume_from_checkpoint:      None,
        }
    }
}

impl TrainingArguments {
    /// Reject argument combinations the trainer cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.per_device_train_batch_size == 0 {
            bail!("per_device_train_batch_size must be at least 1");
        }
        if self.per_device_eval_batch_size == 0 {
            bail!("per_device_eval_batch_size must be at least 1");
        }
        if self.save_steps == 0 {
            bail!("save_steps must be at least 1");
        }
        if self.logging_steps == 0 {
            bail!("logging_steps must be at least 1");
        }
        if self.save_total_limit == Some(0) {
            bail!("save_total_limit must be at least 1 when set");
        }
        if !(self.learning_rate.is_finite() && self.learning_rate >= 0.0) {
            bail!("learning_rate must be a non-negative number, got {}", self.learning_rate);
        }
        if self.weight_decay < 0.0 || self.max_grad_norm < 0.0 {
            bail!("weight_decay and max_grad_norm must not be negative");
        }
        Ok(())
    }

    /// Optimiser steps in one epoch over `num_examples` blocks.
    /// The last batch of an epoch may be partial.
    pub fn steps_per_epoch(&self, num_examples: usize) -> usize {
        num_examples.div_ceil(self.per_device_train_batch_size)
    }
}
