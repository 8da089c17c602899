// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `train` and `generate`, and all
// their configurable flags.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for bad values
//   - type conversion (string → usize, f64, bool, enums)
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{ArgAction, Args, Subcommand, ValueEnum};

use crate::application::{finetune_use_case::FinetuneConfig, generate_use_case::GenerateConfig};
use crate::domain::training_args::{EvalStrategy, TrainingArguments};
use crate::ml::generator::GenerationConfig;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fine-tune a pre-trained causal language model on a text file
    Train(TrainArgs),

    /// Continue a prompt with a (fine-tuned) model
    Generate(GenerateArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalStrategyArg {
    No,
    Epoch,
}

impl From<EvalStrategyArg> for EvalStrategy {
    fn from(a: EvalStrategyArg) -> Self {
        match a {
            EvalStrategyArg::No    => EvalStrategy::No,
            EvalStrategyArg::Epoch => EvalStrategy::Epoch,
        }
    }
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Hub model id or local directory with config.json, model.safetensors
    /// and a tokenizer
    #[arg(long, default_value = "EleutherAI/gpt-neo-125M")]
    pub model_name: String,

    /// Plain-text training corpus
    #[arg(long, default_value = "path_to_your_training_data.txt")]
    pub train_file: String,

    /// Plain-text evaluation corpus
    #[arg(long, default_value = "path_to_your_eval_data.txt")]
    pub eval_file: String,

    /// Checkpoints, metrics.csv and training_args.json go here
    #[arg(long, default_value = "./results")]
    pub output_dir: String,

    /// Start even if output_dir already holds checkpoints
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub overwrite_output_dir: bool,

    #[arg(long, default_value_t = 3)]
    pub num_train_epochs: usize,

    #[arg(long, default_value_t = 4)]
    pub per_device_train_batch_size: usize,

    #[arg(long, default_value_t = 8)]
    pub per_device_eval_batch_size: usize,

    /// Write a checkpoint every N optimiser steps
    #[arg(long, default_value_t = 10_000)]
    pub save_steps: usize,

    /// Number of checkpoints to keep
    #[arg(long, default_value_t = 2)]
    pub save_total_limit: usize,

    /// Tokens per training example
    #[arg(long, default_value_t = 128)]
    pub block_size: usize,

    #[arg(long, default_value_t = 5e-5)]
    pub learning_rate: f64,

    #[arg(long, default_value_t = 0)]
    pub warmup_steps: usize,

    #[arg(long, default_value_t = 0.0)]
    pub weight_decay: f64,

    /// Gradient-norm clip; 0 disables clipping
    #[arg(long, default_value_t = 1.0)]
    pub max_grad_norm: f64,

    #[arg(long, default_value_t = 500)]
    pub logging_steps: usize,

    #[arg(long, value_enum, default_value_t = EvalStrategyArg::No)]
    pub eval_strategy: EvalStrategyArg,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Background threads for batching; 0 batches inline
    #[arg(long, default_value_t = 0)]
    pub dataloader_num_workers: usize,

    /// Re-tokenise even when a fresh block cache exists
    #[arg(long, default_value_t = false)]
    pub overwrite_cache: bool,

    /// Checkpoint directory to continue from, or "latest"
    #[arg(long)]
    pub resume_from_checkpoint: Option<String>,

    /// Where the final model and tokenizer are saved
    #[arg(long, default_value = "./fine_tuned_model")]
    pub save_dir: String,
}

/// Convert CLI TrainArgs into the application-layer FinetuneConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for FinetuneConfig {
    fn from(a: TrainArgs) -> Self {
        FinetuneConfig {
            model_name:      a.model_name,
            train_file:      a.train_file,
            eval_file:       Some(a.eval_file),
            block_size:      a.block_size,
            overwrite_cache: a.overwrite_cache,
            save_dir:        a.save_dir,
            training: TrainingArguments {
                output_dir:                  a.output_dir,
                overwrite_output_dir:        a.overwrite_output_dir,
                num_train_epochs:            a.num_train_epochs,
                per_device_train_batch_size: a.per_device_train_batch_size,
                per_device_eval_batch_size:  a.per_device_eval_batch_size,
                learning_rate:               a.learning_rate,
                weight_decay:                a.weight_decay,
                warmup_steps:                a.warmup_steps,
                max_grad_norm:               a.max_grad_norm,
                logging_steps:               a.logging_steps,
                save_steps:                  a.save_steps,
                save_total_limit:            Some(a.save_total_limit),
                eval_strategy:               a.eval_strategy.into(),
                seed:                        a.seed,
                dataloader_num_workers:      a.dataloader_num_workers,
                resume_from_checkpoint:      a.resume_from_checkpoint,
            },
        }
    }
}

/// All arguments for the `generate` command
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Model directory written by `train` (or a Hub model id)
    #[arg(long, default_value = "./fine_tuned_model")]
    pub model_dir: String,

    /// Text to continue
    #[arg(long)]
    pub prompt: String,

    #[arg(long, default_value_t = 50)]
    pub max_new_tokens: usize,

    /// Softmax temperature; 0 means greedy
    #[arg(long, default_value_t = 1.0)]
    pub temperature: f64,

    /// Sample among the k most likely tokens; 0 disables the cut
    #[arg(long, default_value_t = 50)]
    pub top_k: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

impl From<GenerateArgs> for GenerateConfig {
    fn from(a: GenerateArgs) -> Self {
        GenerateConfig {
            model_dir: a.model_dir,
            prompt:    a.prompt,
            generation: GenerationConfig {
                max_new_tokens: a.max_new_tokens,
                temperature:    a.temperature,
                top_k:          a.top_k,
                seed:           a.seed,
            },
        }
    }
}
