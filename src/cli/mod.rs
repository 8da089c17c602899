// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Two commands are supported:
//   1. `train`    — fine-tunes a pre-trained model on a text file
//   2. `generate` — continues a prompt with a saved model
//
// The Burn backend is chosen here: WGPU, with Autodiff on top
// for training.
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use burn::backend::{wgpu::WgpuDevice, Autodiff, Wgpu};
use clap::Parser;
use commands::{Commands, GenerateArgs, TrainArgs};

use crate::application::{finetune_use_case::FinetuneUseCase, generate_use_case::GenerateUseCase};

type TrainBackend = Autodiff<Wgpu>;
type InferBackend = Wgpu;

#[derive(Parser, Debug)]
#[command(
    name = "lm-finetune",
    version,
    about = "Fine-tune a pre-trained causal language model on plain text, then sample from it."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Route the subcommand to its use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => run_train(args),
            Commands::Generate(args) => run_generate(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    let device = WgpuDevice::default();
    tracing::info!("Fine-tuning '{}' on '{}' (device {:?})", args.model_name, args.train_file, device);

    let use_case = FinetuneUseCase::new(args.into());
    let state = use_case.execute::<TrainBackend>(&device)?;

    match state.last_eval_loss() {
        Some(loss) => println!(
            "Training complete after {} steps. eval_loss={:.4} perplexity={:.2}",
            state.global_step, loss, loss.exp()
        ),
        None => println!("Training complete after {} steps.", state.global_step),
    }
    Ok(())
}

fn run_generate(args: GenerateArgs) -> Result<()> {
    let device = WgpuDevice::default();
    let prompt = args.prompt.clone();

    let use_case = GenerateUseCase::new(args.into());
    let continuation = use_case.execute::<InferBackend>(&device)?;

    println!("{prompt}{continuation}");
    Ok(())
}
