// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Fine-tunes a CausalLm on a BlockDataset with AdamW.
//
// One optimiser step per batch:
//   loss  = model.forward_loss(input_ids, labels)
//   grads = loss.backward()                (global norm clipped to max_grad_norm)
//   lr    = LinearSchedule at global_step
//   model = optim.step(lr, model, grads)
//
// Around the step:
//   every logging_steps  → mean loss + lr logged, metrics.csv row
//   every save_steps     → checkpoint-<step>/, oldest ones rotated out
//   every epoch end      → eval loss + perplexity (eval_strategy=epoch)
//
// Evaluation runs on model.valid(), the inner backend without
// autodiff, with its own batcher on the same device.
//
// Resuming loads model + optimizer records and TrainerState
// from a checkpoint, then skips the steps already taken. Epochs
// finished before the checkpoint still draw their shuffle so the
// remaining batches come in the same order as an uninterrupted run.

use anyhow::{bail, Context, Result};
use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder, DataLoaderIterator},
    data::dataset::Dataset,
    module::AutodiffModule,
    optim::{AdamWConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use std::path::PathBuf;

use crate::data::{
    batcher::{CausalLmBatch, CausalLmBatcher, CollatorConfig},
    dataset::BlockDataset,
};
use crate::domain::{
    trainer_state::{LogEntry, TrainerState},
    training_args::{EvalStrategy, TrainingArguments},
};
use crate::infra::{
    checkpoint::{load_checkpoint, CheckpointManager},
    metrics::MetricsLogger,
};
use crate::ml::{grad_clip::clip_grad_norm, model::CausalLm};

/// Resume keyword selecting the newest checkpoint in output_dir
pub const RESUME_LATEST: &str = "latest";

// ─── LinearSchedule ───────────────────────────────────────────────────────────
/// Linear warmup from 0 to `base_lr` over `warmup_steps`, then
/// linear decay to 0 at `total_steps`.
#[derive(Debug, Clone, Copy)]
pub struct LinearSchedule {
    base_lr:      f64,
    warmup_steps: usize,
    total_steps:  usize,
}

impl LinearSchedule {
    pub fn new(base_lr: f64, warmup_steps: usize, total_steps: usize) -> Self {
        Self { base_lr, warmup_steps, total_steps }
    }

    /// Learning rate for the step taken after `step` completed steps
    pub fn lr_at(&self, step: usize) -> f64 {
        if step < self.warmup_steps {
            return self.base_lr * step as f64 / self.warmup_steps as f64;
        }
        let remaining = self.total_steps.saturating_sub(step) as f64;
        let span      = self.total_steps.saturating_sub(self.warmup_steps).max(1) as f64;
        self.base_lr * (remaining / span).max(0.0)
    }
}

// ─── Trainer ──────────────────────────────────────────────────────────────────
pub struct TrainOutput<B: Backend> {
    pub model: CausalLm<B>,
    pub state: TrainerState,
}

pub struct Trainer<B: AutodiffBackend> {
    model:  CausalLm<B>,
    args:   TrainingArguments,
    train:  BlockDataset,
    eval:   Option<BlockDataset>,
    device: B::Device,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(
        model:    CausalLm<B>,
        args:     TrainingArguments,
        collator: CollatorConfig,
        train:    BlockDataset,
        eval:     Option<BlockDataset>,
        device:   B::Device,
    ) -> Result<Self> {
        collator.validate()?;
        args.validate()?;
        Ok(Self { model, args, train, eval, device })
    }

    /// Run the whole training procedure once, to completion.
    pub fn train(self) -> Result<TrainOutput<B>> {
        let Trainer { mut model, args, train, eval, device } = self;

        if train.is_empty() {
            bail!(
                "The training set is empty: no complete block of {} tokens could be cut from the train file",
                train.block_size()
            );
        }
        let block_size = train.block_size();
        if block_size < 2 {
            bail!("block_size must be at least 2 for next-token prediction, got {block_size}");
        }

        let manager = CheckpointManager::new(&args.output_dir)?;
        if args.resume_from_checkpoint.is_none() && !args.overwrite_output_dir && manager.has_checkpoints()? {
            bail!(
                "Output directory ({}) already exists and is not empty. \
                 Use --overwrite-output-dir to overcome.",
                args.output_dir
            );
        }
        manager.save_args(&args)?;
        B::seed(args.seed);

        let steps_per_epoch = args.steps_per_epoch(train.len());
        let max_steps       = steps_per_epoch * args.num_train_epochs;
        let schedule        = LinearSchedule::new(args.learning_rate, args.warmup_steps, max_steps);

        // ── AdamW ─────────────────────────────────────────────────────────────
        // m = β1*m + (1-β1)*g
        // v = β2*v + (1-β2)*g²
        // θ = θ - lr * (m̂ / (√v̂ + ε) + λθ)
        let mut optim = AdamWConfig::new()
            .with_beta_1(0.9)
            .with_beta_2(0.999)
            .with_epsilon(1e-8)
            .with_weight_decay(args.weight_decay as f32)
            .init::<B, CausalLm<B>>();

        // ── Resume ────────────────────────────────────────────────────────────
        let mut state = TrainerState::new(max_steps);
        if let Some(resume) = &args.resume_from_checkpoint {
            let path = resolve_resume(&manager, resume)?;
            let (restored_model, restored_optim, restored_state) =
                load_checkpoint(&path, model, optim, &device)?;
            model = restored_model;
            optim = restored_optim;
            state = TrainerState { max_steps, ..restored_state };
        }
        let resumed_at = state.global_step;
        let metrics = MetricsLogger::new(manager.dir(), args.resume_from_checkpoint.is_some())?;

        // ── Data loaders ──────────────────────────────────────────────────────
        let num_train = train.len();
        let mut train_builder = DataLoaderBuilder::new(CausalLmBatcher::<B>::new(device.clone()))
            .batch_size(args.per_device_train_batch_size)
            .shuffle(args.seed);
        if args.dataloader_num_workers > 0 {
            train_builder = train_builder.num_workers(args.dataloader_num_workers);
        }
        let train_loader = train_builder.build(train);

        let eval_loader = match eval {
            Some(ds) if args.eval_strategy == EvalStrategy::Epoch && ds.is_empty() => {
                tracing::warn!("Evaluation set has no complete blocks; evaluation is skipped");
                None
            }
            Some(ds) if args.eval_strategy == EvalStrategy::Epoch => Some(
                DataLoaderBuilder::new(CausalLmBatcher::<B::InnerBackend>::new(device.clone()))
                    .batch_size(args.per_device_eval_batch_size)
                    .build(ds),
            ),
            _ => None,
        };

        tracing::info!(
            "***** Running training *****  examples={} epochs={} batch_size={} steps={}",
            num_train, args.num_train_epochs, args.per_device_train_batch_size, max_steps
        );
        if resumed_at >= max_steps {
            tracing::warn!("Checkpoint is already at step {resumed_at} of {max_steps}; nothing left to train");
        }

        // ── Epoch loop ────────────────────────────────────────────────────────
        let mut window_loss  = 0.0f64;
        let mut window_steps = 0usize;

        for epoch in 0..args.num_train_epochs {
            let Some(batches) = remaining_batches(train_loader.as_ref(), epoch, steps_per_epoch, resumed_at) else {
                continue;
            };

            let mut epoch_loss_sum = 0.0f64;
            let mut epoch_batches  = 0usize;

            for batch in batches {
                let loss = model.forward_loss(batch.input_ids, batch.labels);
                let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();

                let grads = GradientsParams::from_grads(loss.backward(), &model);
                let (grads, grad_norm) = clip_grad_norm::<B, _>(&model, grads, args.max_grad_norm);
                tracing::trace!("step {} grad_norm={grad_norm:.4}", state.global_step + 1);
                model = optim.step(schedule.lr_at(state.global_step), model, grads);

                state.global_step += 1;
                state.epoch = state.global_step as f64 / steps_per_epoch as f64;
                epoch_loss_sum += loss_val;
                epoch_batches  += 1;
                window_loss    += loss_val;
                window_steps   += 1;

                if state.global_step % args.logging_steps == 0 {
                    let entry = LogEntry::training(
                        state.global_step,
                        state.epoch,
                        window_loss / window_steps as f64,
                        schedule.lr_at(state.global_step),
                    );
                    tracing::info!(
                        "step {} | epoch {:.2} | loss={:.4} | lr={:.3e}",
                        entry.step, entry.epoch, window_loss / window_steps as f64,
                        schedule.lr_at(state.global_step)
                    );
                    metrics.log(&entry)?;
                    state.log_history.push(entry);
                    window_loss  = 0.0;
                    window_steps = 0;
                }

                if state.global_step % args.save_steps == 0 {
                    manager.save_checkpoint(&model, &optim, &state)?;
                    if let Some(limit) = args.save_total_limit {
                        manager.rotate(limit)?;
                    }
                }
            }

            let avg_train_loss = if epoch_batches > 0 {
                epoch_loss_sum / epoch_batches as f64
            } else { f64::NAN };

            // ── Evaluation phase ──────────────────────────────────────────────
            // model.valid() → CausalLm<B::InnerBackend>, dropout disabled
            let eval_loss = match &eval_loader {
                Some(loader) => evaluate(&model.valid(), loader.iter()),
                None => None,
            };

            match eval_loss {
                Some(eval_loss) => {
                    let entry = LogEntry::evaluation(state.global_step, state.epoch, eval_loss);
                    println!(
                        "Epoch {:>3}/{} | train_loss={:.4} | eval_loss={:.4} | perplexity={:.2}",
                        epoch + 1, args.num_train_epochs, avg_train_loss, eval_loss,
                        entry.perplexity.unwrap_or(f64::NAN),
                    );
                    metrics.log(&entry)?;
                    state.log_history.push(entry);
                }
                None => println!(
                    "Epoch {:>3}/{} | train_loss={:.4}",
                    epoch + 1, args.num_train_epochs, avg_train_loss,
                ),
            }
        }

        tracing::info!("Training complete after {} steps", state.global_step);
        Ok(TrainOutput { model, state })
    }
}

/// Batch-size-weighted mean loss over an evaluation pass.
/// None when the loader yields nothing.
pub fn evaluate<B: Backend>(
    model:   &CausalLm<B>,
    batches: impl IntoIterator<Item = CausalLmBatch<B>>,
) -> Option<f64> {
    let mut loss_sum = 0.0f64;
    let mut examples = 0usize;

    for batch in batches {
        let n = batch.input_ids.dims()[0];
        let loss: f64 = model
            .forward_loss(batch.input_ids, batch.labels)
            .into_scalar()
            .elem::<f64>();
        loss_sum += loss * n as f64;
        examples += n;
    }

    (examples > 0).then(|| loss_sum / examples as f64)
}

/// The batches of `epoch` that still need training after a resume
/// at `resumed_at`, or None when the whole epoch was already done.
/// Every call draws one shuffle from the loader, finished epochs
/// included.
fn remaining_batches<'a, O>(
    loader:          &'a dyn DataLoader<O>,
    epoch:           usize,
    steps_per_epoch: usize,
    resumed_at:      usize,
) -> Option<std::iter::Skip<Box<dyn DataLoaderIterator<O> + 'a>>> {
    let batches     = loader.iter();
    let epoch_start = epoch * steps_per_epoch;
    if epoch_start + steps_per_epoch <= resumed_at {
        return None;
    }
    let skip = resumed_at.saturating_sub(epoch_start);
    if skip > 0 {
        tracing::info!("Skipping {skip} already-trained batches of epoch {}", epoch + 1);
    }
    Some(batches.skip(skip))
}

fn resolve_resume(manager: &CheckpointManager, resume: &str) -> Result<PathBuf> {
    if resume == RESUME_LATEST {
        return manager
            .latest_checkpoint()?
            .with_context(|| format!("No checkpoint found in '{}' to resume from", manager.dir().display()));
    }
    let path = PathBuf::from(resume);
    if !path.is_dir() {
        bail!("Checkpoint '{}' does not exist", path.display());
    }
    Ok(path)
}
