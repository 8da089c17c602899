// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores mid-run training state under output_dir.
//
// What gets saved per checkpoint:
//   1. model.mpk           — all model parameters
//   2. optimizer.mpk       — AdamW moment estimates
//   3. trainer_state.json  — global step, epoch, log history
//
// Records use NamedMpkFileRecorder with full precision so a
// resumed run continues from exactly the saved parameters.
//
// Directory layout:
//   results/
//     training_args.json    ← arguments of the latest run
//     metrics.csv
//     checkpoint-10000/
//       model.mpk
//       optimizer.mpk
//       trainer_state.json
//     checkpoint-20000/
//       ...
//
// Only the newest `save_total_limit` checkpoint-* directories
// survive rotation; nothing else in output_dir is touched.

use anyhow::{Context, Result};
use burn::{
    module::Module,
    optim::Optimizer,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
    tensor::backend::AutodiffBackend,
};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::{trainer_state::TrainerState, training_args::TrainingArguments};
use crate::ml::model::CausalLm;

pub const CHECKPOINT_PREFIX: &str = "checkpoint-";

const MODEL_RECORD:     &str = "model";
const OPTIMIZER_RECORD: &str = "optimizer";
const STATE_FILE:       &str = "trainer_state.json";
const ARGS_FILE:        &str = "training_args.json";

type CheckpointRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// Manages checkpoint-<step> directories inside one output directory.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Create the manager, creating `dir` if it doesn't exist yet.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create output directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All checkpoints as (step, path), oldest first
    pub fn list_checkpoints(&self) -> Result<Vec<(usize, PathBuf)>> {
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("Cannot list '{}'", self.dir.display()))?;

        let mut found = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let step = name
                .to_str()
                .and_then(|n| n.strip_prefix(CHECKPOINT_PREFIX))
                .and_then(|s| s.parse::<usize>().ok());
            if let Some(step) = step {
                found.push((step, entry.path()));
            }
        }
        found.sort_by_key(|(step, _)| *step);
        Ok(found)
    }

    pub fn has_checkpoints(&self) -> Result<bool> {
        Ok(!self.list_checkpoints()?.is_empty())
    }

    pub fn latest_checkpoint(&self) -> Result<Option<PathBuf>> {
        Ok(self.list_checkpoints()?.pop().map(|(_, path)| path))
    }

    /// Write checkpoint-<global_step>/ and return its path.
    pub fn save_checkpoint<B, O>(
        &self,
        model: &CausalLm<B>,
        optim: &O,
        state: &TrainerState,
    ) -> Result<PathBuf>
    where
        B: AutodiffBackend,
        O: Optimizer<CausalLm<B>, B>,
    {
        let path = self.dir.join(format!("{CHECKPOINT_PREFIX}{}", state.global_step));
        fs::create_dir_all(&path)
            .with_context(|| format!("Cannot create checkpoint '{}'", path.display()))?;

        let recorder = CheckpointRecorder::new();
        recorder
            .record(model.clone().into_record(), path.join(MODEL_RECORD))
            .with_context(|| format!("Failed to save model record to '{}'", path.display()))?;
        recorder
            .record(optim.to_record(), path.join(OPTIMIZER_RECORD))
            .with_context(|| format!("Failed to save optimizer record to '{}'", path.display()))?;
        write_json(&path.join(STATE_FILE), state)?;

        tracing::info!("Saved checkpoint '{}'", path.display());
        Ok(path)
    }

    /// Delete the oldest checkpoints until at most `limit` remain.
    /// Returns the deleted paths.
    pub fn rotate(&self, limit: usize) -> Result<Vec<PathBuf>> {
        let checkpoints = self.list_checkpoints()?;
        let excess = checkpoints.len().saturating_sub(limit);

        let mut deleted = Vec::with_capacity(excess);
        for (_, path) in checkpoints.into_iter().take(excess) {
            fs::remove_dir_all(&path)
                .with_context(|| format!("Cannot delete old checkpoint '{}'", path.display()))?;
            tracing::info!("Deleted old checkpoint '{}'", path.display());
            deleted.push(path);
        }
        Ok(deleted)
    }

    pub fn save_args(&self, args: &TrainingArguments) -> Result<()> {
        write_json(&self.dir.join(ARGS_FILE), args)
    }

    #[cfg(test)]
    pub fn load_args(&self) -> Result<TrainingArguments> {
        read_json(&self.dir.join(ARGS_FILE))
    }
}

/// Restore model, optimizer and trainer state from a checkpoint directory.
///
/// `model` and `optim` must have the same structure as the ones
/// that were saved; their contents are replaced.
pub fn load_checkpoint<B, O>(
    path:   &Path,
    model:  CausalLm<B>,
    optim:  O,
    device: &B::Device,
) -> Result<(CausalLm<B>, O, TrainerState)>
where
    B: AutodiffBackend,
    O: Optimizer<CausalLm<B>, B>,
{
    let recorder = CheckpointRecorder::new();

    let model_record = recorder
        .load(path.join(MODEL_RECORD), device)
        .with_context(|| format!("Cannot load model record from checkpoint '{}'", path.display()))?;
    let optim_record = recorder
        .load(path.join(OPTIMIZER_RECORD), device)
        .with_context(|| format!("Cannot load optimizer record from checkpoint '{}'", path.display()))?;
    let state: TrainerState = read_json(&path.join(STATE_FILE))?;

    tracing::info!("Resuming from '{}' at step {}", path.display(), state.global_step);
    Ok((model.load_record(model_record), optim.load_record(optim_record), state))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Cannot write '{}'", path.display()))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Cannot read '{}'", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("'{}' is malformed", path.display()))
}
