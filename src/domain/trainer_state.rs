// ============================================================
// Layer 3 — TrainerState
// ============================================================
// Where a run currently is, plus everything it has logged.
// Saved as trainer_state.json inside each checkpoint so a run
// can be resumed at the exact optimiser step it stopped on.

use serde::{Deserialize, Serialize};

/// One logged event. Training-loss events carry `loss` and
/// `learning_rate`; evaluation events carry `eval_loss` and
/// `perplexity`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub step:  usize,
    pub epoch: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub loss: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub learning_rate: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval_loss: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub perplexity: Option<f64>,
}

impl LogEntry {
    pub fn training(step: usize, epoch: f64, loss: f64, learning_rate: f64) -> Self {
        Self {
            step,
            epoch,
            loss: Some(loss),
            learning_rate: Some(learning_rate),
            ..Self::default()
        }
    }

    pub fn evaluation(step: usize, epoch: f64, eval_loss: f64) -> Self {
        Self {
            step,
            epoch,
            eval_loss: Some(eval_loss),
            perplexity: Some(eval_loss.exp()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainerState {
    /// Optimiser steps completed so far
    pub global_step: usize,

    /// Fractional epoch reached, e.g. 1.5 halfway through the second epoch
    pub epoch: f64,

    /// Total optimiser steps the run was planned for
    pub max_steps: usize,

    pub log_history: Vec<LogEntry>,
}

impl TrainerState {
    pub fn new(max_steps: usize) -> Self {
        Self { max_steps, ..Self::default() }
    }

    /// The most recent evaluation loss, if any evaluation has run
    pub fn last_eval_loss(&self) -> Option<f64> {
        self.log_history.iter().rev().find_map(|e| e.eval_loss)
    }
}
