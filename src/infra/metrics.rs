// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Appends every logged training event to a CSV file so loss
// curves can be plotted after (or during) a run.
//
// Output file: <output_dir>/metrics.csv
//
// Example CSV output:
//   step,epoch,train_loss,eval_loss,learning_rate
//   500,0.42,3.412000,,0.00004583
//   1000,0.83,3.201000,,0.00004167
//   1200,1.00,,3.150000,
//
// Training rows leave eval_loss empty; evaluation rows leave
// train_loss and learning_rate empty.
//
// A fresh run truncates the file; a resumed run appends to it.

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::domain::trainer_state::LogEntry;

const HEADER: &str = "step,epoch,train_loss,eval_loss,learning_rate";

pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Open `<dir>/metrics.csv`. With `append` false any previous file
    /// is replaced; the header is written whenever the file is new.
    pub fn new(dir: &Path, append: bool) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let csv_path = dir.join("metrics.csv");

        if !append || !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "{HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    /// Append one event as a CSV row.
    pub fn log(&self, entry: &LogEntry) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        writeln!(
            f,
            "{},{:.2},{},{},{}",
            entry.step,
            entry.epoch,
            cell(entry.loss, 6),
            cell(entry.eval_loss, 6),
            cell(entry.learning_rate, 8),
        )?;
        Ok(())
    }

    #[cfg(test)]
    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

fn cell(value: Option<f64>, precision: usize) -> String {
    value.map(|v| format!("{v:.precision$}")).unwrap_or_default()
}
