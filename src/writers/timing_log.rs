use crate::error::Result;
use serde::Serialize;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// One row of the timing log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingRecord {
    #[serde(rename = "Operation Name")]
    pub operation: String,

    #[serde(rename = "Average Time per Batch (seconds)")]
    pub average_per_batch: f64,

    #[serde(rename = "Total Operations")]
    pub total_operations: u64,

    #[serde(rename = "Total Time (seconds)")]
    pub total_seconds: f64,

    #[serde(rename = "Batch Size")]
    pub batch_size: u64,
}

impl TimingRecord {
    pub fn new(operation: &str, total: Duration, total_operations: u64, batch_size: u64) -> Self {
        let total_seconds = total.as_secs_f64();
        let batch_size = batch_size.max(1);
        let average_per_batch = if total_operations == 0 {
            0.0
        } else {
            total_seconds / (total_operations as f64 / batch_size as f64)
        };

        Self {
            operation: operation.to_string(),
            average_per_batch,
            total_operations,
            total_seconds,
            batch_size,
        }
    }
}

/// Append-only CSV of per-invocation timings.
#[derive(Debug, Clone)]
pub struct TimingLog {
    path: PathBuf,
}

impl TimingLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &TimingRecord) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let needs_header = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);
        writer.serialize(record)?;
        writer.flush()?;

        debug!(
            "Recorded timing for {} in {}",
            record.operation,
            self.path.display()
        );
        Ok(())
    }

    /// Append, logging instead of failing; timings never fail a run.
    pub fn record(&self, record: &TimingRecord) {
        if let Err(e) = self.append(record) {
            warn!(
                "Could not write timing log {}: {}",
                self.path.display(),
                e
            );
        }
    }
}
