use crate::error::{ErrorCategory, ProcessingError, Result};
use crate::processors::{DailyAggregator, QualityClassifier, ThresholdCatalog};
use crate::storage::schema::SELECT_STATION_CODES;
use crate::storage::StorageGateway;
use crate::utils::constants::AGGREGATION_TIMING_OPERATION;
use crate::utils::progress::ProgressReporter;
use crate::writers::{ConcurrentWriter, TimingLog, TimingRecord, WriteMode};
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Which stations an aggregation run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StationSelection {
    One(i32),
    All,
}

/// Result of aggregating one station.
#[derive(Debug, Clone, PartialEq)]
pub struct StationOutcome {
    pub station_code: i32,
    pub aggregates: usize,
    pub written: usize,
}

/// Result of a whole aggregation run.
#[derive(Debug, Default)]
pub struct AggregationSummary {
    pub stations: Vec<StationOutcome>,
    /// Stations whose store operations failed; the run continued past them.
    pub failed: Vec<(i32, ProcessingError)>,
    pub elapsed: Duration,
}

impl AggregationSummary {
    pub fn aggregates_written(&self) -> usize {
        self.stations.iter().map(|s| s.written).sum()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Error describing every failed station, if any failed.
    pub fn failure(&self) -> Option<ProcessingError> {
        if self.failed.is_empty() {
            return None;
        }
        let details = self
            .failed
            .iter()
            .map(|(_, e)| format!("  {}", e))
            .collect::<Vec<_>>()
            .join("\n");
        Some(ProcessingError::StationsFailed {
            failed: self.failed.len(),
            total: self.failed.len() + self.stations.len(),
            details,
        })
    }
}

/// Daily aggregation: read, summarize, classify and write back, per station.
#[derive(Clone)]
pub struct AggregationPipeline {
    gateway: Arc<dyn StorageGateway>,
    catalog: Arc<ThresholdCatalog>,
    writer: ConcurrentWriter,
    station_parallelism: usize,
    timing_log: Option<TimingLog>,
    silent: bool,
}

impl AggregationPipeline {
    pub fn new(
        gateway: Arc<dyn StorageGateway>,
        catalog: Arc<ThresholdCatalog>,
        writer: ConcurrentWriter,
    ) -> Self {
        Self {
            gateway,
            catalog,
            writer: writer.with_mode(WriteMode::FullyConcurrent),
            station_parallelism: 1,
            timing_log: None,
            silent: true,
        }
    }

    pub fn with_station_parallelism(mut self, parallelism: usize) -> Self {
        self.station_parallelism = parallelism.max(1);
        self
    }

    pub fn with_timing_log(mut self, log: TimingLog) -> Self {
        self.timing_log = Some(log);
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.silent = !show;
        self
    }

    /// Resolve a selection against the stations table.
    pub async fn resolve_stations(&self, selection: &StationSelection) -> Result<Vec<i32>> {
        match selection {
            StationSelection::One(code) => Ok(vec![*code]),
            StationSelection::All => {
                let rows = self.gateway.query(SELECT_STATION_CODES, Vec::new()).await?;
                let mut codes = rows
                    .iter()
                    .map(|row| row.get_i32(0))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                codes.sort_unstable();
                codes.dedup();
                Ok(codes)
            }
        }
    }

    /// Aggregate, classify and write one station.
    ///
    /// Every aggregate is classified before anything is written.
    pub async fn run_station(
        &self,
        station_code: i32,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<StationOutcome> {
        let aggregator = DailyAggregator::new(Arc::clone(&self.gateway));
        let aggregates = aggregator.aggregate(station_code, start, end).await?;
        let classified = QualityClassifier::new(&self.catalog).classify_all(aggregates)?;

        let count = classified.len();
        let operation = format!("daily aggregates for station {}", station_code);
        let report = self.writer.write(&operation, classified).await?;

        Ok(StationOutcome {
            station_code,
            aggregates: count,
            written: report.written,
        })
    }

    /// Run every station in `stations`, continuing past store failures.
    ///
    /// Validation and schema errors abort the run.
    pub async fn run(
        &self,
        stations: &[i32],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<AggregationSummary> {
        if start > end {
            return Err(ProcessingError::InvalidDateRange { start, end });
        }

        let started = Instant::now();
        let mut summary = AggregationSummary::default();
        let mut pending = stations.iter().copied();
        let mut tasks = JoinSet::new();
        let progress =
            ProgressReporter::new(stations.len() as u64, "Aggregating stations...", self.silent);

        info!(
            "Aggregating {} stations from {} to {} ({} at a time)",
            stations.len(),
            start,
            end,
            self.station_parallelism
        );

        loop {
            while tasks.len() < self.station_parallelism {
                let Some(code) = pending.next() else { break };
                let pipeline = self.clone();
                tasks.spawn(async move { (code, pipeline.run_station(code, start, end).await) });
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };
            let (code, result) = joined?;
            progress.increment(1);

            match result {
                Ok(outcome) => {
                    info!(
                        "Station {}: wrote {} of {} aggregates",
                        code, outcome.written, outcome.aggregates
                    );
                    summary.stations.push(outcome);
                }
                Err(e) if e.category() == ErrorCategory::Store => {
                    let e = e.for_station(code, start, end);
                    warn!("{}", e);
                    summary.failed.push((code, e));
                }
                Err(e) => {
                    tasks.abort_all();
                    let e = e.for_station(code, start, end);
                    error!("Aborting aggregation: {}", e);
                    return Err(e);
                }
            }
        }

        summary.elapsed = started.elapsed();
        progress.finish_with_message(&format!(
            "Aggregated {} stations",
            summary.stations.len()
        ));
        if let Some(log) = &self.timing_log {
            log.record(&TimingRecord::new(
                AGGREGATION_TIMING_OPERATION,
                summary.elapsed,
                summary.aggregates_written() as u64,
                self.writer.concurrency() as u64,
            ));
        }

        info!(
            "Aggregation finished: {} aggregates for {} stations in {:.2}s ({} failed)",
            summary.aggregates_written(),
            summary.stations.len(),
            summary.elapsed.as_secs_f64(),
            summary.failed.len()
        );
        Ok(summary)
    }
}
