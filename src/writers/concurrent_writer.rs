use crate::error::{ProcessingError, Result};
use crate::storage::{CqlValue, PreparedStatement, StorageGateway, StorageRow, StoreError};
use crate::utils::constants::{DEFAULT_MAX_BATCH_SIZE, DEFAULT_RETRY_BACKOFF_MS};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Failures listed by name in a report summary.
const SUMMARY_FAILURE_LIMIT: usize = 5;

/// How rows are turned into store writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Every row is an independent write.
    FullyConcurrent,
    /// Rows sharing a partition key are sent as one atomic batch of at most
    /// `max_batch_size` rows.
    GroupedBatch { max_batch_size: usize },
}

impl WriteMode {
    pub fn grouped() -> Self {
        WriteMode::GroupedBatch {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

impl Default for WriteMode {
    fn default() -> Self {
        WriteMode::FullyConcurrent
    }
}

/// One write (single row or batch) that did not succeed.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteFailure {
    pub rows: Vec<String>,
    pub error: StoreError,
    pub attempts: u32,
}

/// Outcome of one `ConcurrentWriter` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteReport {
    pub operation: String,
    /// Rows handed to the writer.
    pub attempted: usize,
    /// Rows whose write was acknowledged.
    pub written: usize,
    pub failures: Vec<WriteFailure>,
    /// Rows whose write was in flight when the call was cancelled.
    pub abandoned: usize,
    /// Rows never issued because of cancellation.
    pub not_issued: usize,
    pub writes_issued: usize,
    pub largest_write: usize,
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl WriteReport {
    fn new(operation: &str, attempted: usize) -> Self {
        Self {
            operation: operation.to_string(),
            attempted,
            ..Default::default()
        }
    }

    pub fn failed_rows(&self) -> usize {
        self.failures.iter().map(|f| f.rows.len()).sum()
    }

    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.failures.is_empty() && self.written == self.attempted
    }

    /// Fold another report into this one (used across chunks).
    pub fn absorb(&mut self, other: WriteReport) {
        self.attempted += other.attempted;
        self.written += other.written;
        self.abandoned += other.abandoned;
        self.not_issued += other.not_issued;
        self.writes_issued += other.writes_issued;
        self.largest_write = self.largest_write.max(other.largest_write);
        self.cancelled |= other.cancelled;
        self.elapsed += other.elapsed;
        self.failures.extend(other.failures);
    }

    pub fn summary(&self) -> String {
        let mut text = format!(
            "{}: wrote {} of {} rows in {:.3}s",
            self.operation,
            self.written,
            self.attempted,
            self.elapsed.as_secs_f64()
        );

        let failed = self.failed_rows();
        if failed > 0 {
            let _ = write!(text, ", {} failed", failed);
        }
        if self.abandoned > 0 {
            let _ = write!(text, ", {} abandoned in flight", self.abandoned);
        }
        if self.not_issued > 0 {
            let _ = write!(text, ", {} not issued", self.not_issued);
        }

        for failure in self.failures.iter().take(SUMMARY_FAILURE_LIMIT) {
            let first = failure.rows.first().map(String::as_str).unwrap_or("?");
            let _ = write!(
                text,
                "\n  {} ({} rows, {} attempts): {}",
                first,
                failure.rows.len(),
                failure.attempts,
                failure.error
            );
        }
        if self.failures.len() > SUMMARY_FAILURE_LIMIT {
            let _ = write!(
                text,
                "\n  ... and {} more failed writes",
                self.failures.len() - SUMMARY_FAILURE_LIMIT
            );
        }

        text
    }

    /// Turn an incomplete report into the matching error.
    pub fn into_result(self) -> Result<WriteReport> {
        if self.cancelled {
            Err(ProcessingError::WriteCancelled(Box::new(self)))
        } else if !self.failures.is_empty() || self.written < self.attempted {
            Err(ProcessingError::PartialWrite(Box::new(self)))
        } else {
            Ok(self)
        }
    }
}

/// Results recorded by the write tasks as they finish.
#[derive(Debug, Default)]
struct Tally {
    written: usize,
    failures: Vec<WriteFailure>,
}

/// Issues row writes against a gateway with a bounded number in flight.
#[derive(Clone)]
pub struct ConcurrentWriter {
    gateway: Arc<dyn StorageGateway>,
    concurrency: usize,
    mode: WriteMode,
    max_retries: u32,
    retry_backoff: Duration,
    cancel: CancellationToken,
}

impl ConcurrentWriter {
    pub fn new(gateway: Arc<dyn StorageGateway>, concurrency: usize) -> Self {
        Self {
            gateway,
            concurrency: concurrency.max(1),
            mode: WriteMode::default(),
            max_retries: 0,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_mode(mut self, mode: WriteMode) -> Self {
        self.mode = match mode {
            WriteMode::GroupedBatch { max_batch_size } => WriteMode::GroupedBatch {
                max_batch_size: max_batch_size.max(1),
            },
            other => other,
        };
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Write every row and fail unless all of them were acknowledged.
    pub async fn write<R: StorageRow>(&self, operation: &str, rows: Vec<R>) -> Result<WriteReport> {
        self.write_all(operation, rows).await?.into_result()
    }

    /// Write every row and return the report, complete or not.
    ///
    /// Only a failure to prepare the statement is returned as an error.
    pub async fn write_all<R: StorageRow>(
        &self,
        operation: &str,
        rows: Vec<R>,
    ) -> Result<WriteReport> {
        let started = Instant::now();
        let mut report = WriteReport::new(operation, rows.len());
        if rows.is_empty() {
            debug!("{}: nothing to write", operation);
            return Ok(report);
        }

        let prepared = self.gateway.prepare(R::INSERT).await?;
        let mut dispatch = Dispatch::new(self, prepared);

        match self.mode {
            WriteMode::FullyConcurrent => {
                let mut remaining = rows.len();
                for row in rows {
                    if !dispatch.submit(vec![row]).await {
                        break;
                    }
                    remaining -= 1;
                }
                dispatch.not_issued = if dispatch.cancelled { remaining } else { 0 };
            }
            WriteMode::GroupedBatch { max_batch_size } => {
                let mut remaining = rows.len();
                let mut pending: BTreeMap<Vec<CqlValue>, Vec<R>> = BTreeMap::new();
                let mut buffered = 0usize;

                for row in rows {
                    remaining -= 1;
                    let group = pending.entry(row.partition_key()).or_default();
                    group.push(row);
                    buffered += 1;
                    if group.len() >= max_batch_size {
                        let full = std::mem::take(group);
                        let size = full.len();
                        if !dispatch.submit(full).await {
                            break;
                        }
                        buffered -= size;
                    }
                }

                if !dispatch.cancelled {
                    for (_, group) in std::mem::take(&mut pending) {
                        if group.is_empty() {
                            continue;
                        }
                        let size = group.len();
                        if !dispatch.submit(group).await {
                            break;
                        }
                        buffered -= size;
                    }
                }

                if dispatch.cancelled {
                    dispatch.not_issued = remaining + buffered;
                }
            }
        }

        dispatch.finish(&mut report).await;
        report.elapsed = started.elapsed();

        if report.is_complete() {
            info!(
                operation,
                written = report.written,
                writes = report.writes_issued,
                elapsed_secs = report.elapsed.as_secs_f64(),
                "Write finished"
            );
        } else {
            warn!("{}", report.summary());
        }

        Ok(report)
    }
}

/// State of one `write_all` call: the permit pool and the spawned writes.
struct Dispatch<'a, R: StorageRow> {
    writer: &'a ConcurrentWriter,
    prepared: Arc<PreparedStatement>,
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<()>,
    tally: Arc<Mutex<Tally>>,
    issued_rows: usize,
    writes_issued: usize,
    largest_write: usize,
    not_issued: usize,
    cancelled: bool,
    _row: std::marker::PhantomData<fn(R)>,
}

impl<'a, R: StorageRow> Dispatch<'a, R> {
    fn new(writer: &'a ConcurrentWriter, prepared: PreparedStatement) -> Self {
        Self {
            writer,
            prepared: Arc::new(prepared),
            semaphore: Arc::new(Semaphore::new(writer.concurrency)),
            tasks: JoinSet::new(),
            tally: Arc::new(Mutex::new(Tally::default())),
            issued_rows: 0,
            writes_issued: 0,
            largest_write: 0,
            not_issued: 0,
            cancelled: false,
            _row: std::marker::PhantomData,
        }
    }

    /// Issue one write once a permit is free. Returns false if cancelled first.
    async fn submit(&mut self, rows: Vec<R>) -> bool {
        if self.cancelled {
            return false;
        }

        let permit = tokio::select! {
            biased;
            _ = self.writer.cancel.cancelled() => None,
            permit = self.semaphore.clone().acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            self.cancelled = true;
            return false;
        };

        self.issued_rows += rows.len();
        self.writes_issued += 1;
        self.largest_write = self.largest_write.max(rows.len());

        let gateway = Arc::clone(&self.writer.gateway);
        let prepared = Arc::clone(&self.prepared);
        let tally = Arc::clone(&self.tally);
        let max_retries = self.writer.max_retries;
        let backoff = self.writer.retry_backoff;

        self.tasks.spawn(async move {
            let outcome = execute_with_retry(gateway.as_ref(), &prepared, &rows, max_retries, backoff).await;
            drop(permit);

            let mut tally = tally.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            match outcome {
                Ok(_) => tally.written += rows.len(),
                Err((error, attempts)) => tally.failures.push(WriteFailure {
                    rows: rows.iter().map(StorageRow::describe).collect(),
                    error,
                    attempts,
                }),
            }
        });

        true
    }

    /// Wait for every issued write, or detach the stragglers on cancellation.
    async fn finish(mut self, report: &mut WriteReport) {
        loop {
            tokio::select! {
                biased;
                _ = self.writer.cancel.cancelled() => {
                    self.cancelled = true;
                    self.tasks.detach_all();
                    break;
                }
                joined = self.tasks.join_next() => match joined {
                    None => break,
                    Some(Err(e)) => warn!("Write task failed to complete: {}", e),
                    Some(Ok(())) => {}
                },
            }
        }

        let tally = self.tally.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let failed_rows: usize = tally.failures.iter().map(|f| f.rows.len()).sum();

        report.written = tally.written;
        report.failures = tally.failures.clone();
        report.abandoned = self
            .issued_rows
            .saturating_sub(tally.written + failed_rows);
        report.not_issued = self.not_issued;
        report.writes_issued = self.writes_issued;
        report.largest_write = self.largest_write;
        report.cancelled = self.cancelled;
    }
}

/// Run one write, retrying transient store errors with exponential backoff.
async fn execute_with_retry<R: StorageRow>(
    gateway: &dyn StorageGateway,
    prepared: &PreparedStatement,
    rows: &[R],
    max_retries: u32,
    backoff: Duration,
) -> std::result::Result<u32, (StoreError, u32)> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let result = if let [row] = rows {
            gateway.execute(prepared, row.bind_values()).await
        } else {
            let batch = rows.iter().map(|row| prepared.bind(row.bind_values())).collect();
            gateway.execute_batch(batch).await
        };

        match result {
            Ok(()) => return Ok(attempt),
            Err(e) if e.is_transient() && attempt <= max_retries => {
                let delay = backoff.saturating_mul(1u32 << (attempt - 1).min(16));
                debug!("Transient store error ({}), retrying in {:?}", e, delay);
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err((e, attempt)),
        }
    }
}
