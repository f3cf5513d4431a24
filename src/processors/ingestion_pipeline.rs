use crate::error::{ProcessingError, Result};
use crate::models::{Pollutant, RawMeasurement, RawRow, Station};
use crate::processors::{RowTransformer, ThresholdCatalog};
use crate::readers::{ChunkedRecordSource, ReferenceReader};
use crate::utils::constants::{
    DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_WORKERS, DEFAULT_REFERENCE_CONCURRENCY, INGESTION_TIMING_OPERATION,
    MEASUREMENTS_FILE, POLLUTANTS_FILE, STATIONS_FILE,
};
use crate::utils::progress::ProgressReporter;
use crate::writers::{ConcurrentWriter, TimingLog, TimingRecord, WriteMode, WriteReport};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What one ingestion run loaded.
#[derive(Debug, Default)]
pub struct IngestionSummary {
    pub stations: usize,
    pub pollutants: usize,
    pub chunks: usize,
    pub measurements: WriteReport,
    pub elapsed: Duration,
}

/// Loads the reference files and the measurement file into the store.
pub struct IngestionPipeline {
    writer: ConcurrentWriter,
    reference_concurrency: usize,
    chunk_size: usize,
    chunk_workers: usize,
    timing_log: Option<TimingLog>,
    cancel: CancellationToken,
    silent: bool,
}

impl IngestionPipeline {
    /// `writer` carries the write mode, concurrency and retries for measurements.
    pub fn new(writer: ConcurrentWriter) -> Self {
        Self {
            writer,
            reference_concurrency: DEFAULT_REFERENCE_CONCURRENCY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_workers: DEFAULT_CHUNK_WORKERS,
            timing_log: None,
            cancel: CancellationToken::new(),
            silent: true,
        }
    }

    pub fn with_reference_concurrency(mut self, concurrency: usize) -> Self {
        self.reference_concurrency = concurrency.max(1);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_chunk_workers(mut self, workers: usize) -> Self {
        self.chunk_workers = workers.max(1);
        self
    }

    pub fn with_timing_log(mut self, log: TimingLog) -> Self {
        self.timing_log = Some(log);
        self
    }

    /// Stops reading and issuing writes once triggered.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.writer = self.writer.with_cancellation(token.clone());
        self.cancel = token;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.silent = !show;
        self
    }

    fn reference_writer(&self) -> ConcurrentWriter {
        self.writer
            .clone()
            .with_mode(WriteMode::FullyConcurrent)
            .with_concurrency(self.reference_concurrency)
    }

    /// Load the three files found in `data_dir`.
    pub async fn run(&self, data_dir: &Path, skip_reference: bool) -> Result<IngestionSummary> {
        let started = Instant::now();
        let mut summary = IngestionSummary::default();

        if skip_reference {
            info!("Skipping station and pollutant reference files");
        } else {
            summary.stations = self.load_stations(&data_dir.join(STATIONS_FILE)).await?;
            summary.pollutants = self.load_pollutants(&data_dir.join(POLLUTANTS_FILE)).await?;
        }

        let (chunks, report) = self
            .load_measurements_report(&data_dir.join(MEASUREMENTS_FILE))
            .await?;
        summary.chunks = chunks;
        summary.measurements = report.into_result()?;
        summary.elapsed = started.elapsed();

        Ok(summary)
    }

    pub async fn load_stations(&self, path: &Path) -> Result<usize> {
        let owned = path.to_path_buf();
        let stations =
            tokio::task::spawn_blocking(move || ReferenceReader::read_all::<Station>(&owned)).await??;
        info!("Read {} stations from {}", stations.len(), path.display());

        let report = self.reference_writer().write("stations", stations).await?;
        Ok(report.written)
    }

    /// Load pollutants; thresholds are checked before anything is written.
    pub async fn load_pollutants(&self, path: &Path) -> Result<usize> {
        let owned = path.to_path_buf();
        let pollutants =
            tokio::task::spawn_blocking(move || ReferenceReader::read_all::<Pollutant>(&owned)).await??;

        ThresholdCatalog::from_thresholds(pollutants.iter().map(|p| (p.code.clone(), p.threshold())))?;
        info!("Read {} pollutants from {}", pollutants.len(), path.display());

        let report = self.reference_writer().write("pollutants", pollutants).await?;
        Ok(report.written)
    }

    /// Load the measurement file, failing if any row was not written.
    pub async fn load_measurements(&self, path: &Path) -> Result<WriteReport> {
        let (_, report) = self.load_measurements_report(path).await?;
        report.into_result()
    }

    /// Chunked load returning the chunk count and the merged write report.
    ///
    /// A read or parse error stops reading; chunks already in flight finish
    /// before the error is returned.
    async fn load_measurements_report(&self, path: &Path) -> Result<(usize, WriteReport)> {
        let started = Instant::now();
        let progress = ProgressReporter::new_spinner("Loading measurements...", self.silent);

        let owned: PathBuf = path.to_path_buf();
        let chunk_size = self.chunk_size;
        let mut source = Some(
            tokio::task::spawn_blocking(move || {
                ChunkedRecordSource::<RawRow>::open(&owned, chunk_size)
            })
            .await??,
        );
        let mut transformer = Some(RowTransformer::new());

        let mut report = WriteReport {
            operation: "measurements".to_string(),
            ..Default::default()
        };
        let mut tasks: JoinSet<Result<WriteReport>> = JoinSet::new();
        let mut chunks = 0usize;
        let mut failure: Option<ProcessingError> = None;

        loop {
            if self.cancel.is_cancelled() {
                warn!("Ingestion cancelled after {} chunks", chunks);
                report.cancelled = true;
                break;
            }

            while tasks.len() >= self.chunk_workers {
                if let Some(joined) = tasks.join_next().await {
                    self.absorb_chunk(&mut report, joined, &progress, &mut failure);
                }
            }
            if failure.is_some() {
                break;
            }

            let (Some(mut reader), Some(mut rows)) = (source.take(), transformer.take()) else {
                break;
            };
            let (reader, rows, next) = tokio::task::spawn_blocking(move || {
                let next = reader.next().map(|chunk| chunk.and_then(|c| rows.transform_chunk(&c)));
                (reader, rows, next)
            })
            .await?;

            match next {
                None => break,
                Some(Err(e)) => {
                    error!("Stopping ingestion at chunk {}: {}", chunks + 1, e);
                    failure = Some(e);
                    break;
                }
                Some(Ok(measurements)) => {
                    chunks += 1;
                    debug!(
                        "Chunk {}: {} measurements, {} rows read",
                        chunks,
                        measurements.len(),
                        reader.rows_read()
                    );
                    source = Some(reader);
                    transformer = Some(rows);
                    self.spawn_chunk(&mut tasks, chunks, measurements);
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            self.absorb_chunk(&mut report, joined, &progress, &mut failure);
        }
        report.elapsed = started.elapsed();
        progress.finish_with_message(&format!("Loaded {} measurements", report.written));

        if let Some(log) = &self.timing_log {
            log.record(&TimingRecord::new(
                INGESTION_TIMING_OPERATION,
                report.elapsed,
                report.written as u64,
                self.chunk_size as u64,
            ));
        }

        if let Some(e) = failure {
            return Err(e);
        }

        info!("{}", report.summary());
        Ok((chunks, report))
    }

    fn spawn_chunk(
        &self,
        tasks: &mut JoinSet<Result<WriteReport>>,
        chunk: usize,
        measurements: Vec<RawMeasurement>,
    ) {
        let writer = self.writer.clone();
        tasks.spawn(async move {
            writer
                .write_all(&format!("measurements chunk {}", chunk), measurements)
                .await
        });
    }

    fn absorb_chunk(
        &self,
        report: &mut WriteReport,
        joined: std::result::Result<Result<WriteReport>, tokio::task::JoinError>,
        progress: &ProgressReporter,
        failure: &mut Option<ProcessingError>,
    ) {
        match joined {
            Ok(Ok(chunk)) => {
                if !chunk.is_complete() {
                    warn!("{}", chunk.summary());
                }
                report.absorb(chunk);
                progress.set_message(&format!(
                    "Loaded {} measurements ({} failed)",
                    report.written,
                    report.failed_rows()
                ));
            }
            Ok(Err(e)) => {
                error!("Measurement chunk failed: {}", e);
                failure.get_or_insert(e);
            }
            Err(e) => {
                error!("Measurement chunk task failed: {}", e);
                failure.get_or_insert(ProcessingError::TaskJoin(e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::storage::MemoryGateway;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    const STATIONS: &str = "Station code,Station name(district),Address,Latitude,Longitude\n\
        101,Jongno-gu,\"19, Jong-ro 35ga-gil, Jongno-gu, Seoul\",37.5720164,127.0049760\n\
        102,Jung-gu,\"15, Deoksugung-gil, Jung-gu, Seoul\",37.5642629,126.9750000\n";

    const POLLUTANTS: &str = "Item code,Item name,Unit of measurement,Good(Blue),Normal(Green),Bad(Yellow),Very bad(Red)\n\
        1,SO2,ppm,0.02,0.05,0.15,1.0\n\
        3,NO2,ppm,0.03,0.06,0.2,2.0\n";

    fn measurements(rows: usize) -> String {
        let mut text = String::from("Measurement date,Station code,Item code,Average value,Instrument status\n");
        for i in 0..rows {
            text.push_str(&format!(
                "2017-01-01 {:02}:00,{},1,0.00{},0\n",
                i % 24,
                101 + (i % 2),
                i % 9
            ));
        }
        text
    }

    fn data_dir(measurement_rows: &str) -> Result<TempDir> {
        let dir = TempDir::new()?;
        fs::write(dir.path().join(STATIONS_FILE), STATIONS)?;
        fs::write(dir.path().join(POLLUTANTS_FILE), POLLUTANTS)?;
        fs::write(dir.path().join(MEASUREMENTS_FILE), measurement_rows)?;
        Ok(dir)
    }

    fn pipeline(gateway: Arc<MemoryGateway>) -> IngestionPipeline {
        let writer = ConcurrentWriter::new(gateway.clone(), 8);
        IngestionPipeline::new(writer)
            .with_chunk_size(7)
            .with_chunk_workers(2)
    }

    #[tokio::test]
    async fn test_full_load() -> Result<()> {
        let dir = data_dir(&measurements(30))?;
        let gateway = Arc::new(MemoryGateway::with_air_quality_tables());

        let summary = pipeline(gateway.clone()).run(dir.path(), false).await?;

        assert_eq!(summary.stations, 2);
        assert_eq!(summary.pollutants, 2);
        assert_eq!(summary.chunks, 5);
        assert_eq!(summary.measurements.written, 30);
        assert_eq!(gateway.row_count("measurements").await?, 30);
        assert_eq!(gateway.row_count("stations").await?, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_grouped_mode_loads_everything() -> Result<()> {
        let dir = data_dir(&measurements(40))?;
        let gateway = Arc::new(MemoryGateway::with_air_quality_tables());
        let writer = ConcurrentWriter::new(gateway.clone(), 4)
            .with_mode(WriteMode::GroupedBatch { max_batch_size: 3 });
        let pipeline = IngestionPipeline::new(writer).with_chunk_size(10);

        let summary = pipeline.run(dir.path(), true).await?;

        assert_eq!(summary.stations, 0);
        assert_eq!(summary.measurements.written, 40);
        assert!(summary.measurements.largest_write <= 3);
        assert_eq!(gateway.row_count("measurements").await?, 40);
        Ok(())
    }

    #[tokio::test]
    async fn test_bad_row_fails_load() -> Result<()> {
        let mut rows = measurements(20);
        rows.push_str("2017-01-02 00:00,101,1,not-a-number,0\n");
        let dir = data_dir(&rows)?;
        let gateway = Arc::new(MemoryGateway::with_air_quality_tables());

        let err = pipeline(gateway.clone())
            .run(dir.path(), true)
            .await
            .unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Validation);
        assert!(err.to_string().contains("row 21"));
        // Chunks before the bad one were still written.
        assert_eq!(gateway.row_count("measurements").await?, 14);
        Ok(())
    }

    #[tokio::test]
    async fn test_wrong_header_is_schema_error() -> Result<()> {
        let dir = data_dir("Date,Station,Item,Value,Status\n")?;
        let gateway = Arc::new(MemoryGateway::with_air_quality_tables());

        let err = pipeline(gateway.clone())
            .run(dir.path(), true)
            .await
            .unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Schema);
        assert_eq!(gateway.row_count("measurements").await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_inverted_thresholds_stop_reference_load() -> Result<()> {
        let dir = data_dir(&measurements(1))?;
        fs::write(
            dir.path().join(POLLUTANTS_FILE),
            "Item code,Item name,Unit of measurement,Good(Blue),Normal(Green),Bad(Yellow),Very bad(Red)\n\
             1,SO2,ppm,0.05,0.02,0.15,1.0\n",
        )?;
        let gateway = Arc::new(MemoryGateway::with_air_quality_tables());

        let err = pipeline(gateway.clone())
            .load_pollutants(&dir.path().join(POLLUTANTS_FILE))
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessingError::InvalidThresholds { .. }));
        assert_eq!(gateway.row_count("pollutants").await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_timing_row_appended() -> Result<()> {
        let dir = data_dir(&measurements(5))?;
        let gateway = Arc::new(MemoryGateway::with_air_quality_tables());
        let log_path = dir.path().join("timings.csv");

        pipeline(gateway)
            .with_timing_log(TimingLog::new(&log_path))
            .load_measurements(&dir.path().join(MEASUREMENTS_FILE))
            .await?;

        let content = fs::read_to_string(&log_path)?;
        assert!(content.lines().nth(1).unwrap().starts_with("populate_db_measurements,"));
        Ok(())
    }
}
