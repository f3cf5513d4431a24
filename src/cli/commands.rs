use crate::cli::args::{AggregateArgs, Cli, Commands, LoadArgs, SchemaArgs};
use crate::config::{PipelineConfig, WriteModeSetting};
use crate::error::Result;
use crate::processors::{AggregationPipeline, IngestionPipeline, StationSelection, ThresholdCatalog};
use crate::storage::{ScyllaGateway, StorageGateway};
use crate::utils::logging::init_logging;
use crate::writers::{ConcurrentWriter, TimingLog};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub async fn run(cli: Cli) -> Result<()> {
    init_logging(cli.verbose, cli.log_file.as_deref())?;

    let mut config = PipelineConfig::load(cli.config.as_deref())?;
    if let Some(points) = cli.contact_points {
        config.contact_points = points;
    }
    if let Some(keyspace) = cli.keyspace {
        config.keyspace = keyspace;
    }

    match cli.command {
        Commands::Load(args) => load(apply_load_flags(config, &args).validated()?, &args).await,
        Commands::Aggregate(args) => {
            aggregate(apply_aggregate_flags(config, &args).validated()?, &args).await
        }
        Commands::Schema(args) => schema(apply_schema_flags(config, &args).validated()?).await,
    }
}

fn apply_load_flags(mut config: PipelineConfig, args: &LoadArgs) -> PipelineConfig {
    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(size) = args.chunk_size {
        config.chunk_size = size;
    }
    if let Some(workers) = args.chunk_workers {
        config.chunk_workers = workers;
    }
    if let Some(concurrency) = args.concurrency {
        config.write_concurrency = concurrency;
    }
    if args.batched {
        config.write_mode = WriteModeSetting::Batched;
    }
    config
}

fn apply_aggregate_flags(mut config: PipelineConfig, args: &AggregateArgs) -> PipelineConfig {
    if let Some(concurrency) = args.concurrency {
        config.write_concurrency = concurrency;
    }
    if let Some(parallelism) = args.station_parallelism {
        config.station_parallelism = parallelism;
    }
    config
}

fn apply_schema_flags(mut config: PipelineConfig, args: &SchemaArgs) -> PipelineConfig {
    if let Some(factor) = args.replication_factor {
        config.replication_factor = factor;
    }
    config
}

/// Cancel `token` on Ctrl-C so in-progress writers stop issuing work.
fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after in-flight writes");
            token.cancel();
        }
    });
}

fn writer_for(config: &PipelineConfig, gateway: Arc<dyn StorageGateway>) -> ConcurrentWriter {
    ConcurrentWriter::new(gateway, config.write_concurrency)
        .with_mode(config.write_mode())
        .with_max_retries(config.max_retries)
        .with_retry_backoff(config.retry_backoff())
}

async fn load(config: PipelineConfig, args: &LoadArgs) -> Result<()> {
    info!(
        "Loading from {} into keyspace {} (chunk size {}, {} chunk workers, concurrency {}, {:?} writes)",
        config.data_dir.display(),
        config.keyspace,
        config.chunk_size,
        config.chunk_workers,
        config.write_concurrency,
        config.write_mode
    );

    let gateway: Arc<dyn StorageGateway> =
        Arc::new(ScyllaGateway::connect(&config.cluster()).await?);
    let token = CancellationToken::new();
    cancel_on_interrupt(token.clone());

    let pipeline = IngestionPipeline::new(writer_for(&config, gateway))
        .with_reference_concurrency(config.reference_concurrency)
        .with_chunk_size(config.chunk_size)
        .with_chunk_workers(config.chunk_workers)
        .with_timing_log(TimingLog::new(&config.timing_log))
        .with_cancellation(token)
        .with_progress(true);

    let summary = pipeline.run(&config.data_dir, args.skip_reference).await?;
    println!(
        "Loaded {} stations, {} pollutants and {} measurements in {:.2}s",
        summary.stations,
        summary.pollutants,
        summary.measurements.written,
        summary.elapsed.as_secs_f64()
    );
    Ok(())
}

async fn aggregate(config: PipelineConfig, args: &AggregateArgs) -> Result<()> {
    let selection = match args.station_code {
        Some(code) if !args.all_stations => StationSelection::One(code),
        _ => StationSelection::All,
    };

    let gateway: Arc<dyn StorageGateway> =
        Arc::new(ScyllaGateway::connect(&config.cluster()).await?);
    let token = CancellationToken::new();
    cancel_on_interrupt(token.clone());

    let catalog = Arc::new(ThresholdCatalog::load(gateway.as_ref()).await?);
    let writer = writer_for(&config, Arc::clone(&gateway)).with_cancellation(token);
    let pipeline = AggregationPipeline::new(Arc::clone(&gateway), catalog, writer)
        .with_station_parallelism(config.station_parallelism)
        .with_timing_log(TimingLog::new(&config.timing_log))
        .with_progress(true);

    let stations = pipeline.resolve_stations(&selection).await?;
    let summary = pipeline.run(&stations, args.start_date, args.end_date).await?;
    println!(
        "Wrote {} daily aggregates for {} stations ({} to {}) in {:.2}s",
        summary.aggregates_written(),
        summary.stations.len(),
        args.start_date,
        args.end_date,
        summary.elapsed.as_secs_f64()
    );

    match summary.failure() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

async fn schema(config: PipelineConfig) -> Result<()> {
    ScyllaGateway::initialize(&config.cluster(), config.replication_factor).await?;
    println!(
        "Keyspace {} and tables are ready on {}",
        config.keyspace,
        config.contact_points.join(", ")
    );
    Ok(())
}
