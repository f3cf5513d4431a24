/// File names
pub const STATIONS_FILE: &str = "Measurement_station_info.csv";
pub const POLLUTANTS_FILE: &str = "Measurement_item_info.csv";
pub const MEASUREMENTS_FILE: &str = "Measurement_info.csv";

/// Default locations
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_TIMING_LOG: &str = "db_insertion_times.csv";

/// Cluster defaults
pub const DEFAULT_CONTACT_POINT: &str = "127.0.0.1:9042";
pub const DEFAULT_KEYSPACE: &str = "air_quality";
pub const DEFAULT_REPLICATION_FACTOR: u32 = 1;

/// Timing log operation names
pub const INGESTION_TIMING_OPERATION: &str = "populate_db_measurements";
pub const AGGREGATION_TIMING_OPERATION: &str = "populate_daily_pollutant_aggregations";

/// Accepted measurement timestamp layouts
pub const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S"];

/// Processing defaults
pub const DEFAULT_CHUNK_SIZE: usize = 20_000;
pub const DEFAULT_CHUNK_WORKERS: usize = 4;
pub const DEFAULT_WRITE_CONCURRENCY: usize = 100;
pub const DEFAULT_REFERENCE_CONCURRENCY: usize = 50;
pub const DEFAULT_MAX_BATCH_SIZE: usize = 10_000;
pub const DEFAULT_STATION_PARALLELISM: usize = 1;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 100;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "AIRQ";
