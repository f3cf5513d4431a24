use crate::error::Result;
use crate::storage::ClusterSettings;
use crate::utils::constants::{
    DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_WORKERS, DEFAULT_CONTACT_POINT, DEFAULT_DATA_DIR,
    DEFAULT_KEYSPACE, DEFAULT_MAX_BATCH_SIZE, DEFAULT_REFERENCE_CONCURRENCY,
    DEFAULT_REPLICATION_FACTOR, DEFAULT_RETRY_BACKOFF_MS, DEFAULT_STATION_PARALLELISM,
    DEFAULT_TIMING_LOG, DEFAULT_WRITE_CONCURRENCY, ENV_PREFIX,
};
use crate::writers::WriteMode;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use validator::Validate;

/// Configured write strategy for measurement loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteModeSetting {
    Concurrent,
    Batched,
}

/// Run settings: built-in defaults, then an optional TOML file, then
/// `AIRQ_*` environment variables, then command-line flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub timing_log: PathBuf,

    /// `host:port` of the cluster nodes to contact first.
    #[validate(length(min = 1))]
    pub contact_points: Vec<String>,

    #[validate(length(min = 1, max = 48))]
    pub keyspace: String,

    pub username: Option<String>,
    pub password: Option<String>,

    #[validate(range(min = 1))]
    pub replication_factor: u32,

    #[validate(range(min = 1))]
    pub chunk_size: usize,

    #[validate(range(min = 1))]
    pub chunk_workers: usize,

    #[validate(range(min = 1))]
    pub write_concurrency: usize,

    #[validate(range(min = 1))]
    pub reference_concurrency: usize,

    #[validate(range(min = 1))]
    pub max_batch_size: usize,

    pub write_mode: WriteModeSetting,

    pub max_retries: u32,

    #[validate(range(min = 1))]
    pub retry_backoff_ms: u64,

    #[validate(range(min = 1))]
    pub station_parallelism: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            timing_log: PathBuf::from(DEFAULT_TIMING_LOG),
            contact_points: vec![DEFAULT_CONTACT_POINT.to_string()],
            keyspace: DEFAULT_KEYSPACE.to_string(),
            username: None,
            password: None,
            replication_factor: DEFAULT_REPLICATION_FACTOR,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_workers: DEFAULT_CHUNK_WORKERS,
            write_concurrency: DEFAULT_WRITE_CONCURRENCY,
            reference_concurrency: DEFAULT_REFERENCE_CONCURRENCY,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            write_mode: WriteModeSetting::Concurrent,
            max_retries: 0,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            station_parallelism: DEFAULT_STATION_PARALLELISM,
        }
    }
}

impl PipelineConfig {
    /// Layer defaults, the optional file and the environment. Not yet validated;
    /// apply flag overrides and then call [`PipelineConfig::validated`].
    pub fn load(file: Option<&Path>) -> Result<Self> {
        Self::load_with_env(file, Environment::with_prefix(ENV_PREFIX))
    }

    fn load_with_env(file: Option<&Path>, env: Environment) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Some(path) = file {
            debug!("Reading configuration from {}", path.display());
            builder = builder.add_source(File::new(&path.to_string_lossy(), FileFormat::Toml));
        }

        let env = env
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("contact_points");
        let config = builder.add_source(env).build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn validated(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }

    pub fn write_mode(&self) -> WriteMode {
        match self.write_mode {
            WriteModeSetting::Concurrent => WriteMode::FullyConcurrent,
            WriteModeSetting::Batched => WriteMode::GroupedBatch {
                max_batch_size: self.max_batch_size,
            },
        }
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn cluster(&self) -> ClusterSettings {
        ClusterSettings {
            contact_points: self.contact_points.clone(),
            keyspace: self.keyspace.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcessingError;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn no_env() -> Environment {
        Environment::with_prefix(ENV_PREFIX).source(Some(HashMap::new()))
    }

    #[test]
    fn test_defaults() -> Result<()> {
        let config = PipelineConfig::load_with_env(None, no_env())?.validated()?;

        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.chunk_size, 20_000);
        assert_eq!(config.write_mode(), WriteMode::FullyConcurrent);
        assert_eq!(config.cluster().contact_points, vec!["127.0.0.1:9042"]);
        assert_eq!(config.cluster().keyspace, "air_quality");
        Ok(())
    }

    #[test]
    fn test_file_then_environment() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "chunk_size = 500")?;
        writeln!(file, "write_concurrency = 8")?;
        writeln!(file, "write_mode = \"batched\"")?;
        writeln!(file, "max_batch_size = 250")?;
        writeln!(file, "keyspace = \"seoul\"")?;

        let env = Environment::with_prefix(ENV_PREFIX).source(Some(HashMap::from([
            ("AIRQ_WRITE_CONCURRENCY".to_string(), "16".to_string()),
            (
                "AIRQ_CONTACT_POINTS".to_string(),
                "10.0.0.1:9042,10.0.0.2:9042".to_string(),
            ),
            ("AIRQ_USERNAME".to_string(), "loader".to_string()),
        ])));
        let config = PipelineConfig::load_with_env(Some(file.path()), env)?.validated()?;

        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.write_concurrency, 16);
        assert_eq!(config.keyspace, "seoul");
        let cluster = config.cluster();
        assert_eq!(cluster.contact_points, vec!["10.0.0.1:9042", "10.0.0.2:9042"]);
        assert_eq!(cluster.username.as_deref(), Some("loader"));
        assert_eq!(cluster.password, None);
        assert_eq!(
            config.write_mode(),
            WriteMode::GroupedBatch {
                max_batch_size: 250
            }
        );
        Ok(())
    }

    #[test]
    fn test_zero_sizes_rejected() {
        let config = PipelineConfig {
            chunk_workers: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validated(),
            Err(ProcessingError::Validation(_))
        ));

        let config = PipelineConfig {
            contact_points: Vec::new(),
            ..Default::default()
        };
        assert!(config.validated().is_err());
    }
}
