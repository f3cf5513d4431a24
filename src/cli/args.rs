use chrono::NaiveDate;
use clap::{ArgGroup, Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "air-quality-loader")]
#[command(about = "Bulk loader and daily aggregator for air-quality measurements")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "TOML configuration file")]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_delimiter = ',',
        help = "Cluster contact points (host:port, comma separated)"
    )]
    pub contact_points: Option<Vec<String>>,

    #[arg(long, global = true, help = "Keyspace holding the air-quality tables")]
    pub keyspace: Option<String>,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Log file path")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load stations, pollutants and measurements from CSV files
    Load(LoadArgs),

    /// Compute daily per-pollutant aggregates for one or all stations
    Aggregate(AggregateArgs),

    /// Create the keyspace and tables if they do not exist
    Schema(SchemaArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SchemaArgs {
    #[arg(long, help = "Replication factor for a newly created keyspace")]
    pub replication_factor: Option<u32>,
}

#[derive(Args, Debug, Clone)]
pub struct LoadArgs {
    #[arg(short, long, help = "Directory holding the three measurement CSV files")]
    pub data_dir: Option<PathBuf>,

    #[arg(long, help = "Measurement rows per chunk")]
    pub chunk_size: Option<usize>,

    #[arg(long, help = "Chunks written concurrently")]
    pub chunk_workers: Option<usize>,

    #[arg(long, help = "Maximum writes in flight per chunk")]
    pub concurrency: Option<usize>,

    #[arg(long, help = "Group rows by partition into atomic batches")]
    pub batched: bool,

    #[arg(long, help = "Only load measurements")]
    pub skip_reference: bool,
}

#[derive(Args, Debug, Clone)]
#[command(group(
    ArgGroup::new("stations")
        .required(true)
        .args(["station_code", "all_stations"])
))]
pub struct AggregateArgs {
    #[arg(long, help = "Station code to aggregate")]
    pub station_code: Option<i32>,

    #[arg(short = 'a', long, help = "Aggregate every station in the store")]
    pub all_stations: bool,

    #[arg(long, help = "First day of the range (YYYY-MM-DD)")]
    pub start_date: NaiveDate,

    #[arg(long, help = "Last day of the range, inclusive (YYYY-MM-DD)")]
    pub end_date: NaiveDate,

    #[arg(long, help = "Maximum writes in flight per station")]
    pub concurrency: Option<usize>,

    #[arg(long, help = "Stations processed at the same time")]
    pub station_parallelism: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_aggregate_requires_selector_and_dates() {
        assert!(Cli::try_parse_from(["air-quality-loader", "aggregate", "--start-date", "2024-01-01", "--end-date", "2024-01-02"]).is_err());
        assert!(Cli::try_parse_from(["air-quality-loader", "aggregate", "-a", "--start-date", "2024-01-01"]).is_err());
        assert!(Cli::try_parse_from(["air-quality-loader", "aggregate", "-a", "--station-code", "101", "--start-date", "2024-01-01", "--end-date", "2024-01-02"]).is_err());

        let cli = Cli::try_parse_from([
            "air-quality-loader",
            "aggregate",
            "--station-code",
            "101",
            "--start-date",
            "2024-01-01",
            "--end-date",
            "2024-01-31",
        ])
        .unwrap();
        match cli.command {
            Commands::Aggregate(args) => {
                assert_eq!(args.station_code, Some(101));
                assert_eq!(args.end_date, NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
            }
            _ => panic!("expected aggregate"),
        }
    }

    #[test]
    fn test_cluster_flags() {
        let cli = Cli::try_parse_from([
            "air-quality-loader",
            "schema",
            "--contact-points",
            "10.0.0.1:9042,10.0.0.2:9042",
            "--keyspace",
            "seoul",
            "--replication-factor",
            "3",
        ])
        .unwrap();

        assert_eq!(
            cli.contact_points,
            Some(vec!["10.0.0.1:9042".to_string(), "10.0.0.2:9042".to_string()])
        );
        assert_eq!(cli.keyspace.as_deref(), Some("seoul"));
        match cli.command {
            Commands::Schema(args) => assert_eq!(args.replication_factor, Some(3)),
            _ => panic!("expected schema"),
        }
    }

    #[test]
    fn test_malformed_date_rejected() {
        assert!(Cli::try_parse_from(["air-quality-loader", "aggregate", "-a", "--start-date", "01/01/2024", "--end-date", "2024-01-02"]).is_err());
    }
}
