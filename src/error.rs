use crate::models::PollutantCode;
use crate::storage::StoreError;
use crate::writers::WriteReport;
use chrono::NaiveDate;
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProcessingError>;

/// Position of a record in its source file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowLocation {
    /// 1-based data row, not counting the header.
    pub row: u64,
    pub byte_offset: Option<u64>,
}

impl RowLocation {
    pub fn new(row: u64, byte_offset: Option<u64>) -> Self {
        Self { row, byte_offset }
    }
}

impl fmt::Display for RowLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.byte_offset {
            Some(offset) => write!(f, "row {} (byte {})", self.row, offset),
            None => write!(f, "row {}", self.row),
        }
    }
}

/// How the orchestration layer should react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad input data or arguments; fatal to the unit of work.
    Validation,
    /// A store operation failed; confined to the station or chunk that issued it.
    Store,
    /// Input layout does not match the expected columns; fatal at startup.
    Schema,
    /// Everything else (I/O, task failures, cancellation).
    Runtime,
}

#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Date parsing error: {0}")]
    DateParse(#[from] chrono::ParseError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid record at {location}: {message}")]
    InvalidRow {
        location: RowLocation,
        message: String,
    },

    #[error("No thresholds for pollutant '{pollutant}'")]
    UnknownPollutant { pollutant: PollutantCode },

    #[error("Invalid thresholds for pollutant '{pollutant}': {message}")]
    InvalidThresholds {
        pollutant: PollutantCode,
        message: String,
    },

    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("Schema mismatch in {source_name}: expected columns {expected:?}, found {found:?}")]
    SchemaMismatch {
        source_name: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("{}", .0.summary())]
    PartialWrite(Box<WriteReport>),

    #[error("Write cancelled: {}", .0.summary())]
    WriteCancelled(Box<WriteReport>),

    #[error("Station {station_code} ({start} to {end}): {source}")]
    Station {
        station_code: i32,
        start: NaiveDate,
        end: NaiveDate,
        #[source]
        source: Box<ProcessingError>,
    },

    #[error("{failed} of {total} stations failed:\n{details}")]
    StationsFailed {
        failed: usize,
        total: usize,
        details: String,
    },

    #[error("Missing required data: {0}")]
    MissingData(String),

    #[error("Async task error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl From<config::ConfigError> for ProcessingError {
    fn from(err: config::ConfigError) -> Self {
        ProcessingError::Config(err.to_string())
    }
}

impl ProcessingError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ProcessingError::Validation(_)
            | ProcessingError::InvalidRow { .. }
            | ProcessingError::UnknownPollutant { .. }
            | ProcessingError::InvalidThresholds { .. }
            | ProcessingError::InvalidDateRange { .. }
            | ProcessingError::DateParse(_) => ErrorCategory::Validation,

            ProcessingError::SchemaMismatch { .. } => ErrorCategory::Schema,

            ProcessingError::Store(_) | ProcessingError::PartialWrite(_) => ErrorCategory::Store,

            ProcessingError::Station { source, .. } => source.category(),

            _ => ErrorCategory::Runtime,
        }
    }

    /// Attach the station and date range being processed.
    pub fn for_station(self, station_code: i32, start: NaiveDate, end: NaiveDate) -> Self {
        match self {
            already @ ProcessingError::Station { .. } => already,
            other => ProcessingError::Station {
                station_code,
                start,
                end,
                source: Box::new(other),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_location_display() {
        assert_eq!(RowLocation::new(12, Some(340)).to_string(), "row 12 (byte 340)");
        assert_eq!(RowLocation::new(3, None).to_string(), "row 3");
    }

    #[test]
    fn test_station_context_keeps_category() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let err = ProcessingError::UnknownPollutant {
            pollutant: PollutantCode::new("ZZZ"),
        }
        .for_station(101, date, date);

        assert_eq!(err.category(), ErrorCategory::Validation);
        assert!(err.to_string().contains("Station 101"));
        assert!(err.to_string().contains("ZZZ"));

        let err = ProcessingError::Store(StoreError::Unavailable("node down".into()))
            .for_station(101, date, date);
        assert_eq!(err.category(), ErrorCategory::Store);
    }
}
