use crate::error::{ProcessingError, Result};
use crate::models::PollutantCode;
use crate::storage::schema::INSERT_DAILY_AGGREGATE;
use crate::storage::{CqlValue, Row, StorageRow};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ordinal air-quality band; variants are declared from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityLabel {
    Good,
    Normal,
    Bad,
    VeryBad,
}

impl QualityLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityLabel::Good => "good",
            QualityLabel::Normal => "normal",
            QualityLabel::Bad => "bad",
            QualityLabel::VeryBad => "very_bad",
        }
    }
}

impl fmt::Display for QualityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityLabel {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "good" => Ok(QualityLabel::Good),
            "normal" => Ok(QualityLabel::Normal),
            "bad" => Ok(QualityLabel::Bad),
            "very_bad" => Ok(QualityLabel::VeryBad),
            other => Err(ProcessingError::MissingData(format!(
                "unrecognised quality label '{}'",
                other
            ))),
        }
    }
}

/// Statistics of one (station, pollutant, day) group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAggregate {
    pub station_code: i32,
    pub date: NaiveDate,
    pub pollutant: PollutantCode,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub count: u64,
}

/// A daily aggregate with its quality band, ready to be written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedAggregate {
    pub aggregate: DailyAggregate,
    pub label: QualityLabel,
}

impl ClassifiedAggregate {
    pub fn new(aggregate: DailyAggregate, label: QualityLabel) -> Self {
        Self { aggregate, label }
    }

    /// Rebuild from a row of `SELECT_DAILY_AGGREGATES`.
    pub fn from_row(station_code: i32, row: &Row) -> Result<Self> {
        let count = row.get_i64(5)?;
        let aggregate = DailyAggregate {
            station_code,
            date: row.get_date(0)?,
            pollutant: PollutantCode::new(row.get_text(1)?),
            mean: row.get_f64(2)?,
            min: row.get_f64(3)?,
            max: row.get_f64(4)?,
            count: u64::try_from(count).map_err(|_| {
                ProcessingError::MissingData(format!("negative measurement count {}", count))
            })?,
        };

        Ok(Self::new(aggregate, row.get_text(6)?.parse()?))
    }
}

impl StorageRow for ClassifiedAggregate {
    const INSERT: &'static str = INSERT_DAILY_AGGREGATE;

    fn partition_key(&self) -> Vec<CqlValue> {
        vec![CqlValue::Int(self.aggregate.station_code)]
    }

    fn bind_values(&self) -> Vec<CqlValue> {
        let agg = &self.aggregate;
        vec![
            CqlValue::Int(agg.station_code),
            CqlValue::Date(agg.date),
            CqlValue::Text(agg.pollutant.to_string()),
            CqlValue::Double(agg.mean),
            CqlValue::Double(agg.max),
            CqlValue::Double(agg.min),
            CqlValue::Text(self.label.to_string()),
            CqlValue::BigInt(i64::try_from(agg.count).unwrap_or(i64::MAX)),
        ]
    }

    fn describe(&self) -> String {
        format!(
            "aggregate station {} pollutant {} on {}",
            self.aggregate.station_code, self.aggregate.pollutant, self.aggregate.date
        )
    }
}
