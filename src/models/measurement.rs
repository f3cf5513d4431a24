use crate::models::{PollutantCode, TimeUuid};
use crate::readers::CsvRecord;
use crate::storage::schema::INSERT_MEASUREMENT;
use crate::storage::{CqlValue, StorageRow};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One measurement line exactly as read from the file, before any parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    #[serde(rename = "Measurement date")]
    pub measurement_date: String,

    #[serde(rename = "Station code")]
    pub station_code: String,

    #[serde(rename = "Item code")]
    pub item_code: String,

    #[serde(rename = "Average value")]
    pub average_value: String,

    #[serde(rename = "Instrument status")]
    pub instrument_status: String,
}

impl RawRow {
    pub fn new(
        measurement_date: &str,
        station_code: &str,
        item_code: &str,
        average_value: &str,
        instrument_status: &str,
    ) -> Self {
        Self {
            measurement_date: measurement_date.to_string(),
            station_code: station_code.to_string(),
            item_code: item_code.to_string(),
            average_value: average_value.to_string(),
            instrument_status: instrument_status.to_string(),
        }
    }
}

impl CsvRecord for RawRow {
    const COLUMNS: &'static [&'static str] = &[
        "Measurement date",
        "Station code",
        "Item code",
        "Average value",
        "Instrument status",
    ];
}

/// A measurement in its stored shape, keyed by station and calendar day.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMeasurement {
    pub station_code: i32,
    pub measurement_date: NaiveDate,
    pub ts: TimeUuid,
    pub pollutant: PollutantCode,
    pub average_value: f64,
    pub instrument_status: i32,
}

impl StorageRow for RawMeasurement {
    const INSERT: &'static str = INSERT_MEASUREMENT;

    fn partition_key(&self) -> Vec<CqlValue> {
        vec![
            CqlValue::Int(self.station_code),
            CqlValue::Date(self.measurement_date),
        ]
    }

    fn bind_values(&self) -> Vec<CqlValue> {
        vec![
            CqlValue::Int(self.station_code),
            CqlValue::Date(self.measurement_date),
            CqlValue::Timeuuid(self.ts),
            CqlValue::Text(self.pollutant.to_string()),
            CqlValue::Double(self.average_value),
            CqlValue::Int(self.instrument_status),
        ]
    }

    fn describe(&self) -> String {
        format!(
            "measurement {} station {} pollutant {} on {}",
            self.ts, self.station_code, self.pollutant, self.measurement_date
        )
    }
}
