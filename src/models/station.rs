use crate::readers::CsvRecord;
use crate::storage::schema::INSERT_STATION;
use crate::storage::{CqlValue, StorageRow};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Station {
    #[serde(rename = "Station code")]
    pub station_code: i32,

    #[serde(rename = "Station name(district)")]
    #[validate(length(min = 1))]
    pub name: String,

    #[serde(rename = "Address")]
    pub address: String,

    #[serde(rename = "Latitude")]
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,

    #[serde(rename = "Longitude")]
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
}

impl Station {
    pub fn new(
        station_code: i32,
        name: String,
        address: String,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            station_code,
            name,
            address,
            latitude,
            longitude,
        }
    }
}

impl CsvRecord for Station {
    const COLUMNS: &'static [&'static str] = &[
        "Station code",
        "Station name(district)",
        "Address",
        "Latitude",
        "Longitude",
    ];
}

impl StorageRow for Station {
    const INSERT: &'static str = INSERT_STATION;

    fn partition_key(&self) -> Vec<CqlValue> {
        vec![CqlValue::Int(self.station_code)]
    }

    fn bind_values(&self) -> Vec<CqlValue> {
        vec![
            CqlValue::Int(self.station_code),
            CqlValue::Text(self.name.clone()),
            CqlValue::Text(self.address.clone()),
            CqlValue::Double(self.latitude),
            CqlValue::Double(self.longitude),
        ]
    }

    fn describe(&self) -> String {
        format!("station {}", self.station_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_station_validation() {
        let station = Station::new(
            101,
            "Jongno-gu".to_string(),
            "19, Jong-ro 35ga-gil, Jongno-gu, Seoul".to_string(),
            37.572016,
            127.005007,
        );

        assert!(station.validate().is_ok());
        assert_eq!(station.bind_values().len(), 5);
    }

    #[test]
    fn test_invalid_coordinates() {
        let station = Station::new(
            101,
            "Invalid Station".to_string(),
            String::new(),
            91.0, // Invalid latitude
            127.0,
        );

        assert!(station.validate().is_err());
    }
}
