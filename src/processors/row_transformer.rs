use crate::error::{ProcessingError, Result, RowLocation};
use crate::models::{PollutantCode, RawMeasurement, RawRow, TimeUuidGenerator};
use crate::readers::Located;
use crate::utils::constants::TIMESTAMP_FORMATS;
use chrono::NaiveDateTime;
use rayon::prelude::*;

/// A measurement row with typed fields but no storage id yet.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRow {
    pub station_code: i32,
    pub timestamp: NaiveDateTime,
    pub pollutant: PollutantCode,
    pub average_value: f64,
    pub instrument_status: i32,
}

impl ParsedRow {
    fn into_measurement(self, generator: &mut TimeUuidGenerator) -> RawMeasurement {
        RawMeasurement {
            station_code: self.station_code,
            measurement_date: self.timestamp.date(),
            ts: generator.next_for(self.timestamp),
            pollutant: self.pollutant,
            average_value: self.average_value,
            instrument_status: self.instrument_status,
        }
    }
}

/// Turns raw measurement rows into their stored shape.
pub struct RowTransformer {
    generator: TimeUuidGenerator,
}

impl RowTransformer {
    pub fn new() -> Self {
        Self {
            generator: TimeUuidGenerator::new(),
        }
    }

    pub fn with_generator(generator: TimeUuidGenerator) -> Self {
        Self { generator }
    }

    pub fn parse(row: &RawRow, location: RowLocation) -> Result<ParsedRow> {
        let invalid = |message: String| ProcessingError::InvalidRow { location, message };

        let timestamp = parse_timestamp(&row.measurement_date).ok_or_else(|| {
            invalid(format!(
                "unparseable measurement date '{}'",
                row.measurement_date
            ))
        })?;

        let station_code = row.station_code.trim().parse::<i32>().map_err(|_| {
            invalid(format!("station code '{}' is not an integer", row.station_code))
        })?;

        let pollutant = PollutantCode::new(row.item_code.as_str());
        if pollutant.as_str().is_empty() {
            return Err(invalid("empty item code".to_string()));
        }

        let average_value = row
            .average_value
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| {
                invalid(format!(
                    "average value '{}' is not a finite number",
                    row.average_value
                ))
            })?;

        let instrument_status = row.instrument_status.trim().parse::<i32>().map_err(|_| {
            invalid(format!(
                "instrument status '{}' is not an integer",
                row.instrument_status
            ))
        })?;

        Ok(ParsedRow {
            station_code,
            timestamp,
            pollutant,
            average_value,
            instrument_status,
        })
    }

    /// Transform one row, issuing its id from this transformer's generator.
    pub fn transform(&mut self, row: &RawRow, location: RowLocation) -> Result<RawMeasurement> {
        Ok(Self::parse(row, location)?.into_measurement(&mut self.generator))
    }

    /// Parse a chunk in parallel, then assign ids in input order.
    ///
    /// Fails with the error of the earliest bad row; no ids are issued then.
    pub fn transform_chunk(&mut self, chunk: &[Located<RawRow>]) -> Result<Vec<RawMeasurement>> {
        let parsed: Vec<Result<ParsedRow>> = chunk
            .par_iter()
            .map(|located| Self::parse(&located.record, located.location))
            .collect();

        let parsed = parsed.into_iter().collect::<Result<Vec<_>>>()?;

        Ok(parsed
            .into_iter()
            .map(|row| row.into_measurement(&mut self.generator))
            .collect())
    }
}

impl Default for RowTransformer {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn located(row: u64, raw: RawRow) -> Located<RawRow> {
        Located {
            location: RowLocation::new(row, Some(row * 40)),
            record: raw,
        }
    }

    #[test]
    fn test_parse_valid_row() -> Result<()> {
        let raw = RawRow::new("2017-01-01 00:00", "101", "1", "0.004", "0");
        let parsed = RowTransformer::parse(&raw, RowLocation::new(1, None))?;

        assert_eq!(parsed.station_code, 101);
        assert_eq!(parsed.pollutant.as_str(), "1");
        assert_eq!(parsed.average_value, 0.004);
        assert_eq!(
            parsed.timestamp.date(),
            NaiveDate::from_ymd_opt(2017, 1, 1).unwrap()
        );

        let with_seconds = RawRow::new("2017-01-01 23:59:30", "101", "1", "-1", "9");
        let parsed = RowTransformer::parse(&with_seconds, RowLocation::new(2, None))?;
        assert_eq!(parsed.instrument_status, 9);
        assert_eq!(parsed.average_value, -1.0);
        Ok(())
    }

    #[test]
    fn test_invalid_fields_are_rejected() {
        let location = RowLocation::new(7, Some(512));
        let cases = [
            RawRow::new("01/01/2017 00:00", "101", "1", "0.004", "0"),
            RawRow::new("2017-01-01 00:00", "10x", "1", "0.004", "0"),
            RawRow::new("2017-01-01 00:00", "101", "1", "n/a", "0"),
            RawRow::new("2017-01-01 00:00", "101", "1", "NaN", "0"),
            RawRow::new("2017-01-01 00:00", "101", "1", "inf", "0"),
            RawRow::new("2017-01-01 00:00", "101", "1", "0.004", "0.5"),
            RawRow::new("2017-01-01 00:00", "101", "", "0.004", "0"),
        ];

        for raw in &cases {
            let err = RowTransformer::parse(raw, location).unwrap_err();
            assert!(
                err.to_string().contains("row 7 (byte 512)"),
                "unexpected message: {}",
                err
            );
        }
    }

    #[test]
    fn test_ids_increase_within_a_chunk() -> Result<()> {
        let chunk: Vec<_> = (0..50)
            .map(|i| located(i + 1, RawRow::new("2017-01-01 00:00", "101", "1", "0.004", "0")))
            .collect();
        let mut transformer = RowTransformer::new();

        let rows = transformer.transform_chunk(&chunk)?;

        assert_eq!(rows.len(), 50);
        assert!(rows.windows(2).all(|w| w[0].ts < w[1].ts));
        Ok(())
    }

    #[test]
    fn test_station_sorted_file_keeps_row_times() -> Result<()> {
        let chunk = vec![
            located(1, RawRow::new("2019-12-31 23:00", "101", "1", "0.004", "0")),
            located(2, RawRow::new("2017-01-01 00:00", "102", "1", "0.004", "0")),
            located(3, RawRow::new("2017-01-01 00:00", "102", "3", "0.030", "0")),
        ];

        let first = RowTransformer::with_generator(TimeUuidGenerator::new()).transform_chunk(&chunk)?;
        let second = RowTransformer::new().transform_chunk(&chunk)?;

        let expected = NaiveDate::from_ymd_opt(2017, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(first[1].ts.timestamp().unwrap().naive_utc(), expected);
        assert_eq!(first[2].ts.timestamp().unwrap().naive_utc(), expected);
        assert!(first[1].ts < first[2].ts);
        assert!(first[1].ts < first[0].ts);

        let ids = |rows: &[RawMeasurement]| rows.iter().map(|m| m.ts).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
        Ok(())
    }

    #[test]
    fn test_bad_row_reports_earliest_location() {
        let mut chunk: Vec<_> = (0..20)
            .map(|i| located(i + 1, RawRow::new("2017-01-01 00:00", "101", "1", "0.004", "0")))
            .collect();
        chunk[5].record.average_value = "bad".to_string();
        chunk[15].record.station_code = "bad".to_string();

        let err = RowTransformer::new().transform_chunk(&chunk).unwrap_err();
        match err {
            ProcessingError::InvalidRow { location, .. } => assert_eq!(location.row, 6),
            other => panic!("unexpected error {}", other),
        }
    }
}
