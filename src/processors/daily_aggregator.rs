use crate::error::{ProcessingError, Result};
use crate::models::{DailyAggregate, PollutantCode};
use crate::storage::schema::SELECT_STATION_MEASUREMENTS;
use crate::storage::{CqlValue, StorageGateway};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Running count, mean, min and max of one group.
#[derive(Debug, Clone, Copy)]
struct Accumulator {
    count: u64,
    mean: f64,
    min: f64,
    max: f64,
}

impl Accumulator {
    fn new(value: f64) -> Self {
        Self {
            count: 1,
            mean: value,
            min: value,
            max: value,
        }
    }

    fn push(&mut self, value: f64) {
        self.count += 1;
        self.mean += (value - self.mean) / self.count as f64;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }
}

/// Computes daily statistics for a station from its raw measurements.
#[derive(Clone)]
pub struct DailyAggregator {
    gateway: Arc<dyn StorageGateway>,
}

impl DailyAggregator {
    pub fn new(gateway: Arc<dyn StorageGateway>) -> Self {
        Self { gateway }
    }

    /// Aggregates for `start..=end`, sorted by (pollutant, date).
    pub async fn aggregate(
        &self,
        station_code: i32,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyAggregate>> {
        if start > end {
            return Err(ProcessingError::InvalidDateRange { start, end });
        }

        let rows = self
            .gateway
            .query(
                SELECT_STATION_MEASUREMENTS,
                vec![
                    CqlValue::Int(station_code),
                    CqlValue::Date(start),
                    CqlValue::Date(end),
                ],
            )
            .await?;
        debug!(
            "Station {}: {} measurements between {} and {}",
            station_code,
            rows.len(),
            start,
            end
        );

        let mut readings = Vec::with_capacity(rows.len());
        for row in &rows {
            readings.push((
                PollutantCode::new(row.get_text(1)?),
                row.get_date(2)?,
                row.get_f64(0)?,
            ));
        }

        Ok(summarize(station_code, readings))
    }
}

/// Group readings by (pollutant, date) and reduce each group.
pub fn summarize(
    station_code: i32,
    readings: impl IntoIterator<Item = (PollutantCode, NaiveDate, f64)>,
) -> Vec<DailyAggregate> {
    let mut groups: BTreeMap<(PollutantCode, NaiveDate), Accumulator> = BTreeMap::new();

    for (pollutant, date, value) in readings {
        groups
            .entry((pollutant, date))
            .and_modify(|acc| acc.push(value))
            .or_insert_with(|| Accumulator::new(value));
    }

    groups
        .into_iter()
        .map(|((pollutant, date), acc)| DailyAggregate {
            station_code,
            date,
            pollutant,
            mean: acc.mean.clamp(acc.min, acc.max),
            min: acc.min,
            max: acc.max,
            count: acc.count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RawMeasurement, TimeUuidGenerator};
    use crate::storage::{MemoryGateway, PreparedStatement, StorageRow};

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn code(s: &str) -> PollutantCode {
        PollutantCode::new(s)
    }

    #[test]
    fn test_single_group_statistics() {
        let out = summarize(
            101,
            vec![
                (code("SO2"), date(1), 0.02),
                (code("SO2"), date(1), 0.03),
                (code("SO2"), date(1), 0.04),
            ],
        );

        assert_eq!(out.len(), 1);
        let agg = &out[0];
        assert_eq!(agg.count, 3);
        assert_eq!(agg.min, 0.02);
        assert_eq!(agg.max, 0.04);
        assert!((agg.mean - 0.03).abs() < 1e-12);
    }

    #[test]
    fn test_single_reading_has_equal_stats() {
        let out = summarize(101, vec![(code("O3"), date(2), 0.017)]);
        assert_eq!(out[0].mean, 0.017);
        assert_eq!(out[0].min, 0.017);
        assert_eq!(out[0].max, 0.017);
    }

    #[test]
    fn test_output_sorted_and_bounded() {
        let readings = vec![
            (code("SO2"), date(2), 0.1),
            (code("NO2"), date(1), 0.3),
            (code("SO2"), date(1), 0.1),
            (code("NO2"), date(1), 0.1),
            (code("SO2"), date(1), 0.1),
            (code("SO2"), date(1), 0.1),
        ];

        let out = summarize(101, readings);
        let keys: Vec<(String, NaiveDate)> = out
            .iter()
            .map(|a| (a.pollutant.to_string(), a.date))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("NO2".to_string(), date(1)),
                ("SO2".to_string(), date(1)),
                ("SO2".to_string(), date(2)),
            ]
        );
        assert_eq!(out[1].count, 3);
        for agg in &out {
            assert!(agg.min <= agg.mean && agg.mean <= agg.max);
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(summarize(101, Vec::new()).is_empty());
    }

    #[tokio::test]
    async fn test_aggregate_reads_inclusive_range() -> Result<()> {
        let gateway = Arc::new(MemoryGateway::with_air_quality_tables());
        let insert = PreparedStatement::new(RawMeasurement::INSERT);
        let mut ids = TimeUuidGenerator::new();

        for (station, day, value) in [(101, 1, 0.02), (101, 3, 0.04), (101, 4, 0.09), (102, 2, 0.5)] {
            let at = date(day).and_hms_opt(1, 0, 0).unwrap();
            let measurement = RawMeasurement {
                station_code: station,
                measurement_date: date(day),
                ts: ids.next_for(at),
                pollutant: code("SO2"),
                average_value: value,
                instrument_status: 0,
            };
            gateway.execute(&insert, measurement.bind_values()).await?;
        }

        let aggregator = DailyAggregator::new(gateway);
        let out = aggregator.aggregate(101, date(1), date(3)).await?;

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].date, date(1));
        assert_eq!(out[1].date, date(3));
        assert!(out.iter().all(|a| a.station_code == 101));

        assert!(aggregator.aggregate(101, date(10), date(12)).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_inverted_range_is_rejected() {
        let aggregator = DailyAggregator::new(Arc::new(MemoryGateway::with_air_quality_tables()));
        let err = aggregator.aggregate(101, date(5), date(1)).await.unwrap_err();
        assert!(matches!(err, ProcessingError::InvalidDateRange { .. }));
    }
}
