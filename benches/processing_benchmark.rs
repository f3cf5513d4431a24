use air_quality_loader::error::RowLocation;
use air_quality_loader::models::{PollutantCode, PollutantThreshold, RawRow};
use air_quality_loader::processors::{summarize, RowTransformer, ThresholdCatalog};
use air_quality_loader::readers::Located;
use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

const POLLUTANTS: [&str; 6] = ["1", "3", "5", "6", "8", "9"];

// Hourly rows for a handful of stations and pollutants
fn create_raw_rows(stations: usize, days: usize) -> Vec<Located<RawRow>> {
    let base = NaiveDate::from_ymd_opt(2017, 1, 1).unwrap();
    let mut rows = Vec::with_capacity(stations * days * 24 * POLLUTANTS.len());

    for station in 0..stations {
        for day in 0..days {
            let date = base + chrono::Duration::days(day as i64);
            for hour in 0..24 {
                for (p, code) in POLLUTANTS.iter().enumerate() {
                    let value = 0.002 * (1 + (hour + p + station) % 40) as f64;
                    rows.push(Located {
                        location: RowLocation::new(rows.len() as u64 + 1, None),
                        record: RawRow::new(
                            &format!("{} {:02}:00", date.format("%Y-%m-%d"), hour),
                            &(101 + station).to_string(),
                            code,
                            &value.to_string(),
                            "0",
                        ),
                    });
                }
            }
        }
    }

    rows
}

fn benchmark_row_transformation(c: &mut Criterion) {
    let rows = create_raw_rows(5, 30);

    c.bench_function("transform_chunk", |b| {
        b.iter(|| {
            let mut transformer = RowTransformer::new();
            let measurements = transformer.transform_chunk(&rows).unwrap_or_default();
            black_box(measurements.len())
        })
    });
}

fn benchmark_daily_summaries(c: &mut Criterion) {
    let mut group = c.benchmark_group("daily_summaries_by_days");

    for &days in &[7, 30, 365] {
        let readings: Vec<(PollutantCode, NaiveDate, f64)> = {
            let mut transformer = RowTransformer::new();
            transformer
                .transform_chunk(&create_raw_rows(1, days))
                .unwrap_or_default()
                .into_iter()
                .map(|m| (m.pollutant, m.measurement_date, m.average_value))
                .collect()
        };

        group.bench_with_input(BenchmarkId::new("days", days), &readings, |b, readings| {
            b.iter(|| black_box(summarize(101, readings.iter().cloned()).len()))
        });
    }

    group.finish();
}

fn benchmark_classification(c: &mut Criterion) {
    let catalog = ThresholdCatalog::from_thresholds(POLLUTANTS.iter().map(|code| {
        (
            PollutantCode::new(*code),
            PollutantThreshold::new(0.02, 0.05, 0.15, 1.0),
        )
    }))
    .unwrap_or_default();
    let codes: Vec<PollutantCode> = POLLUTANTS.iter().map(|c| PollutantCode::new(*c)).collect();

    c.bench_function("classify_means", |b| {
        b.iter(|| {
            let mut labelled = 0;
            for (i, code) in codes.iter().cycle().take(10_000).enumerate() {
                if catalog.classify(code, i as f64 * 0.0001).is_ok() {
                    labelled += 1;
                }
            }
            black_box(labelled)
        })
    });
}

criterion_group!(
    benches,
    benchmark_row_transformation,
    benchmark_daily_summaries,
    benchmark_classification
);
criterion_main!(benches);
