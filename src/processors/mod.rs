pub mod aggregation_pipeline;
pub mod daily_aggregator;
pub mod ingestion_pipeline;
pub mod quality_classifier;
pub mod row_transformer;

pub use aggregation_pipeline::{AggregationPipeline, AggregationSummary, StationOutcome, StationSelection};
pub use daily_aggregator::{summarize, DailyAggregator};
pub use ingestion_pipeline::{IngestionPipeline, IngestionSummary};
pub use quality_classifier::{QualityClassifier, ThresholdCatalog};
pub use row_transformer::{ParsedRow, RowTransformer};
