use crate::error::{ProcessingError, Result};
use crate::models::{ClassifiedAggregate, DailyAggregate, PollutantCode, PollutantThreshold, QualityLabel};
use crate::storage::schema::SELECT_THRESHOLDS;
use crate::storage::StorageGateway;
use std::collections::HashMap;
use tracing::info;

/// Per-pollutant classification boundaries, loaded once and shared read-only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThresholdCatalog {
    thresholds: HashMap<PollutantCode, PollutantThreshold>,
}

impl ThresholdCatalog {
    /// Build a catalog, rejecting any pollutant whose boundaries decrease.
    pub fn from_thresholds(
        entries: impl IntoIterator<Item = (PollutantCode, PollutantThreshold)>,
    ) -> Result<Self> {
        let mut thresholds = HashMap::new();
        for (code, threshold) in entries {
            threshold.check(&code)?;
            thresholds.insert(code, threshold);
        }
        Ok(Self { thresholds })
    }

    pub async fn load(gateway: &dyn StorageGateway) -> Result<Self> {
        let rows = gateway.query(SELECT_THRESHOLDS, Vec::new()).await?;

        let entries = rows
            .iter()
            .map(|row| -> Result<(PollutantCode, PollutantThreshold)> {
                let code = PollutantCode::new(row.get_text(0)?);
                let threshold = PollutantThreshold::new(
                    row.get_f64(1)?,
                    row.get_f64(2)?,
                    row.get_f64(3)?,
                    row.get_f64(4)?,
                );
                Ok((code, threshold))
            })
            .collect::<Result<Vec<_>>>()?;

        let catalog = Self::from_thresholds(entries)?;
        info!("Loaded thresholds for {} pollutants", catalog.len());
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.thresholds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }

    pub fn get(&self, pollutant: &PollutantCode) -> Option<&PollutantThreshold> {
        self.thresholds.get(pollutant)
    }

    pub fn classify(&self, pollutant: &PollutantCode, mean: f64) -> Result<QualityLabel> {
        self.get(pollutant)
            .map(|threshold| threshold.classify(mean))
            .ok_or_else(|| ProcessingError::UnknownPollutant {
                pollutant: pollutant.clone(),
            })
    }
}

/// Applies a catalog to daily aggregates.
pub struct QualityClassifier<'a> {
    catalog: &'a ThresholdCatalog,
}

impl<'a> QualityClassifier<'a> {
    pub fn new(catalog: &'a ThresholdCatalog) -> Self {
        Self { catalog }
    }

    /// Classify every aggregate or none: the first unknown pollutant fails the lot.
    pub fn classify_all(&self, aggregates: Vec<DailyAggregate>) -> Result<Vec<ClassifiedAggregate>> {
        aggregates
            .into_iter()
            .map(|aggregate| {
                let label = self.catalog.classify(&aggregate.pollutant, aggregate.mean)?;
                Ok(ClassifiedAggregate::new(aggregate, label))
            })
            .collect()
    }
}
