use crate::error::{ProcessingError, Result};
use crate::models::QualityLabel;
use crate::readers::CsvRecord;
use crate::storage::schema::INSERT_POLLUTANT;
use crate::storage::{CqlValue, StorageRow};
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

/// Identifier of a measured pollutant (the dataset's "item code").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PollutantCode(String);

impl PollutantCode {
    pub fn new(code: impl Into<String>) -> Self {
        let code = code.into();
        let trimmed = code.trim();
        if trimmed.len() == code.len() {
            Self(code)
        } else {
            Self(trimmed.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PollutantCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PollutantCode {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

/// Upper bounds of the four quality bands, in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PollutantThreshold {
    pub good: f64,
    pub normal: f64,
    pub bad: f64,
    pub very_bad: f64,
}

impl PollutantThreshold {
    pub fn new(good: f64, normal: f64, bad: f64, very_bad: f64) -> Self {
        Self {
            good,
            normal,
            bad,
            very_bad,
        }
    }

    /// Boundaries must be finite and non-decreasing.
    pub fn check(&self, pollutant: &PollutantCode) -> Result<()> {
        let bounds = [
            ("good", self.good),
            ("normal", self.normal),
            ("bad", self.bad),
            ("very_bad", self.very_bad),
        ];

        if let Some((name, value)) = bounds.iter().find(|(_, v)| !v.is_finite()) {
            return Err(ProcessingError::InvalidThresholds {
                pollutant: pollutant.clone(),
                message: format!("{} boundary is not a finite number ({})", name, value),
            });
        }

        for pair in bounds.windows(2) {
            let ((lower_name, lower), (upper_name, upper)) = (pair[0], pair[1]);
            if lower > upper {
                return Err(ProcessingError::InvalidThresholds {
                    pollutant: pollutant.clone(),
                    message: format!(
                        "{} ({}) is greater than {} ({})",
                        lower_name, lower, upper_name, upper
                    ),
                });
            }
        }

        Ok(())
    }

    /// Inclusive upper-bound comparison against the boundaries in ascending order.
    pub fn classify(&self, mean: f64) -> QualityLabel {
        if mean <= self.good {
            QualityLabel::Good
        } else if mean <= self.normal {
            QualityLabel::Normal
        } else if mean <= self.bad {
            QualityLabel::Bad
        } else {
            QualityLabel::VeryBad
        }
    }
}

/// One row of the pollutant (item) reference file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Pollutant {
    #[serde(rename = "Item code")]
    pub code: PollutantCode,

    #[serde(rename = "Item name")]
    #[validate(length(min = 1))]
    pub name: String,

    #[serde(rename = "Unit of measurement")]
    pub unit: String,

    #[serde(rename = "Good(Blue)")]
    pub good: f64,

    #[serde(rename = "Normal(Green)")]
    pub normal: f64,

    #[serde(rename = "Bad(Yellow)")]
    pub bad: f64,

    #[serde(rename = "Very bad(Red)")]
    pub very_bad: f64,
}

impl Pollutant {
    pub fn new(
        code: PollutantCode,
        name: String,
        unit: String,
        threshold: PollutantThreshold,
    ) -> Self {
        Self {
            code,
            name,
            unit,
            good: threshold.good,
            normal: threshold.normal,
            bad: threshold.bad,
            very_bad: threshold.very_bad,
        }
    }

    pub fn threshold(&self) -> PollutantThreshold {
        PollutantThreshold::new(self.good, self.normal, self.bad, self.very_bad)
    }
}

impl CsvRecord for Pollutant {
    const COLUMNS: &'static [&'static str] = &[
        "Item code",
        "Item name",
        "Unit of measurement",
        "Good(Blue)",
        "Normal(Green)",
        "Bad(Yellow)",
        "Very bad(Red)",
    ];
}

impl StorageRow for Pollutant {
    const INSERT: &'static str = INSERT_POLLUTANT;

    fn partition_key(&self) -> Vec<CqlValue> {
        vec![CqlValue::Text(self.code.to_string())]
    }

    fn bind_values(&self) -> Vec<CqlValue> {
        vec![
            CqlValue::Text(self.code.to_string()),
            CqlValue::Text(self.name.clone()),
            CqlValue::Text(self.unit.clone()),
            CqlValue::Double(self.good),
            CqlValue::Double(self.normal),
            CqlValue::Double(self.bad),
            CqlValue::Double(self.very_bad),
        ]
    }

    fn describe(&self) -> String {
        format!("pollutant {}", self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn so2() -> PollutantThreshold {
        PollutantThreshold::new(0.02, 0.05, 0.10, 0.15)
    }

    #[test]
    fn test_classify_inclusive_bounds() {
        let threshold = so2();

        assert_eq!(threshold.classify(0.0), QualityLabel::Good);
        assert_eq!(threshold.classify(0.02), QualityLabel::Good);
        assert_eq!(threshold.classify(0.03), QualityLabel::Normal);
        assert_eq!(threshold.classify(0.05), QualityLabel::Normal);
        assert_eq!(threshold.classify(0.10), QualityLabel::Bad);
        assert_eq!(threshold.classify(0.12), QualityLabel::VeryBad);
        assert_eq!(threshold.classify(0.2), QualityLabel::VeryBad);
    }

    #[test]
    fn test_classification_is_monotonic() {
        let threshold = so2();
        let mut previous = QualityLabel::Good;

        for step in 0..=300 {
            let label = threshold.classify(step as f64 * 0.001);
            assert!(label >= previous, "label regressed at step {}", step);
            previous = label;
        }
    }

    #[test]
    fn test_check_rejects_decreasing_bounds() {
        let code = PollutantCode::new("SO2");
        assert!(so2().check(&code).is_ok());
        assert!(PollutantThreshold::new(0.02, 0.02, 0.02, 0.02)
            .check(&code)
            .is_ok());

        let err = PollutantThreshold::new(0.02, 0.01, 0.10, 0.15)
            .check(&code)
            .unwrap_err();
        assert!(err.to_string().contains("normal"));

        assert!(PollutantThreshold::new(0.02, f64::NAN, 0.10, 0.15)
            .check(&code)
            .is_err());
    }

    #[test]
    fn test_pollutant_code_is_trimmed() {
        assert_eq!(PollutantCode::new(" 1 ").as_str(), "1");
        assert_eq!(PollutantCode::from("SO2").to_string(), "SO2");
    }
}
