use serde::{Deserialize, Serialize};

use super::{Location, PerLocation, YearMonth};

/// Row of `monthly_generation`, keyed by (year, month, location).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub period: YearMonth,
    pub location: Location,
    pub actual_kwh: Option<f64>,
    pub predicted_kwh: Option<f64>,
}

/// Pivoted generation: one row per month, one actual per location.
///
/// A location without a recorded value for the month is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyActuals {
    pub period: YearMonth,
    pub actuals: PerLocation<Option<f64>>,
}

/// Row of `feature_importance`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportanceRecord {
    pub feature_name: String,
    pub importance_value: f64,
}

/// Round to the two decimals stored for kWh values.
pub fn round_kwh(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Round to the three decimals stored for importance scores.
pub fn round_importance(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounding() {
        assert_eq!(round_kwh(103.954), 103.95);
        assert_eq!(round_kwh(96.048), 96.05);
        assert_eq!(round_importance(0.12345), 0.123);
    }
}
