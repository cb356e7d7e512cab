//! Forecast Metrics and Evaluation
//!
//! Accuracy metrics for comparing predicted and actual monthly generation:
//! MAE, RMSE, MAPE and R².

use serde::{Deserialize, Serialize};
use std::fmt;

/// Forecast accuracy metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastMetrics {
    /// Mean Absolute Error
    pub mae: f64,
    /// Root Mean Square Error
    pub rmse: f64,
    /// Mean Absolute Percentage Error (%)
    pub mape: f64,
    /// R² (coefficient of determination)
    pub r2: f64,
    /// Number of samples evaluated
    pub sample_count: usize,
    /// Maximum absolute error observed
    pub max_error: f64,
}

impl ForecastMetrics {
    /// Calculate metrics from actual and predicted values.
    ///
    /// A zero or non-finite actual value makes the percentage error undefined
    /// and is reported as an error instead of being skipped.
    pub fn calculate(actual: &[f64], predicted: &[f64]) -> Result<Self, ForecastMetricsError> {
        if actual.len() != predicted.len() {
            return Err(ForecastMetricsError::DimensionMismatch {
                actual: actual.len(),
                predicted: predicted.len(),
            });
        }

        if actual.is_empty() {
            return Err(ForecastMetricsError::EmptyData);
        }

        let n = actual.len() as f64;
        let mut abs_errors = Vec::with_capacity(actual.len());
        let mut squared_error_sum = 0.0;
        let mut percentage_error_sum = 0.0;

        for (index, (a, p)) in actual.iter().zip(predicted.iter()).enumerate() {
            if !a.is_finite() {
                return Err(ForecastMetricsError::NonFiniteActual { index });
            }
            if *a == 0.0 {
                return Err(ForecastMetricsError::ZeroActual { index });
            }
            if !p.is_finite() {
                return Err(ForecastMetricsError::NonFinitePrediction { index });
            }

            let error = a - p;
            abs_errors.push(error.abs());
            squared_error_sum += error * error;
            percentage_error_sum += (error / a).abs();
        }

        let mae = abs_errors.iter().sum::<f64>() / n;
        let rmse = (squared_error_sum / n).sqrt();
        let mape = percentage_error_sum / n * 100.0;

        let mean_actual = actual.iter().sum::<f64>() / n;
        let total_variance: f64 = actual.iter().map(|a| (a - mean_actual).powi(2)).sum();

        // constant actuals: perfect predictions score 1, anything else 0
        let r2 = if total_variance > 1e-10 {
            1.0 - (squared_error_sum / total_variance)
        } else if squared_error_sum == 0.0 {
            1.0
        } else {
            0.0
        };

        let max_error = abs_errors.iter().fold(0.0f64, |a, &b| a.max(b));

        Ok(ForecastMetrics {
            mae,
            rmse,
            mape,
            r2,
            sample_count: actual.len(),
            max_error,
        })
    }
}

/// Compact one-line summary used in evaluation logs.
impl fmt::Display for ForecastMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "r2={:.4} rmse={:.2} mape={:.2}% mae={:.2} max_err={:.2} n={}",
            self.r2, self.rmse, self.mape, self.mae, self.max_error, self.sample_count
        )
    }
}

/// Forecast metrics calculation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ForecastMetricsError {
    #[error("Dimension mismatch: actual={actual}, predicted={predicted}")]
    DimensionMismatch { actual: usize, predicted: usize },

    #[error("Empty data provided")]
    EmptyData,

    #[error("Actual value at index {index} is zero, percentage error undefined")]
    ZeroActual { index: usize },

    #[error("Actual value at index {index} is not finite")]
    NonFiniteActual { index: usize },

    #[error("Predicted value at index {index} is not finite")]
    NonFinitePrediction { index: usize },
}
