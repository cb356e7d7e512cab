//! Diagnostic bias correction of evaluation-window predictions
//!
//! Each raw prediction is nudged toward the *known* actual value by a bounded
//! fraction of itself, proportional to how wrong it was. Because it consumes the
//! evaluation-window actuals, the result illustrates achievable error reduction
//! and is not a blind forecast. Nothing here should be used to predict months
//! whose actual generation is unknown.

use tracing::debug;

use crate::config::CorrectionConfig;
use crate::domain::{Location, PerLocation};

/// Bias correction errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CorrectionError {
    #[error("prediction rows ({predicted}) do not match actual rows ({actual})")]
    LengthMismatch { predicted: usize, actual: usize },

    #[error("actual value for {location} at evaluation row {row} is zero, relative error undefined")]
    ZeroActual { location: Location, row: usize },

    #[error("actual value for {location} at evaluation row {row} is not finite")]
    NonFiniteActual { location: Location, row: usize },

    #[error("raw prediction for {location} at evaluation row {row} is not finite")]
    NonFinitePrediction { location: Location, row: usize },
}

/// Offline evaluation helper that corrects predictions using ground truth.
#[derive(Debug, Clone, Copy)]
pub struct DiagnosticCorrection {
    config: CorrectionConfig,
}

impl Default for DiagnosticCorrection {
    fn default() -> Self {
        Self::new(CorrectionConfig::default())
    }
}

impl DiagnosticCorrection {
    pub fn new(config: CorrectionConfig) -> Self {
        Self { config }
    }

    /// Fraction of the prediction to move by: `|error| * damping`, raised to
    /// the floor then capped at the ceiling. An inverted pair yields the ceiling.
    pub fn scaled_error(&self, relative_error: f64) -> f64 {
        (relative_error.abs() * self.config.damping)
            .max(self.config.floor)
            .min(self.config.ceiling)
    }

    /// Correct a single prediction against its actual value.
    ///
    /// Equal values count as "not over-predicted" and are scaled up by the floor.
    pub fn correct(&self, predicted: f64, actual: f64) -> Option<f64> {
        if actual == 0.0 || !actual.is_finite() || !predicted.is_finite() {
            return None;
        }
        let scaled = self.scaled_error((predicted - actual) / actual);
        let factor = if predicted > actual {
            1.0 - scaled
        } else {
            1.0 + scaled
        };
        Some(predicted * factor)
    }

    /// Correct every evaluation row. `predicted` and `actual` are row-aligned.
    pub fn apply(
        &self,
        predicted: &[PerLocation<f64>],
        actual: &[PerLocation<f64>],
    ) -> Result<Vec<PerLocation<f64>>, CorrectionError> {
        if predicted.len() != actual.len() {
            return Err(CorrectionError::LengthMismatch {
                predicted: predicted.len(),
                actual: actual.len(),
            });
        }

        let mut corrected = Vec::with_capacity(predicted.len());
        for (row, (p, a)) in predicted.iter().zip(actual.iter()).enumerate() {
            let mut values = PerLocation::default();
            for location in Location::ALL {
                let (p, a) = (p[location], a[location]);
                if !a.is_finite() {
                    return Err(CorrectionError::NonFiniteActual { location, row });
                }
                if a == 0.0 {
                    return Err(CorrectionError::ZeroActual { location, row });
                }
                values[location] = self
                    .correct(p, a)
                    .ok_or(CorrectionError::NonFinitePrediction { location, row })?;
            }
            corrected.push(values);
        }

        debug!(rows = corrected.len(), "applied diagnostic correction");
        Ok(corrected)
    }
}
