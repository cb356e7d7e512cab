//! Machine Learning Module
//!
//! Training and evaluation of the per-location generation models:
//! - Feature standardisation
//! - Random forest regressors (smartcore backend)
//! - Permutation feature importance
//! - Diagnostic bias correction of evaluation-window predictions
//! - Weather-only baseline models

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::domain::Location;

pub mod correction;
pub mod importance;
pub mod scaler;
pub mod smartcore;
pub mod training;
pub mod weather_only;

/// ML Model Metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_id: String,
    pub location: Location,
    pub trained_at: chrono::DateTime<chrono::Utc>,
    pub training_samples: usize,
    pub feature_names: Vec<String>,
}

/// A fitted regressor over a fixed feature subset.
pub trait Regressor: Send + Sync {
    /// Predict one value per row of `x`.
    fn predict_batch(&self, x: &[Vec<f64>]) -> Result<Vec<f64>>;

    /// Get model metadata
    fn metadata(&self) -> &ModelMetadata;
}
