//! SmartCore random forest wrapper
//!
//! Maps the shared forest policy from [`TrainingConfig`] onto smartcore's
//! `RandomForestRegressor` and exposes the fitted model as a [`Regressor`].

use anyhow::Result;
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use tracing::{debug, warn};

use super::{ModelMetadata, Regressor};
use crate::config::TrainingConfig;
use crate::domain::Location;

type ForestModel = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Fitted smartcore random forest for one location.
pub struct SmartcoreRandomForest {
    pub metadata: ModelMetadata,
    model: ForestModel,
    pub n_trees: usize,
    pub max_depth: Option<usize>,
}

impl SmartcoreRandomForest {
    /// Number of features tried at each split: `max(1, floor(fraction * n_features))`.
    pub fn features_per_split(max_features: f64, n_features: usize) -> usize {
        ((max_features * n_features as f64).floor() as usize).clamp(1, n_features.max(1))
    }

    /// Translate the forest policy into smartcore parameters.
    ///
    /// smartcore always bootstraps and has no impurity-decrease threshold, so
    /// those two settings are carried in the config but not forwarded.
    pub fn parameters(config: &TrainingConfig, n_features: usize) -> RandomForestRegressorParameters {
        if !config.bootstrap {
            warn!("bootstrap=false is not supported by the smartcore backend, sampling with replacement");
        }
        if config.min_impurity_decrease > 0.0 {
            debug!(
                min_impurity_decrease = config.min_impurity_decrease,
                "min_impurity_decrease not supported by the smartcore backend"
            );
        }

        RandomForestRegressorParameters {
            max_depth: Some(config.max_depth),
            min_samples_leaf: config.min_samples_leaf,
            min_samples_split: config.min_samples_split,
            n_trees: config.n_trees,
            m: Some(Self::features_per_split(config.max_features, n_features)),
            keep_samples: false,
            seed: config.seed,
        }
    }

    /// Train a forest on a row-major feature matrix.
    pub fn train(
        location: Location,
        x: &[Vec<f64>],
        y: &[f64],
        params: RandomForestRegressorParameters,
        feature_names: Vec<String>,
    ) -> Result<Self> {
        if x.is_empty() || y.is_empty() {
            anyhow::bail!("Cannot train on empty dataset");
        }

        if x.len() != y.len() {
            anyhow::bail!(
                "Feature and target count mismatch: {} rows, {} targets",
                x.len(),
                y.len()
            );
        }

        if x[0].len() != feature_names.len() {
            anyhow::bail!(
                "Feature name count mismatch: {} columns, {} names",
                x[0].len(),
                feature_names.len()
            );
        }

        let n_trees = params.n_trees;
        let max_depth = params.max_depth.map(|d| d as usize);

        let x_matrix = to_dense(x)?;
        let y_vec = y.to_vec();

        let model = RandomForestRegressor::fit(&x_matrix, &y_vec, params)
            .map_err(|e| anyhow::anyhow!("RandomForest training failed for {}: {:?}", location, e))?;

        let metadata = ModelMetadata {
            model_id: format!("smartcore_rf_{}", uuid::Uuid::new_v4()),
            location,
            trained_at: chrono::Utc::now(),
            training_samples: x.len(),
            feature_names,
        };

        Ok(Self {
            metadata,
            model,
            n_trees,
            max_depth,
        })
    }
}

impl Regressor for SmartcoreRandomForest {
    fn predict_batch(&self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        if x.is_empty() {
            return Ok(Vec::new());
        }

        let expected = self.metadata.feature_names.len();
        if let Some(row) = x.iter().find(|row| row.len() != expected) {
            anyhow::bail!(
                "Feature count mismatch: model expects {}, got {}",
                expected,
                row.len()
            );
        }

        let predictions = self
            .model
            .predict(&to_dense(x)?)
            .map_err(|e| anyhow::anyhow!("Prediction failed: {:?}", e))?;

        if predictions.len() != x.len() {
            anyhow::bail!(
                "Model returned {} predictions for {} rows",
                predictions.len(),
                x.len()
            );
        }

        if let Some(value) = predictions.iter().find(|v| !v.is_finite()) {
            anyhow::bail!("Model returned non-finite prediction {}", value);
        }

        Ok(predictions)
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}

fn to_dense(x: &[Vec<f64>]) -> Result<DenseMatrix<f64>> {
    let n_samples = x.len();
    let n_features = x.first().map(Vec::len).unwrap_or(0);

    let mut flat_data = Vec::with_capacity(n_samples * n_features);
    for row in x {
        if row.len() != n_features {
            anyhow::bail!("All feature vectors must have the same length");
        }
        flat_data.extend_from_slice(row);
    }

    Ok(DenseMatrix::new(n_samples, n_features, flat_data, false))
}
