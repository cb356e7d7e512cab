//! Per-location model training
//!
//! Each location gets its own forest trained on its own feature subset. The
//! fitted set is returned as an explicit [`LocationModels`] mapping.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::ops::Range;
use tracing::info;

use super::importance::permutation_importance;
use super::smartcore::SmartcoreRandomForest;
use super::Regressor;
use crate::config::TrainingConfig;
use crate::domain::{round_importance, FeatureImportanceRecord, Location, PerLocation};
use crate::forecast::{DataError, Dataset, Feature};

/// Chronological train/evaluation split. Rows are never shuffled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChronologicalSplit {
    pub train_size: usize,
    pub test_size: usize,
}

impl ChronologicalSplit {
    /// Hold out the trailing `ceil(n_rows * test_fraction)` rows.
    pub fn new(n_rows: usize, test_fraction: f64) -> Result<Self, DataError> {
        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(DataError::InvalidFraction(test_fraction));
        }

        let test_size = (n_rows as f64 * test_fraction).ceil() as usize;
        let train_size = n_rows.saturating_sub(test_size);

        if train_size == 0 || test_size == 0 {
            return Err(DataError::InsufficientRows {
                required: 2,
                actual: n_rows,
            });
        }

        Ok(Self {
            train_size,
            test_size,
        })
    }

    pub fn train_range(&self) -> Range<usize> {
        0..self.train_size
    }

    pub fn test_range(&self) -> Range<usize> {
        self.train_size..self.train_size + self.test_size
    }

    pub fn total(&self) -> usize {
        self.train_size + self.test_size
    }
}

/// A fitted model together with the columns it was trained on.
pub struct LocationModel {
    pub location: Location,
    pub features: Vec<Feature>,
    pub model: Box<dyn Regressor>,
    /// Importance per entry of `features`.
    pub importances: Vec<f64>,
}

impl LocationModel {
    pub fn predict(&self, dataset: &Dataset, rows: Range<usize>) -> Result<Vec<f64>> {
        self.model.predict_batch(&dataset.select(rows, &self.features))
    }

    /// Importances paired with their features, most important first.
    pub fn ranked_importances(&self) -> Vec<(Feature, f64)> {
        let mut ranked: Vec<(Feature, f64)> = self
            .features
            .iter()
            .copied()
            .zip(self.importances.iter().copied())
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }
}

/// Fitted models keyed by location, built once per run.
#[derive(Default)]
pub struct LocationModels {
    models: BTreeMap<Location, LocationModel>,
}

impl LocationModels {
    pub fn from_models(models: impl IntoIterator<Item = LocationModel>) -> Self {
        Self {
            models: models.into_iter().map(|m| (m.location, m)).collect(),
        }
    }

    pub fn get(&self, location: Location) -> Option<&LocationModel> {
        self.models.get(&location)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocationModel> {
        self.models.values()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Raw model output for a row range, one value per location.
    pub fn predict(&self, dataset: &Dataset, rows: Range<usize>) -> Result<Vec<PerLocation<f64>>> {
        let mut predictions = vec![PerLocation::default(); rows.len()];
        for location in Location::ALL {
            let model = self
                .get(location)
                .with_context(|| format!("no trained model for {}", location))?;
            let values = model.predict(dataset, rows.clone())?;
            if values.len() != predictions.len() {
                anyhow::bail!(
                    "{} model returned {} predictions for {} rows",
                    location,
                    values.len(),
                    predictions.len()
                );
            }
            for (row, value) in predictions.iter_mut().zip(values) {
                row[location] = value;
            }
        }
        Ok(predictions)
    }

    /// One record per distinct feature: its mean importance over the models
    /// that use it, under its display name. Sorted most important first.
    pub fn merged_importances(&self) -> Vec<FeatureImportanceRecord> {
        let mut totals: BTreeMap<Feature, (f64, usize)> = BTreeMap::new();
        for model in self.models.values() {
            for (feature, importance) in model.features.iter().zip(model.importances.iter()) {
                let entry = totals.entry(*feature).or_insert((0.0, 0));
                entry.0 += importance;
                entry.1 += 1;
            }
        }

        let mut records: Vec<FeatureImportanceRecord> = totals
            .into_iter()
            .map(|(feature, (sum, count))| FeatureImportanceRecord {
                feature_name: feature.display_name(),
                importance_value: round_importance(sum / count as f64),
            })
            .collect();
        records.sort_by(|a, b| b.importance_value.total_cmp(&a.importance_value));
        records
    }
}

/// Trains one random forest per location.
pub struct ModelTrainer {
    config: TrainingConfig,
}

impl ModelTrainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Fit every location on the training rows of `dataset`, using
    /// `feature_subset` to pick each location's columns.
    pub fn train_per_location(
        &self,
        dataset: &Dataset,
        split: &ChronologicalSplit,
        feature_subset: impl Fn(Location) -> Vec<Feature>,
    ) -> Result<LocationModels> {
        let mut models = Vec::with_capacity(Location::ALL.len());

        for location in Location::ALL {
            let features = feature_subset(location);
            if let Some(missing) = features.iter().find(|f| dataset.column_index(**f).is_none()) {
                anyhow::bail!("feature {} missing from dataset", missing.column_name());
            }

            let x_train = dataset.select(split.train_range(), &features);
            let y_train = dataset.target(split.train_range(), location);

            let params = SmartcoreRandomForest::parameters(&self.config, features.len());
            let names = features.iter().map(Feature::column_name).collect();
            let forest = SmartcoreRandomForest::train(location, &x_train, &y_train, params, names)?;

            let importances = permutation_importance(
                &forest,
                &x_train,
                &y_train,
                self.config.importance_repeats,
                self.config.seed,
            )
            .with_context(|| format!("feature importance failed for {}", location))?;

            let model = LocationModel {
                location,
                features,
                model: Box::new(forest),
                importances,
            };

            info!(
                location = %location,
                samples = x_train.len(),
                features = model.features.len(),
                "trained location model"
            );
            for (feature, importance) in model.ranked_importances() {
                info!(location = %location, feature = %feature.column_name(), importance, "feature importance");
            }

            models.push(model);
        }

        Ok(LocationModels::from_models(models))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WeatherField;
    use crate::ml::ModelMetadata;
    use rstest::rstest;

    #[rstest]
    #[case(10, 8, 2)]
    #[case(11, 8, 3)]
    #[case(36, 28, 8)]
    #[case(2, 1, 1)]
    fn test_split_sizes(#[case] n: usize, #[case] train: usize, #[case] test: usize) {
        let split = ChronologicalSplit::new(n, 0.2).unwrap();
        assert_eq!(split.train_size, train);
        assert_eq!(split.test_size, test);
        assert_eq!(split.test_range(), train..n);
    }

    #[test]
    fn test_split_needs_two_rows() {
        assert_eq!(
            ChronologicalSplit::new(1, 0.2),
            Err(DataError::InsufficientRows { required: 2, actual: 1 })
        );
        assert_eq!(
            ChronologicalSplit::new(10, 1.5),
            Err(DataError::InvalidFraction(1.5))
        );
    }

    struct ConstantModel {
        value: f64,
        metadata: ModelMetadata,
    }

    impl Regressor for ConstantModel {
        fn predict_batch(&self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
            Ok(vec![self.value; x.len()])
        }

        fn metadata(&self) -> &ModelMetadata {
            &self.metadata
        }
    }

    fn constant(location: Location, features: Vec<Feature>, value: f64, importances: Vec<f64>) -> LocationModel {
        let metadata = ModelMetadata {
            model_id: format!("constant_{}", location),
            location,
            trained_at: chrono::Utc::now(),
            training_samples: 0,
            feature_names: features.iter().map(Feature::column_name).collect(),
        };
        LocationModel {
            location,
            features,
            model: Box::new(ConstantModel { value, metadata }),
            importances,
        }
    }

    #[test]
    fn test_merged_importances_average_shared_features() {
        let irradiance = Feature::Weather(WeatherField::SolarIrradiance);
        let models = LocationModels::from_models(
            Location::ALL
                .into_iter()
                .enumerate()
                .map(|(i, location)| {
                    constant(
                        location,
                        vec![irradiance, Feature::Trend(location)],
                        0.0,
                        vec![0.2 * (i + 1) as f64, 0.1],
                    )
                }),
        );

        let records = models.merged_importances();
        assert_eq!(records.len(), 5);
        assert_eq!(records[0].feature_name, "Solar Irradiance (W/m²)");
        // (0.2 + 0.4 + 0.6 + 0.8) / 4
        assert_eq!(records[0].importance_value, 0.5);
        assert!(records
            .iter()
            .any(|r| r.feature_name == "Trend (UOB)" && r.importance_value == 0.1));
    }

    #[test]
    fn test_predict_fills_each_location() {
        let dataset = Dataset {
            periods: vec![
                crate::domain::YearMonth::new(2023, 1).unwrap(),
                crate::domain::YearMonth::new(2023, 2).unwrap(),
            ],
            features: vec![Feature::MonthCos],
            x: vec![vec![0.5], vec![0.8]],
            y: vec![PerLocation([1.0; 4]); 2],
        };
        let models = LocationModels::from_models(
            Location::ALL
                .into_iter()
                .map(|l| constant(l, vec![Feature::MonthCos], l.index() as f64 + 1.0, vec![1.0])),
        );

        let predictions = models.predict(&dataset, 1..2).unwrap();
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0], PerLocation([1.0, 2.0, 3.0, 4.0]));
    }

    #[test]
    fn test_predict_requires_every_location() {
        let dataset = Dataset {
            periods: vec![crate::domain::YearMonth::new(2023, 1).unwrap()],
            features: vec![Feature::MonthCos],
            x: vec![vec![0.5]],
            y: vec![PerLocation([1.0; 4])],
        };
        let models = LocationModels::from_models([constant(
            Location::Awali,
            vec![Feature::MonthCos],
            1.0,
            vec![1.0],
        )]);
        assert!(models.predict(&dataset, 0..1).is_err());
    }
}
