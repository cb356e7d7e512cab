//! One-shot batch jobs
//!
//! Load, prepare, train, evaluate and persist, strictly in sequence. Every
//! failure propagates to the caller; nothing is retried.

use anyhow::{Context, Result};
use tracing::info;

use crate::config::Config;
use crate::database::repositories::{
    FeatureImportanceRepository, GenerationRepository, PredictionBatch, WeatherRepository,
};
use crate::database::Database;
use crate::domain::{PerLocation, YearMonth};
use crate::forecast::{build_dataset, Dataset, Feature, ForecastMetrics};
use crate::ml::correction::DiagnosticCorrection;
use crate::ml::scaler::StandardScaler;
use crate::ml::training::{ChronologicalSplit, LocationModels, ModelTrainer};
use crate::ml::weather_only::{train_weather_only, WeatherOnlyOutcome};
use crate::report::EvaluationReport;

/// Outcome of training on the leading rows and scoring the trailing window.
pub struct Evaluation {
    pub split: ChronologicalSplit,
    /// Periods of the evaluation window.
    pub periods: Vec<YearMonth>,
    pub actual: Vec<PerLocation<f64>>,
    /// Raw model output.
    pub base: Vec<PerLocation<f64>>,
    /// Output of the diagnostic correction, which reads `actual`.
    pub corrected: Vec<PerLocation<f64>>,
    pub base_metrics: PerLocation<ForecastMetrics>,
    pub corrected_metrics: PerLocation<ForecastMetrics>,
    pub models: LocationModels,
}

/// Read both source tables and build the aligned dataset.
pub async fn load_dataset(db: &Database) -> Result<Dataset> {
    let weather = WeatherRepository::new(db.pool()).find_all().await?;
    let generation = GenerationRepository::new(db.pool()).find_monthly_actuals().await?;

    let dataset = build_dataset(&weather, &generation)?;
    info!(
        weather_rows = weather.len(),
        generation_rows = generation.len(),
        joined_rows = dataset.len(),
        "Loaded training data"
    );
    Ok(dataset)
}

/// Standardise every feature column.
///
/// The scaler sees the whole matrix, evaluation window included, so the
/// held-out rows leak their mean and variance into training.
pub fn standardize(dataset: &Dataset) -> Result<Dataset> {
    let scaler = StandardScaler::fit(&dataset.x)?;
    let scaled = dataset.with_matrix(scaler.transform(&dataset.x)?)?;
    Ok(scaled)
}

fn per_location_metrics(
    actual: &[PerLocation<f64>],
    predicted: &[PerLocation<f64>],
    label: &str,
) -> Result<PerLocation<ForecastMetrics>> {
    PerLocation::try_from_fn(|location| {
        let a: Vec<f64> = actual.iter().map(|row| row[location]).collect();
        let p: Vec<f64> = predicted.iter().map(|row| row[location]).collect();
        ForecastMetrics::calculate(&a, &p).with_context(|| format!("{} metrics failed for {}", label, location))
    })
}

/// Train the per-location forests and score them on the evaluation window.
pub fn train_and_evaluate(dataset: &Dataset, config: &Config) -> Result<Evaluation> {
    let scaled = standardize(dataset)?;
    let split = ChronologicalSplit::new(scaled.len(), config.training.test_fraction)?;

    info!(
        train = split.train_size,
        test = split.test_size,
        "Training per-location random forest models"
    );

    let trainer = ModelTrainer::new(config.training.clone());
    let models = trainer.train_per_location(&scaled, &split, Feature::for_location)?;

    let base = models.predict(&scaled, split.test_range())?;
    let actual = scaled.y[split.test_range()].to_vec();
    let corrected = DiagnosticCorrection::new(config.correction).apply(&base, &actual)?;

    let base_metrics = per_location_metrics(&actual, &base, "base")?;
    let corrected_metrics = per_location_metrics(&actual, &corrected, "corrected")?;

    for (location, base) in base_metrics.iter() {
        info!(
            location = %location,
            base = %base,
            corrected = %corrected_metrics[location],
            "Evaluation results"
        );
    }

    Ok(Evaluation {
        split,
        periods: scaled.periods[split.test_range()].to_vec(),
        actual,
        base,
        corrected,
        base_metrics,
        corrected_metrics,
        models,
    })
}

/// Full training run: evaluate, persist corrected predictions and
/// importances, then write the report if one is configured.
pub async fn run_training(db: &Database, config: &Config) -> Result<EvaluationReport> {
    let dataset = load_dataset(db).await?;
    let evaluation = train_and_evaluate(&dataset, config)?;

    GenerationRepository::new(db.pool())
        .save_predictions(PredictionBatch {
            periods: &dataset.periods,
            actuals: &dataset.y,
            predictions: &evaluation.corrected,
        })
        .await
        .context("Failed to persist predictions")?;

    let importances = evaluation.models.merged_importances();
    FeatureImportanceRepository::new(db.pool())
        .replace_all(&importances)
        .await
        .context("Failed to persist feature importance")?;

    let report = EvaluationReport::from_evaluation(&evaluation);
    if let Some(path) = &config.report.path {
        report.write_json(path)?;
    }

    info!(run_id = %report.run_id, "Training run complete");
    Ok(report)
}

/// Weather-only baseline: train, log metrics, persist merged importances.
pub async fn run_weather_only(db: &Database, config: &Config) -> Result<WeatherOnlyOutcome> {
    let dataset = load_dataset(db).await?;
    let scaled = standardize(&dataset)?;

    let trainer = ModelTrainer::new(config.training.clone());
    let outcome = train_weather_only(&scaled, &trainer)?;

    FeatureImportanceRepository::new(db.pool())
        .replace_all(&outcome.models.merged_importances())
        .await
        .context("Failed to persist weather-only feature importance")?;

    info!("Weather-only run complete");
    Ok(outcome)
}
