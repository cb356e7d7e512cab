//! Weather-only baseline
//!
//! Same forest policy and chronological split as the main models, but each
//! location sees only the ten raw weather fields. Useful for judging how much
//! the autoregressive features contribute.

use anyhow::{Context, Result};
use tracing::info;

use super::training::{ChronologicalSplit, LocationModels, ModelTrainer};
use crate::domain::PerLocation;
use crate::forecast::{Dataset, Feature, ForecastMetrics};

pub struct WeatherOnlyOutcome {
    pub split: ChronologicalSplit,
    pub models: LocationModels,
    pub metrics: PerLocation<ForecastMetrics>,
}

/// Train and evaluate the baseline on an already standardised dataset.
pub fn train_weather_only(scaled: &Dataset, trainer: &ModelTrainer) -> Result<WeatherOnlyOutcome> {
    let split = ChronologicalSplit::new(scaled.len(), trainer.config().test_fraction)?;

    info!(
        train = split.train_size,
        test = split.test_size,
        "training weather-only random forest models"
    );
    let models = trainer.train_per_location(scaled, &split, |_| Feature::weather_only())?;

    let predictions = models.predict(scaled, split.test_range())?;
    let actual = &scaled.y[split.test_range()];

    let metrics = PerLocation::try_from_fn(|location| {
        let a: Vec<f64> = actual.iter().map(|row| row[location]).collect();
        let p: Vec<f64> = predictions.iter().map(|row| row[location]).collect();
        ForecastMetrics::calculate(&a, &p)
            .with_context(|| format!("weather-only evaluation failed for {}", location))
    })?;

    for (location, m) in metrics.iter() {
        info!(location = %location, metrics = %m, "weather-only results");
    }

    Ok(WeatherOnlyOutcome {
        split,
        models,
        metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrainingConfig;
    use crate::domain::{Location, WeatherField, YearMonth};

    fn synthetic(n: usize) -> Dataset {
        let features = Feature::all();
        let mut periods = Vec::new();
        let mut x = Vec::new();
        let mut y = Vec::new();
        let mut period = YearMonth::new(2019, 1).unwrap();
        for i in 0..n {
            let irradiance = 200.0 + 80.0 * ((i % 12) as f64 / 12.0 * std::f64::consts::TAU).sin();
            let row: Vec<f64> = features
                .iter()
                .map(|f| match f {
                    Feature::Weather(WeatherField::SolarIrradiance) => irradiance,
                    _ => (i % 5) as f64,
                })
                .collect();
            periods.push(period);
            x.push(row);
            y.push(PerLocation::from_fn(|l| irradiance * (l.index() + 1) as f64));
            period = period.next();
        }
        Dataset { periods, features, x, y }
    }

    #[test]
    fn test_weather_only_uses_weather_columns() {
        let dataset = synthetic(30);
        let trainer = ModelTrainer::new(TrainingConfig {
            n_trees: 15,
            max_depth: 6,
            importance_repeats: 2,
            ..TrainingConfig::default()
        });

        let outcome = train_weather_only(&dataset, &trainer).unwrap();
        assert_eq!(outcome.split.test_size, 6);
        assert_eq!(outcome.models.len(), 4);

        let model = outcome.models.get(Location::Uob).unwrap();
        assert_eq!(model.features, Feature::weather_only());
        assert_eq!(model.model.metadata().training_samples, 24);
        assert_eq!(outcome.metrics[Location::Uob].sample_count, 6);

        // irradiance drives every target, so it should dominate
        let (top, _) = model.ranked_importances()[0];
        assert_eq!(top, Feature::Weather(WeatherField::SolarIrradiance));
    }
}
