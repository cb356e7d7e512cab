//! Feature engineering for the monthly generation models
//!
//! Joins weather aggregates with the pivoted generation series and derives the
//! autoregressive rolling/trend features and the cyclical month encoding.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Range;
use tracing::debug;

use crate::domain::{Location, MonthlyActuals, PerLocation, WeatherField, WeatherObservation, YearMonth};

/// Months in the short rolling window.
pub const SHORT_WINDOW: usize = 3;
/// Months in the long rolling window.
pub const LONG_WINDOW: usize = 6;
/// Rows compared by the trend indicator.
pub const TREND_WINDOW: usize = 3;

/// Dataset preparation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DataError {
    #[error("weather and generation data share no (year, month) rows")]
    EmptyJoin,

    #[error("missing value for {field} in {period}")]
    MissingValue { period: YearMonth, field: String },

    #[error("need at least {required} rows, got {actual}")]
    InsufficientRows { required: usize, actual: usize },

    #[error("row {row} has {actual} columns, expected {expected}")]
    ShapeMismatch { row: usize, expected: usize, actual: usize },

    #[error("invalid split fraction {0}, must be in (0, 1)")]
    InvalidFraction(f64),
}

/// A model input column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Feature {
    Weather(WeatherField),
    MonthCos,
    RollingAvg3(Location),
    RollingAvg6(Location),
    Trend(Location),
}

impl Feature {
    /// Every column of the prepared feature matrix, in matrix order.
    pub fn all() -> Vec<Feature> {
        let mut features = Self::shared();
        for location in Location::ALL {
            features.extend(Self::autoregressive(location));
        }
        features
    }

    /// Weather fields plus the month encoding, used by every location model.
    pub fn shared() -> Vec<Feature> {
        let mut features = Self::weather_only();
        features.push(Feature::MonthCos);
        features
    }

    /// Raw weather fields only.
    pub fn weather_only() -> Vec<Feature> {
        WeatherField::ALL.iter().copied().map(Feature::Weather).collect()
    }

    /// The location's own rolling and trend features.
    pub fn autoregressive(location: Location) -> [Feature; 3] {
        [
            Feature::RollingAvg3(location),
            Feature::RollingAvg6(location),
            Feature::Trend(location),
        ]
    }

    /// Inputs of one location's model. Other locations' series are excluded.
    pub fn for_location(location: Location) -> Vec<Feature> {
        let mut features = Self::shared();
        features.extend(Self::autoregressive(location));
        features
    }

    pub fn column_name(&self) -> String {
        match self {
            Feature::Weather(field) => field.column().to_string(),
            Feature::MonthCos => "month_cos".to_string(),
            Feature::RollingAvg3(l) => format!("{}_rolling_avg_3", l.column_stem()),
            Feature::RollingAvg6(l) => format!("{}_rolling_avg_6", l.column_stem()),
            Feature::Trend(l) => format!("{}_trend", l.column_stem()),
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            Feature::Weather(field) => field.display_name().to_string(),
            Feature::MonthCos => "Seasonal Pattern".to_string(),
            Feature::RollingAvg3(l) => format!("3-Month Rolling Avg ({})", l.label()),
            Feature::RollingAvg6(l) => format!("6-Month Rolling Avg ({})", l.label()),
            Feature::Trend(l) => format!("Trend ({})", l.label()),
        }
    }
}

/// Chronologically ordered, row-aligned features and targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub periods: Vec<YearMonth>,
    pub features: Vec<Feature>,
    /// Row-major feature matrix, columns ordered as `features`.
    pub x: Vec<Vec<f64>>,
    pub y: Vec<PerLocation<f64>>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    pub fn column_index(&self, feature: Feature) -> Option<usize> {
        self.features.iter().position(|f| *f == feature)
    }

    /// Same rows and targets with a replacement feature matrix (e.g. scaled).
    pub fn with_matrix(&self, x: Vec<Vec<f64>>) -> Result<Self, DataError> {
        if x.len() != self.len() {
            return Err(DataError::InsufficientRows {
                required: self.len(),
                actual: x.len(),
            });
        }
        for (row, values) in x.iter().enumerate() {
            if values.len() != self.features.len() {
                return Err(DataError::ShapeMismatch {
                    row,
                    expected: self.features.len(),
                    actual: values.len(),
                });
            }
        }
        Ok(Self {
            periods: self.periods.clone(),
            features: self.features.clone(),
            x,
            y: self.y.clone(),
        })
    }

    /// Extract the given columns for a row range.
    pub fn select(&self, rows: Range<usize>, columns: &[Feature]) -> Vec<Vec<f64>> {
        let indices: Vec<usize> = columns
            .iter()
            .filter_map(|f| self.column_index(*f))
            .collect();
        self.x[rows]
            .iter()
            .map(|row| indices.iter().map(|&i| row[i]).collect())
            .collect()
    }

    pub fn target(&self, rows: Range<usize>, location: Location) -> Vec<f64> {
        self.y[rows].iter().map(|values| values[location]).collect()
    }
}

/// Cyclical month encoding.
pub fn month_cos(month: u32) -> f64 {
    (2.0 * std::f64::consts::PI * month as f64 / 12.0).cos()
}

/// Trailing rolling mean with a minimum window of one.
///
/// NaN entries are skipped; a window holding only NaN yields NaN.
pub fn rolling_mean(values: &[f64], window_size: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window_size);
            let (sum, count) = values[start..=i]
                .iter()
                .filter(|v| !v.is_nan())
                .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
            if count == 0 {
                f64::NAN
            } else {
                sum / count as f64
            }
        })
        .collect()
}

/// Direction of the series over a trailing window: +1 rising, -1 falling, 0 flat.
///
/// The first row has a one-element window and is always flat. Comparisons
/// involving NaN are flat.
pub fn rolling_trend(values: &[f64], window_size: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window_size);
            let (first, last) = (values[start], values[i]);
            if last > first {
                1.0
            } else if last < first {
                -1.0
            } else {
                0.0
            }
        })
        .collect()
}

/// Derived autoregressive columns for one location series.
struct SeriesFeatures {
    avg_3: Vec<f64>,
    avg_6: Vec<f64>,
    trend: Vec<f64>,
}

impl SeriesFeatures {
    fn compute(series: &[f64]) -> Self {
        Self {
            avg_3: rolling_mean(series, SHORT_WINDOW),
            avg_6: rolling_mean(series, LONG_WINDOW),
            trend: rolling_trend(series, TREND_WINDOW),
        }
    }
}

/// Build the aligned dataset.
///
/// Rolling features are computed over the full generation series before the
/// inner join on (year, month). Months present in only one source are dropped.
pub fn build_dataset(
    weather: &[WeatherObservation],
    generation: &[MonthlyActuals],
) -> Result<Dataset, DataError> {
    let mut generation: Vec<&MonthlyActuals> = generation.iter().collect();
    generation.sort_by_key(|g| g.period);

    let series: PerLocation<SeriesFeatures> = PerLocation::from_fn(|location| {
        let values: Vec<f64> = generation
            .iter()
            .map(|g| g.actuals[location].unwrap_or(f64::NAN))
            .collect();
        SeriesFeatures::compute(&values)
    });

    let generation_index: HashMap<YearMonth, usize> = generation
        .iter()
        .enumerate()
        .map(|(i, g)| (g.period, i))
        .collect();

    let mut weather: Vec<&WeatherObservation> = weather.iter().collect();
    weather.sort_by_key(|w| w.period);

    let features = Feature::all();
    let mut periods = Vec::new();
    let mut x = Vec::new();
    let mut y = Vec::new();

    for obs in weather {
        let Some(&g) = generation_index.get(&obs.period) else {
            continue;
        };

        let mut row = Vec::with_capacity(features.len());
        for feature in &features {
            let value = match *feature {
                Feature::Weather(field) => obs.value(field),
                Feature::MonthCos => month_cos(obs.period.month),
                Feature::RollingAvg3(l) => series[l].avg_3[g],
                Feature::RollingAvg6(l) => series[l].avg_6[g],
                Feature::Trend(l) => series[l].trend[g],
            };
            if !value.is_finite() {
                return Err(DataError::MissingValue {
                    period: obs.period,
                    field: feature.column_name(),
                });
            }
            row.push(value);
        }

        let mut targets = PerLocation::default();
        for location in Location::ALL {
            targets[location] = generation[g].actuals[location]
                .filter(|v| v.is_finite())
                .ok_or_else(|| DataError::MissingValue {
                    period: obs.period,
                    field: location.column_stem().to_string(),
                })?;
        }

        periods.push(obs.period);
        x.push(row);
        y.push(targets);
    }

    if periods.is_empty() {
        return Err(DataError::EmptyJoin);
    }

    debug!(rows = periods.len(), columns = features.len(), "prepared dataset");

    Ok(Dataset {
        periods,
        features,
        x,
        y,
    })
}
