//! Evaluation report
//!
//! JSON summary of one training run, consumed by the plotting tooling:
//! per-location metrics for raw and corrected predictions, the evaluation
//! window series, and feature importances under their display names.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;
use uuid::Uuid;

use crate::domain::{round_importance, FeatureImportanceRecord, Location, YearMonth};
use crate::forecast::ForecastMetrics;
use crate::pipeline::Evaluation;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub train_size: usize,
    pub test_size: usize,
    pub locations: Vec<LocationReport>,
    /// Importances merged across locations, largest first.
    pub feature_importance: Vec<FeatureImportanceRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationReport {
    pub location: Location,
    pub base_metrics: ForecastMetrics,
    pub corrected_metrics: ForecastMetrics,
    pub points: Vec<ReportPoint>,
    /// This location's own importances, largest first.
    pub feature_importance: Vec<FeatureImportanceRecord>,
}

/// One evaluation-window month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportPoint {
    pub period: YearMonth,
    pub date: NaiveDate,
    pub actual_kwh: f64,
    pub base_kwh: f64,
    pub corrected_kwh: f64,
}

impl EvaluationReport {
    pub fn from_evaluation(evaluation: &Evaluation) -> Self {
        let locations = Location::ALL
            .into_iter()
            .map(|location| {
                let points = evaluation
                    .periods
                    .iter()
                    .enumerate()
                    .map(|(row, period)| ReportPoint {
                        period: *period,
                        date: period.first_day(),
                        actual_kwh: evaluation.actual[row][location],
                        base_kwh: evaluation.base[row][location],
                        corrected_kwh: evaluation.corrected[row][location],
                    })
                    .collect();

                let feature_importance = evaluation
                    .models
                    .get(location)
                    .map(|model| {
                        model
                            .ranked_importances()
                            .into_iter()
                            .map(|(feature, importance)| FeatureImportanceRecord {
                                feature_name: feature.display_name(),
                                importance_value: round_importance(importance),
                            })
                            .collect()
                    })
                    .unwrap_or_default();

                LocationReport {
                    location,
                    base_metrics: evaluation.base_metrics[location].clone(),
                    corrected_metrics: evaluation.corrected_metrics[location].clone(),
                    points,
                    feature_importance,
                }
            })
            .collect();

        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            train_size: evaluation.split.train_size,
            test_size: evaluation.split.test_size,
            locations,
            feature_importance: evaluation.models.merged_importances(),
        }
    }

    /// Write pretty-printed JSON, creating parent directories as needed.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create report directory {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize evaluation report")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write report to {}", path.display()))?;

        info!(path = %path.display(), run_id = %self.run_id, "Wrote evaluation report");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(mae: f64) -> ForecastMetrics {
        ForecastMetrics {
            mae,
            rmse: mae,
            mape: 1.0,
            r2: 0.9,
            sample_count: 1,
            max_error: mae,
        }
    }

    fn report() -> EvaluationReport {
        let period = YearMonth::new(2024, 3).unwrap();
        EvaluationReport {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            train_size: 4,
            test_size: 1,
            locations: vec![LocationReport {
                location: Location::Uob,
                base_metrics: metrics(2.0),
                corrected_metrics: metrics(1.0),
                points: vec![ReportPoint {
                    period,
                    date: period.first_day(),
                    actual_kwh: 100.0,
                    base_kwh: 110.0,
                    corrected_kwh: 103.95,
                }],
                feature_importance: vec![],
            }],
            feature_importance: vec![FeatureImportanceRecord {
                feature_name: "Seasonal Pattern".to_string(),
                importance_value: 1.0,
            }],
        }
    }

    #[test]
    fn test_write_json_creates_directories() {
        let dir = std::env::temp_dir().join(format!("solar-report-{}", Uuid::new_v4()));
        let path = dir.join("nested").join("evaluation.json");
        let report = report();

        report.write_json(&path).unwrap();

        let parsed: EvaluationReport = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.run_id, report.run_id);
        assert_eq!(parsed.test_size, 1);
        assert_eq!(parsed.locations[0].points.len(), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_json_field_names() {
        let value = serde_json::to_value(report()).unwrap();
        let location = &value["locations"][0];
        assert_eq!(location["location"], "UOB");
        assert_eq!(location["points"][0]["date"], "2024-03-01");
        assert_eq!(location["points"][0]["corrected_kwh"], 103.95);
        assert_eq!(value["feature_importance"][0]["feature_name"], "Seasonal Pattern");
    }
}
