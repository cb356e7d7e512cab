use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct Config {
    #[validate(nested)]
    pub database: DatabaseConfig,
    #[validate(nested)]
    pub training: TrainingConfig,
    #[validate(nested)]
    pub correction: CorrectionConfig,
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    pub url: String,
    #[validate(range(min = 1))]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://db/app.db".to_string(),
            max_connections: 1,
        }
    }
}

/// Chronological split and random forest policy, shared by every location model.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TrainingConfig {
    /// Trailing fraction of rows held out as the evaluation window.
    #[validate(range(exclusive_min = 0.0, exclusive_max = 1.0))]
    pub test_fraction: f64,
    #[validate(range(min = 1))]
    pub n_trees: usize,
    #[validate(range(min = 1))]
    pub max_depth: u16,
    #[validate(range(min = 2))]
    pub min_samples_split: usize,
    #[validate(range(min = 1))]
    pub min_samples_leaf: usize,
    /// Fraction of features considered at each split.
    #[validate(range(exclusive_min = 0.0, max = 1.0))]
    pub max_features: f64,
    pub seed: u64,
    pub bootstrap: bool,
    #[validate(range(min = 0.0))]
    pub min_impurity_decrease: f64,
    /// Shuffles per feature when estimating permutation importance.
    #[validate(range(min = 1))]
    pub importance_repeats: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            n_trees: 500,
            max_depth: 15,
            min_samples_split: 4,
            min_samples_leaf: 2,
            max_features: 0.8,
            seed: 42,
            bootstrap: true,
            min_impurity_decrease: 0.0001,
            importance_repeats: 5,
        }
    }
}

/// Bounds of the diagnostic bias correction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_correction_bounds"))]
pub struct CorrectionConfig {
    #[validate(range(min = 0.0))]
    pub damping: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub floor: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub ceiling: f64,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            damping: 0.55,
            floor: 0.02,
            ceiling: 0.15,
        }
    }
}

fn validate_correction_bounds(cfg: &CorrectionConfig) -> Result<(), ValidationError> {
    if cfg.floor > cfg.ceiling {
        return Err(ValidationError::new("correction_floor_above_ceiling"));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Where the evaluation report is written; `None` disables it.
    pub path: Option<PathBuf>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            path: Some(PathBuf::from("reports/evaluation.json")),
        }
    }
}

impl Config {
    /// Defaults, then the TOML file (if present), then `SOLAR__` environment variables.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("SOLAR__").split("__"));
        let cfg: Config = figment
            .extract()
            .with_context(|| format!("invalid configuration in {}", path.as_ref().display()))?;
        cfg.validate().context("configuration failed validation")?;
        Ok(cfg)
    }
}
