//! Repositories over the SQLite store
//!
//! - Weather: monthly weather aggregates
//! - Generation: per-location actuals and the transactional prediction writer
//! - Feature importance: delete-then-insert importance table
//! - Locations: name to row id resolution

pub mod feature_importance;
pub mod generation;
pub mod locations;
pub mod weather;

pub use feature_importance::FeatureImportanceRepository;
pub use generation::{GenerationRepository, PredictionBatch};
pub use locations::resolve_location_ids;
pub use weather::WeatherRepository;
