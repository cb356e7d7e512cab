//! Tables read and written by the training jobs.
//!
//! kWh and importance columns are declared REAL so SQLite keeps them as
//! floating point.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::info;

use crate::domain::Location;

const CREATE_TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS weather_monthly (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        year INTEGER NOT NULL,
        month INTEGER NOT NULL CHECK (month >= 1 AND month <= 12),
        avg_sunshine_duration_seconds REAL,
        avg_daylight_duration_seconds REAL,
        min_temperature_C REAL,
        avg_temperature_C REAL,
        max_temperature_C REAL,
        avg_solar_irradiance_wm2 REAL,
        avg_relative_humidity_percent REAL,
        avg_cloud_cover_percent REAL,
        avg_wind_speed_kmh REAL,
        total_rainfall_mm REAL,
        UNIQUE (year, month)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS locations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name VARCHAR(50) UNIQUE NOT NULL CHECK (name IN ('Awali', 'Refinery', 'UOB', 'Total System')),
        installed_capacity_kw REAL,
        number_of_panels INTEGER,
        last_updated TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS monthly_generation (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        year INTEGER NOT NULL,
        month INTEGER NOT NULL CHECK (month >= 1 AND month <= 12),
        location_id INTEGER NOT NULL,
        actual_kwh REAL,
        theoretical_kwh REAL,
        predicted_kwh REAL,
        FOREIGN KEY (location_id) REFERENCES locations(id),
        UNIQUE (year, month, location_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS feature_importance (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        feature_name TEXT NOT NULL,
        importance_value REAL,
        last_updated TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        UNIQUE (feature_name)
    )
    "#,
];

/// Create missing tables and seed the fixed location list. Safe to rerun.
pub async fn initialize(pool: &SqlitePool) -> Result<()> {
    for statement in CREATE_TABLES {
        sqlx::query(statement)
            .execute(pool)
            .await
            .context("Failed to create table")?;
    }

    for location in Location::ALL {
        sqlx::query("INSERT OR IGNORE INTO locations (name) VALUES (?)")
            .bind(location.db_name())
            .execute(pool)
            .await
            .with_context(|| format!("Failed to seed location {}", location))?;
    }

    info!("Database schema initialized");
    Ok(())
}
