pub mod repositories;
pub mod schema;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::domain::{Location, YearMonth};

/// Persistence contract violations, raised before or inside the write transaction.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PersistenceError {
    #[error("location '{0}' not found in locations table")]
    UnknownLocation(String),

    #[error("{periods} periods but {actuals} actual rows")]
    ActualsMismatch { periods: usize, actuals: usize },

    #[error("{predictions} prediction rows exceed {periods} periods")]
    TooManyPredictions { predictions: usize, periods: usize },

    #[error("non-finite {kind} value for {location} in {period}")]
    NonFinite {
        kind: &'static str,
        location: Location,
        period: YearMonth,
    },

    #[error("invalid period {year}-{month} in generation table")]
    InvalidPeriod { year: i64, month: i64 },
}

/// SQLite connection pool
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating the file if needed) and check the store.
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!(url = %config.url, "Initializing database connection pool");

        let options = SqliteConnectOptions::from_str(&config.url)
            .with_context(|| format!("invalid database url {}", config.url))?
            .create_if_missing(true);

        if let Some(dir) = options.get_filename().parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create database directory {}", dir.display()))?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .context("Failed to create database pool")?;

        let db = Self { pool };
        db.health_check().await?;

        info!("Database connection pool initialized successfully");
        Ok(db)
    }

    /// Private in-memory store. A single connection that is never recycled
    /// keeps the database alive for the pool's lifetime.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to open in-memory database")?;
        Ok(Self { pool })
    }

    /// Perform a health check query
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Database health check failed")?;
        Ok(())
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Gracefully close the database connection pool
    pub async fn close(self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }
}
