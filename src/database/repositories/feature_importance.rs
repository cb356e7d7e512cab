use anyhow::{Context, Result};
use sqlx::{FromRow, SqlitePool};
use tracing::info;

use crate::domain::{round_importance, FeatureImportanceRecord};

#[derive(Debug, Clone, FromRow)]
struct FeatureImportanceRow {
    feature_name: String,
    importance_value: Option<f64>,
}

pub struct FeatureImportanceRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> FeatureImportanceRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Swap the stored importances for `records` atomically.
    pub async fn replace_all(&self, records: &[FeatureImportanceRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to start transaction")?;

        sqlx::query("DELETE FROM feature_importance")
            .execute(&mut *tx)
            .await
            .context("Failed to clear feature importance")?;

        for record in records {
            sqlx::query("INSERT INTO feature_importance (feature_name, importance_value) VALUES (?, ?)")
                .bind(&record.feature_name)
                .bind(round_importance(record.importance_value))
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to insert importance for {}", record.feature_name))?;
        }

        tx.commit().await.context("Failed to commit transaction")?;

        info!("Stored {} feature importances", records.len());
        Ok(())
    }

    /// Stored importances, largest first.
    pub async fn find_all(&self) -> Result<Vec<FeatureImportanceRecord>> {
        let rows = sqlx::query_as::<_, FeatureImportanceRow>(
            r#"
            SELECT feature_name, CAST(importance_value AS REAL) AS importance_value
            FROM feature_importance
            ORDER BY importance_value DESC, feature_name
            "#,
        )
        .fetch_all(self.pool)
        .await
        .context("Failed to load feature importance")?;

        Ok(rows
            .into_iter()
            .map(|row| FeatureImportanceRecord {
                feature_name: row.feature_name,
                importance_value: row.importance_value.unwrap_or(0.0),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{schema, Database};

    fn record(name: &str, value: f64) -> FeatureImportanceRecord {
        FeatureImportanceRecord {
            feature_name: name.to_string(),
            importance_value: value,
        }
    }

    #[tokio::test]
    async fn test_replace_all_swaps_contents() {
        let db = Database::in_memory().await.unwrap();
        schema::initialize(db.pool()).await.unwrap();
        let repo = FeatureImportanceRepository::new(db.pool());

        repo.replace_all(&[record("Rainfall (mm)", 0.4), record("Seasonal Pattern", 0.6)])
            .await
            .unwrap();
        repo.replace_all(&[
            record("Solar Irradiance (W/m²)", 0.71234),
            record("Trend (UOB)", 0.28766),
        ])
        .await
        .unwrap();

        let stored = repo.find_all().await.unwrap();
        assert_eq!(
            stored,
            vec![
                record("Solar Irradiance (W/m²)", 0.712),
                record("Trend (UOB)", 0.288),
            ]
        );
    }

    #[tokio::test]
    async fn test_duplicate_name_rolls_back() {
        let db = Database::in_memory().await.unwrap();
        schema::initialize(db.pool()).await.unwrap();
        let repo = FeatureImportanceRepository::new(db.pool());

        repo.replace_all(&[record("Seasonal Pattern", 1.0)]).await.unwrap();
        let result = repo
            .replace_all(&[record("Rainfall (mm)", 0.5), record("Rainfall (mm)", 0.5)])
            .await;

        assert!(result.is_err());
        assert_eq!(repo.find_all().await.unwrap(), vec![record("Seasonal Pattern", 1.0)]);
    }
}
