use anyhow::{Context, Result};
use sqlx::{FromRow, Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::str::FromStr;
use tracing::{debug, error, info, warn};

use super::locations::resolve_location_ids;
use crate::database::PersistenceError;
use crate::domain::{round_kwh, GenerationRecord, Location, MonthlyActuals, PerLocation, YearMonth};

/// Generation pivoted to one row per month.
#[derive(Debug, Clone, FromRow)]
pub struct MonthlyActualsRow {
    pub year: i64,
    pub month: i64,
    pub awali: Option<f64>,
    pub refinery: Option<f64>,
    pub uob: Option<f64>,
    pub total_system: Option<f64>,
}

impl TryFrom<MonthlyActualsRow> for MonthlyActuals {
    type Error = PersistenceError;

    fn try_from(row: MonthlyActualsRow) -> Result<Self, Self::Error> {
        let period = YearMonth::from_db(row.year, row.month).ok_or(PersistenceError::InvalidPeriod {
            year: row.year,
            month: row.month,
        })?;
        Ok(MonthlyActuals {
            period,
            actuals: PerLocation([row.awali, row.refinery, row.uob, row.total_system]),
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct GenerationRow {
    pub year: i64,
    pub month: i64,
    pub location_name: String,
    pub actual_kwh: Option<f64>,
    pub predicted_kwh: Option<f64>,
}

impl TryFrom<GenerationRow> for GenerationRecord {
    type Error = PersistenceError;

    fn try_from(row: GenerationRow) -> Result<Self, Self::Error> {
        let period = YearMonth::from_db(row.year, row.month).ok_or(PersistenceError::InvalidPeriod {
            year: row.year,
            month: row.month,
        })?;
        let location = Location::from_str(&row.location_name)
            .map_err(|_| PersistenceError::UnknownLocation(row.location_name.clone()))?;
        Ok(GenerationRecord {
            period,
            location,
            actual_kwh: row.actual_kwh,
            predicted_kwh: row.predicted_kwh,
        })
    }
}

/// Everything one training run writes back to `monthly_generation`.
///
/// `actuals` has one row per entry of `periods`. `predictions` covers only
/// the trailing evaluation window, so it aligns with the last
/// `predictions.len()` periods.
#[derive(Debug, Clone, Copy)]
pub struct PredictionBatch<'a> {
    pub periods: &'a [YearMonth],
    pub actuals: &'a [PerLocation<f64>],
    pub predictions: &'a [PerLocation<f64>],
}

impl PredictionBatch<'_> {
    pub fn validate(&self) -> Result<(), PersistenceError> {
        if self.actuals.len() != self.periods.len() {
            return Err(PersistenceError::ActualsMismatch {
                periods: self.periods.len(),
                actuals: self.actuals.len(),
            });
        }
        if self.predictions.len() > self.periods.len() {
            return Err(PersistenceError::TooManyPredictions {
                predictions: self.predictions.len(),
                periods: self.periods.len(),
            });
        }

        for (period, row) in self.periods.iter().zip(self.actuals) {
            if let Some((location, _)) = row.iter().find(|(_, v)| !v.is_finite()) {
                return Err(PersistenceError::NonFinite {
                    kind: "actual",
                    location,
                    period: *period,
                });
            }
        }
        for (period, row) in self.periods[self.offset()..].iter().zip(self.predictions) {
            if let Some((location, _)) = row.iter().find(|(_, v)| !v.is_finite()) {
                return Err(PersistenceError::NonFinite {
                    kind: "predicted",
                    location,
                    period: *period,
                });
            }
        }
        Ok(())
    }

    /// Index of the first period that carries a prediction.
    pub fn offset(&self) -> usize {
        self.periods.len() - self.predictions.len()
    }

    fn predicted(&self, row: usize, location: Location) -> Option<f64> {
        row.checked_sub(self.offset())
            .map(|i| round_kwh(self.predictions[i][location]))
    }
}

pub struct GenerationRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> GenerationRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Actuals pivoted by location, one row per month in chronological order.
    pub async fn find_monthly_actuals(&self) -> Result<Vec<MonthlyActuals>> {
        let rows = sqlx::query_as::<_, MonthlyActualsRow>(
            r#"
            SELECT g.year, g.month,
                   CAST(MAX(CASE WHEN l.name = 'Awali' THEN g.actual_kwh END) AS REAL) AS awali,
                   CAST(MAX(CASE WHEN l.name = 'Refinery' THEN g.actual_kwh END) AS REAL) AS refinery,
                   CAST(MAX(CASE WHEN l.name = 'UOB' THEN g.actual_kwh END) AS REAL) AS uob,
                   CAST(MAX(CASE WHEN l.name = 'Total System' THEN g.actual_kwh END) AS REAL) AS total_system
            FROM monthly_generation g
            JOIN locations l ON l.id = g.location_id
            GROUP BY g.year, g.month
            ORDER BY g.year, g.month
            "#,
        )
        .fetch_all(self.pool)
        .await
        .context("Failed to load monthly generation")?;

        debug!(rows = rows.len(), "loaded pivoted generation rows");

        Ok(rows
            .into_iter()
            .map(MonthlyActuals::try_from)
            .collect::<Result<Vec<_>, _>>()?)
    }

    /// Every generation row, ordered by period then location name.
    pub async fn find_all(&self) -> Result<Vec<GenerationRecord>> {
        let rows = sqlx::query_as::<_, GenerationRow>(
            r#"
            SELECT g.year, g.month, l.name AS location_name,
                   CAST(g.actual_kwh AS REAL) AS actual_kwh,
                   CAST(g.predicted_kwh AS REAL) AS predicted_kwh
            FROM monthly_generation g
            JOIN locations l ON l.id = g.location_id
            ORDER BY g.year, g.month, l.name
            "#,
        )
        .fetch_all(self.pool)
        .await
        .context("Failed to load generation rows")?;

        Ok(rows
            .into_iter()
            .map(GenerationRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?)
    }

    /// Record observed generation. Locations without a value are left untouched.
    ///
    /// Seeding helper for tests and fixtures. Production actuals are written
    /// by the ingestion service that owns `monthly_generation`.
    pub async fn upsert_actuals(&self, records: &[MonthlyActuals]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.context("Failed to start transaction")?;
        let ids = resolve_location_ids(&mut tx).await?;

        for record in records {
            for (location, actual) in record.actuals.iter() {
                let Some(actual) = actual else { continue };
                sqlx::query(
                    r#"
                    INSERT INTO monthly_generation (year, month, location_id, actual_kwh)
                    VALUES (?, ?, ?, ?)
                    ON CONFLICT(year, month, location_id) DO UPDATE SET
                        actual_kwh = excluded.actual_kwh
                    "#,
                )
                .bind(record.period.year)
                .bind(record.period.month)
                .bind(ids[location])
                .bind(round_kwh(*actual))
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to upsert actual for {} {}", location, record.period))?;
            }
        }

        tx.commit().await.context("Failed to commit transaction")?;

        info!("Upserted actuals for {} months", records.len());
        Ok(())
    }

    /// Replace all stored predictions with `batch` in a single transaction.
    ///
    /// Every existing `predicted_kwh` is cleared, then every period and
    /// location is upserted with its actual and, for the trailing window,
    /// its prediction. Nothing is written if any step fails.
    pub async fn save_predictions(&self, batch: PredictionBatch<'_>) -> Result<usize> {
        batch.validate()?;

        let mut tx = begin_write(self.pool).await?;

        match write_predictions(&mut tx, &batch).await {
            Ok(written) => {
                tx.commit().await.context("Failed to commit transaction")?;
                info!(
                    rows = written,
                    predicted_months = batch.predictions.len(),
                    "Saved predictions to monthly_generation"
                );
                Ok(written)
            }
            Err(e) => {
                warn!(error = %e, "Rolling back prediction write");
                if let Err(rollback) = tx.rollback().await {
                    error!(error = %rollback, "Failed to roll back prediction write");
                }
                Err(e)
            }
        }
    }
}

/// Open a transaction that holds the database write lock from its first
/// statement, so no other writer can interleave with clear-then-upsert.
pub(crate) async fn begin_write(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>> {
    pool.begin_with("BEGIN IMMEDIATE")
        .await
        .context("Failed to start write transaction")
}

async fn write_predictions(conn: &mut SqliteConnection, batch: &PredictionBatch<'_>) -> Result<usize> {
    let ids = resolve_location_ids(conn).await?;

    let cleared = sqlx::query("UPDATE monthly_generation SET predicted_kwh = NULL")
        .execute(&mut *conn)
        .await
        .context("Failed to clear previous predictions")?
        .rows_affected();
    debug!(rows = cleared, "cleared previous predictions");

    let mut written = 0;
    for (row, (period, actuals)) in batch.periods.iter().zip(batch.actuals).enumerate() {
        for location in Location::ALL {
            sqlx::query(
                r#"
                INSERT INTO monthly_generation (year, month, location_id, actual_kwh, predicted_kwh)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(year, month, location_id) DO UPDATE SET
                    actual_kwh = excluded.actual_kwh,
                    predicted_kwh = excluded.predicted_kwh
                "#,
            )
            .bind(period.year)
            .bind(period.month)
            .bind(ids[location])
            .bind(round_kwh(actuals[location]))
            .bind(batch.predicted(row, location))
            .execute(&mut *conn)
            .await
            .with_context(|| format!("Failed to upsert generation for {} {}", location, period))?;
            written += 1;
        }
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{schema, Database};

    async fn setup() -> Database {
        let db = Database::in_memory().await.unwrap();
        schema::initialize(db.pool()).await.unwrap();
        db
    }

    fn periods(start_year: i32, n: usize) -> Vec<YearMonth> {
        let mut p = YearMonth::new(start_year, 1).unwrap();
        (0..n)
            .map(|_| {
                let current = p;
                p = p.next();
                current
            })
            .collect()
    }

    fn values(n: usize, base: f64) -> Vec<PerLocation<f64>> {
        (0..n)
            .map(|i| PerLocation::from_fn(|l| base + i as f64 + l.index() as f64 * 0.001))
            .collect()
    }

    async fn predicted_count(db: &Database) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM monthly_generation WHERE predicted_kwh IS NOT NULL")
            .fetch_one(db.pool())
            .await
            .unwrap()
    }

    async fn row_count(db: &Database) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM monthly_generation")
            .fetch_one(db.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_save_predictions_fills_only_the_tail() {
        let db = setup().await;
        let repo = GenerationRepository::new(db.pool());
        let periods = periods(2022, 5);
        let actuals = values(5, 100.0);
        let predictions = values(2, 200.0);

        let written = repo
            .save_predictions(PredictionBatch {
                periods: &periods,
                actuals: &actuals,
                predictions: &predictions,
            })
            .await
            .unwrap();

        assert_eq!(written, 20);
        assert_eq!(row_count(&db).await, 20);
        assert_eq!(predicted_count(&db).await, 8);

        let records = repo.find_all().await.unwrap();
        for record in &records {
            let in_window = record.period >= periods[3];
            assert_eq!(record.predicted_kwh.is_some(), in_window, "{:?}", record);
        }

        let uob_last = records
            .iter()
            .find(|r| r.period == periods[4] && r.location == Location::Uob)
            .unwrap();
        // 201.002 rounded to two decimals
        assert_eq!(uob_last.predicted_kwh, Some(201.0));
        assert_eq!(uob_last.actual_kwh, Some(104.0));
    }

    #[tokio::test]
    async fn test_save_predictions_is_idempotent() {
        let db = setup().await;
        let repo = GenerationRepository::new(db.pool());
        let periods = periods(2022, 6);
        let actuals = values(6, 50.0);
        let predictions = values(2, 60.0);
        let batch = PredictionBatch {
            periods: &periods,
            actuals: &actuals,
            predictions: &predictions,
        };

        repo.save_predictions(batch).await.unwrap();
        let first = repo.find_all().await.unwrap();
        repo.save_predictions(batch).await.unwrap();
        let second = repo.find_all().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(row_count(&db).await, 24);
        assert_eq!(predicted_count(&db).await, 8);
    }

    #[tokio::test]
    async fn test_previous_predictions_are_cleared() {
        let db = setup().await;
        let repo = GenerationRepository::new(db.pool());
        let old_periods = periods(2015, 4);
        let old_actuals = values(4, 10.0);
        let old_predictions = values(4, 11.0);
        repo.save_predictions(PredictionBatch {
            periods: &old_periods,
            actuals: &old_actuals,
            predictions: &old_predictions,
        })
        .await
        .unwrap();
        assert_eq!(predicted_count(&db).await, 16);

        let new_periods = periods(2022, 3);
        let new_actuals = values(3, 10.0);
        let new_predictions = values(1, 11.0);
        repo.save_predictions(PredictionBatch {
            periods: &new_periods,
            actuals: &new_actuals,
            predictions: &new_predictions,
        })
        .await
        .unwrap();

        assert_eq!(row_count(&db).await, 28);
        assert_eq!(predicted_count(&db).await, 4);
    }

    #[tokio::test]
    async fn test_unknown_location_aborts_before_clearing() {
        let db = setup().await;
        let repo = GenerationRepository::new(db.pool());

        sqlx::query(
            r#"
            INSERT INTO monthly_generation (year, month, location_id, actual_kwh, predicted_kwh)
            SELECT 2020, 1, id, 10.0, 12.0 FROM locations WHERE name = 'Awali'
            "#,
        )
        .execute(db.pool())
        .await
        .unwrap();
        sqlx::query("DELETE FROM locations WHERE name = 'UOB'")
            .execute(db.pool())
            .await
            .unwrap();

        let periods = periods(2022, 2);
        let actuals = values(2, 1.0);
        let predictions = values(1, 2.0);
        let err = repo
            .save_predictions(PredictionBatch {
                periods: &periods,
                actuals: &actuals,
                predictions: &predictions,
            })
            .await
            .unwrap_err();

        assert_eq!(
            err.downcast_ref::<PersistenceError>(),
            Some(&PersistenceError::UnknownLocation("UOB".to_string()))
        );
        assert_eq!(row_count(&db).await, 1);
        assert_eq!(predicted_count(&db).await, 1);
    }

    #[tokio::test]
    async fn test_failure_mid_write_rolls_back() {
        let db = setup().await;
        let repo = GenerationRepository::new(db.pool());

        let old_periods = periods(2020, 3);
        let old_actuals = values(3, 10.0);
        let old_predictions = values(2, 11.0);
        repo.save_predictions(PredictionBatch {
            periods: &old_periods,
            actuals: &old_actuals,
            predictions: &old_predictions,
        })
        .await
        .unwrap();
        let before = repo.find_all().await.unwrap();

        sqlx::query(
            r#"
            CREATE TRIGGER fail_insert BEFORE INSERT ON monthly_generation
            WHEN NEW.year = 2099
            BEGIN
                SELECT RAISE(ABORT, 'boom');
            END
            "#,
        )
        .execute(db.pool())
        .await
        .unwrap();

        let mut new_periods = periods(2022, 3);
        new_periods.push(YearMonth::new(2099, 1).unwrap());
        let new_actuals = values(4, 30.0);
        let new_predictions = values(2, 31.0);
        let result = repo
            .save_predictions(PredictionBatch {
                periods: &new_periods,
                actuals: &new_actuals,
                predictions: &new_predictions,
            })
            .await;

        let err = result.unwrap_err();
        assert!(format!("{:#}", err).contains("boom"), "{:#}", err);
        assert_eq!(repo.find_all().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_write_transaction_locks_out_other_writers() {
        use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
        use std::time::Duration;

        let dir = std::env::temp_dir().join(format!("solar-lock-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let options = SqliteConnectOptions::new()
            .filename(dir.join("app.db"))
            .create_if_missing(true)
            .busy_timeout(Duration::ZERO);
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .unwrap();
        schema::initialize(&pool).await.unwrap();

        let tx = begin_write(&pool).await.unwrap();

        // no statement has run in `tx` yet, but the write lock is already held
        let mut other = pool.acquire().await.unwrap();
        let competing = sqlx::query("BEGIN IMMEDIATE").execute(&mut *other).await;
        assert!(competing.is_err());

        tx.rollback().await.unwrap();
        drop(other);
        pool.close().await;
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_invalid_batch_is_rejected_before_writing() {
        let db = setup().await;
        let repo = GenerationRepository::new(db.pool());
        let periods = periods(2022, 3);
        let actuals = values(2, 1.0);
        let err = repo
            .save_predictions(PredictionBatch {
                periods: &periods,
                actuals: &actuals,
                predictions: &[],
            })
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<PersistenceError>(),
            Some(&PersistenceError::ActualsMismatch { periods: 3, actuals: 2 })
        );

        let actuals = values(3, 1.0);
        let mut predictions = values(1, 1.0);
        predictions[0][Location::Refinery] = f64::NAN;
        let err = PredictionBatch {
            periods: &periods,
            actuals: &actuals,
            predictions: &predictions,
        }
        .validate()
        .unwrap_err();
        assert_eq!(
            err,
            PersistenceError::NonFinite {
                kind: "predicted",
                location: Location::Refinery,
                period: periods[2],
            }
        );
        assert_eq!(row_count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_pivot_round_trip() {
        let db = setup().await;
        let repo = GenerationRepository::new(db.pool());
        let january = YearMonth::new(2023, 1).unwrap();
        let february = YearMonth::new(2023, 2).unwrap();

        repo.upsert_actuals(&[
            MonthlyActuals {
                period: february,
                actuals: PerLocation([Some(1.0), Some(2.0), Some(3.0), Some(6.0)]),
            },
            MonthlyActuals {
                period: january,
                actuals: PerLocation([Some(1.5), None, Some(2.5), Some(4.0)]),
            },
        ])
        .await
        .unwrap();

        let pivot = repo.find_monthly_actuals().await.unwrap();
        assert_eq!(pivot.len(), 2);
        assert_eq!(pivot[0].period, january);
        assert_eq!(pivot[0].actuals, PerLocation([Some(1.5), None, Some(2.5), Some(4.0)]));
        assert_eq!(pivot[1].actuals[Location::TotalSystem], Some(6.0));
        assert_eq!(row_count(&db).await, 7);
    }
}
