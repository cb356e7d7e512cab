use anyhow::{Context, Result};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info};

use crate::database::PersistenceError;
use crate::domain::{WeatherField, WeatherObservation, YearMonth};
use crate::forecast::DataError;

/// `weather_monthly` row. Measurement columns are nullable in the table.
#[derive(Debug, Clone, FromRow)]
pub struct WeatherRow {
    pub year: i64,
    pub month: i64,
    pub avg_sunshine_duration_seconds: Option<f64>,
    pub avg_daylight_duration_seconds: Option<f64>,
    pub min_temperature_c: Option<f64>,
    pub avg_temperature_c: Option<f64>,
    pub max_temperature_c: Option<f64>,
    pub avg_solar_irradiance_wm2: Option<f64>,
    pub avg_relative_humidity_percent: Option<f64>,
    pub avg_cloud_cover_percent: Option<f64>,
    pub avg_wind_speed_kmh: Option<f64>,
    pub total_rainfall_mm: Option<f64>,
}

impl TryFrom<WeatherRow> for WeatherObservation {
    type Error = anyhow::Error;

    fn try_from(row: WeatherRow) -> Result<Self> {
        let period = YearMonth::from_db(row.year, row.month).ok_or(PersistenceError::InvalidPeriod {
            year: row.year,
            month: row.month,
        })?;

        let require = |field: WeatherField, value: Option<f64>| {
            value.ok_or_else(|| DataError::MissingValue {
                period,
                field: field.column().to_string(),
            })
        };

        Ok(WeatherObservation {
            period,
            avg_sunshine_duration_seconds: require(WeatherField::SunshineDuration, row.avg_sunshine_duration_seconds)?,
            avg_daylight_duration_seconds: require(WeatherField::DaylightDuration, row.avg_daylight_duration_seconds)?,
            min_temperature_c: require(WeatherField::MinTemperature, row.min_temperature_c)?,
            avg_temperature_c: require(WeatherField::AvgTemperature, row.avg_temperature_c)?,
            max_temperature_c: require(WeatherField::MaxTemperature, row.max_temperature_c)?,
            avg_solar_irradiance_wm2: require(WeatherField::SolarIrradiance, row.avg_solar_irradiance_wm2)?,
            avg_relative_humidity_percent: require(WeatherField::RelativeHumidity, row.avg_relative_humidity_percent)?,
            avg_cloud_cover_percent: require(WeatherField::CloudCover, row.avg_cloud_cover_percent)?,
            avg_wind_speed_kmh: require(WeatherField::WindSpeed, row.avg_wind_speed_kmh)?,
            total_rainfall_mm: require(WeatherField::Rainfall, row.total_rainfall_mm)?,
        })
    }
}

pub struct WeatherRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> WeatherRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// All monthly weather rows in chronological order.
    pub async fn find_all(&self) -> Result<Vec<WeatherObservation>> {
        let rows = sqlx::query_as::<_, WeatherRow>(
            r#"
            SELECT year, month,
                   CAST(avg_sunshine_duration_seconds AS REAL) AS avg_sunshine_duration_seconds,
                   CAST(avg_daylight_duration_seconds AS REAL) AS avg_daylight_duration_seconds,
                   CAST(min_temperature_C AS REAL) AS min_temperature_c,
                   CAST(avg_temperature_C AS REAL) AS avg_temperature_c,
                   CAST(max_temperature_C AS REAL) AS max_temperature_c,
                   CAST(avg_solar_irradiance_wm2 AS REAL) AS avg_solar_irradiance_wm2,
                   CAST(avg_relative_humidity_percent AS REAL) AS avg_relative_humidity_percent,
                   CAST(avg_cloud_cover_percent AS REAL) AS avg_cloud_cover_percent,
                   CAST(avg_wind_speed_kmh AS REAL) AS avg_wind_speed_kmh,
                   CAST(total_rainfall_mm AS REAL) AS total_rainfall_mm
            FROM weather_monthly
            ORDER BY year, month
            "#,
        )
        .fetch_all(self.pool)
        .await
        .context("Failed to load weather data")?;

        debug!(rows = rows.len(), "loaded weather rows");

        rows.into_iter().map(WeatherObservation::try_from).collect()
    }

    /// Insert or replace monthly aggregates in one transaction.
    ///
    /// Seeding helper for tests and fixtures. Production weather rows are
    /// loaded by the ingestion service that owns `weather_monthly`.
    pub async fn upsert_batch(&self, observations: &[WeatherObservation]) -> Result<()> {
        if observations.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.context("Failed to start transaction")?;

        for obs in observations {
            sqlx::query(
                r#"
                INSERT INTO weather_monthly (
                    year, month,
                    avg_sunshine_duration_seconds, avg_daylight_duration_seconds,
                    min_temperature_C, avg_temperature_C, max_temperature_C,
                    avg_solar_irradiance_wm2, avg_relative_humidity_percent,
                    avg_cloud_cover_percent, avg_wind_speed_kmh, total_rainfall_mm
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(year, month) DO UPDATE SET
                    avg_sunshine_duration_seconds = excluded.avg_sunshine_duration_seconds,
                    avg_daylight_duration_seconds = excluded.avg_daylight_duration_seconds,
                    min_temperature_C = excluded.min_temperature_C,
                    avg_temperature_C = excluded.avg_temperature_C,
                    max_temperature_C = excluded.max_temperature_C,
                    avg_solar_irradiance_wm2 = excluded.avg_solar_irradiance_wm2,
                    avg_relative_humidity_percent = excluded.avg_relative_humidity_percent,
                    avg_cloud_cover_percent = excluded.avg_cloud_cover_percent,
                    avg_wind_speed_kmh = excluded.avg_wind_speed_kmh,
                    total_rainfall_mm = excluded.total_rainfall_mm
                "#,
            )
            .bind(obs.period.year)
            .bind(obs.period.month)
            .bind(obs.avg_sunshine_duration_seconds)
            .bind(obs.avg_daylight_duration_seconds)
            .bind(obs.min_temperature_c)
            .bind(obs.avg_temperature_c)
            .bind(obs.max_temperature_c)
            .bind(obs.avg_solar_irradiance_wm2)
            .bind(obs.avg_relative_humidity_percent)
            .bind(obs.avg_cloud_cover_percent)
            .bind(obs.avg_wind_speed_kmh)
            .bind(obs.total_rainfall_mm)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to upsert weather for {}", obs.period))?;
        }

        tx.commit().await.context("Failed to commit transaction")?;

        info!("Upserted {} weather rows", observations.len());
        Ok(())
    }
}
