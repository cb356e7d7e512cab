use anyhow::{Context, Result};
use sqlx::SqliteConnection;

use crate::database::PersistenceError;
use crate::domain::{Location, PerLocation};

/// Look up the row id of every location on the given connection.
///
/// Fails with [`PersistenceError::UnknownLocation`] on the first name that
/// has no row, so callers inside a transaction abort before writing.
pub async fn resolve_location_ids(conn: &mut SqliteConnection) -> Result<PerLocation<i64>> {
    let mut ids = PerLocation::default();

    for location in Location::ALL {
        let id: Option<i64> = sqlx::query_scalar("SELECT id FROM locations WHERE name = ?")
            .bind(location.db_name())
            .fetch_optional(&mut *conn)
            .await
            .with_context(|| format!("Failed to look up location {}", location))?;

        ids[location] = id.ok_or_else(|| PersistenceError::UnknownLocation(location.db_name().to_string()))?;
    }

    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{schema, Database};

    #[tokio::test]
    async fn test_resolves_seeded_locations() {
        let db = Database::in_memory().await.unwrap();
        schema::initialize(db.pool()).await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        let ids = resolve_location_ids(&mut conn).await.unwrap();

        let mut distinct: Vec<i64> = ids.0.to_vec();
        distinct.dedup();
        assert_eq!(distinct.len(), 4);
    }

    #[tokio::test]
    async fn test_missing_location_is_an_error() {
        let db = Database::in_memory().await.unwrap();
        schema::initialize(db.pool()).await.unwrap();
        sqlx::query("DELETE FROM locations WHERE name = 'UOB'")
            .execute(db.pool())
            .await
            .unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        let err = resolve_location_ids(&mut conn).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<PersistenceError>(),
            Some(&PersistenceError::UnknownLocation("UOB".to_string()))
        );
    }
}
