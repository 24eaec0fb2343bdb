// src/server/db.rs

//! Database pool configuration and the startup connectivity probe.

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::time::Duration;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to connect to database: {0}")]
    Connect(sqlx::Error),

    #[error("Database is not responding: {0}")]
    Probe(sqlx::Error),
}

/// Create the connection pool shared by the poller and the HTTP layer.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, StoreError> {
    SqlitePoolOptions::new()
        // SQLite is single-writer, but the poller only reads
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .max_lifetime(Duration::from_secs(1800))
        .idle_timeout(Duration::from_secs(600))
        .connect(database_url)
        .await
        .map_err(StoreError::Connect)
}

/// Verify the store answers a trivial query before the service starts.
pub async fn probe(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(pool)
        .await
        .map_err(StoreError::Probe)?;

    info!("Database connection verified");
    Ok(())
}
