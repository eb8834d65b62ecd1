use std::{future::Future, str::FromStr, time::Duration};

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use thiserror::Error;
use tracing::{error, info, instrument};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
}

impl StoreError {
    /// True when the store rejected a write on a unique index.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::Database(e)) => e.is_unique_violation(),
            _ => false,
        }
    }
}

/// Connection pool plus the deadline applied to every store round trip.
#[derive(Clone, Debug)]
pub struct Database {
    pool: SqlitePool,
    timeout: Duration,
}

impl Database {
    pub fn new(pool: SqlitePool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Runs a store call, failing with [`StoreError::Timeout`] once the deadline passes.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => {
                error!(timeout = ?self.timeout, "store call timed out");
                Err(StoreError::Timeout(self.timeout))
            }
        }
    }
}

#[instrument(skip_all)]
pub async fn create_db_pool(database_url: &str) -> Result<SqlitePool, StoreError> {
    info!("Connecting to database");

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await?;

    migrate(&pool).await?;

    info!("Database ready");
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
