//! SQLite connection and schema management for the dedup cache.

use std::path::Path;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::instrument;

/// Default maximum number of connections in the pool.
/// Kept low for SQLite since it uses file-level locking.
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// SQLite busy timeout in milliseconds.
/// Connections wait this long before returning SQLITE_BUSY, which matters
/// when multiple orchestrator workers write completion marks concurrently.
const BUSY_TIMEOUT_MS: u32 = 5000;

/// Cache persistence errors.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Query or connection failure.
    #[error("cache database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Failed to run migrations.
    #[error("failed to run cache migrations: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Connection pool around the embedded cache database.
///
/// Opens the database file (creating it if needed), enables WAL mode for
/// concurrent reads, and runs pending migrations. The store's own
/// transactional write path serializes concurrent writers, so callers
/// never take an external lock.
#[derive(Debug, Clone)]
pub struct CacheDb {
    pool: SqlitePool,
}

impl CacheDb {
    /// Opens (or creates) the cache database at `db_path`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Database`] if the connection fails,
    /// or [`CacheError::Migration`] if migrations fail.
    #[instrument(skip(db_path), fields(path = %db_path.display()))]
    pub async fn open(db_path: &Path) -> Result<Self, CacheError> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect(&db_url)
            .await?;

        // Enable WAL mode for concurrent reads
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await?;

        // Set busy timeout to avoid immediate lock errors
        sqlx::query(&format!("PRAGMA busy_timeout={BUSY_TIMEOUT_MS}"))
            .execute(&pool)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Creates an in-memory cache database for testing.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Database`] if the connection fails,
    /// or [`CacheError::Migration`] if migrations fail.
    #[instrument]
    pub async fn in_memory() -> Result<Self, CacheError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Returns the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Gracefully closes all connections; call at process shutdown.
    #[instrument(skip(self))]
    pub async fn close(self) {
        self.pool.close().await;
    }
}
