//! Bucketed key-value operations over the cache database.

use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::instrument;

use super::db::{CacheDb, CacheError};

/// One stored cache row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Bucket the entry lives in.
    pub bucket: String,
    /// Full key, including any namespace prefix.
    pub key: String,
    /// Raw value bytes.
    pub value: Vec<u8>,
}

impl CacheEntry {
    /// The value as a (lossy) string.
    #[must_use]
    pub fn value_str(&self) -> String {
        String::from_utf8_lossy(&self.value).into_owned()
    }

    /// The value parsed as a completion timestamp, if it is one.
    #[must_use]
    pub fn value_time(&self) -> Option<DateTime<Utc>> {
        parse_time(&self.value)
    }
}

/// Escapes `%`, `_`, and `\` so a prefix can be used in a LIKE pattern.
fn like_prefix(prefix: &str) -> String {
    let escaped = prefix
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("{escaped}%")
}

fn parse_time(value: &[u8]) -> Option<DateTime<Utc>> {
    let text = std::str::from_utf8(value).ok()?;
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// The dedup cache service.
///
/// All mutations go through SQLite's transactional write path, so
/// concurrent orchestrator workers are serialized without an external
/// lock. Existence of a key is the primary signal; values are secondary.
#[derive(Debug, Clone)]
pub struct DedupCache {
    db: CacheDb,
}

impl DedupCache {
    /// Wraps an opened cache database.
    #[must_use]
    pub fn new(db: CacheDb) -> Self {
        Self { db }
    }

    /// Returns `true` if `key` exists in `bucket`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on query failure.
    pub async fn exists(&self, bucket: &str, key: &str) -> Result<bool, CacheError> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM cache_entries WHERE bucket = ? AND key = ?")
                .bind(bucket)
                .bind(key)
                .fetch_optional(self.db.pool())
                .await?;
        Ok(found.is_some())
    }

    /// Reads a raw value.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on query failure.
    pub async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let value: Option<Vec<u8>> =
            sqlx::query_scalar("SELECT value FROM cache_entries WHERE bucket = ? AND key = ?")
                .bind(bucket)
                .bind(key)
                .fetch_optional(self.db.pool())
                .await?;
        Ok(value)
    }

    /// Reads a value as a string.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on query failure.
    pub async fn get_string(&self, bucket: &str, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self
            .get(bucket, key)
            .await?
            .map(|value| String::from_utf8_lossy(&value).into_owned()))
    }

    /// Reads a value as a completion timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on query failure.
    pub async fn get_time(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<DateTime<Utc>>, CacheError> {
        Ok(self.get(bucket, key).await?.and_then(|v| parse_time(&v)))
    }

    /// Writes a raw value, replacing any existing entry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on write failure.
    #[instrument(level = "debug", skip(self, value))]
    pub async fn set(&self, bucket: &str, key: &str, value: &[u8]) -> Result<(), CacheError> {
        sqlx::query(
            "INSERT INTO cache_entries (bucket, key, value) VALUES (?, ?, ?) \
             ON CONFLICT (bucket, key) DO UPDATE SET value = excluded.value",
        )
        .bind(bucket)
        .bind(key)
        .bind(value)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    /// Writes a string value.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on write failure.
    pub async fn set_string(&self, bucket: &str, key: &str, value: &str) -> Result<(), CacheError> {
        self.set(bucket, key, value.as_bytes()).await
    }

    /// Writes the current time as the value: a "done" marker.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on write failure.
    pub async fn set_timestamp(&self, bucket: &str, key: &str) -> Result<(), CacheError> {
        let now = Utc::now().to_rfc3339();
        self.set(bucket, key, now.as_bytes()).await
    }

    /// Deletes one entry. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on write failure.
    pub async fn delete(&self, bucket: &str, key: &str) -> Result<(), CacheError> {
        sqlx::query("DELETE FROM cache_entries WHERE bucket = ? AND key = ?")
            .bind(bucket)
            .bind(key)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    /// Returns all entries in `bucket` whose key starts with `prefix`,
    /// ordered by key.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on query failure.
    pub async fn scan_prefix(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<CacheEntry>, CacheError> {
        let rows = sqlx::query(
            "SELECT key, value FROM cache_entries \
             WHERE bucket = ? AND key LIKE ? ESCAPE '\\' ORDER BY key",
        )
        .bind(bucket)
        .bind(like_prefix(prefix))
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| CacheEntry {
                bucket: bucket.to_string(),
                key: row.get("key"),
                value: row.get("value"),
            })
            .collect())
    }

    /// Returns every entry in `bucket`, ordered by key.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on query failure.
    pub async fn entries(&self, bucket: &str) -> Result<Vec<CacheEntry>, CacheError> {
        self.scan_prefix(bucket, "").await
    }

    /// Drops every entry in `bucket`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on write failure.
    #[instrument(level = "debug", skip(self))]
    pub async fn delete_bucket(&self, bucket: &str) -> Result<(), CacheError> {
        sqlx::query("DELETE FROM cache_entries WHERE bucket = ?")
            .bind(bucket)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    /// The underlying database handle.
    #[must_use]
    pub fn db(&self) -> &CacheDb {
        &self.db
    }
}
