//! Typed bucket helpers: post/gdrive/ugoira completion marks and cached
//! creator display names.

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use super::db::CacheError;
use super::store::DedupCache;
use crate::batch::Job;
use crate::platform::Platform;

/// Bucket of completed-post markers.
pub const POST_BUCKET: &str = "post_cache";
/// Bucket of completed GDrive file markers.
pub const GDRIVE_BUCKET: &str = "gdrive_cache";
/// Bucket of converted ugoira (animation) markers.
pub const UGOIRA_BUCKET: &str = "ugoira_cache";
/// Bucket of resolved creator display names.
pub const CREATOR_NAME_BUCKET: &str = "creator_name_cache";

/// Separator between the platform namespace and the resource locator.
pub const POST_DELIM: &str = "|";

/// Builds a namespaced post key: `<platform>|<resource-locator>`.
#[must_use]
pub fn post_key(platform: Platform, locator: &str) -> String {
    format!("{}{POST_DELIM}{locator}", platform.as_str())
}

/// Splits a namespaced post key back into platform and locator.
///
/// Returns `None` for malformed keys or unknown platforms. Locators may
/// themselves contain the delimiter; only the first occurrence splits.
#[must_use]
pub fn split_post_key(key: &str) -> Option<(Platform, &str)> {
    let (platform, locator) = key.split_once(POST_DELIM)?;
    Some((platform.parse().ok()?, locator))
}

/// A completed-post record read back from the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRecord {
    /// Platform the post belongs to.
    pub platform: Platform,
    /// Resource locator (URL or id).
    pub locator: String,
    /// When the post finished downloading.
    pub completed_at: DateTime<Utc>,
    /// The full stored key.
    pub cache_key: String,
}

impl DedupCache {
    /// Returns `true` if the post was completed on a previous run.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on query failure.
    pub async fn post_exists(&self, platform: Platform, locator: &str) -> Result<bool, CacheError> {
        self.exists(POST_BUCKET, &post_key(platform, locator)).await
    }

    /// Marks a post completed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on write failure.
    pub async fn mark_post(&self, platform: Platform, locator: &str) -> Result<(), CacheError> {
        self.mark_post_key(&post_key(platform, locator)).await
    }

    /// Marks a post completed using an already-namespaced key (the form
    /// carried on [`Job::cache_key`]).
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on write failure.
    pub async fn mark_post_key(&self, parsed_key: &str) -> Result<(), CacheError> {
        self.set_timestamp(POST_BUCKET, parsed_key).await
    }

    /// Returns `true` if the GDrive file was completed on a previous run.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on query failure.
    pub async fn gdrive_exists(&self, key: &str) -> Result<bool, CacheError> {
        self.exists(GDRIVE_BUCKET, key).await
    }

    /// Marks a GDrive file completed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on write failure.
    pub async fn mark_gdrive(&self, key: &str) -> Result<(), CacheError> {
        self.set_timestamp(GDRIVE_BUCKET, key).await
    }

    /// Returns `true` if the ugoira was already converted.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on query failure.
    pub async fn ugoira_exists(&self, key: &str) -> Result<bool, CacheError> {
        self.exists(UGOIRA_BUCKET, key).await
    }

    /// Marks an ugoira converted.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on write failure.
    pub async fn mark_ugoira(&self, key: &str) -> Result<(), CacheError> {
        self.set_timestamp(UGOIRA_BUCKET, key).await
    }

    /// Reads a cached creator display name.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on query failure.
    pub async fn creator_name(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.get_string(CREATOR_NAME_BUCKET, key).await
    }

    /// Caches a creator display name.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on write failure.
    pub async fn set_creator_name(&self, key: &str, name: &str) -> Result<(), CacheError> {
        self.set_string(CREATOR_NAME_BUCKET, key, name).await
    }

    /// All completed posts for one platform, newest first.
    ///
    /// Uses a prefix scan over the namespaced keys, so other platforms'
    /// entries are never touched.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on query failure.
    pub async fn posts_for_platform(
        &self,
        platform: Platform,
    ) -> Result<Vec<PostRecord>, CacheError> {
        let prefix = format!("{}{POST_DELIM}", platform.as_str());
        let entries = self.scan_prefix(POST_BUCKET, &prefix).await?;
        let mut records: Vec<PostRecord> = entries
            .into_iter()
            .filter_map(|entry| {
                let (platform, locator) = split_post_key(&entry.key)?;
                Some(PostRecord {
                    platform,
                    locator: locator.to_string(),
                    completed_at: entry.value_time()?,
                    cache_key: entry.key,
                })
            })
            .collect();
        records.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        Ok(records)
    }

    /// All completed posts across every platform, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on query failure.
    pub async fn all_posts(&self) -> Result<Vec<PostRecord>, CacheError> {
        let entries = self.entries(POST_BUCKET).await?;
        let mut records: Vec<PostRecord> = entries
            .into_iter()
            .filter_map(|entry| {
                let (platform, locator) = split_post_key(&entry.key)?;
                Some(PostRecord {
                    platform,
                    locator: locator.to_string(),
                    completed_at: entry.value_time()?,
                    cache_key: entry.key,
                })
            })
            .collect();
        records.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        Ok(records)
    }

    /// Drops all completed-post markers (management operation).
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on write failure.
    pub async fn clear_posts(&self) -> Result<(), CacheError> {
        self.delete_bucket(POST_BUCKET).await
    }

    /// Drops all GDrive markers (management operation).
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on write failure.
    pub async fn clear_gdrive(&self) -> Result<(), CacheError> {
        self.delete_bucket(GDRIVE_BUCKET).await
    }

    /// Drops all ugoira markers (management operation).
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on write failure.
    pub async fn clear_ugoira(&self) -> Result<(), CacheError> {
        self.delete_bucket(UGOIRA_BUCKET).await
    }

    /// Drops all cached creator names (management operation).
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on write failure.
    pub async fn clear_creator_names(&self) -> Result<(), CacheError> {
        self.delete_bucket(CREATOR_NAME_BUCKET).await
    }

    /// Drops jobs whose cache key is already marked completed, so repeated
    /// runs are idempotent: pruned jobs never reach the orchestrator and
    /// cause zero network calls.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on query failure.
    #[instrument(level = "debug", skip(self, jobs), fields(total = jobs.len()))]
    pub async fn prune_completed(&self, jobs: Vec<Job>) -> Result<Vec<Job>, CacheError> {
        let mut kept = Vec::with_capacity(jobs.len());
        for job in jobs {
            let completed = match job.cache_key.as_deref() {
                Some(key) => self.exists(POST_BUCKET, key).await?,
                None => false,
            };
            if completed {
                debug!(url = %job.url, "skipping already-completed job");
            } else {
                kept.push(job);
            }
        }
        Ok(kept)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cache::CacheDb;

    async fn cache() -> DedupCache {
        DedupCache::new(CacheDb::in_memory().await.unwrap())
    }

    #[test]
    fn test_post_key_format() {
        assert_eq!(
            post_key(Platform::Fantia, "https://fantia.jp/posts/123456"),
            "fantia|https://fantia.jp/posts/123456"
        );
    }

    #[test]
    fn test_split_post_key_keeps_delimiters_in_locator() {
        let (platform, locator) = split_post_key("kemono|https://kemono.party/a|b").unwrap();
        assert_eq!(platform, Platform::Kemono);
        assert_eq!(locator, "https://kemono.party/a|b");
    }

    #[test]
    fn test_split_post_key_rejects_malformed_keys() {
        assert!(split_post_key("no-delimiter").is_none());
        assert!(split_post_key("unknown|https://x").is_none());
    }

    #[tokio::test]
    async fn test_post_mark_and_exists() {
        let cache = cache().await;
        let url = "https://fantia.jp/posts/123456";
        assert!(!cache.post_exists(Platform::Fantia, url).await.unwrap());

        cache.mark_post(Platform::Fantia, url).await.unwrap();
        assert!(cache.post_exists(Platform::Fantia, url).await.unwrap());
        // Same locator under a different platform is a different resource.
        assert!(!cache.post_exists(Platform::Kemono, url).await.unwrap());
    }

    #[tokio::test]
    async fn test_posts_for_platform_scans_only_that_prefix() {
        let cache = cache().await;
        cache.mark_post(Platform::Fantia, "https://fantia.jp/posts/1").await.unwrap();
        cache.mark_post(Platform::Fantia, "https://fantia.jp/posts/2").await.unwrap();
        cache.mark_post(Platform::Pixiv, "https://www.pixiv.net/artworks/3").await.unwrap();

        let records = cache.posts_for_platform(Platform::Fantia).await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.platform == Platform::Fantia));

        let all = cache.all_posts().await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_creator_name_round_trip() {
        let cache = cache().await;
        assert_eq!(cache.creator_name("kemono|123").await.unwrap(), None);
        cache.set_creator_name("kemono|123", "Some Artist").await.unwrap();
        assert_eq!(
            cache.creator_name("kemono|123").await.unwrap(),
            Some("Some Artist".to_string())
        );
    }

    #[tokio::test]
    async fn test_prune_completed_drops_cached_jobs() {
        let cache = cache().await;
        let done_key = post_key(Platform::Fantia, "https://fantia.jp/posts/123456");
        cache.mark_post_key(&done_key).await.unwrap();

        let jobs = vec![
            Job::new("https://fantia.jp/posts/123456/download/1", "/tmp/a.zip")
                .with_cache_key(done_key.clone()),
            Job::new("https://fantia.jp/posts/999/download/2", "/tmp/b.zip")
                .with_cache_key(post_key(Platform::Fantia, "https://fantia.jp/posts/999")),
            Job::new("https://fantia.jp/extra.bin", "/tmp/c.bin"),
        ];

        let kept = cache.prune_completed(jobs).await.unwrap();
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|job| job.cache_key.as_deref() != Some(done_key.as_str())));
    }
}
