//! The unit of work: one URL to one destination path.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tracing::warn;

use crate::cache::DedupCache;

/// Completion callback invoked with the job's cache key after every job
/// sharing that key finished successfully. Typically a dedup-cache write.
pub type OnComplete = Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>;

/// A single download job, produced by a platform collaborator and
/// consumed exactly once by the orchestrator. Immutable after creation.
#[derive(Clone)]
pub struct Job {
    /// Source URL to fetch.
    pub url: String,
    /// Destination: a file path (with extension) or a directory to place
    /// the URL-derived filename in.
    pub file_path: PathBuf,
    /// Namespaced dedup key (`<platform>|<locator>`). Several jobs from
    /// the same post share one key.
    pub cache_key: Option<String>,
    /// Expected MD5 hex digest, when the platform API provides one.
    pub expected_md5: Option<String>,
    /// Callback run once the whole cache key completed.
    pub on_complete: Option<OnComplete>,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("url", &self.url)
            .field("file_path", &self.file_path)
            .field("cache_key", &self.cache_key)
            .field("expected_md5", &self.expected_md5)
            .field("has_on_complete", &self.on_complete.is_some())
            .finish()
    }
}

impl Job {
    /// Creates a job.
    pub fn new(url: impl Into<String>, file_path: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            file_path: file_path.into(),
            cache_key: None,
            expected_md5: None,
            on_complete: None,
        }
    }

    /// Sets the dedup cache key.
    #[must_use]
    pub fn with_cache_key(mut self, cache_key: impl Into<String>) -> Self {
        self.cache_key = Some(cache_key.into());
        self
    }

    /// Sets the expected MD5 digest for post-transfer verification.
    #[must_use]
    pub fn with_expected_md5(mut self, md5: impl Into<String>) -> Self {
        self.expected_md5 = Some(md5.into());
        self
    }

    /// Sets the completion callback.
    #[must_use]
    pub fn with_on_complete(mut self, on_complete: OnComplete) -> Self {
        self.on_complete = Some(on_complete);
        self
    }
}

/// The standard completion callback: record the post key in the dedup
/// cache. A write failure is logged, never escalated — the download
/// itself succeeded, and the worst outcome is a redundant re-download on
/// the next run.
#[must_use]
pub fn mark_post_on_complete(cache: DedupCache) -> OnComplete {
    Arc::new(move |key: String| {
        let cache = cache.clone();
        Box::pin(async move {
            if let Err(error) = cache.mark_post_key(&key).await {
                warn!(%key, %error, "failed to record completed post in cache");
            }
        })
    })
}
