//! Persistent dedup cache of completed resources.
//!
//! The cache is an embedded SQLite store of named buckets. The only signal
//! most callers consult is key existence: a post key present in
//! `post_cache` means every download belonging to that post finished on a
//! previous run, so the whole post is skipped. Values are completion
//! timestamps (for "done" markers) or short strings (cached display
//! names).
//!
//! There is no ambient global cache: a [`DedupCache`] is opened once at
//! process start and passed by reference into whatever needs it. Entries
//! never expire automatically; bulk deletes are explicit management
//! operations.
//!
//! # Example
//!
//! ```no_run
//! use mediagrab_core::cache::{CacheDb, DedupCache};
//! use mediagrab_core::platform::Platform;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = CacheDb::open(Path::new("mediagrab.db")).await?;
//! let cache = DedupCache::new(db);
//! if !cache.post_exists(Platform::Fantia, "https://fantia.jp/posts/123456").await? {
//!     // download, then:
//!     cache.mark_post(Platform::Fantia, "https://fantia.jp/posts/123456").await?;
//! }
//! # Ok(())
//! # }
//! ```

mod db;
mod post;
mod store;

pub use db::{CacheDb, CacheError};
pub use post::{
    CREATOR_NAME_BUCKET, GDRIVE_BUCKET, POST_BUCKET, POST_DELIM, PostRecord, UGOIRA_BUCKET,
    post_key, split_post_key,
};
pub use store::{CacheEntry, DedupCache};
