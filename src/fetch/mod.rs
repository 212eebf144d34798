//! Resumable, checksummed single-file downloads.
//!
//! One [`FileFetcher::fetch`] call moves one job through a strict
//! sequence: HEAD probe → skip check → (possibly ranged) transfer →
//! integrity verification. Partial files are appended to via HTTP range
//! requests when the endpoint supports them; cancellation stops writing
//! but leaves partial content in place so a later run can resume it.

mod error;
mod fetcher;
mod probe;

pub use error::FetchError;
pub use fetcher::{FetchOptions, FetchOutcome, FileFetcher};
pub use probe::DownloadProbe;
