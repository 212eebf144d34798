//! Error types for single-file fetches.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::challenge::ChallengeError;
use crate::request::RequestError;

/// Errors that can occur while fetching one file.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The download's network request failed.
    #[error("failed to download {url}: {source}")]
    Download {
        /// The URL being fetched.
        url: String,
        /// The underlying request failure.
        #[source]
        source: RequestError,
    },

    /// The challenge-aware request path failed.
    #[error(transparent)]
    Challenge(ChallengeError),

    /// File system error for this job (fatal for the job, not the batch).
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Final file size does not match the expected content length.
    #[error(
        "integrity check failed for {path}: expected {expected_bytes} bytes, got {actual_bytes}"
    )]
    Integrity {
        /// Download path that failed verification.
        path: PathBuf,
        /// Expected size in bytes.
        expected_bytes: u64,
        /// Actual size in bytes.
        actual_bytes: u64,
    },

    /// Content checksum still mismatched after a forced re-download.
    #[error("checksum mismatch for {path}: expected md5 {expected}, got {actual}")]
    ChecksumMismatch {
        /// Download path that failed verification.
        path: PathBuf,
        /// Expected MD5 hex digest.
        expected: String,
        /// Computed MD5 hex digest.
        actual: String,
    },

    /// The fetch was cancelled; partial content is left on disk.
    #[error("download cancelled")]
    Cancelled,
}

impl FetchError {
    /// Wraps a request failure, preserving cancellation as its own variant.
    pub fn request(url: impl Into<String>, source: RequestError) -> Self {
        if source.is_cancelled() {
            Self::Cancelled
        } else {
            Self::Download {
                url: url.into(),
                source,
            }
        }
    }

    /// Wraps a challenge-path failure, preserving cancellation.
    #[must_use]
    pub fn challenge(source: ChallengeError) -> Self {
        if source.is_cancelled() {
            Self::Cancelled
        } else {
            Self::Challenge(source)
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an integrity mismatch error.
    pub fn integrity(path: &Path, expected_bytes: u64, actual_bytes: u64) -> Self {
        Self::Integrity {
            path: path.to_path_buf(),
            expected_bytes,
            actual_bytes,
        }
    }

    /// Returns `true` if this result represents cancellation rather than failure.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_helper_promotes_cancellation() {
        let err = FetchError::request("https://x", RequestError::Cancelled);
        assert!(err.is_cancelled());

        let err = FetchError::request("https://x", RequestError::invalid_url("https://x"));
        assert!(!err.is_cancelled());
        assert!(err.to_string().contains("failed to download https://x"));
    }

    #[test]
    fn test_integrity_display_includes_both_sizes() {
        let err = FetchError::integrity(Path::new("/tmp/file.zip"), 1000, 400);
        let msg = err.to_string();
        assert!(msg.contains("1000"), "missing expected size: {msg}");
        assert!(msg.contains("400"), "missing actual size: {msg}");
    }
}
