//! Error types for challenge resolution.

use thiserror::Error;

use super::resolver::ChallengeKey;
use crate::request::RequestError;

/// Failure reported by an external [`super::Solver`].
#[derive(Debug, Error)]
pub enum SolveError {
    /// Resolution can never succeed under current preconditions
    /// (e.g. no session cookie for a session-scoped challenge).
    /// Marks the key permanently failed.
    #[error("challenge cannot be resolved: {0}")]
    Unrecoverable(String),

    /// Resolution failed but a later attempt may succeed.
    #[error("challenge resolution failed: {0}")]
    Transient(String),
}

/// Errors surfaced by the challenge resolver and gate.
#[derive(Debug, Error)]
pub enum ChallengeError {
    /// The solver previously reported this key unrecoverable; it is not
    /// invoked again for the lifetime of the resolver.
    #[error("challenge for {key} previously failed permanently; re-authenticate and run again")]
    PermanentlyFailed {
        /// The failed challenge key.
        key: ChallengeKey,
    },

    /// The solver reported an unrecoverable failure just now. Subsequent
    /// attempts on the same key get [`ChallengeError::PermanentlyFailed`].
    #[error("challenge for {key} is unresolvable: {reason}")]
    Unrecoverable {
        /// The failed challenge key.
        key: ChallengeKey,
        /// The solver's reason.
        reason: String,
    },

    /// The solver failed transiently; the key stays retryable.
    #[error("challenge solver failed for {key}: {reason}")]
    Solver {
        /// The challenge key being resolved.
        key: ChallengeKey,
        /// The solver's reason.
        reason: String,
    },

    /// The response still matched the challenge predicate after a
    /// successful resolution and retry.
    #[error("challenge for {key} still present after resolution")]
    Unresolved {
        /// The challenge key.
        key: ChallengeKey,
    },

    /// The underlying request failed or was cancelled.
    #[error(transparent)]
    Request(#[from] RequestError),
}

impl ChallengeError {
    /// Returns `true` if this result represents cancellation rather than failure.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Request(inner) if inner.is_cancelled())
    }
}
