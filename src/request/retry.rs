//! Retry policy with uniformly-random backoff delays.
//!
//! Failed attempts sleep a random duration in `[min_delay, max_delay]`
//! before retrying. Randomizing the delay (rather than a fixed schedule)
//! spreads concurrent retries out so a burst of failures does not hammer
//! the server again in lockstep.

use std::time::Duration;

use rand::Rng;

/// Default maximum attempts, including the initial attempt.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Default minimum retry delay (1 second).
const DEFAULT_MIN_DELAY: Duration = Duration::from_secs(1);

/// Default maximum retry delay (3 seconds).
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(3);

/// How many transport failures are tolerated on HTTP/3 before the engine
/// falls back to HTTP/2 for the remaining attempts.
pub const H3_TRANSPORT_ATTEMPT_CAP: u32 = 2;

/// Configuration for the request retry loop.
///
/// # Default Values
///
/// - `min_delay`: 1 second
/// - `max_delay`: 3 seconds
/// - `max_attempts`: 4 (including the initial attempt)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    min_delay: Duration,
    max_delay: Duration,
    max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            min_delay: DEFAULT_MIN_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    /// Creates a retry policy.
    ///
    /// `max_attempts` is raised to at least 1; an inverted delay window is
    /// swapped so `min_delay <= max_delay` always holds.
    #[must_use]
    pub fn new(min_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        let (min_delay, max_delay) = if min_delay <= max_delay {
            (min_delay, max_delay)
        } else {
            (max_delay, min_delay)
        };
        Self {
            min_delay,
            max_delay,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Creates a policy with a custom attempt cap and the default delay window.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Returns the maximum number of attempts (including the initial attempt).
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns a uniformly-random delay in `[min_delay, max_delay]`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn random_delay(&self) -> Duration {
        let min_ms = self.min_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        if min_ms == max_ms {
            return self.min_delay;
        }
        let mut rng = rand::thread_rng();
        Duration::from_millis(rng.gen_range(min_ms..=max_ms))
    }
}
