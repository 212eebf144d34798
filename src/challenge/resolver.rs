//! Per-key challenge state and single-flight resolution.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::error::{ChallengeError, SolveError};
use crate::platform::Platform;
use crate::request::SessionCookie;

/// Identifies one independently-resolvable challenge scope, typically a
/// platform, sometimes a sub-resource with its own protection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChallengeKey(String);

impl ChallengeKey {
    /// Creates a key from an arbitrary scope id.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The conventional key for a whole platform.
    #[must_use]
    pub fn for_platform(platform: Platform) -> Self {
        Self(platform.as_str().to_string())
    }

    /// The raw key string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChallengeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An opaque credential produced by a solver: the cookie set that makes
/// subsequent requests pass the platform's challenge.
#[derive(Debug, Clone, Default)]
pub struct Credential {
    /// Cookies to inject into challenged requests.
    pub cookies: Vec<SessionCookie>,
}

impl Credential {
    /// Creates a credential from solver-produced cookies.
    #[must_use]
    pub fn from_cookies(cookies: Vec<SessionCookie>) -> Self {
        Self { cookies }
    }
}

/// External challenge solver collaborator.
///
/// Typically backed by a browser-automation process or containerized
/// headless solver. The resolver guarantees at most one concurrent
/// invocation per key.
#[async_trait]
pub trait Solver: Send + Sync {
    /// Solves the challenge for `key`, optionally using the caller's
    /// platform session credential.
    async fn solve(
        &self,
        key: &ChallengeKey,
        user_agent: &str,
        session: Option<&Credential>,
    ) -> Result<Credential, SolveError>;
}

/// Mutable state for one challenge key. Guarded by a per-key async mutex;
/// holding the lock across the solver call is what provides single-flight.
#[derive(Debug, Default)]
struct KeyState {
    credential: Option<Credential>,
    solved_at: Option<Instant>,
    permanently_failed: bool,
}

impl KeyState {
    /// Returns the credential and its solve time if still within `ttl`.
    fn fresh(&self, ttl: Duration) -> Option<(Credential, Instant)> {
        let solved_at = self.solved_at?;
        if solved_at.elapsed() < ttl {
            self.credential
                .clone()
                .map(|credential| (credential, solved_at))
        } else {
            None
        }
    }
}

/// Caches challenge credentials per key and serializes resolution.
///
/// Constructed once at startup and shared by reference; there is no
/// ambient global state.
pub struct ChallengeResolver {
    solver: Arc<dyn Solver>,
    ttl: Duration,
    states: DashMap<ChallengeKey, Arc<Mutex<KeyState>>>,
}

impl fmt::Debug for ChallengeResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChallengeResolver")
            .field("ttl", &self.ttl)
            .field("keys", &self.states.len())
            .finish_non_exhaustive()
    }
}

impl ChallengeResolver {
    /// Creates a resolver around an external solver.
    ///
    /// `ttl` bounds how long a solved credential is reused before it is
    /// re-resolved.
    pub fn new(solver: Arc<dyn Solver>, ttl: Duration) -> Self {
        Self {
            solver,
            ttl,
            states: DashMap::new(),
        }
    }

    fn state_for(&self, key: &ChallengeKey) -> Arc<Mutex<KeyState>> {
        Arc::clone(self.states.entry(key.clone()).or_default().value())
    }

    /// Returns the cached, unexpired credential for `key`, if any.
    pub async fn cached(&self, key: &ChallengeKey) -> Option<Credential> {
        self.cached_snapshot(key).await.map(|(credential, _)| credential)
    }

    /// Cached credential plus its solve time, used by the gate to detect
    /// whether a failing credential has already been superseded.
    pub(crate) async fn cached_snapshot(
        &self,
        key: &ChallengeKey,
    ) -> Option<(Credential, Instant)> {
        let state = self.state_for(key);
        let guard = state.lock().await;
        guard.fresh(self.ttl)
    }

    /// Returns `true` once `key` has been marked permanently failed.
    pub async fn is_permanently_failed(&self, key: &ChallengeKey) -> bool {
        let state = self.state_for(key);
        state.lock().await.permanently_failed
    }

    /// Resolves the challenge for `key`.
    ///
    /// Single-flight per key: concurrent callers block on the per-key lock
    /// and the late arrivals observe the freshly cached credential without
    /// invoking the solver again. A cached unexpired credential returns
    /// immediately; a permanently failed key errors immediately without
    /// invoking the solver.
    ///
    /// # Errors
    ///
    /// Returns [`ChallengeError`] when the key is permanently failed or
    /// the solver fails.
    pub async fn resolve(
        &self,
        key: &ChallengeKey,
        user_agent: &str,
        session: Option<&Credential>,
    ) -> Result<Credential, ChallengeError> {
        self.refresh(key, user_agent, session, None).await
    }

    /// Like [`ChallengeResolver::resolve`], but treats any credential
    /// solved at or before `observed` as stale: a caller that just watched
    /// that credential fail a challenge needs a newer one, not the same
    /// one back. Callers that lost the single-flight race still reuse the
    /// winner's (newer) credential.
    #[instrument(level = "debug", skip(self, session), fields(key = %key))]
    pub(crate) async fn refresh(
        &self,
        key: &ChallengeKey,
        user_agent: &str,
        session: Option<&Credential>,
        observed: Option<Instant>,
    ) -> Result<Credential, ChallengeError> {
        let state = self.state_for(key);
        let mut guard = state.lock().await;

        if guard.permanently_failed {
            return Err(ChallengeError::PermanentlyFailed { key: key.clone() });
        }

        if let Some((credential, solved_at)) = guard.fresh(self.ttl) {
            let superseded = observed.is_none_or(|seen| solved_at > seen);
            if superseded {
                debug!("reusing cached challenge credential");
                return Ok(credential);
            }
        }

        info!("invoking external challenge solver");
        match self.solver.solve(key, user_agent, session).await {
            Ok(credential) => {
                guard.credential = Some(credential.clone());
                guard.solved_at = Some(Instant::now());
                info!("challenge resolved");
                Ok(credential)
            }
            Err(SolveError::Unrecoverable(reason)) => {
                warn!(%reason, "challenge is unresolvable, marking key permanently failed");
                guard.permanently_failed = true;
                Err(ChallengeError::Unrecoverable {
                    key: key.clone(),
                    reason,
                })
            }
            Err(SolveError::Transient(reason)) => {
                warn!(%reason, "challenge solver failed, key stays retryable");
                Err(ChallengeError::Solver {
                    key: key.clone(),
                    reason,
                })
            }
        }
    }
}
