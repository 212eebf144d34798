//! The request-path adapter: detect a challenge, resolve it, retry.

use std::fmt;
use std::sync::Arc;

use reqwest::{Response, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::error::ChallengeError;
use super::resolver::{ChallengeKey, ChallengeResolver, Credential};
use crate::request::{RequestClient, RequestSpec, SessionCookie};

/// The spec as it goes on the wire during the challenge cycle: credential
/// cookies attached, status checking off.
fn with_credential_unchecked(spec: &RequestSpec, cookies: &[SessionCookie]) -> RequestSpec {
    let mut wire = spec.clone();
    wire.check_status = false;
    wire.add_cookies(cookies.iter().cloned());
    wire
}

/// Platform-supplied challenge predicate: does this response demand
/// resolution before the request can succeed? Implemented by the platform
/// collaborator (status code, redirect target, or body-shape checks), not
/// by the core.
pub type ChallengeCheck = Arc<dyn Fn(&Response) -> bool + Send + Sync>;

/// The common predicate: a 403 response is a challenge interstitial.
#[must_use]
pub fn forbidden_check() -> ChallengeCheck {
    Arc::new(|response: &Response| response.status() == StatusCode::FORBIDDEN)
}

/// Binds a [`ChallengeResolver`] to one platform flow: its key, its
/// detection predicate, and the session context the solver needs.
///
/// Requests sent through the gate transparently pick up cached
/// credentials, and a detected challenge triggers resolution followed by
/// one retry of the original request. Challenge detection is not an error;
/// the caller only sees a failure when resolution itself fails.
#[derive(Clone)]
pub struct ChallengeGate {
    resolver: Arc<ChallengeResolver>,
    key: ChallengeKey,
    check: ChallengeCheck,
    user_agent: String,
    session: Option<Credential>,
}

impl fmt::Debug for ChallengeGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChallengeGate")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl ChallengeGate {
    /// Creates a gate for one challenge scope.
    pub fn new(
        resolver: Arc<ChallengeResolver>,
        key: ChallengeKey,
        check: ChallengeCheck,
        user_agent: impl Into<String>,
        session: Option<Credential>,
    ) -> Self {
        Self {
            resolver,
            key,
            check,
            user_agent: user_agent.into(),
            session,
        }
    }

    /// The challenge key this gate serves.
    #[must_use]
    pub fn key(&self) -> &ChallengeKey {
        &self.key
    }

    /// Sends a request through the challenge-aware path.
    ///
    /// The wire request always runs with status checking off so the
    /// challenge predicate sees the raw response (a 403 interstitial would
    /// otherwise be swallowed by the engine's status retry). Once the
    /// challenge cycle is done, a spec that asked for status checking is
    /// handed back to the engine so its normal non-200 retry applies.
    ///
    /// # Errors
    ///
    /// Returns [`ChallengeError`] when the request fails, resolution
    /// fails, or the challenge persists after a successful resolution.
    pub async fn send(
        &self,
        client: &RequestClient,
        spec: &RequestSpec,
        cancel: &CancellationToken,
    ) -> Result<Response, ChallengeError> {
        let cached = self.resolver.cached_snapshot(&self.key).await;
        let mut cookies: Vec<SessionCookie> = cached
            .as_ref()
            .map(|(credential, _)| credential.cookies.clone())
            .unwrap_or_default();
        if !cookies.is_empty() {
            debug!(key = %self.key, "injecting cached challenge credential");
        }

        let response = client
            .send(&with_credential_unchecked(spec, &cookies), cancel)
            .await?;

        let response = if (self.check)(&response) {
            info!(key = %self.key, url = %spec.url, "challenge detected, resolving");
            let observed = cached.map(|(_, solved_at)| solved_at);
            let credential = self
                .resolver
                .refresh(&self.key, &self.user_agent, self.session.as_ref(), observed)
                .await?;
            cookies = credential.cookies;

            let retried = client
                .send(&with_credential_unchecked(spec, &cookies), cancel)
                .await?;
            if (self.check)(&retried) {
                return Err(ChallengeError::Unresolved {
                    key: self.key.clone(),
                });
            }
            retried
        } else {
            response
        };

        if !spec.check_status || response.status() == StatusCode::OK {
            return Ok(response);
        }

        // Non-200 unrelated to the challenge: run the engine's own
        // status-retry path with the credential attached.
        let mut full = spec.clone();
        full.add_cookies(cookies);
        Ok(client.send(&full, cancel).await?)
    }
}
