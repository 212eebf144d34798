//! The shared per-batch download session.
//!
//! One `DownloadSession` replaces the pile of near-duplicate per-platform
//! option structs: the orchestrator, resolver, and downloader all operate
//! against this single contract. Platform-specific needs that vary per
//! file (an expected checksum, say) ride on the [`crate::batch::Job`]
//! instead of forking the session type.

use thiserror::Error;

use crate::batch::Orchestrator;
use crate::challenge::{ChallengeGate, ChallengeKey};
use crate::fetch::{FetchOptions, FileFetcher};
use crate::filters::Filters;
use crate::platform::Platform;
use crate::request::{ProtocolChoice, RequestClient, RetryPolicy, SessionCookie};

/// Default User-Agent sent when the caller does not supply one.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Bounds shared with the orchestrator's concurrency validation.
const MIN_CONCURRENCY: usize = 1;
const MAX_CONCURRENCY: usize = 100;

/// Session construction errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid session concurrency {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },
}

/// Everything a batch needs to know about how to talk to one platform.
#[derive(Debug, Clone)]
pub struct DownloadSession {
    platform: Platform,
    user_agent: String,
    cookies: Vec<SessionCookie>,
    headers: Vec<(String, String)>,
    concurrency: usize,
    overwrite_existing: bool,
    supports_range: bool,
    retry: RetryPolicy,
    filters: Filters,
}

impl DownloadSession {
    /// Starts building a session for `platform` with that platform's
    /// defaults.
    #[must_use]
    pub fn builder(platform: Platform) -> SessionBuilder {
        SessionBuilder {
            platform,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            cookies: Vec::new(),
            headers: Vec::new(),
            concurrency: default_concurrency(platform),
            overwrite_existing: false,
            supports_range: true,
            retry: RetryPolicy::default(),
            filters: Filters::default(),
        }
    }

    /// The session's platform.
    #[must_use]
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// The User-Agent for this session's requests.
    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// The session cookies.
    #[must_use]
    pub fn cookies(&self) -> &[SessionCookie] {
        &self.cookies
    }

    /// Extra headers for this session's requests.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// How many downloads run concurrently.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// The session's filter set.
    #[must_use]
    pub fn filters(&self) -> &Filters {
        &self.filters
    }

    /// The session's retry policy.
    #[must_use]
    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// The challenge key for this platform.
    #[must_use]
    pub fn challenge_key(&self) -> ChallengeKey {
        ChallengeKey::for_platform(self.platform)
    }

    /// The protocol for this platform's page or API endpoints.
    #[must_use]
    pub fn protocol(&self, is_api: bool) -> ProtocolChoice {
        ProtocolChoice::for_platform(self.platform, is_api)
    }

    /// The fetch options this session implies.
    #[must_use]
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            overwrite_existing: self.overwrite_existing,
            supports_range: self.supports_range,
            retry: self.retry.clone(),
            ..FetchOptions::default()
        }
    }

    /// Builds a file fetcher carrying this session's cookies and headers.
    #[must_use]
    pub fn fetcher(&self, client: RequestClient) -> FileFetcher {
        FileFetcher::new(client, self.fetch_options())
            .with_cookies(self.cookies.clone())
            .with_headers(self.headers.clone())
    }

    /// Like [`DownloadSession::fetcher`], with requests routed through a
    /// challenge gate.
    #[must_use]
    pub fn fetcher_with_gate(&self, client: RequestClient, gate: ChallengeGate) -> FileFetcher {
        self.fetcher(client).with_gate(gate)
    }

    /// Builds the orchestrator for this session's concurrency.
    ///
    /// # Errors
    ///
    /// Never fails in practice: the builder validated the same bounds.
    pub fn orchestrator(&self) -> Result<Orchestrator, crate::batch::OrchestratorError> {
        Orchestrator::new(self.concurrency)
    }
}

/// Per-platform default for concurrent downloads. Pixiv rate-limits more
/// aggressively than the others.
fn default_concurrency(platform: Platform) -> usize {
    match platform {
        Platform::Pixiv => 3,
        _ => 4,
    }
}

/// Builder with validation at `build()`.
#[derive(Debug, Clone)]
pub struct SessionBuilder {
    platform: Platform,
    user_agent: String,
    cookies: Vec<SessionCookie>,
    headers: Vec<(String, String)>,
    concurrency: usize,
    overwrite_existing: bool,
    supports_range: bool,
    retry: RetryPolicy,
    filters: Filters,
}

impl SessionBuilder {
    /// Overrides the User-Agent.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the session cookies.
    #[must_use]
    pub fn cookies(mut self, cookies: Vec<SessionCookie>) -> Self {
        self.cookies = cookies;
        self
    }

    /// Adds a header sent with every request.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets how many downloads run concurrently.
    #[must_use]
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Re-download files that already exist on disk.
    #[must_use]
    pub fn overwrite_existing(mut self, overwrite: bool) -> Self {
        self.overwrite_existing = overwrite;
        self
    }

    /// Whether this platform's file hosts honor range requests.
    #[must_use]
    pub fn supports_range(mut self, supports_range: bool) -> Self {
        self.supports_range = supports_range;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the filter set.
    #[must_use]
    pub fn filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    /// Validates and builds the session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidConcurrency`] outside 1..=100.
    pub fn build(self) -> Result<DownloadSession, SessionError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&self.concurrency) {
            return Err(SessionError::InvalidConcurrency {
                value: self.concurrency,
            });
        }
        Ok(DownloadSession {
            platform: self.platform,
            user_agent: self.user_agent,
            cookies: self.cookies,
            headers: self.headers,
            concurrency: self.concurrency,
            overwrite_existing: self.overwrite_existing,
            supports_range: self.supports_range,
            retry: self.retry,
            filters: self.filters,
        })
    }
}
