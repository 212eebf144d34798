//! Request descriptions consumed by the engine.

use std::time::Duration;

use reqwest::Method;

use super::cookie::SessionCookie;
use super::protocol::ProtocolChoice;
use super::retry::RetryPolicy;

/// Default per-request timeout when the caller does not set one.
///
/// File transfers override this with a much longer window; see
/// [`crate::fetch::FetchOptions`].
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Everything needed to issue one request.
///
/// Plain data: platform collaborators assemble these, gates inject
/// credentials into them, and [`super::RequestClient::send`] consumes them.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    /// HTTP method.
    pub method: Method,
    /// Target URL.
    pub url: String,
    /// Extra headers; a `User-Agent` entry here overrides the client default.
    pub headers: Vec<(String, String)>,
    /// Cookies, filtered per request by domain substring match.
    pub cookies: Vec<SessionCookie>,
    /// Query parameters appended to the URL.
    pub params: Vec<(String, String)>,
    /// Whole-request timeout.
    pub timeout: Duration,
    /// When `true`, only HTTP 200 counts as success; other statuses are
    /// retried and then surfaced. When `false`, any response is returned
    /// to the caller as-is.
    pub check_status: bool,
    /// Retry behavior for this request.
    pub retry: RetryPolicy,
    /// Explicit protocol override; `None` resolves from the URL.
    pub protocol: Option<ProtocolChoice>,
}

impl RequestSpec {
    /// Creates a request spec with the given method.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            cookies: Vec::new(),
            params: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            check_status: false,
            retry: RetryPolicy::default(),
            protocol: None,
        }
    }

    /// Creates a GET request spec.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// Creates a HEAD request spec.
    pub fn head(url: impl Into<String>) -> Self {
        Self::new(Method::HEAD, url)
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replaces the cookie list.
    #[must_use]
    pub fn with_cookies(mut self, cookies: Vec<SessionCookie>) -> Self {
        self.cookies = cookies;
        self
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Sets the whole-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enables or disables strict status checking.
    #[must_use]
    pub fn check_status(mut self, check: bool) -> Self {
        self.check_status = check;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Forces a specific protocol instead of resolving it from the URL.
    #[must_use]
    pub fn with_protocol(mut self, protocol: ProtocolChoice) -> Self {
        self.protocol = Some(protocol);
        self
    }

    /// Appends credential cookies (challenge resolution injects through this).
    pub fn add_cookies(&mut self, cookies: impl IntoIterator<Item = SessionCookie>) {
        self.cookies.extend(cookies);
    }

    /// The protocol this request will use.
    #[must_use]
    pub fn resolved_protocol(&self) -> ProtocolChoice {
        self.protocol
            .unwrap_or_else(|| ProtocolChoice::resolve(&self.url))
    }
}
