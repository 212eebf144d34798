//! The request client: header/cookie/query assembly and the retry loop.

use reqwest::header::COOKIE;
use reqwest::{Client, Response, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use url::Url;

use super::cookie::cookie_header_for;
use super::error::RequestError;
use super::protocol::ProtocolChoice;
use super::retry::H3_TRANSPORT_ATTEMPT_CAP;
use super::spec::RequestSpec;

/// Connect timeout applied to every request (seconds).
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// HTTP client pair with per-request protocol selection and bounded retry.
///
/// One instance is created at startup and shared (it is cheap to clone;
/// the underlying reqwest clients pool connections). The H3 client speaks
/// HTTP/3 when the crate is built with the `http3` feature and otherwise
/// degrades to the default transport, keeping the selection logic hot in
/// either build.
#[derive(Debug, Clone)]
pub struct RequestClient {
    h2: Client,
    h3: Client,
}

impl RequestClient {
    /// Creates a request client with the given default User-Agent.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new(user_agent: &str) -> Self {
        Self {
            h2: build_client(user_agent, false)
                .expect("failed to build HTTP/2 client with static configuration"),
            h3: build_client(user_agent, true)
                .expect("failed to build HTTP/3 client with static configuration"),
        }
    }

    /// Sends a request, retrying per the spec's [`super::RetryPolicy`].
    ///
    /// - Transport errors sleep a uniformly-random delay in the policy's
    ///   window and retry, up to the attempt cap. HTTP/3 transport errors
    ///   fall back to HTTP/2 after [`H3_TRANSPORT_ATTEMPT_CAP`] failures.
    /// - With `check_status` set, any non-200 response is treated as a
    ///   soft failure and retried; the aggregated error carries only the
    ///   final status code, never a response body.
    /// - Cancellation short-circuits out of both the in-flight request and
    ///   the backoff sleep as [`RequestError::Cancelled`].
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] when the URL is invalid, the retry budget
    /// is exhausted, or the token is cancelled.
    #[instrument(level = "debug", skip(self, spec, cancel), fields(url = %spec.url, method = %spec.method))]
    pub async fn send(
        &self,
        spec: &RequestSpec,
        cancel: &CancellationToken,
    ) -> Result<Response, RequestError> {
        Url::parse(&spec.url).map_err(|_| RequestError::invalid_url(&spec.url))?;

        let mut protocol = spec.resolved_protocol();
        let max_attempts = spec.retry.max_attempts();
        let mut h3_failures = 0u32;
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let request = self.build_request(spec, protocol);
            let outcome = tokio::select! {
                () = cancel.cancelled() => return Err(RequestError::Cancelled),
                result = request.send() => result,
            };

            match outcome {
                Ok(response) => {
                    if !spec.check_status || response.status() == StatusCode::OK {
                        return Ok(response);
                    }
                    let status = response.status().as_u16();
                    if attempt >= max_attempts {
                        return Err(RequestError::status(&spec.url, max_attempts, status));
                    }
                    debug!(status, attempt, "non-200 response, will retry");
                }
                Err(error) => {
                    if attempt >= max_attempts {
                        return Err(RequestError::transport(&spec.url, max_attempts, error));
                    }
                    if protocol == ProtocolChoice::H3 {
                        h3_failures += 1;
                        if h3_failures >= H3_TRANSPORT_ATTEMPT_CAP {
                            warn!(h3_failures, "HTTP/3 transport failing, falling back to HTTP/2");
                            protocol = ProtocolChoice::H2;
                        }
                    }
                    warn!(error = %error, attempt, "transport error, will retry");
                }
            }

            let delay = spec.retry.random_delay();
            debug!(delay_ms = delay.as_millis(), next_attempt = attempt + 1, "backing off");
            tokio::select! {
                () = cancel.cancelled() => return Err(RequestError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Assembles one attempt's request from the spec.
    fn build_request(&self, spec: &RequestSpec, protocol: ProtocolChoice) -> reqwest::RequestBuilder {
        let client = match protocol {
            ProtocolChoice::H2 => &self.h2,
            ProtocolChoice::H3 => &self.h3,
        };

        let mut builder = client
            .request(spec.method.clone(), &spec.url)
            .timeout(spec.timeout);

        if !spec.params.is_empty() {
            builder = builder.query(&spec.params);
        }
        for (name, value) in &spec.headers {
            builder = builder.header(name, value);
        }
        if let Some(cookie_header) = cookie_header_for(&spec.url, &spec.cookies) {
            builder = builder.header(COOKIE, cookie_header);
        }
        builder
    }
}

fn build_client(user_agent: &str, h3: bool) -> Result<Client, reqwest::Error> {
    let builder = Client::builder()
        .connect_timeout(std::time::Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .gzip(true)
        .user_agent(user_agent);

    #[cfg(feature = "http3")]
    let builder = if h3 {
        builder.http3_prior_knowledge()
    } else {
        builder
    };
    #[cfg(not(feature = "http3"))]
    let _ = h3;

    builder.build()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::request::{RetryPolicy, SessionCookie};

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(5), Duration::from_millis(15), max_attempts)
    }

    #[tokio::test]
    async fn test_send_returns_response_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/posts/1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let client = RequestClient::new("mediagrab-test");
        let spec = RequestSpec::get(format!("{}/posts/1", server.uri())).check_status(true);
        let response = client.send(&spec, &CancellationToken::new()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_send_retry_bound_transient_then_success() {
        // Fails exactly twice with 503, then succeeds: 3 calls total.
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = RequestClient::new("mediagrab-test");
        let spec = RequestSpec::get(format!("{}/flaky", server.uri()))
            .check_status(true)
            .with_retry(fast_retry(4));
        let response = client.send(&spec, &CancellationToken::new()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_send_exhausts_attempts_and_reports_final_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(502))
            .expect(3)
            .mount(&server)
            .await;

        let client = RequestClient::new("mediagrab-test");
        let spec = RequestSpec::get(format!("{}/down", server.uri()))
            .check_status(true)
            .with_retry(fast_retry(3));
        let err = client
            .send(&spec, &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            RequestError::Status { status, attempts, .. } => {
                assert_eq!(status, 502);
                assert_eq!(attempts, 3);
            }
            other => panic!("expected Status error, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_without_status_check_returns_non_200_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let client = RequestClient::new("mediagrab-test");
        let spec = RequestSpec::get(format!("{}/missing", server.uri()))
            .with_retry(fast_retry(4));
        let response = client.send(&spec, &CancellationToken::new()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_send_attaches_matching_cookies_only() {
        let server = MockServer::start().await;
        // 127.0.0.1 is a substring of the mock server URI; pixiv.net is not.
        Mock::given(method("GET"))
            .and(path("/cookies"))
            .and(header("Cookie", "_session_id=abc"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = RequestClient::new("mediagrab-test");
        let spec = RequestSpec::get(format!("{}/cookies", server.uri()))
            .check_status(true)
            .with_cookies(vec![
                SessionCookie::new("_session_id", "abc", "127.0.0.1"),
                SessionCookie::new("PHPSESSID", "zzz", "pixiv.net"),
            ]);
        client.send(&spec, &CancellationToken::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_appends_query_params() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/posts"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = RequestClient::new("mediagrab-test");
        let spec = RequestSpec::get(format!("{}/api/posts", server.uri()))
            .check_status(true)
            .with_param("page", "2");
        client.send(&spec, &CancellationToken::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_cancellation_is_distinct_and_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
            .mount(&server)
            .await;

        let client = RequestClient::new("mediagrab-test");
        let spec = RequestSpec::get(format!("{}/slow", server.uri())).check_status(true);
        let cancel = CancellationToken::new();

        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel_clone.cancel();
        });

        let started = tokio::time::Instant::now();
        let err = client.send(&spec, &cancel).await.unwrap_err();
        assert!(err.is_cancelled(), "expected cancellation, got: {err:?}");
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "cancellation must short-circuit promptly"
        );
    }

    #[tokio::test]
    async fn test_send_rejects_invalid_url() {
        let client = RequestClient::new("mediagrab-test");
        let spec = RequestSpec::get("not-a-url");
        let err = client
            .send(&spec, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::InvalidUrl { .. }));
    }
}
