//! End-to-end pipeline tests: filters prune candidates, the dedup cache
//! prunes completed work, the orchestrator fans jobs out to the fetcher,
//! and completion marks make repeated runs idempotent.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mediagrab_core::batch::{CancelScope, CountingProgress, Job, mark_post_on_complete};
use mediagrab_core::cache::{CacheDb, DedupCache, POST_BUCKET, post_key};
use mediagrab_core::challenge::{
    ChallengeGate, ChallengeKey, ChallengeResolver, Credential, SolveError, Solver,
    forbidden_check,
};
use mediagrab_core::filters::Filters;
use mediagrab_core::platform::Platform;
use mediagrab_core::request::{RequestClient, SessionCookie};
use mediagrab_core::session::DownloadSession;

async fn mount_file(server: &MockServer, url_path: &str, body: &[u8], expected_gets: u64) {
    Mock::given(method("HEAD"))
        .and(path(url_path.to_string()))
        .respond_with(
            ResponseTemplate::new(200).insert_header("Content-Length", body.len().to_string()),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(url_path.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .expect(expected_gets)
        .mount(server)
        .await;
}

/// Builds the jobs a platform collaborator would produce for one post,
/// with the session's filters applied first.
fn jobs_for_post(
    session: &DownloadSession,
    cache: &DedupCache,
    server_uri: &str,
    post_locator: &str,
    file_names: &[&str],
    dest: &Path,
) -> Vec<Job> {
    let key = post_key(session.platform(), post_locator);
    file_names
        .iter()
        .filter(|name| session.filters().path_allowed(Path::new(name)))
        .map(|name| {
            Job::new(format!("{server_uri}/files/{name}"), dest)
                .with_cache_key(key.clone())
                .with_on_complete(mark_post_on_complete(cache.clone()))
        })
        .collect()
}

#[tokio::test]
async fn test_pipeline_filters_downloads_and_marks_cache() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    // Each file must be fetched exactly once across BOTH runs below.
    mount_file(&server, "/files/a.png", b"png-a", 1).await;
    mount_file(&server, "/files/b.png", b"png-b", 1).await;

    let cache = DedupCache::new(CacheDb::in_memory().await.unwrap());
    let session = DownloadSession::builder(Platform::Fantia)
        .concurrency(2)
        .filters(
            Filters::new(0, None, vec![".png".to_string()], None, None, None).unwrap(),
        )
        .build()
        .unwrap();
    let fetcher = Arc::new(session.fetcher(RequestClient::new(session.user_agent())));
    let orchestrator = session.orchestrator().unwrap();

    let post_locator = format!("{}/posts/1", server.uri());
    let candidates = ["a.png", "b.png", "notes.txt"];

    // First run: the .txt candidate is filtered out, both images download,
    // and the post is marked complete.
    let jobs = jobs_for_post(
        &session,
        &cache,
        &server.uri(),
        &post_locator,
        &candidates,
        dir.path(),
    );
    assert_eq!(jobs.len(), 2, "extension filter must drop notes.txt");

    let jobs = cache.prune_completed(jobs).await.unwrap();
    assert_eq!(jobs.len(), 2);

    let progress = Arc::new(CountingProgress::new());
    let outcome = orchestrator
        .run_all(
            jobs,
            Arc::clone(&fetcher) as _,
            &CancelScope::new(),
            Arc::clone(&progress) as _,
        )
        .await;

    assert!(outcome.is_clean(), "errors: {:?}", outcome.errors);
    assert_eq!(progress.max(), 2);
    assert_eq!(progress.ticks(), 2);
    assert_eq!(std::fs::read(dir.path().join("a.png")).unwrap(), b"png-a");
    let key = post_key(Platform::Fantia, &post_locator);
    assert!(cache.exists(POST_BUCKET, &key).await.unwrap());

    // Second run: the cache prunes everything before the orchestrator, so
    // the per-file GET expectations (exactly 1) hold at server shutdown.
    let jobs = jobs_for_post(
        &session,
        &cache,
        &server.uri(),
        &post_locator,
        &candidates,
        dir.path(),
    );
    let jobs = cache.prune_completed(jobs).await.unwrap();
    assert!(jobs.is_empty(), "second run must be fully pruned");

    let outcome = orchestrator
        .run_all(
            jobs,
            Arc::clone(&fetcher) as _,
            &CancelScope::new(),
            Arc::new(CountingProgress::new()),
        )
        .await;
    assert!(outcome.is_clean());
}

#[tokio::test]
async fn test_pipeline_prepopulated_cache_key_short_circuits_before_network() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    // Any request at all fails the test.
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let cache = DedupCache::new(CacheDb::in_memory().await.unwrap());
    cache
        .mark_post(Platform::Fantia, "https://fantia.jp/posts/123456")
        .await
        .unwrap();

    let job = Job::new(format!("{}/files/img.png", server.uri()), dir.path())
        .with_cache_key(post_key(Platform::Fantia, "https://fantia.jp/posts/123456"));

    let remaining = cache.prune_completed(vec![job]).await.unwrap();
    assert!(remaining.is_empty(), "cached post must never reach the orchestrator");
}

struct OneShotSolver {
    calls: AtomicUsize,
}

#[async_trait]
impl Solver for OneShotSolver {
    async fn solve(
        &self,
        _key: &ChallengeKey,
        _user_agent: &str,
        _session: Option<&Credential>,
    ) -> Result<Credential, SolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Credential::from_cookies(vec![SessionCookie::new(
            "cf_clearance",
            "solved",
            "127.0.0.1",
        )]))
    }
}

#[tokio::test]
async fn test_pipeline_challenge_resolved_once_then_reused() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let body = b"protected bytes";

    // With the clearance cookie everything works...
    Mock::given(method("HEAD"))
        .and(path("/files/locked.png"))
        .and(header("Cookie", "cf_clearance=solved"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("Content-Length", body.len().to_string()),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/locked.png"))
        .and(header("Cookie", "cf_clearance=solved"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .expect(1)
        .mount(&server)
        .await;
    // ...without it, the platform serves its interstitial.
    Mock::given(method("HEAD"))
        .and(path("/files/locked.png"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/locked.png"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let solver = Arc::new(OneShotSolver {
        calls: AtomicUsize::new(0),
    });
    let resolver = Arc::new(ChallengeResolver::new(
        Arc::clone(&solver) as _,
        Duration::from_secs(60),
    ));
    let session = DownloadSession::builder(Platform::Fantia).build().unwrap();
    let gate = ChallengeGate::new(
        Arc::clone(&resolver),
        session.challenge_key(),
        forbidden_check(),
        session.user_agent(),
        None,
    );
    let fetcher = session.fetcher_with_gate(RequestClient::new(session.user_agent()), gate);

    let job = Job::new(format!("{}/files/locked.png", server.uri()), dir.path());
    let outcome = fetcher.fetch(&job, &CancellationToken::new()).await.unwrap();

    assert!(!outcome.skipped);
    assert_eq!(std::fs::read(&outcome.path).unwrap(), body);
    assert_eq!(
        solver.calls.load(Ordering::SeqCst),
        1,
        "the HEAD probe resolves the challenge; the GET reuses the credential"
    );
}

#[tokio::test]
async fn test_pipeline_cancellation_suppresses_cache_writes() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200).insert_header("Content-Length", "1000000"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![1u8; 1_000_000])
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let cache = DedupCache::new(CacheDb::in_memory().await.unwrap());
    let session = DownloadSession::builder(Platform::Kemono)
        .concurrency(1)
        .build()
        .unwrap();
    let fetcher = Arc::new(session.fetcher(RequestClient::new(session.user_agent())));
    let orchestrator = session.orchestrator().unwrap();

    let key = post_key(Platform::Kemono, "https://kemono.party/post/1");
    let jobs: Vec<Job> = (0..4)
        .map(|i| {
            Job::new(format!("{}/files/{i}.bin", server.uri()), dir.path())
                .with_cache_key(key.clone())
                .with_on_complete(mark_post_on_complete(cache.clone()))
        })
        .collect();

    let scope = CancelScope::new();
    let token = scope.token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        token.cancel();
    });

    let progress = Arc::new(CountingProgress::new());
    let outcome = orchestrator
        .run_all(
            jobs,
            Arc::clone(&fetcher) as _,
            &scope,
            Arc::clone(&progress) as _,
        )
        .await;

    assert!(outcome.cancelled);
    assert!(
        outcome.errors.is_empty(),
        "cancellation must not appear in the error list: {:?}",
        outcome.errors
    );
    assert!(
        !cache.exists(POST_BUCKET, &key).await.unwrap(),
        "an incomplete post must never be marked done"
    );
    assert!(progress.ticks() < 4);
}
