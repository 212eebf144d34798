//! The fan-out engine: semaphore-bounded job execution with error
//! aggregation and grouped completion callbacks.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::job::{Job, OnComplete};
use super::progress::ProgressObserver;
use super::scope::CancelScope;
use crate::fetch::{FetchError, FetchOutcome, FileFetcher};

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
const MAX_CONCURRENCY: usize = 100;

/// Default concurrent downloads per batch.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Orchestrator construction errors.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },
}

/// One job's failure, tagged with its URL.
#[derive(Debug, Error)]
#[error("{url}: {source}")]
pub struct BatchError {
    /// The failed job's URL.
    pub url: String,
    /// What went wrong.
    #[source]
    pub source: FetchError,
}

/// Result of one batch run.
///
/// Cancellation is reported separately from errors: a cancelled batch may
/// carry an empty or partial error list, and jobs that never started
/// contribute nothing to it.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Per-job failures, in completion order.
    pub errors: Vec<BatchError>,
    /// Whether the batch was cancelled before finishing.
    pub cancelled: bool,
}

impl BatchOutcome {
    /// Whether any job failed.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Whether the batch finished fully and cleanly.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        !self.has_errors() && !self.cancelled
    }
}

/// The seam between the orchestrator and the thing that fetches one job.
///
/// Production code uses [`FileFetcher`]; tests substitute doubles to
/// exercise concurrency and cancellation without a network.
#[async_trait]
pub trait JobFetcher: Send + Sync {
    /// Fetches one job.
    async fn fetch(
        &self,
        job: &Job,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, FetchError>;
}

#[async_trait]
impl JobFetcher for FileFetcher {
    async fn fetch(
        &self,
        job: &Job,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, FetchError> {
        FileFetcher::fetch(self, job, cancel).await
    }
}

/// Tracks whether every job under one cache key succeeded.
struct CacheMark {
    all_ok: bool,
    on_complete: Option<OnComplete>,
}

/// Generic bounded-concurrency fan-out over jobs.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    concurrency: usize,
}

impl Orchestrator {
    /// Creates an orchestrator.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::InvalidConcurrency`] outside 1..=100.
    pub fn new(concurrency: usize) -> Result<Self, OrchestratorError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(OrchestratorError::InvalidConcurrency { value: concurrency });
        }
        Ok(Self { concurrency })
    }

    /// The configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Runs all jobs with at most `min(concurrency, jobs.len())` in flight.
    ///
    /// Every job runs as its own task gated by a counting semaphore.
    /// Per-job errors are aggregated; cancellation (from the scope, the
    /// process signals wired into it, or a fetch observing the token) sets
    /// `cancelled` instead of adding errors, and jobs that never started
    /// are not fetched. After all tasks settle, each cache key whose jobs
    /// all succeeded has its `on_complete` callback invoked — never
    /// before the work is durably complete.
    #[instrument(skip_all, fields(jobs = jobs.len(), concurrency = self.concurrency))]
    pub async fn run_all(
        &self,
        jobs: Vec<Job>,
        fetcher: Arc<dyn JobFetcher>,
        scope: &CancelScope,
        progress: Arc<dyn ProgressObserver>,
    ) -> BatchOutcome {
        if jobs.is_empty() {
            return BatchOutcome::default();
        }

        let effective = self.concurrency.min(jobs.len());
        let semaphore = Arc::new(Semaphore::new(effective));
        let errors = Arc::new(std::sync::Mutex::new(Vec::new()));
        let cancelled = Arc::new(AtomicBool::new(false));
        let marks = Arc::new(std::sync::Mutex::new(HashMap::<String, CacheMark>::new()));
        let token = scope.token();

        info!(total = jobs.len(), effective, "starting batch");
        progress.update_max(jobs.len());

        let mut handles = Vec::with_capacity(jobs.len());
        for job in jobs {
            let semaphore = Arc::clone(&semaphore);
            let errors = Arc::clone(&errors);
            let cancelled = Arc::clone(&cancelled);
            let marks = Arc::clone(&marks);
            let fetcher = Arc::clone(&fetcher);
            let progress = Arc::clone(&progress);
            let token = token.clone();

            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };

                // A queued job that reaches the front after cancellation
                // must not start new work.
                if token.is_cancelled() {
                    cancelled.store(true, Ordering::SeqCst);
                    record_mark(&marks, &job, false);
                    return;
                }

                match fetcher.fetch(&job, &token).await {
                    Ok(outcome) => {
                        debug!(url = %job.url, skipped = outcome.skipped, "job finished");
                        record_mark(&marks, &job, true);
                        progress.increment();
                    }
                    Err(error) if error.is_cancelled() => {
                        cancelled.store(true, Ordering::SeqCst);
                        record_mark(&marks, &job, false);
                    }
                    Err(error) => {
                        warn!(url = %job.url, %error, "job failed");
                        record_mark(&marks, &job, false);
                        lock_ignoring_poison(&errors).push(BatchError {
                            url: job.url.clone(),
                            source: error,
                        });
                        progress.increment();
                    }
                }
            }));
        }

        for handle in handles {
            if let Err(error) = handle.await {
                warn!(%error, "job task panicked");
            }
        }

        // A cache key is durably complete only when every job that carried
        // it succeeded; one failed or cancelled sibling poisons the key.
        let marks = std::mem::take(&mut *lock_ignoring_poison(&marks));
        for (key, mark) in marks {
            if mark.all_ok {
                if let Some(on_complete) = mark.on_complete {
                    debug!(%key, "recording completed cache key");
                    on_complete(key).await;
                }
            }
        }

        let errors = std::mem::take(&mut *lock_ignoring_poison(&errors));
        let cancelled = cancelled.load(Ordering::SeqCst);
        info!(
            failed = errors.len(),
            cancelled, "batch finished"
        );
        BatchOutcome { errors, cancelled }
    }
}

fn lock_ignoring_poison<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn record_mark(
    marks: &std::sync::Mutex<HashMap<String, CacheMark>>,
    job: &Job,
    ok: bool,
) {
    let Some(key) = job.cache_key.clone() else {
        return;
    };
    let mut guard = lock_ignoring_poison(marks);
    guard
        .entry(key)
        .and_modify(|mark| mark.all_ok &= ok)
        .or_insert(CacheMark {
            all_ok: ok,
            on_complete: job.on_complete.clone(),
        });
}
