//! Injected progress reporting.
//!
//! Purely cosmetic: the orchestrator reports through this seam and never
//! depends on what (if anything) renders it. CLI frontends wrap their
//! progress bars in this trait; tests use [`CountingProgress`] or
//! [`NoopProgress`].

use std::sync::atomic::{AtomicUsize, Ordering};

/// Observer of batch progress.
pub trait ProgressObserver: Send + Sync {
    /// Announces the total number of jobs in the batch.
    fn update_max(&self, total: usize);

    /// Records one finished (succeeded or failed, but not cancelled) job.
    fn increment(&self);
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressObserver for NoopProgress {
    fn update_max(&self, _total: usize) {}
    fn increment(&self) {}
}

/// Observer that counts calls; handy in tests and dry runs.
#[derive(Debug, Default)]
pub struct CountingProgress {
    max: AtomicUsize,
    ticks: AtomicUsize,
}

impl CountingProgress {
    /// Creates a zeroed counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The last announced batch size.
    #[must_use]
    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }

    /// How many jobs finished.
    #[must_use]
    pub fn ticks(&self) -> usize {
        self.ticks.load(Ordering::SeqCst)
    }
}

impl ProgressObserver for CountingProgress {
    fn update_max(&self, total: usize) {
        self.max.store(total, Ordering::SeqCst);
    }

    fn increment(&self) {
        self.ticks.fetch_add(1, Ordering::SeqCst);
    }
}
