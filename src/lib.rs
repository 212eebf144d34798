//! Mediagrab Core Library
//!
//! This library provides the core download pipeline for retrieving large
//! batches of media files from content platforms under adversarial
//! conditions: anti-bot challenges, rate limits, flaky connections, and
//! very large file counts.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`request`] - HTTP request engine with protocol selection and bounded retry
//! - [`challenge`] - Anti-bot challenge detection and single-flight resolution
//! - [`fetch`] - Resumable, checksummed single-file downloads
//! - [`batch`] - Bounded-concurrency fan-out over download jobs
//! - [`cache`] - Persistent dedup cache of completed resources
//! - [`filters`] - Pure predicates gating which resources become jobs
//! - [`platform`] - Closed enum of supported platforms
//! - [`session`] - The shared per-batch download session
//!
//! Platform collaborators produce job lists; [`filters::Filters`] and the
//! [`cache::DedupCache`] prune them; the [`batch::Orchestrator`] fans the
//! rest out to the [`fetch::FileFetcher`], whose requests flow through the
//! [`challenge::ChallengeGate`] and [`request::RequestClient`].

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod batch;
pub mod cache;
pub mod challenge;
pub mod fetch;
pub mod filters;
pub mod platform;
pub mod request;
pub mod session;

// Re-export commonly used types
pub use batch::{
    BatchError, BatchOutcome, CancelScope, Job, JobFetcher, NoopProgress, Orchestrator,
    ProgressObserver,
};
pub use cache::{CacheDb, CacheEntry, CacheError, DedupCache};
pub use challenge::{
    ChallengeError, ChallengeGate, ChallengeKey, ChallengeResolver, Credential, SolveError, Solver,
};
pub use fetch::{DownloadProbe, FetchError, FetchOptions, FetchOutcome, FileFetcher};
pub use filters::{FilterError, Filters};
pub use platform::{Platform, PlatformError};
pub use request::{
    DEFAULT_MAX_ATTEMPTS, ProtocolChoice, RequestClient, RequestError, RequestSpec, RetryPolicy,
    SessionCookie,
};
pub use session::{DownloadSession, SessionError};
