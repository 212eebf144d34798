//! HTTP request engine with protocol selection and bounded retry.
//!
//! This module issues single HTTP requests on behalf of the rest of the
//! pipeline. It owns header/cookie/query assembly, HTTP/2 vs HTTP/3
//! selection, and a bounded randomized-backoff retry loop.
//!
//! # Example
//!
//! ```no_run
//! use mediagrab_core::request::{RequestClient, RequestSpec};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = RequestClient::new("mediagrab/0.1");
//! let spec = RequestSpec::get("https://fantia.jp/api/v1/posts/123456").check_status(true);
//! let response = client.send(&spec, &CancellationToken::new()).await?;
//! println!("status: {}", response.status());
//! # Ok(())
//! # }
//! ```

mod client;
mod cookie;
mod error;
mod protocol;
mod retry;
mod spec;

pub use client::RequestClient;
pub use cookie::SessionCookie;
pub use error::RequestError;
pub use protocol::ProtocolChoice;
pub use retry::{DEFAULT_MAX_ATTEMPTS, H3_TRANSPORT_ATTEMPT_CAP, RetryPolicy};
pub use spec::RequestSpec;
