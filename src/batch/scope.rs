//! One cancellation scope per batch.
//!
//! Replaces ad-hoc signal wiring at every call site: a batch derives a
//! single [`CancelScope`] from its caller, optionally attaches the
//! process interrupt signals, and threads the scope's token through every
//! request, stream, and sleep.

use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::info;

/// Cancellation scope for one top-level batch operation.
///
/// Triggered by (a) caller-supplied cancellation, (b) SIGINT/SIGTERM when
/// signal handling is attached, or (c) the caller escalating a fatal
/// error via [`CancelScope::cancel`].
#[derive(Debug)]
pub struct CancelScope {
    token: CancellationToken,
    /// Shuts the signal listener down when the scope is dropped.
    _signal_guard: Option<DropGuard>,
}

impl Default for CancelScope {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelScope {
    /// Creates a standalone scope.
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            _signal_guard: None,
        }
    }

    /// Creates a scope that cancels when its parent token does.
    #[must_use]
    pub fn child_of(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
            _signal_guard: None,
        }
    }

    /// Attaches SIGINT/SIGTERM handling: an interrupt cancels this scope,
    /// stopping in-flight and queued jobs. The listener task exits when
    /// the scope is dropped or cancelled.
    ///
    /// Must be called within a tokio runtime.
    #[must_use]
    pub fn with_signal_handling(mut self) -> Self {
        let token = self.token.clone();
        let listener_token = CancellationToken::new();
        let listener_child = listener_token.child_token();

        tokio::spawn(async move {
            tokio::select! {
                () = listener_child.cancelled() => {}
                () = token.cancelled() => {}
                () = wait_for_interrupt() => {
                    info!("interrupt received, cancelling batch");
                    token.cancel();
                }
            }
        });

        self._signal_guard = Some(listener_token.drop_guard());
        self
    }

    /// A token tied to this scope, for handing to tasks.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancels the scope.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the scope has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[cfg(unix)]
async fn wait_for_interrupt() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_interrupt() {
    let _ = tokio::signal::ctrl_c().await;
}
