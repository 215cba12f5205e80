//! Shutdown signalling and draining of the listener and viewer sessions.
//!
//! One `CancellationToken` reaches the `axum::serve` task and every viewer
//! pump. Viewer sessions run inside tasks axum spawns for each upgrade, so
//! they are wrapped with a [`TaskTracker`] to be awaited at shutdown.

use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TrackedFuture;
use tracing::{info, warn};

/// Drain budget when the caller gives none.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns the shutdown token and the set of live viewer sessions.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    sessions: TaskTracker,
}

impl ShutdownCoordinator {
    /// Create a coordinator with no sessions.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            sessions: TaskTracker::new(),
        }
    }

    /// A clone of the shutdown token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal shutdown without waiting.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been signalled.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wrap a viewer session so [`graceful_shutdown`](Self::graceful_shutdown) waits for it.
    pub fn track_session<F: Future>(&self, session: F) -> TrackedFuture<F> {
        self.sessions.track_future(session)
    }

    /// Viewer sessions still running.
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Signal shutdown, then wait up to `timeout` for `handles` and every
    /// tracked session to finish. Sessions use the time to send their close
    /// frames.
    pub async fn graceful_shutdown(&self, handles: Vec<JoinHandle<()>>, timeout: Option<Duration>) {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);

        self.shutdown();
        let _ = self.sessions.close();
        info!(
            tasks = handles.len(),
            sessions = self.sessions.len(),
            ?timeout,
            "draining"
        );

        let drain = async {
            let _ = join_all(handles).await;
            self.sessions.wait().await;
        };
        match tokio::time::timeout(timeout, drain).await {
            Ok(()) => info!("drained"),
            Err(_) => warn!(
                sessions = self.sessions.len(),
                "shutdown timed out after {timeout:?}"
            ),
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
