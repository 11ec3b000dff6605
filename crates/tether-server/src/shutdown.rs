//! Graceful shutdown coordination via `CancellationToken` and `TaskTracker`.
//!
//! The token tells every session to drain. The tracker counts sessions and
//! acts as the barrier: once closed, [`ShutdownCoordinator::wait_sessions`]
//! resolves only after every tracked session has released its token.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TaskTrackerToken;
use tracing::{info, warn};

/// Default timeout for graceful shutdown before giving up on stragglers.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Coordinates graceful shutdown across the listener and all sessions.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    sessions: TaskTracker,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            sessions: TaskTracker::new(),
        }
    }

    /// Get a clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Initiate shutdown: signal every session and stop admitting new ones.
    pub fn shutdown(&self) {
        self.token.cancel();
        let _ = self.sessions.close();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Register a new session. Returns `None` once shutdown has begun.
    ///
    /// The session counts as active until the returned token is dropped.
    pub fn track(&self) -> Option<TaskTrackerToken> {
        if self.is_shutting_down() {
            return None;
        }
        Some(self.sessions.token())
    }

    /// Number of sessions currently holding a tracker token.
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Wait until shutdown has begun and every session has ended.
    pub async fn wait_sessions(&self) {
        self.sessions.wait().await;
    }

    /// Perform a graceful shutdown.
    ///
    /// 1. Cancel the token and close the session tracker
    /// 2. Wait up to `timeout` for `handles` and every session to finish
    ///
    /// Returns `true` when everything drained within the timeout.
    pub async fn graceful_shutdown(
        &self,
        handles: Vec<JoinHandle<()>>,
        timeout: Option<Duration>,
    ) -> bool {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);

        self.shutdown();
        info!(
            task_count = handles.len(),
            active_sessions = self.active_sessions(),
            timeout_secs = timeout.as_secs(),
            "waiting for sessions to close"
        );

        let drain = async {
            let _ = futures::future::join_all(handles).await;
            self.wait_sessions().await;
        };

        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!(
                active_sessions = self.active_sessions(),
                "shutdown timed out after {timeout:?}, some sessions may still be running"
            );
            return false;
        }
        info!("all sessions closed");
        true
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
