//! Graceful shutdown coordination via `CancellationToken` and `TaskTracker`.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Coordinates graceful shutdown across the listener, sessions and
/// in-flight dispatch tasks.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Get a clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Spawn a task that shutdown waits for.
    pub fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn(task)
    }

    /// Wrap a future so shutdown waits for it wherever it is polled.
    pub fn track<F: Future>(&self, task: F) -> impl Future<Output = F::Output> + use<F> {
        self.tracker.track_future(task)
    }

    /// Number of tracked tasks still running.
    pub fn task_count(&self) -> usize {
        self.tracker.len()
    }

    /// Cancel the token, then wait up to `timeout` for every tracked task.
    ///
    /// Returns `false` if the timeout elapsed first.
    pub async fn graceful_shutdown(&self, timeout: Duration) -> bool {
        self.shutdown();
        let _ = self.tracker.close();
        info!(
            task_count = self.tracker.len(),
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "waiting for tasks to complete"
        );

        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_err() {
            warn!("shutdown timed out after {timeout:?}, some tasks may still be running");
            false
        } else {
            true
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_not_shutting_down() {
        let coord = ShutdownCoordinator::new();
        assert!(!coord.is_shutting_down());
    }

    #[test]
    fn token_propagation() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        assert!(!token.is_cancelled());
        coord.shutdown();
        assert!(token.is_cancelled());
    }

    #[test]
    fn multiple_shutdown_calls_idempotent() {
        let coord = ShutdownCoordinator::default();
        coord.shutdown();
        coord.shutdown();
        assert!(coord.is_shutting_down());
    }

    #[tokio::test]
    async fn graceful_shutdown_waits_for_cancel_aware_tasks() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        let _ = coord.spawn(async move { token.cancelled().await });
        assert_eq!(coord.task_count(), 1);
        assert!(coord.graceful_shutdown(Duration::from_secs(5)).await);
        assert_eq!(coord.task_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn graceful_shutdown_times_out() {
        let coord = ShutdownCoordinator::new();
        let _ = coord.spawn(tokio::time::sleep(Duration::from_secs(3600)));
        assert!(!coord.graceful_shutdown(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn tracked_future_counts() {
        let coord = ShutdownCoordinator::new();
        let fut = coord.track(async { 7 });
        assert_eq!(coord.task_count(), 1);
        assert_eq!(fut.await, 7);
        assert_eq!(coord.task_count(), 0);
    }
}
