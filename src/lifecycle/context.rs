//! Process-wide application context.

use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tokio_util::task::TaskTracker;

use crate::observability::{Logger, Metrics};

/// Shared state of one process lifetime: the cancellation token every
/// long-running task observes, the tracker shutdown waits on, and the
/// logger and metrics clients.
///
/// Cloning is cheap and every clone observes the same cancellation.
#[derive(Clone, Debug)]
pub struct AppContext {
    token: CancellationToken,
    tracker: TaskTracker,
    logger: Logger,
    metrics: Metrics,
}

impl AppContext {
    /// Create a context governed by `token`, with a fresh task tracker.
    pub fn new(token: CancellationToken, logger: Logger, metrics: Metrics) -> Self {
        Self::from_parts(token, TaskTracker::new(), logger, metrics)
    }

    pub fn from_parts(
        token: CancellationToken,
        tracker: TaskTracker,
        logger: Logger,
        metrics: Metrics,
    ) -> Self {
        Self {
            token,
            tracker,
            logger,
            metrics,
        }
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancel the context. Repeated calls are no-ops.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes once the context is cancelled.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Spawn a task that shutdown waits for, running under the process logger.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn(self.logger.scope(future))
    }

    /// Stop accepting new tasks and wait for every spawned task to finish.
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}
