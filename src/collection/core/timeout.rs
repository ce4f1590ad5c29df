//! Time-bounding helpers for suspending operations.
//!
//! A [`TimeoutGuard`] resolves with the operation's output when it settles in
//! time and with a caller supplied fallback otherwise. Resolution happens
//! exactly once: the guard consumes itself and yields a single value.

use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;

/// Outcome of a guarded operation, keeping track of which side won the race.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guarded<T> {
    Settled(T),
    Fallback(T),
}

impl<T> Guarded<T> {
    pub fn into_inner(self) -> T {
        match self {
            Guarded::Settled(value) | Guarded::Fallback(value) => value,
        }
    }

    pub fn timed_out(&self) -> bool {
        matches!(self, Guarded::Fallback(_))
    }
}

/// Bounds a pending operation with a fallback value.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutGuard {
    bound: Duration,
}

impl TimeoutGuard {
    pub fn new(bound: Duration) -> Self {
        Self { bound }
    }

    pub fn limit(&self) -> Duration {
        self.bound
    }

    /// Await `operation` for at most the configured bound.
    ///
    /// When the bound elapses the operation is dropped, which cancels it at
    /// its next suspension point.
    pub async fn run<F>(self, operation: F, fallback: F::Output) -> Guarded<F::Output>
    where
        F: Future,
    {
        match timeout(self.bound, operation).await {
            Ok(value) => Guarded::Settled(value),
            Err(_) => {
                log::debug!("operation exceeded {:?}, using fallback", self.bound);
                Guarded::Fallback(fallback)
            }
        }
    }

    /// Await `operation` for at most the configured bound without cancelling it.
    ///
    /// The operation runs as its own task. If the bound elapses first the guard
    /// resolves with `fallback` and the task is left running: any side effect
    /// it performs afterwards (a late DOM mutation, a late write to shared
    /// state) is still observed by whoever shares that state.
    pub async fn run_detached<F>(self, operation: F, fallback: F::Output) -> Guarded<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let handle = tokio::spawn(operation);
        match timeout(self.bound, handle).await {
            Ok(Ok(value)) => Guarded::Settled(value),
            Ok(Err(err)) => {
                log::warn!("detached operation aborted: {err}");
                Guarded::Fallback(fallback)
            }
            Err(_) => {
                log::debug!(
                    "stopped waiting after {:?}; detached operation keeps running",
                    self.bound
                );
                Guarded::Fallback(fallback)
            }
        }
    }
}
