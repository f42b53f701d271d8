//! Admission control for requests that wait on a conversation runtime.
//!
//! Waiting is cheap per request but unbounded waiting is not, so the limiter
//! rejects new waiters outright once the configured number are in flight.
//!
//! Steward itself never waits on a runtime. The limiter lives on
//! [`AppState`](crate::AppState) so a host application that embeds the router
//! (a chat integration polling for agent output, say) wraps each wait in
//! [`RuntimeWaitLimiter::track`] and shares one limit with `/health`.

use std::{fmt::Display, future::Future, sync::Arc};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::observability::metrics;

/// Returned when the maximum number of concurrent waits is already in flight.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Something went wrong. Please try again later.")]
pub struct TooManyWaitingError;

pub struct RuntimeWaitLimiter {
    permits: Arc<Semaphore>,
    max: usize,
}

impl RuntimeWaitLimiter {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max: max_concurrent,
        }
    }

    /// Number of waits currently in flight.
    pub fn current(&self) -> usize {
        self.max - self.permits.available_permits()
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// Run `fut` as a tracked wait.
    ///
    /// Fails immediately with [`TooManyWaitingError`] when the limit is reached;
    /// callers are never queued. The slot is released when `fut` completes or
    /// the returned future is dropped.
    pub async fn track<F, T, E>(&self, fut: F) -> Result<Result<T, E>, TooManyWaitingError>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                metrics::record_runtime_wait_completed("rejected");
                tracing::error!(
                    current = self.current(),
                    max = self.max,
                    "Runtime wait rejected: too many requests already waiting"
                );
                return Err(TooManyWaitingError);
            }
        };

        let mut slot = WaitSlot::new(permit, self);
        let result = fut.await;
        slot.finish(match &result {
            Ok(_) => "success",
            Err(e) if is_timeout(e) => "timeout",
            Err(_) => "error",
        });

        Ok(result)
    }
}

fn is_timeout(error: &impl Display) -> bool {
    let message = error.to_string();
    message.contains("taking too long") || message.contains("deadline has elapsed")
}

/// Holds a permit for one wait and reports its outcome.
struct WaitSlot<'a> {
    permit: Option<OwnedSemaphorePermit>,
    limiter: &'a RuntimeWaitLimiter,
    status: &'static str,
}

impl<'a> WaitSlot<'a> {
    fn new(permit: OwnedSemaphorePermit, limiter: &'a RuntimeWaitLimiter) -> Self {
        metrics::record_runtime_wait_started();
        metrics::set_runtime_wait_current(limiter.current());
        tracing::info!(current = limiter.current(), "Runtime wait started");
        Self {
            permit: Some(permit),
            limiter,
            status: "cancelled",
        }
    }

    fn finish(&mut self, status: &'static str) {
        self.status = status;
    }
}

impl Drop for WaitSlot<'_> {
    fn drop(&mut self) {
        drop(self.permit.take());
        metrics::record_runtime_wait_completed(self.status);
        metrics::set_runtime_wait_current(self.limiter.current());
        tracing::info!(
            current = self.limiter.current(),
            status = self.status,
            "Runtime wait ended"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::oneshot;

    use super::*;

    #[tokio::test]
    async fn test_completed_wait_releases_slot() {
        let limiter = RuntimeWaitLimiter::new(2);

        let result = limiter
            .track(async { Ok::<_, String>(42) })
            .await
            .unwrap();

        assert_eq!(result, Ok(42));
        assert_eq!(limiter.current(), 0);
        assert_eq!(limiter.max(), 2);
    }

    #[tokio::test]
    async fn test_rejects_waiter_over_limit() {
        let limiter = Arc::new(RuntimeWaitLimiter::new(2));
        let mut releases = Vec::new();
        let mut handles = Vec::new();

        for _ in 0..2 {
            let (tx, rx) = oneshot::channel::<()>();
            releases.push(tx);
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter
                    .track(async move { rx.await.map_err(|e| e.to_string()) })
                    .await
            }));
        }
        while limiter.current() < 2 {
            tokio::task::yield_now().await;
        }

        let rejected = limiter.track(async { Ok::<_, String>(()) }).await;
        assert_eq!(rejected, Err(TooManyWaitingError));
        assert_eq!(
            TooManyWaitingError.to_string(),
            "Something went wrong. Please try again later."
        );

        for tx in releases {
            tx.send(()).unwrap();
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(Ok(())));
        }
        assert_eq!(limiter.current(), 0);
        assert!(limiter.track(async { Ok::<_, String>(()) }).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_wait_releases_slot() {
        let limiter = RuntimeWaitLimiter::new(1);

        let result = limiter
            .track(async { Err::<(), _>("Runtime is taking too long to start") })
            .await
            .unwrap();

        assert!(result.is_err());
        assert_eq!(limiter.current(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_wait_releases_slot() {
        let limiter = RuntimeWaitLimiter::new(1);

        let timed_out = tokio::time::timeout(
            Duration::from_secs(1),
            limiter.track(std::future::pending::<Result<(), String>>()),
        )
        .await;

        assert!(timed_out.is_err());
        assert_eq!(limiter.current(), 0);
    }

    #[test]
    fn test_timeout_classification() {
        assert!(is_timeout(&"Runtime is taking too long"));
        assert!(!is_timeout(&"connection refused"));
    }
}
