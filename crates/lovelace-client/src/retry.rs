//! Bounded exponential backoff for idempotent reads, and cancellation.
//!
//! Only reads go through [`RetryPolicy::run`]. Submission is never retried
//! here; see [`crate::submit`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::warn;

use lovelace_core::error::QueryError;

/// Retry schedule: delays double from `base_delay` up to `max_delay`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero behaves like one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, runs
    /// out of attempts or `cancel` fires.
    pub async fn run<T, F, Fut>(&self, cancel: &Cancellation, what: &str, mut op: F) -> Result<T, QueryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, QueryError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(QueryError::Cancelled);
            }
            let result = tokio::select! {
                r = op() => r,
                _ = cancel.cancelled() => return Err(QueryError::Cancelled),
            };
            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(what, attempt, error = %e, delay_ms = delay.as_millis() as u64, "retrying read");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Err(QueryError::Cancelled),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Receiving side of a cancellation signal. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

/// Sending side of a cancellation signal.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

/// A linked handle/signal pair.
pub fn cancellation() -> (CancelHandle, Cancellation) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx: Arc::new(tx) }, Cancellation { rx })
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl Cancellation {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled. Pending forever if the handle is dropped first.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::never()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[test]
    fn delays_double_and_cap() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_for(1), Duration::from_millis(250));
        assert_eq!(p.delay_for(2), Duration::from_millis(500));
        assert_eq!(p.delay_for(3), Duration::from_secs(1));
        assert_eq!(p.delay_for(10), Duration::from_secs(4));
        assert_eq!(p.delay_for(64), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = fast()
            .run(&Cancellation::never(), "test", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(QueryError::Unavailable("down".into()))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = fast()
            .run(&Cancellation::never(), "test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(QueryError::Remote { status: 502, body: "bad gateway".into() })
            })
            .await;
        assert_eq!(result, Err(QueryError::Remote { status: 502, body: "bad gateway".into() }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = fast()
            .run(&Cancellation::never(), "test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(QueryError::Remote { status: 403, body: "invalid project token".into() })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let (handle, cancel) = cancellation();
        handle.cancel();
        let result: Result<(), _> = fast().run(&cancel, "test", || async { Ok(()) }).await;
        assert_eq!(result, Err(QueryError::Cancelled));
    }

    #[tokio::test]
    async fn cancel_interrupts_pending_read() {
        let (handle, cancel) = cancellation();
        let task = tokio::spawn(async move {
            RetryPolicy::none()
                .run(&cancel, "slow", || async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok::<_, QueryError>(())
                })
                .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();
        assert_eq!(task.await.unwrap(), Err(QueryError::Cancelled));
    }

    #[tokio::test]
    async fn never_does_not_fire() {
        let cancel = Cancellation::never();
        assert!(!cancel.is_cancelled());
        let fired = tokio::time::timeout(Duration::from_millis(10), cancel.cancelled()).await;
        assert!(fired.is_err());
    }
}
