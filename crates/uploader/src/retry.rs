//! Bounded retries with linear backoff.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Retry bounds for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retries: u32,
    pub base_delay: Duration,
}

/// Why [`RetryPolicy::run`] gave up.
#[derive(Debug, PartialEq, Eq)]
pub enum RetryError<E> {
    /// The token was cancelled before an attempt or during a backoff wait.
    Cancelled,
    /// Every attempt failed; `last` is the final attempt's error.
    Exhausted { attempts: u32, last: E },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Total attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Wait after the `attempt`-th failure (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Runs `op` until it succeeds, the retries run out, or `cancel` fires.
    ///
    /// `op` receives the 1-based attempt number. Cancellation is observed
    /// before every attempt and during every backoff wait; an attempt that is
    /// already running is left to finish.
    pub async fn run<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled);
            }
            attempt += 1;

            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(last) if attempt >= self.max_attempts() => {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last,
                    });
                }
                Err(e) => {
                    let delay = self.delay_for_attempt(attempt);
                    debug!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "attempt failed, retrying");

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(retries: u32) -> RetryPolicy {
        RetryPolicy {
            retries,
            base_delay: Duration::from_secs(1),
        }
    }

    #[test]
    fn delays_grow_linearly() {
        let p = policy(3);
        assert_eq!(p.max_attempts(), 4);
        assert_eq!(p.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(p.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(p.delay_for_attempt(3), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_two_failures() {
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();

        let result = policy(3)
            .run(&CancellationToken::new(), |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt <= 2 {
                        Err(format!("boom {attempt}"))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1 s after the first failure, 2 s after the second.
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_retries() {
        let result: Result<(), _> = policy(2)
            .run(&CancellationToken::new(), |attempt| async move {
                Err(format!("fail {attempt}"))
            })
            .await;

        assert_eq!(
            result,
            Err(RetryError::Exhausted {
                attempts: 3,
                last: "fail 3".to_string(),
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn zero_retries_means_one_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy(0)
            .run(&CancellationToken::new(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("no") }
            })
            .await;

        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 1, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_before_first_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let calls = AtomicU32::new(0);
        let result: Result<(), RetryError<String>> = policy(3)
            .run(&cancel, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert_eq!(result, Err(RetryError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_backoff_is_distinct_from_exhaustion() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(500)).await;
                cancel.cancel();
            })
        };

        let c = Arc::clone(&calls);
        let result: Result<(), _> = policy(3)
            .run(&cancel, move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                async { Err("transient") }
            })
            .await;

        canceller.await.unwrap();
        assert_eq!(result, Err(RetryError::Cancelled));
        // Only the first attempt ran; the cancel landed in the 1 s wait.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
