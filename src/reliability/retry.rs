//! Bounded-attempt retry for idempotent network operations.
//!
//! Every error is retried; there is no error-type filtering. After the last
//! attempt the final error is returned unchanged and the caller classifies it.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Retry immediately.
    None,
    /// Same delay before every retry.
    Fixed(Duration),
    /// `base * 2^attempt`, capped at `max`.
    Exponential { base: Duration, max: Duration },
}

/// How many times to try and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Policy with `max_attempts` total attempts (at least one) and no delay.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::None,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Delay to wait after the `attempt`-th failure (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, max } => {
                let factor = 2u32.saturating_pow(attempt);
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3).with_backoff(Backoff::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_secs(5),
        })
    }
}

/// Run `operation` until it succeeds or `policy.max_attempts` attempts fail.
///
/// `on_retry(attempt, &error)` is called after each failed attempt that will
/// be followed by another one.
pub async fn with_retry<T, E, F, Fut, R>(
    policy: &RetryPolicy,
    mut on_retry: R,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: FnMut(u32, &E),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= max_attempts => return Err(err),
            Err(err) => {
                on_retry(attempt, &err);
                let delay = policy.delay_after(attempt);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
        }
    }
}

/// An `on_retry` hook that logs each retry at warn level.
pub fn warn_on_retry<E: Display>(operation: &'static str) -> impl FnMut(u32, &E) {
    move |attempt, err| warn!(operation, attempt, error = %err, "Retrying after failure")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_succeeds_first_try() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<u32, String> = with_retry(&RetryPolicy::new(3), |_, _| {}, || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(7)
        })
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let mut observed = Vec::new();

        let result: Result<&str, String> = with_retry(
            &RetryPolicy::new(3),
            |attempt, err: &String| observed.push((attempt, err.clone())),
            || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(format!("fail {}", n))
                } else {
                    Ok("done")
                }
            },
        )
        .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(
            observed,
            vec![(1, "fail 1".to_string()), (2, "fail 2".to_string())]
        );
    }

    #[tokio::test]
    async fn test_returns_last_error_when_exhausted() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let mut retries = 0;

        let result: Result<(), String> = with_retry(
            &RetryPolicy::new(3),
            |_, _| retries += 1,
            || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err(format!("fail {}", n))
            },
        )
        .await;

        assert_eq!(result, Err("fail 3".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(retries, 2);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let _: Result<(), ()> = with_retry(&RetryPolicy::new(0), |_, _| {}, || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(())
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_between_attempts() {
        let policy = RetryPolicy::new(3).with_backoff(Backoff::Fixed(Duration::from_secs(2)));
        let start = tokio::time::Instant::now();

        let _: Result<(), ()> = with_retry(&policy, |_, _| {}, || async { Err(()) }).await;

        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let policy = RetryPolicy::new(10).with_backoff(Backoff::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_secs(1),
        });
        assert_eq!(policy.delay_after(1), Duration::from_millis(200));
        assert_eq!(policy.delay_after(2), Duration::from_millis(400));
        assert_eq!(policy.delay_after(5), Duration::from_secs(1));
    }
}
