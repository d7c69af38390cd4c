// Retry with exponential backoff for hosted-model calls

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::warn;

use crate::types::AppResult;

const MAX_DELAY: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryMode {
    /// Exponential backoff with jitter.
    Standard,
    /// Like `Standard`, but backs off further after the provider throttles us.
    Adaptive,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub mode: RetryMode,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, mode: RetryMode) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            mode,
            base_delay: Duration::from_millis(500),
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Upper bound of the wait before attempt `attempt + 1`.
    fn delay_ceiling(&self, attempt: u32, throttled: bool) -> Duration {
        let exp = self.base_delay.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1).min(5)));
        let exp = match (self.mode, throttled) {
            (RetryMode::Adaptive, true) => exp.saturating_mul(4),
            _ => exp,
        };
        exp.min(MAX_DELAY)
    }

    fn delay(&self, attempt: u32, throttled: bool) -> Duration {
        let ceiling = self.delay_ceiling(attempt, throttled);
        if ceiling.is_zero() {
            return ceiling;
        }
        // Half fixed, half jitter.
        let half = ceiling / 2;
        let jitter = rand::thread_rng().gen_range(0..=half.as_millis() as u64);
        half + Duration::from_millis(jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, RetryMode::Adaptive)
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the policy's attempts are used up.
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, mut operation: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => {
                if attempt >= policy.max_attempts || !error.is_retryable() {
                    return Err(error);
                }

                let delay = policy.delay(attempt, error.is_rate_limited());
                warn!(attempt, max_attempts = policy.max_attempts, delay_ms = delay.as_millis() as u64, error = %error, "Retrying model call");
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AppError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn instant(attempts: u32, mode: RetryMode) -> RetryPolicy {
        RetryPolicy::new(attempts, mode).with_base_delay(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_stops_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: AppResult<()> = with_retry(&instant(2, RetryMode::Adaptive), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::RateLimited("slow down".into()))
        })
        .await;

        assert!(matches!(result, Err(AppError::RateLimited(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_fast() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: AppResult<()> = with_retry(&instant(5, RetryMode::Standard), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::Config("no key".into()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failure() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_retry(&instant(3, RetryMode::Standard), || async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(AppError::Timeout("read".into()))
            } else {
                Ok("done")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_adaptive_backs_off_further_when_throttled() {
        let policy = RetryPolicy::new(3, RetryMode::Adaptive);
        assert!(policy.delay_ceiling(1, true) > policy.delay_ceiling(1, false));

        let standard = RetryPolicy::new(3, RetryMode::Standard);
        assert_eq!(standard.delay_ceiling(1, true), standard.delay_ceiling(1, false));
        assert!(policy.delay_ceiling(10, true) <= MAX_DELAY);
    }
}
