//! Retry policy with exponential backoff for repository requests
//!
//! - Attempts: 4 total (1 call + 3 retries)
//! - Delay: base × 2ⁿ, capped, ±25% jitter
//! - Only `SourceError::is_retryable` errors are retried

use crate::errors::SourceError;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Maximum number of attempts, including the first
pub const MAX_ATTEMPTS: u32 = 4;

/// Base delay for exponential backoff
const BASE_DELAY_MS: u64 = 500;

/// Maximum delay cap
const MAX_DELAY_MS: u64 = 8_000;

/// Retry policy with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    enable_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            base_delay_ms: BASE_DELAY_MS,
            max_delay_ms: MAX_DELAY_MS,
            enable_jitter: true,
        }
    }

    /// Custom attempt count and base delay
    pub fn with_config(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms,
            max_delay_ms: MAX_DELAY_MS,
            enable_jitter: true,
        }
    }

    /// Single attempt, no retries
    pub fn none() -> Self {
        Self::with_config(1, 0)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `operation`, retrying retryable failures
    ///
    /// The last error is returned unchanged once attempts run out.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, SourceError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, SourceError>>,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    attempt += 1;
                    if !e.is_retryable() || attempt >= self.max_attempts {
                        return Err(e);
                    }

                    let delay = self.calculate_delay(attempt - 1);
                    warn!(attempt, max_attempts = self.max_attempts, ?delay, error = %e, "retrying repository request");
                    sleep(delay).await;
                }
            }
        }
    }

    /// Delay before retry number `retry` (0-based)
    fn calculate_delay(&self, retry: u32) -> Duration {
        let exponential_delay = self.base_delay_ms.saturating_mul(2u64.saturating_pow(retry));
        let delay_ms = exponential_delay.min(self.max_delay_ms);

        let final_delay = if self.enable_jitter {
            let jitter = (delay_ms / 4) as i64;
            let random_jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter as f64;
            ((delay_ms as i64) + random_jitter as i64).max(0) as u64
        } else {
            delay_ms
        };

        Duration::from_millis(final_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_success_first_attempt() {
        let policy = RetryPolicy::with_config(3, 1);
        let attempts = Arc::new(Mutex::new(0));
        let counter = attempts.clone();

        let result = policy
            .execute(move || {
                let counter = counter.clone();
                async move {
                    *counter.lock().unwrap() += 1;
                    Ok::<_, SourceError>(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(*attempts.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_success_after_transient_failures() {
        let policy = RetryPolicy::with_config(4, 1);
        let attempts = Arc::new(Mutex::new(0));
        let counter = attempts.clone();

        let result = policy
            .execute(move || {
                let counter = counter.clone();
                async move {
                    let mut n = counter.lock().unwrap();
                    *n += 1;
                    if *n < 3 {
                        Err(SourceError::Unavailable("502 Bad Gateway".to_string()))
                    } else {
                        Ok("tree")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "tree");
        assert_eq!(*attempts.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_with_last_error() {
        let policy = RetryPolicy::with_config(3, 1);
        let attempts = Arc::new(Mutex::new(0));
        let counter = attempts.clone();

        let result = policy
            .execute(move || {
                let counter = counter.clone();
                async move {
                    *counter.lock().unwrap() += 1;
                    Err::<(), _>(SourceError::RateLimited("secondary limit".to_string()))
                }
            })
            .await;

        assert_eq!(
            result.unwrap_err(),
            SourceError::RateLimited("secondary limit".to_string())
        );
        assert_eq!(*attempts.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error() {
        let policy = RetryPolicy::with_config(5, 1);
        let attempts = Arc::new(Mutex::new(0));
        let counter = attempts.clone();

        let result = policy
            .execute(move || {
                let counter = counter.clone();
                async move {
                    *counter.lock().unwrap() += 1;
                    Err::<(), _>(SourceError::NotFound("octo/missing".to_string()))
                }
            })
            .await;

        assert!(matches!(result, Err(SourceError::NotFound(_))));
        assert_eq!(*attempts.lock().unwrap(), 1);
    }

    #[test]
    fn test_calculate_delay() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
            enable_jitter: false,
        };

        assert_eq!(policy.calculate_delay(0), Duration::from_millis(500));
        assert_eq!(policy.calculate_delay(1), Duration::from_millis(1_000));
        assert_eq!(policy.calculate_delay(3), Duration::from_millis(4_000));
        assert_eq!(policy.calculate_delay(10), Duration::from_millis(8_000));
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let policy = RetryPolicy::new();
        for _ in 0..20 {
            let delay = policy.calculate_delay(1).as_millis() as u64;
            assert!((750..=1_250).contains(&delay), "delay {} out of band", delay);
        }
    }
}
