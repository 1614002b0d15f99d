//! Shared retry-with-backoff helper for REST calls.
//!
//! Retryable on HTTP 5xx and 429 (honoring a `retry_after_ms` hint when the
//! exchange sends one); 4xx is terminal and returned immediately.

use rand::Rng;
use std::time::Duration;
use tracing::warn;

use crate::errors::{ExchangeError, Result};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        let scaled = self.base_delay.saturating_mul(1u32 << attempt.min(16));
        let capped = scaled.min(self.max_delay);
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        capped.mul_f64(jitter)
    }
}

/// Run `op` up to `policy.max_attempts` times, sleeping between attempts
/// whenever the error is transient (5xx/429). 4xx errors return immediately.
pub async fn retry_with_backoff<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_terminal() => return Err(error),
            Err(error) => {
                attempt += 1;
                if attempt >= policy.max_attempts {
                    return Err(error);
                }
                let delay = policy.delay_for(attempt - 1);
                warn!(attempt, ?delay, %error, "retrying exchange request after transient error");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        };

        let result = retry_with_backoff(policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ExchangeError::Http {
                        status: 503,
                        body: String::new(),
                    })
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_stops_immediately_on_terminal_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result: Result<()> = retry_with_backoff(policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ExchangeError::Http { status: 404, body: String::new() }) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
