use crate::error::AdapterError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// An explicit, parameterized retry combinator for adapter calls.
///
/// Retries transient errors with exponential backoff bounded by
/// `[min_delay, max_delay]`. Non-transient errors (per
/// [`AdapterError::is_transient`]) are returned immediately.
#[derive(Debug, Clone, Copy)]
pub struct Retry {
    pub max_attempts: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl Retry {
    pub fn new(max_attempts: u32, min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            min_delay,
            max_delay,
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        (self.min_delay * factor).min(self.max_delay)
    }

    /// Runs `op` until it succeeds, fails non-transiently, or the attempt
    /// budget is exhausted. The last error is propagated.
    pub async fn call<F, Fut, T>(&self, name: &str, mut op: F) -> Result<T, AdapterError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AdapterError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay_for_attempt(attempt);
                    warn!(operation = name, attempt, error = %e, "Retrying after transient error in {:?}", delay);
                    sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Like [`Retry::call`], but falls back to `default` once the attempt
    /// budget is exhausted instead of propagating the error. Used on read
    /// paths where a safe default ("no data") is preferable to failure.
    pub async fn call_or<F, Fut, T>(&self, name: &str, default: T, op: F) -> T
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AdapterError>>,
    {
        match self.call(name, op).await {
            Ok(value) => value,
            Err(e) => {
                warn!(operation = name, error = %e, "Falling back to default after retries");
                default
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> AdapterError {
        AdapterError::RateLimited
    }

    fn permanent() -> AdapterError {
        AdapterError::InvalidOrder("bad size".to_string())
    }

    fn fast_retry() -> Retry {
        Retry::new(3, Duration::from_millis(1), Duration::from_millis(2))
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let attempts = AtomicU32::new(0);
        let result = fast_retry()
            .call("op", || async {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(transient())
                } else {
                    Ok(42u32)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, _> = fast_retry()
            .call("op", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(permanent())
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_falls_back_to_default() {
        let attempts = AtomicU32::new(0);
        let value = fast_retry()
            .call_or("op", 7u32, || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(transient())
            })
            .await;
        assert_eq!(value, 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn backoff_is_bounded() {
        let retry = Retry::new(10, Duration::from_secs(1), Duration::from_secs(10));
        assert_eq!(retry.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(retry.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(retry.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(retry.delay_for_attempt(6), Duration::from_secs(10));
    }
}
