//! Access limiting for rate-limited external providers
//!
//! Bounds the number of outstanding calls with a semaphore and retries
//! rate-limited calls with capped exponential backoff.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

/// Errors that can signal a provider rate limit
pub trait RateLimitSignal {
    fn is_rate_limited(&self) -> bool;
}

/// Retry behavior for rate-limited calls
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Retries after the initial attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Backoff is capped here
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl BackoffPolicy {
    pub fn new(max_retries: u32, initial_delay_ms: u64) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_millis(initial_delay_ms),
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// Shared limiter for one provider
#[derive(Clone)]
pub struct ProviderLimiter {
    provider: &'static str,
    permits: Arc<Semaphore>,
    policy: BackoffPolicy,
}

impl ProviderLimiter {
    pub fn new(provider: &'static str, max_concurrent: usize, policy: BackoffPolicy) -> Self {
        Self {
            provider,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            policy,
        }
    }

    /// Run `op` under a permit, retrying on rate-limit errors
    pub async fn call<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RateLimitSignal + Display,
    {
        let mut attempt = 0;
        loop {
            let result = {
                // The semaphore is never closed
                let _permit = self.permits.acquire().await.ok();
                op().await
            };

            match result {
                Err(e) if e.is_rate_limited() && attempt < self.policy.max_retries => {
                    let delay = self.policy.delay_for(attempt);
                    tracing::warn!(
                        provider = self.provider,
                        attempt = attempt + 1,
                        max_retries = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Provider rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct FakeError(bool);

    impl Display for FakeError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "fake error (rate limited: {})", self.0)
        }
    }

    impl RateLimitSignal for FakeError {
        fn is_rate_limited(&self) -> bool {
            self.0
        }
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = BackoffPolicy {
            max_retries: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for(4), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(40), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_rate_limited_until_cap() {
        let limiter = ProviderLimiter::new("test", 1, BackoffPolicy::new(2, 10));
        let calls = AtomicU32::new(0);

        let result: Result<(), FakeError> = limiter
            .call(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(FakeError(true)) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_errors_are_not_retried() {
        let limiter = ProviderLimiter::new("test", 1, BackoffPolicy::new(5, 10));
        let calls = AtomicU32::new(0);

        let result: Result<(), FakeError> = limiter
            .call(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(FakeError(false)) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_rate_limit() {
        let limiter = ProviderLimiter::new("test", 2, BackoffPolicy::new(3, 10));
        let calls = AtomicU32::new(0);

        let result: Result<u32, FakeError> = limiter
            .call(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { if n == 0 { Err(FakeError(true)) } else { Ok(n) } }
            })
            .await;

        assert_eq!(result.unwrap(), 1);
    }
}
