//! Bounded exponential backoff for transient batch failures.

use crate::error::LoadError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

pub const DEFAULT_MAX_RETRIES: u32 = 5;
const RETRY_BASE_DELAY_MS: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(RETRY_BASE_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Policy that retries without sleeping.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (1-based). Doubles per attempt,
    /// capped at 16x the base delay.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        self.base_delay * (1u32 << (attempt - 1).min(4))
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// retry budget runs out.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, LoadError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LoadError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.delay_for(attempt);
                    warn!(
                        "Retrying {} (attempt {}/{}), waiting {}ms: {}",
                        label,
                        attempt,
                        self.max_retries,
                        delay.as_millis(),
                        e
                    );
                    sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_for() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::ZERO);
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(5), Duration::from_millis(1600));
        assert_eq!(policy.delay_for(9), Duration::from_millis(1600));
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = RetryPolicy::immediate(3)
            .run("batch", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(LoadError::Transient("restart transaction".into()))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = RetryPolicy::immediate(2)
            .run("batch", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LoadError::Transient("restart transaction".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = RetryPolicy::immediate(5)
            .run("batch", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LoadError::ConstraintViolation("duplicate key".into()))
            })
            .await;
        assert!(matches!(result, Err(LoadError::ConstraintViolation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
