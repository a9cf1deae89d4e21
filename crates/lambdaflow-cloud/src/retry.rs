//! Bounded fixed-delay retry for the role propagation race

use crate::error::{ProvisionError, Result};
use std::future::Future;
use std::time::Duration;

/// Retry configuration for control-plane calls that hit a retryable error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of calls, the first one included
    pub max_attempts: u32,

    /// Fixed delay before each retry
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Run `call` until it succeeds, fails with a non-retryable error, or the
    /// attempts are used up
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    if attempt >= self.max_attempts {
                        return Err(ProvisionError::RetriesExhausted {
                            attempts: attempt,
                            last: Box::new(e),
                        });
                    }
                    tracing::warn!(
                        "{} failed ({}), retrying in {:?} [{}/{}]",
                        operation,
                        e,
                        self.delay,
                        attempt,
                        self.max_attempts
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
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

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let policy = RetryPolicy::new(3, Duration::from_secs(5));
        let start = tokio::time::Instant::now();

        let result: Result<()> = policy
            .run("CreateFunction", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ProvisionError::RolePropagation("not yet".into()))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(10));
        assert!(elapsed < Duration::from_secs(11));
        match result {
            Err(ProvisionError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(last.is_retryable());
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let start = tokio::time::Instant::now();

        let result: Result<()> = RetryPolicy::default()
            .run("CreateFunction", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ProvisionError::remote("CreateFunction", "AccessDenied"))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(matches!(result, Err(ProvisionError::Remote { .. })));
    }

    #[test]
    fn test_at_least_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }
}
