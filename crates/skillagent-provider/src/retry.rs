//! Retry with exponential backoff for generation calls

use crate::error::{ProviderError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Default delay before the first retry
pub const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Upper bound for a single backoff delay
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Bounded retry budget with exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: INITIAL_RETRY_DELAY,
            max_delay: MAX_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Policy without sleeps, for tests and local backends
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delay after the given 0-based failed attempt: `initial * 2^attempt`, capped
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// Run `op` until it succeeds, fails permanently, or the budget is spent
///
/// `op` receives the 0-based attempt number. Non-retryable errors are
/// returned as-is; exhausting the budget yields `RetriesExhausted`.
pub async fn retry_with_backoff<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.max_attempts.max(1);

    for attempt in 0..attempts {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                warn!(
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    "{} failed: {}",
                    label,
                    e
                );

                if attempt + 1 == attempts {
                    return Err(ProviderError::RetriesExhausted {
                        attempts,
                        last_error: Box::new(e),
                    });
                }

                let delay = policy.backoff_delay(attempt);
                if !delay.is_zero() {
                    info!("Retrying {} in {:?}", label, delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    Err(ProviderError::Config(format!("{} made no attempt", label)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(0), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(4));
        assert_eq!(policy.backoff_delay(10), MAX_RETRY_DELAY);
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(&RetryPolicy::immediate(3), "test", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(ProviderError::Transport("timeout".into()))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_budget() {
        let result: Result<()> = retry_with_backoff(&RetryPolicy::immediate(2), "test", |_| async {
            Err(ProviderError::EmptyResponse {
                model: "m".into(),
            })
        })
        .await;

        match result {
            Err(ProviderError::RetriesExhausted { attempts, last_error }) => {
                assert_eq!(attempts, 2);
                assert!(last_error.to_string().contains("Empty response"));
                assert!(!last_error.is_invalid_output());
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_exhausted_by_invalid_output() {
        let result: Result<()> = retry_with_backoff(&RetryPolicy::immediate(2), "test", |_| async {
            Err(ProviderError::InvalidStructuredOutput("not json".into()))
        })
        .await;
        assert!(result.unwrap_err().is_invalid_output());
    }

    #[tokio::test]
    async fn test_config_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_with_backoff(&RetryPolicy::immediate(5), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::Config("missing key".into())) }
        })
        .await;

        assert!(matches!(result, Err(ProviderError::Config(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
