//! Bounded retries for calls to external services
//!
//! Only errors where [`AppError::is_transient`] holds are retried. Anything
//! else (a rejected key, a malformed request) is returned after one attempt.

use crate::errors::{AppError, Result};
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::warn;

/// Bounds for retrying an external call
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Jitter as a fraction of each interval
    pub randomization: f64,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
            randomization: 0.5,
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    fn schedule(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_backoff)
            .with_randomization_factor(self.randomization)
            .with_multiplier(2.0)
            .with_max_interval(self.max_backoff)
            .with_max_elapsed_time(None)
            .build()
    }
}

/// Run `op` until it succeeds, fails permanently, or runs out of retries.
///
/// Returns the final result with the number of attempts made.
pub async fn retry_transient<T, F, Fut>(policy: &RetryPolicy, target: &str, mut op: F) -> (Result<T>, u32)
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<T>> + Send,
    T: Send,
{
    let attempts = AtomicU32::new(0);
    let max_retries = policy.max_retries;

    let result = backoff::future::retry_notify(
        policy.schedule(),
        || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            let call = op();
            async move {
                match call.await {
                    Ok(value) => Ok(value),
                    Err(e) if e.is_transient() && attempt < max_retries => {
                        Err(backoff::Error::transient(e))
                    }
                    Err(e) => Err(backoff::Error::permanent(e)),
                }
            }
        },
        |err: AppError, delay: Duration| {
            warn!(
                target_service = target,
                error = %err,
                delay_ms = delay.as_millis() as u64,
                "Attempt failed, retrying"
            );
        },
    )
    .await;

    (result, attempts.load(Ordering::SeqCst))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            ..RetryPolicy::default()
        }
    }

    #[tokio::test]
    async fn test_transient_errors_retried_until_success() {
        let calls = AtomicU32::new(0);
        let (result, attempts) = retry_transient(&fast_policy(3), "test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(AppError::ServiceUnavailable { message: "503".into() })
            } else {
                Ok("done")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_permanent_error_tried_once() {
        let (result, attempts) = retry_transient(&fast_policy(5), "test", || async {
            Err::<(), _>(AppError::EmbeddingError { message: "API error 401".into() })
        })
        .await;

        assert!(matches!(result, Err(AppError::EmbeddingError { .. })));
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn test_large_retry_budget_is_bounded_by_attempts() {
        let policy = RetryPolicy { max_retries: 80, ..fast_policy(0) };
        let calls = AtomicU32::new(0);
        let (result, attempts) = retry_transient(&policy, "test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 70 {
                Err(AppError::ServiceUnavailable { message: "429".into() })
            } else {
                Ok(())
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(attempts, 71);
    }
}
