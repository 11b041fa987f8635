//! Retry primitive with bounded exponential backoff
//!
//! Every background job funnels its calls to external services through
//! [`run`] (or [`run_or_none`] for lookups whose absence is a normal
//! outcome). Only errors classified as transient by
//! [`WorkerError::is_retryable`] are retried; permanent failures surface
//! immediately.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{WorkerError, WorkerResult};

/// Default retry configuration
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY_MS: u64 = 500;
const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// Bounded exponential backoff policy, created per call site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts (first try included)
    pub max_attempts: u32,

    /// Delay before the second attempt
    pub base_delay: Duration,

    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with explicit attempt count and base delay
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            ..Self::default()
        }
    }

    /// Backoff delay before retrying after the given zero-based attempt
    ///
    /// Doubles per attempt, capped at `max_delay`. Monotonically
    /// non-decreasing in the attempt number.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Run a fallible async operation under the given retry policy
///
/// Each failed attempt is logged with its attempt number and error text
/// before sleeping for the policy's backoff. Exhausting all attempts returns
/// [`WorkerError::MaxRetriesExceeded`] carrying the final error text.
pub async fn run<T, F, Fut>(
    operation_name: &str,
    policy: RetryPolicy,
    mut operation: F,
) -> WorkerResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = WorkerResult<T>>,
{
    // Degenerate policy - run the operation once
    if policy.max_attempts == 0 {
        return operation().await;
    }

    let mut last_error: Option<WorkerError> = None;

    for attempt in 0..policy.max_attempts {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !e.is_retryable() {
                    // Non-retryable errors return immediately
                    return Err(e);
                } else if attempt < policy.max_attempts - 1 {
                    let delay = policy.delay_for(attempt);
                    warn!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        max_attempts = policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                } else {
                    last_error = Some(e);
                    break;
                }
            }
        }
    }

    Err(WorkerError::retries_exceeded(
        operation_name,
        policy.max_attempts,
        last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string()),
    ))
}

/// Run an operation under retries, swallowing the final failure
///
/// Returns `None` when all attempts fail. Intended for read-only lookups
/// where absence is a normal outcome (e.g., "does this collection already
/// exist?"), never for destructive operations.
pub async fn run_or_none<T, F, Fut>(
    operation_name: &str,
    policy: RetryPolicy,
    operation: F,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = WorkerResult<T>>,
{
    match run(operation_name, policy, operation).await {
        Ok(result) => Some(result),
        Err(e) => {
            warn!(
                operation = operation_name,
                error = %e,
                "Lookup failed after retries, treating as absent"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    fn transient() -> WorkerError {
        WorkerError::PlexUnreachable("connection refused".to_string())
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for(3), Duration::from_millis(350));
    }

    #[test]
    fn test_backoff_monotone() {
        let policy = RetryPolicy::default();
        let mut prev = Duration::ZERO;
        for attempt in 0..40 {
            let delay = policy.delay_for(attempt);
            assert!(delay >= prev, "delay decreased at attempt {}", attempt);
            assert!(delay <= policy.max_delay);
            prev = delay;
        }
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result = run("test op", fast_policy(3), move || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, WorkerError>(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result = run("test op", fast_policy(3), move || {
            let calls = calls_clone.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(transient())
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_retries_exceeded() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result: WorkerResult<()> = run("delete collection 42", fast_policy(3), move || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(transient())
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result.unwrap_err() {
            WorkerError::MaxRetriesExceeded {
                operation,
                attempts,
                ..
            } => {
                assert_eq!(operation, "delete collection 42");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected MaxRetriesExceeded, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result: WorkerResult<()> = run("test op", fast_policy(3), move || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(WorkerError::InvalidPayload("bad".to_string()))
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(WorkerError::InvalidPayload(_))));
    }

    #[tokio::test]
    async fn test_run_or_none_swallows_failure() {
        let result: Option<i64> = run_or_none("find collection", fast_policy(2), || async {
            Err(transient())
        })
        .await;

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_run_or_none_passes_through_success() {
        let result = run_or_none("find collection", fast_policy(2), || async {
            Ok::<_, WorkerError>(Some(99))
        })
        .await;

        assert_eq!(result, Some(Some(99)));
    }
}
