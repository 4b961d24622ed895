//! Deadlines and bounded exponential backoff for backing-store calls.
//!
//! Every call into a `TableBackend` goes through [`with_retry`]: each attempt
//! runs under the per-call deadline, an expired deadline counts as
//! `StoreUnavailable`, and only that error class is attempted again.

use crate::error::{DirectoryError, DirectoryResult};

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Deadline applied to each individual attempt.
    pub call_timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 4,
            base_delay_ms: 150,
            max_delay_ms: 1200,
            call_timeout_ms: 500,
        }
    }
}

impl RetryPolicy {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// Runs `call` until it succeeds, fails with a non-retryable error, or the
/// attempt budget is spent.
///
/// The closure is invoked once per attempt, so anything that must stay stable
/// across attempts (the operation id of a mutation, for one) has to be
/// captured by the caller rather than created inside it.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, op: &str, mut call: F) -> DirectoryResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DirectoryResult<T>>,
{
    let mut delay_ms = policy.base_delay_ms;
    let mut last_error = None;

    for attempt in 0..policy.attempts {
        let outcome = match tokio::time::timeout(policy.call_timeout(), call()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(DirectoryError::unavailable(format!(
                "{} timed out after {}ms",
                op, policy.call_timeout_ms
            ))),
        };

        match outcome {
            Err(e) if e.is_retryable() => {
                if attempt + 1 == policy.attempts {
                    last_error = Some(e);
                    break;
                }
                tracing::warn!(
                    "{} failed (attempt {}/{}): {}",
                    op,
                    attempt + 1,
                    policy.attempts,
                    e
                );
                let jitter = rand::random::<u64>() % (delay_ms / 3 + 1);
                tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                delay_ms = (delay_ms * 2).min(policy.max_delay_ms);
                last_error = Some(e);
            }
            other => return other,
        }
    }

    Err(last_error.unwrap_or_else(|| {
        DirectoryError::unavailable(format!("{}: retry attempts exhausted", op))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_policy(attempts: usize) -> RetryPolicy {
        RetryPolicy {
            attempts,
            base_delay_ms: 1,
            max_delay_ms: 4,
            call_timeout_ms: 50,
        }
    }

    #[tokio::test]
    async fn test_retries_transient_errors_until_success() {
        let calls = Arc::new(AtomicUsize::new(0));

        let result = with_retry(&fast_policy(4), "flaky", || {
            let calls = calls.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(DirectoryError::unavailable("blip"))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_caller_errors() {
        let calls = Arc::new(AtomicUsize::new(0));

        let result: DirectoryResult<()> = with_retry(&fast_policy(4), "conflict", || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(DirectoryError::conflict("photo 1:0"))
            }
        })
        .await;

        assert!(matches!(result, Err(DirectoryError::Conflict { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_attempt_budget() {
        let calls = Arc::new(AtomicUsize::new(0));

        let result: DirectoryResult<()> = with_retry(&fast_policy(3), "down", || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(DirectoryError::unavailable("connection refused"))
            }
        })
        .await;

        assert!(matches!(result, Err(DirectoryError::StoreUnavailable { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_deadline_expiry_counts_as_unavailable() {
        let result: DirectoryResult<()> = with_retry(&fast_policy(2), "slow", || async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(())
        })
        .await;

        match result {
            Err(DirectoryError::StoreUnavailable { message }) => {
                assert!(message.contains("timed out"));
            }
            other => panic!("expected StoreUnavailable, got {:?}", other),
        }
    }
}
