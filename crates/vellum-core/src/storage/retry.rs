//! Bounded retry with exponential backoff for collaborator calls.
//!
//! Only transient store failures are retried. Authentication errors,
//! conflicts, and missing records surface immediately: retrying those
//! would either hammer a backend that already gave a definitive answer
//! or mask a real bug.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::traits::StoreError;

/// Retry policy for transient collaborator failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first (minimum 1)
    pub max_attempts: u32,

    /// Delay before the first retry; doubles after each failure
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    /// Policy that never retries. Used by tests and interactive paths.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
        }
    }

    /// Policy with custom bounds.
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

/// Run a store operation, retrying transient failures with backoff.
///
/// # Arguments
///
/// * `policy` - Attempt and delay bounds
/// * `op_name` - Operation label for retry logs
/// * `op` - Closure producing the store future; called once per attempt
pub async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    op_name: &str,
    mut op: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut delay = policy.initial_backoff;

    for attempt in 1..=policy.max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                warn!(op = op_name, attempt, ?delay, error = %err, "Transient store failure, retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(err) => return Err(err),
        }
    }

    // max_attempts >= 1 means the loop always returns before this point.
    unreachable!("retry loop exhausted without returning")
}
