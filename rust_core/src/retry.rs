//! Retry with exponential backoff for transient failures
//!
//! Shared by the quote fetch and sink delivery. Whether an error is worth
//! another attempt is decided by the caller.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Backoff configuration for one retried operation
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (minimum 1)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_backoff_ms: u64,
    /// Upper bound for any single delay
    pub max_backoff_ms: u64,
    /// Jitter as a fraction of the delay (0.1 = ±10%)
    pub jitter_pct: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 100,
            max_backoff_ms: 5_000,
            jitter_pct: 0.1,
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn new(max_attempts: u32, base_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff_ms,
            max_backoff_ms: max_backoff_ms.max(base_backoff_ms),
            ..Self::default()
        }
    }

    /// Delay to wait after `attempt` (1-based) has failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_backoff_ms
            .saturating_mul(2_u64.saturating_pow(attempt.saturating_sub(1)));
        let capped = exponential.min(self.max_backoff_ms) as f64;

        let jitter_range = capped * self.jitter_pct;
        let jitter = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };

        Duration::from_millis((capped + jitter).max(0.0) as u64)
    }
}

/// Result of a retried operation and how many attempts it took.
#[derive(Debug)]
pub struct Retried<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

/// Run `f` until it succeeds, fails with a non-retriable error, or the
/// policy's attempts are used up.
pub async fn execute_with_retry<F, Fut, T, E, P>(
    mut f: F,
    policy: &RetryPolicy,
    is_retriable: P,
) -> Retried<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match f().await {
            Ok(value) => {
                return Retried {
                    result: Ok(value),
                    attempts: attempt,
                }
            }
            Err(e) if attempt < max_attempts && is_retriable(&e) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "Operation failed (attempt {}/{}): {}. Retrying in {}ms",
                    attempt,
                    max_attempts,
                    e,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                return Retried {
                    result: Err(e),
                    attempts: attempt,
                }
            }
        }
    }
}
