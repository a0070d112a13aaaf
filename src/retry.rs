//! Bounded retry with a fixed delay between attempts

use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

use crate::error::{AppError, Result};

/// How many times an operation may run and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero is treated as one.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    pub fn from_millis(max_attempts: u32, delay_ms: u64) -> Self {
        Self::new(max_attempts, Duration::from_millis(delay_ms))
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Worst-case time spent across every attempt when each one runs for `per_attempt`
    pub fn budget(&self, per_attempt: Duration) -> Duration {
        let attempts = self.attempts();
        per_attempt * attempts + self.delay * (attempts - 1)
    }
}

/// Run `op` until it succeeds, the predicate rejects its error, or the policy
/// is exhausted. The closure receives the 1-based attempt number. The error
/// of the final attempt is returned unchanged.
pub async fn retry<T, F, Fut, P>(
    policy: RetryPolicy,
    label: &str,
    mut is_retryable: P,
    mut op: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
    P: FnMut(&AppError) -> bool,
{
    let max_attempts = policy.attempts();
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts && is_retryable(&e) => {
                warn!(
                    operation = %label,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = policy.delay.as_millis() as u64,
                    error = %e,
                    "Attempt failed, retrying"
                );
                if !policy.delay.is_zero() {
                    tokio::time::sleep(policy.delay).await;
                }
                attempt += 1;
            }
            Err(e) => {
                error!(
                    operation = %label,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    error = %e,
                    "Giving up"
                );
                return Err(e);
            }
        }
    }
}
