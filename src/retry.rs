//! Bounded exponential backoff for transient I/O faults.
//!
//! One policy is applied at the boundary of each loop (telemetry emission,
//! metric persistence) instead of ad-hoc handling at every call site.
//! Delays double from `base_delay` and are capped at `max_delay`; after
//! `max_attempts` total tries the last error is returned to the caller,
//! which treats it as fatal for its loop.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::config::defaults::RETRY_MAX_BACKOFF_EXPONENT;

/// Classifies whether an error is worth retrying.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Retry budget for a single operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

/// The operation failed and the policy gave up.
#[derive(Debug, thiserror::Error)]
#[error("{operation} failed after {attempts} attempt(s): {source}")]
pub struct RetryExhausted<E: std::error::Error + 'static> {
    pub operation: &'static str,
    pub attempts: u32,
    #[source]
    pub source: E,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    /// Single attempt, no backoff.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay slept after the `failures`-th consecutive failure (1-based).
    pub fn backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(RETRY_MAX_BACKOFF_EXPONENT);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds, a non-transient error occurs, or the
    /// attempt budget is spent.
    ///
    /// Cancel-safe: dropping the returned future stops any pending backoff.
    pub async fn run<T, E, F, Fut>(
        &self,
        operation: &'static str,
        mut op: F,
    ) -> Result<T, RetryExhausted<E>>
    where
        E: std::error::Error + Transient + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempts < self.max_attempts => {
                    let delay = self.backoff(attempts);
                    warn!(
                        operation,
                        attempt = attempts,
                        max_attempts = self.max_attempts,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(source) => {
                    return Err(RetryExhausted {
                        operation,
                        attempts,
                        source,
                    })
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        use crate::config::defaults::{RETRY_BASE_DELAY_MS, RETRY_MAX_ATTEMPTS, RETRY_MAX_DELAY_MS};
        Self::new(
            RETRY_MAX_ATTEMPTS,
            Duration::from_millis(RETRY_BASE_DELAY_MS),
            Duration::from_millis(RETRY_MAX_DELAY_MS),
        )
    }
}
