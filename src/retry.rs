//! Bounded exponential backoff for calls to external services.

use std::future::Future;
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;

/// Retry policy for one class of external calls.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds.
    pub base_delay_ms: u64,
    /// Cap for the backoff delay, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay after the given zero-based attempt, doubling per
    /// attempt and capped at `max_delay_ms`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay_ms
            .saturating_mul(1u64 << attempt.min(16))
            .min(self.max_delay_ms);
        Duration::from_millis(exp)
    }
}

/// Run `op` up to `policy.max_attempts` times, sleeping with backoff
/// between attempts. Returns the first success or the last error.
pub async fn with_retries<T, E, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= policy.max_attempts.max(1) {
                    return Err(err);
                }
                let delay = policy.delay(attempt - 1);
                warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                    what, attempt, policy.max_attempts, err, delay
                );
                sleep(delay).await;
            }
        }
    }
}
