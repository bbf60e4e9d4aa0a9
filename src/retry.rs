//! Bounded exponential backoff for idempotent reads
//!
//! Only operations that can be repeated without side effects go through
//! here: fetching a source image, downloading an edit result by URL and
//! listing planner models. Paid generation calls never do.

use crate::error::Result;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Backoff parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total calls, the first one included
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Symmetric jitter as a fraction of the delay (0.3 = ±30 %)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(600),
            jitter: 0.3,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based)
    ///
    /// `unit` is a sample in `[0, 1)`; 0.5 yields the undithered delay.
    #[must_use]
    pub fn delay_for(&self, retry: u32, unit: f64) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        let base = self.base_delay.as_secs_f64() * f64::from(1u32 << exponent);
        let offset = base * self.jitter * (2.0 * unit.clamp(0.0, 1.0) - 1.0);
        Duration::from_secs_f64((base + offset).max(0.0))
    }
}

/// Run `operation`, retrying transient failures per `policy`
///
/// Non-transient errors (see [`crate::StagingError::is_transient`]) are
/// returned immediately.
///
/// # Errors
/// The last error once attempts are exhausted.
pub async fn retry_with_backoff<T, F, Fut>(policy: &RetryPolicy, label: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt, rand::thread_rng().gen::<f64>());
                tracing::warn!(
                    operation = %label,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            },
            Err(error) => return Err(error),
        }
    }
}
