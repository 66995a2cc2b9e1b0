//! Bounded exponential backoff for transient cache I/O.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, warn};

use ragindex_core::config::CacheSettings;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    /// Total attempts including the first; at least 1.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { initial_delay: Duration::from_millis(500), max_delay: Duration::from_secs(10), backoff_factor: 2.0, max_attempts: 3 }
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self { initial_delay: settings.retry_initial_delay(), max_attempts: settings.retry_attempts.max(1), ..Self::default() }
    }

    /// No retries; the first error is returned.
    pub fn none() -> Self { Self { max_attempts: 1, ..Self::default() } }

    /// Delay after the zero-based `attempt` failed.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt.min(31)).unwrap_or(31);
        let delay = self.initial_delay.as_secs_f64() * self.backoff_factor.max(1.0).powi(exp);
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }
}

pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, op: &str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt + 1 < attempts => {
                let delay = policy.delay_for_attempt(attempt);
                debug!(op, attempt, error = %e, delay_ms = delay.as_millis() as u64, "retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                warn!(op, attempts, error = %e, "giving up");
                return Err(e);
            }
        }
    }
}
