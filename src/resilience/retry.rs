//! Retry with exponential backoff
//!
//! Wraps any fallible async operation. The first attempt runs immediately;
//! each retry waits `base_delay_ms * backoff_multiplier^(n-1)`, capped at
//! `max_delay_ms`.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Extra attempts after the first one
    pub max_retries: u32,

    /// Delay before the first retry
    pub base_delay_ms: u64,

    /// Upper bound for any single delay
    pub max_delay_ms: u64,

    /// Factor applied to the delay after each failure
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a configuration with custom max retries
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Create a configuration with custom delays
    pub fn with_delays(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms,
            ..Default::default()
        }
    }

    /// Configuration that never retries
    pub fn none() -> Self {
        Self::new(0)
    }

    /// Delay before retry number `attempt` (1-based); zero for the first call
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let exponential = self.base_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = if exponential.is_finite() {
            (exponential as u64).min(self.max_delay_ms)
        } else {
            self.max_delay_ms
        };

        Duration::from_millis(capped)
    }
}

/// Execute an operation with retry logic and exponential backoff
///
/// Returns the first success, or the last error once all attempts failed.
///
/// ```no_run
/// use trendbot::resilience::{with_retry, RetryConfig};
///
/// # async fn run() -> Result<(), std::io::Error> {
/// let config = RetryConfig::default();
/// let value = with_retry(&config, || async { Ok::<_, std::io::Error>(42) }).await?;
/// # Ok(())
/// # }
/// ```
pub async fn with_retry<T, E, F, Fut>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    with_retry_if(config, operation, |_| true).await
}

/// Execute an operation with retry logic, retrying only errors accepted by
/// `should_retry`
///
/// A rejected error is returned immediately without further attempts.
pub async fn with_retry_if<T, E, F, Fut, P>(
    config: &RetryConfig,
    mut operation: F,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => {
                if !should_retry(&e) {
                    warn!(error = %e, "Non-retryable error encountered");
                    return Err(e);
                }

                if attempt >= config.max_retries {
                    warn!(
                        attempts = attempt + 1,
                        error = %e,
                        "Operation failed, retries exhausted"
                    );
                    return Err(e);
                }

                attempt += 1;
                let delay = config.calculate_delay(attempt);
                warn!(
                    attempt,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Operation failed, will retry"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
