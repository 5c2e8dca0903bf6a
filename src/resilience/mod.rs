//! Failure handling around external calls
//!
//! Three independent primitives ([`RateLimiter`], [`CircuitBreaker`],
//! [`with_retry`]) and a [`ResiliencePolicy`] composing them around a single
//! `execute` call: the rate limiter spaces calls, the breaker guards the call,
//! and retries run inside the breaker so one exhausted retry sequence counts
//! as one breaker failure.

pub mod circuit_breaker;
pub mod rate_limit;
pub mod retry;

pub use circuit_breaker::{BreakerError, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use rate_limit::RateLimiter;
pub use retry::{with_retry, with_retry_if, RetryConfig};

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;

use crate::metrics;

/// Settings for one [`ResiliencePolicy`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub retry: RetryConfig,
    pub breaker: CircuitBreakerConfig,
    /// Maximum calls per minute, 0 for unlimited
    pub calls_per_minute: u32,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            breaker: CircuitBreakerConfig::default(),
            calls_per_minute: 60,
        }
    }
}

/// Rate limit, circuit breaker and retry composed around one operation
#[derive(Debug)]
pub struct ResiliencePolicy {
    name: String,
    retry: RetryConfig,
    limiter: RateLimiter,
    breaker: CircuitBreaker,
}

impl ResiliencePolicy {
    pub fn new(name: impl Into<String>, config: &ResilienceConfig) -> Self {
        let name = name.into();
        Self {
            limiter: RateLimiter::per_minute(config.calls_per_minute),
            breaker: CircuitBreaker::new(name.clone(), &config.breaker),
            retry: config.retry.clone(),
            name,
        }
    }

    /// Policy that never waits, retries or trips
    pub fn passthrough(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            limiter: RateLimiter::unlimited(),
            breaker: CircuitBreaker::new(
                name.clone(),
                &CircuitBreakerConfig {
                    failure_threshold: u32::MAX,
                    timeout_secs: 0,
                },
            ),
            retry: RetryConfig::none(),
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn breaker_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Run `operation`, retrying every error
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.execute_if(operation, |_| true).await
    }

    /// Run `operation`, retrying only errors accepted by `should_retry`
    pub async fn execute_if<T, E, F, Fut, P>(
        &self,
        operation: F,
        should_retry: P,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: Fn(&E) -> bool,
    {
        self.limiter.acquire().await;

        let result = self
            .breaker
            .call(|| with_retry_if(&self.retry, operation, should_retry))
            .await;

        metrics::set_breaker_state(&self.name, self.breaker.state().as_gauge());
        result
    }
}
