//! Minimum-spacing rate limiter

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

/// Enforces a minimum interval between successive calls
///
/// Burst size is one: a call made too soon after the previous one waits out
/// the remainder of the interval. A zero interval disables limiting.
pub struct RateLimiter {
    limiter: Option<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    interval: Duration,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        let limiter = Quota::with_period(interval)
            .map(|quota| GovernorLimiter::direct(quota.allow_burst(NonZeroU32::MIN)));

        Self { limiter, interval }
    }

    /// Limit to `calls` per minute; zero disables limiting
    pub fn per_minute(calls: u32) -> Self {
        if calls == 0 {
            return Self::unlimited();
        }
        Self::new(Duration::from_secs(60) / calls)
    }

    pub fn unlimited() -> Self {
        Self {
            limiter: None,
            interval: Duration::ZERO,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until the next call is allowed
    pub async fn acquire(&self) {
        let Some(limiter) = &self.limiter else {
            return;
        };

        if limiter.check().is_err() {
            debug!(interval_ms = self.interval.as_millis() as u64, "Rate limited, waiting");
            limiter.until_ready().await;
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("interval", &self.interval)
            .finish()
    }
}
