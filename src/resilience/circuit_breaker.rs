//! Circuit breaker
//!
//! State transitions:
//! - Closed → Open: after `failure_threshold` consecutive failures
//! - Open → HalfOpen: once `timeout` has elapsed; exactly one trial call
//! - HalfOpen → Closed: trial succeeded
//! - HalfOpen → Open: trial failed

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, calls pass through
    Closed,
    /// Failing fast
    Open,
    /// Probing with a single trial call
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }

    /// Numeric value exported as a gauge
    pub fn as_gauge(&self) -> i64 {
        match self {
            Self::Closed => 0,
            Self::HalfOpen => 1,
            Self::Open => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Seconds to stay open before allowing a trial call
    pub timeout_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout_secs: 60,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Error returned by [`CircuitBreaker::call`]
#[derive(Debug, Error, PartialEq)]
pub enum BreakerError<E> {
    /// The circuit is open; the wrapped call was not attempted
    #[error("circuit breaker is open")]
    Open,
    /// The wrapped call ran and failed
    #[error(transparent)]
    Inner(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Open => None,
            Self::Inner(e) => Some(e),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    current: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Fail-fast guard around a repeatedly failing operation
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    timeout: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: &CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            failure_threshold: config.failure_threshold.max(1),
            timeout: config.timeout(),
            state: Mutex::new(BreakerState {
                current: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state, without side effects
    pub fn state(&self) -> CircuitState {
        self.lock().current
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Execute a future with circuit breaker protection
    pub async fn call<T, E, F, Fut>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.try_acquire() {
            return Err(BreakerError::Open);
        }

        let mut guard = CallGuard {
            breaker: self,
            settled: false,
        };
        let result = f().await;
        guard.settled = true;

        match result {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure();
                Err(BreakerError::Inner(e))
            }
        }
    }

    /// Decide whether a call may proceed
    fn try_acquire(&self) -> bool {
        let mut state = self.lock();

        match state.current {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => {
                if state.trial_in_flight {
                    false
                } else {
                    state.trial_in_flight = true;
                    true
                }
            }
            CircuitState::Open => {
                let elapsed = state
                    .opened_at
                    .map_or(true, |opened| opened.elapsed() >= self.timeout);

                if elapsed {
                    info!(breaker = %self.name, "Circuit breaker: Open → HalfOpen");
                    state.current = CircuitState::HalfOpen;
                    state.trial_in_flight = true;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn record_success(&self) {
        let mut state = self.lock();

        if state.current != CircuitState::Closed {
            info!(breaker = %self.name, "Circuit breaker: {} → Closed", state.current.as_str());
        }

        state.current = CircuitState::Closed;
        state.consecutive_failures = 0;
        state.opened_at = None;
        state.trial_in_flight = false;
    }

    fn record_failure(&self) {
        let mut state = self.lock();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);

        match state.current {
            CircuitState::Closed => {
                if state.consecutive_failures >= self.failure_threshold {
                    warn!(
                        breaker = %self.name,
                        failures = state.consecutive_failures,
                        "Circuit breaker: Closed → Open"
                    );
                    state.current = CircuitState::Open;
                    state.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                warn!(breaker = %self.name, "Circuit breaker: HalfOpen → Open (trial failed)");
                state.current = CircuitState::Open;
                state.opened_at = Some(Instant::now());
                state.trial_in_flight = false;
            }
            CircuitState::Open => {}
        }
    }

    /// A call was dropped before it completed
    fn record_abandoned(&self) {
        let mut state = self.lock();

        if state.current == CircuitState::HalfOpen && state.trial_in_flight {
            warn!(breaker = %self.name, "Circuit breaker: HalfOpen → Open (trial abandoned)");
            state.current = CircuitState::Open;
            state.opened_at = Some(Instant::now());
            state.trial_in_flight = false;
        }
    }
}

/// Settles an in-flight call that was cancelled mid-await
struct CallGuard<'a> {
    breaker: &'a CircuitBreaker,
    settled: bool,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.record_abandoned();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn breaker(threshold: u32, timeout_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            &CircuitBreakerConfig {
                failure_threshold: threshold,
                timeout_secs,
            },
        )
    }

    async fn fail(cb: &CircuitBreaker) -> Result<(), BreakerError<&'static str>> {
        cb.call(|| async { Err("boom") }).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold() {
        let cb = breaker(3, 60);

        for _ in 0..2 {
            assert_eq!(fail(&cb).await, Err(BreakerError::Inner("boom")));
        }
        assert_eq!(cb.state(), CircuitState::Closed);

        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_fails_fast_without_calling() {
        let cb = breaker(1, 60);
        fail(&cb).await.unwrap_err();

        let calls = AtomicU32::new(0);
        let result = cb
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>(())
            })
            .await;

        assert!(result.unwrap_err().is_open());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_count() {
        let cb = breaker(3, 60);
        fail(&cb).await.unwrap_err();
        fail(&cb).await.unwrap_err();
        cb.call(|| async { Ok::<_, &str>(()) }).await.unwrap();

        assert_eq!(cb.consecutive_failures(), 0);
        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_success_closes() {
        let cb = breaker(1, 60);
        fail(&cb).await.unwrap_err();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(fail(&cb).await.unwrap_err().is_open());

        tokio::time::advance(Duration::from_secs(1)).await;
        cb.call(|| async { Ok::<_, &str>(()) }).await.unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_failure_reopens() {
        let cb = breaker(2, 30);
        fail(&cb).await.unwrap_err();
        fail(&cb).await.unwrap_err();

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(fail(&cb).await, Err(BreakerError::Inner("boom")));
        assert_eq!(cb.state(), CircuitState::Open);

        // timer restarts from the failed trial
        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(fail(&cb).await.unwrap_err().is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_trial_in_half_open() {
        let cb = Arc::new(breaker(1, 10));
        fail(&cb).await.unwrap_err();
        tokio::time::advance(Duration::from_secs(10)).await;

        let gate = Arc::new(tokio::sync::Notify::new());
        let trial = {
            let cb = Arc::clone(&cb);
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                cb.call(|| async move {
                    gate.notified().await;
                    Ok::<_, &str>(())
                })
                .await
            })
        };

        tokio::task::yield_now().await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        let calls = AtomicU32::new(0);
        let second = cb
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>(())
            })
            .await;
        assert!(second.unwrap_err().is_open());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        gate.notify_one();
        trial.await.unwrap().unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_trial_reopens_instead_of_jamming() {
        let cb = breaker(1, 10);
        fail(&cb).await.unwrap_err();
        tokio::time::advance(Duration::from_secs(10)).await;

        let trial = cb.call(|| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<_, &str>(())
        });
        assert!(tokio::time::timeout(Duration::from_secs(1), trial)
            .await
            .is_err());
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(10)).await;
        cb.call(|| async { Ok::<_, &str>(()) }).await.unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_call_while_closed_is_not_a_failure() {
        let cb = breaker(1, 10);

        let call = cb.call(|| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<_, &str>(())
        });
        assert!(tokio::time::timeout(Duration::from_secs(1), call)
            .await
            .is_err());

        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
    }
}
