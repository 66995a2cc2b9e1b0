//! Circuit breaker for one external call-site.
//!
//! CLOSED counts failures and opens at `failure_threshold`. OPEN rejects
//! without calling until `recovery_timeout` has passed since the last failure,
//! then lets exactly one probe through (HALF-OPEN). A successful probe closes
//! the circuit and clears the count; a failed one reopens it. Successes while
//! CLOSED do not clear the count.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

use ragindex_core::config::BreakerSettings;

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
}

impl CircuitBreakerConfig {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self { failure_threshold: failure_threshold.max(1), recovery_timeout }
    }

    pub fn from_settings(settings: &BreakerSettings) -> Self { Self::new(settings.failure_threshold, settings.recovery_timeout()) }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self { Self::new(5, Duration::from_secs(60)) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// Rejected without calling; the service is deliberately off-limits.
    #[error("circuit open")]
    Open,
    #[error("call timed out after {0:?}")]
    TimedOut(Duration),
    #[error("call failed: {0}")]
    Failed(E),
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failures: u32,
    last_failure: Option<Instant>,
    probe_in_flight: bool,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

/// One admitted call. Dropping it unsettled (the caller's future was cancelled)
/// counts as a failure.
struct Attempt<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl Attempt<'_> {
    fn succeed(mut self) {
        self.settled = true;
        self.breaker.on_success(self.probe);
    }

    fn fail(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.probe);
    }
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        if !self.settled { self.breaker.on_failure(self.probe); }
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner { state: CircuitState::Closed, failures: 0, last_failure: None, probe_in_flight: false }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> { self.inner.lock().unwrap_or_else(PoisonError::into_inner) }

    pub fn name(&self) -> &str { &self.name }

    /// State as of the last call; an OPEN circuit past its timeout still reads OPEN until the next call.
    pub fn state(&self) -> CircuitState { self.lock().state }

    pub fn failures(&self) -> u32 { self.lock().failures }

    fn admit(&self) -> Option<Attempt<'_>> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Some(Attempt { breaker: self, probe: false, settled: false }),
            CircuitState::Open => {
                let cooled = inner.last_failure.map_or(true, |t| t.elapsed() > self.config.recovery_timeout);
                if !cooled { return None; }
                inner.state = CircuitState::HalfOpen;
                inner.probe_in_flight = true;
                info!(circuit = %self.name, "circuit half-open, probing");
                Some(Attempt { breaker: self, probe: true, settled: false })
            }
            CircuitState::HalfOpen if inner.probe_in_flight => None,
            CircuitState::HalfOpen => {
                inner.probe_in_flight = true;
                Some(Attempt { breaker: self, probe: true, settled: false })
            }
        }
    }

    fn on_success(&self, probe: bool) {
        let mut inner = self.lock();
        if probe && inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Closed;
            inner.failures = 0;
            inner.probe_in_flight = false;
            info!(circuit = %self.name, "circuit closed");
        }
    }

    fn on_failure(&self, probe: bool) {
        let mut inner = self.lock();
        inner.failures += 1;
        inner.last_failure = Some(Instant::now());
        let reopen = probe && inner.state == CircuitState::HalfOpen;
        let trip = inner.state == CircuitState::Closed && inner.failures >= self.config.failure_threshold;
        if reopen || trip {
            inner.state = CircuitState::Open;
            inner.probe_in_flight = false;
            warn!(circuit = %self.name, failures = inner.failures, "circuit open");
        }
    }

    /// Runs `f` unless the circuit is open.
    pub async fn call<T, E, F, Fut>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempt = self.admit().ok_or(BreakerError::Open)?;
        match f().await {
            Ok(value) => { attempt.succeed(); Ok(value) }
            Err(e) => { attempt.fail(); Err(BreakerError::Failed(e)) }
        }
    }

    /// Like [`CircuitBreaker::call`], with running past `limit` counted as a failure.
    pub async fn call_with_timeout<T, E, F, Fut>(&self, limit: Duration, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempt = self.admit().ok_or(BreakerError::Open)?;
        match tokio::time::timeout(limit, f()).await {
            Ok(Ok(value)) => { attempt.succeed(); Ok(value) }
            Ok(Err(e)) => { attempt.fail(); Err(BreakerError::Failed(e)) }
            Err(_) => { attempt.fail(); Err(BreakerError::TimedOut(limit)) }
        }
    }
}
