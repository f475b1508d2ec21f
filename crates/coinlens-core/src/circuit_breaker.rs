//! Per-adapter circuit breaker.
//!
//! ```text
//! Closed --(threshold consecutive failures)--> Open
//! Open --(open_timeout elapsed, next call)--> HalfOpen
//! HalfOpen --(success)--> Closed
//! HalfOpen --(failure)--> Open
//! ```
//!
//! A [`CircuitCall`] dropped before it is settled counts as a failure, so a
//! call cancelled by an outer timeout still moves the state machine.
//!
//! Time is read from `tokio::time`, so paused-clock tests drive the
//! transitions deterministically.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::data_source::SourceError;
use crate::ProviderId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct CircuitInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

impl CircuitInner {
    const fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
        }
    }

    /// Moves an open circuit to half-open once `open_timeout` has passed.
    fn admit(&mut self, open_timeout: Duration) -> bool {
        match (self.state, self.opened_at) {
            (CircuitState::Closed | CircuitState::HalfOpen, _) => true,
            (CircuitState::Open, Some(opened_at)) if opened_at.elapsed() >= open_timeout => {
                self.state = CircuitState::HalfOpen;
                self.opened_at = None;
                true
            }
            (CircuitState::Open, _) => false,
        }
    }

    /// Returns `true` when this failure tripped the circuit.
    fn fail(&mut self, threshold: u32) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let trips = self.state == CircuitState::HalfOpen || self.consecutive_failures >= threshold;
        if !trips {
            return false;
        }
        let was_open = self.state == CircuitState::Open;
        self.state = CircuitState::Open;
        self.opened_at = Some(Instant::now());
        !was_open
    }
}

/// Circuit breaker shared by every call one adapter makes.
///
/// An open circuit makes the adapter fail fast with
/// [`SourceError::unavailable`], which the aggregator records like any other
/// source failure.
#[derive(Debug)]
pub struct CircuitBreaker {
    provider: ProviderId,
    config: CircuitBreakerConfig,
    inner: Mutex<CircuitInner>,
}

impl CircuitBreaker {
    pub fn new(provider: ProviderId, config: CircuitBreakerConfig) -> Self {
        Self {
            provider,
            config,
            inner: Mutex::new(CircuitInner::closed()),
        }
    }

    pub fn with_defaults(provider: ProviderId) -> Self {
        Self::new(provider, CircuitBreakerConfig::default())
    }

    pub fn check(&self) -> Result<(), SourceError> {
        if self.lock().admit(self.config.open_timeout) {
            return Ok(());
        }
        Err(SourceError::unavailable(format!(
            "{} circuit breaker is open; skipping upstream call",
            self.provider
        )))
    }

    /// Admits one upstream call, or fails fast while the circuit is open.
    pub fn call(&self) -> Result<CircuitCall<'_>, SourceError> {
        self.check()?;
        Ok(CircuitCall {
            breaker: self,
            settled: false,
        })
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state != CircuitState::Closed {
            info!(source = %self.provider, "circuit breaker closed");
        }
        *inner = CircuitInner::closed();
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        if inner.fail(self.config.failure_threshold) {
            warn!(
                source = %self.provider,
                failures = inner.consecutive_failures,
                "circuit breaker opened"
            );
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    fn lock(&self) -> MutexGuard<'_, CircuitInner> {
        self.inner
            .lock()
            .expect("circuit breaker lock is not poisoned")
    }
}

/// One admitted call through a [`CircuitBreaker`].
#[must_use = "an unsettled call counts as a failure when dropped"]
#[derive(Debug)]
pub struct CircuitCall<'a> {
    breaker: &'a CircuitBreaker,
    settled: bool,
}

impl CircuitCall<'_> {
    pub fn succeeded(mut self) {
        self.settled = true;
        self.breaker.record_success();
    }

    pub fn failed(mut self) {
        self.settled = true;
        self.breaker.record_failure();
    }

    /// Settles the call without counting it either way.
    pub fn release(mut self) {
        self.settled = true;
    }
}

impl Drop for CircuitCall<'_> {
    fn drop(&mut self) {
        if !self.settled {
            debug!(source = %self.breaker.provider, "upstream call dropped before completion");
            self.breaker.record_failure();
        }
    }
}
