//! Per-connector circuit breaker.
//!
//! Shields external systems from repeated calls while they are failing.
//! Closed passes requests through, Open rejects them, and HalfOpen lets
//! probes through after a cooldown until enough successes close the
//! circuit again.

use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, requests pass through.
    Closed,
    /// Failure threshold reached, requests are rejected.
    Open,
    /// Probing recovery after cooldown.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Tuning knobs for a circuit breaker.
#[derive(Debug, Clone)]
pub struct CircuitConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// Successes in half-open state required to close.
    pub success_threshold: u32,
    /// How long the circuit stays open before probing.
    pub cooldown: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            cooldown: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    opened_at: Option<Instant>,
}

/// Circuit breaker guarding one connector.
pub struct CircuitBreaker {
    name: String,
    config: CircuitConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: &str, config: CircuitConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                opened_at: None,
            }),
        }
    }

    pub fn with_defaults(name: &str) -> Self {
        Self::new(name, CircuitConfig::default())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current state, applying the Open to HalfOpen
    /// transition when the cooldown has elapsed.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.maybe_half_open(&mut inner);
        inner.state
    }

    /// Returns true when a request may proceed. Open circuits transition
    /// to half-open once the cooldown elapses.
    pub fn can_execute(&self) -> bool {
        let mut inner = self.lock();
        self.maybe_half_open(&mut inner);
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        }
    }

    /// Records a successful call. Returns true when the call closed a
    /// half-open circuit.
    pub fn record_success(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
                false
            }
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                debug!(
                    name = %self.name,
                    successes = inner.half_open_successes,
                    threshold = self.config.success_threshold,
                    "Probe succeeded in half-open circuit"
                );
                if inner.half_open_successes >= self.config.success_threshold {
                    info!(name = %self.name, "Circuit breaker closed");
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.half_open_successes = 0;
                    inner.opened_at = None;
                    return true;
                }
                false
            }
            CircuitState::Open => false,
        }
    }

    /// Records a failed call. Returns true when the failure opened the
    /// circuit.
    pub fn record_failure(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                debug!(
                    name = %self.name,
                    failures = inner.consecutive_failures,
                    threshold = self.config.failure_threshold,
                    "Connector failure recorded"
                );
                if inner.consecutive_failures >= self.config.failure_threshold {
                    warn!(name = %self.name, "Circuit breaker opened");
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    return true;
                }
                false
            }
            CircuitState::HalfOpen => {
                warn!(name = %self.name, "Probe failed, reopening circuit");
                inner.state = CircuitState::Open;
                inner.half_open_successes = 0;
                inner.opened_at = Some(Instant::now());
                true
            }
            CircuitState::Open => false,
        }
    }

    /// Forces the circuit back to closed.
    pub fn reset(&self) {
        let mut inner = self.lock();
        if inner.state != CircuitState::Closed {
            info!(name = %self.name, "Circuit breaker reset");
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.half_open_successes = 0;
        inner.opened_at = None;
    }

    fn maybe_half_open(&self, inner: &mut BreakerInner) {
        if inner.state == CircuitState::Open {
            let elapsed = inner
                .opened_at
                .map(|t| t.elapsed())
                .unwrap_or(Duration::ZERO);
            if elapsed >= self.config.cooldown {
                info!(name = %self.name, "Circuit breaker entering half-open state");
                inner.state = CircuitState::HalfOpen;
                inner.half_open_successes = 0;
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
