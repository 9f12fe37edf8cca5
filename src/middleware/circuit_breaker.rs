use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls go through
    Closed,
    /// Calls fail fast without reaching the generative service
    Open,
    /// Cooldown elapsed, calls go through to probe the service
    HalfOpen,
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: usize,
    /// How long the circuit stays open before probing
    pub cooldown: Duration,
    /// Consecutive probe successes that close the circuit again
    pub success_threshold: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
            success_threshold: 2,
        }
    }
}

/// Shared breaker guarding every call to the generative service.
///
/// Once open, calls fail fast with `ApiError::CircuitOpen` until the cooldown
/// elapses.
#[derive(Clone)]
pub struct CircuitBreaker {
    inner: Arc<RwLock<BreakerInner>>,
    config: CircuitBreakerConfig,
}

struct BreakerInner {
    state: CircuitState,
    consecutive_failures: usize,
    probe_successes: usize,
    opened_at: Option<Instant>,
    trips: usize,
    total_failures: usize,
    total_successes: usize,
}

/// Circuit breaker statistics
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub consecutive_failures: usize,
    pub trips: usize,
    pub total_failures: usize,
    pub total_successes: usize,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                probe_successes: 0,
                opened_at: None,
                trips: 0,
                total_failures: 0,
                total_successes: 0,
            })),
            config,
        }
    }

    /// Returns false when the call should fail fast
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.write();

        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let cooled = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.cooldown)
                    .unwrap_or(true);
                if cooled {
                    info!("Circuit half-open, probing generative service");
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_successes = 0;
                }
                cooled
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.write();
        inner.total_successes += 1;
        inner.consecutive_failures = 0;

        if inner.state != CircuitState::Closed {
            inner.probe_successes += 1;
            if inner.probe_successes >= self.config.success_threshold {
                info!("Circuit closed, generative service recovered");
                inner.state = CircuitState::Closed;
                inner.probe_successes = 0;
                inner.opened_at = None;
            } else {
                inner.state = CircuitState::HalfOpen;
            }
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.write();
        inner.total_failures += 1;
        inner.consecutive_failures += 1;
        inner.probe_successes = 0;

        let should_open = match inner.state {
            CircuitState::Closed => inner.consecutive_failures >= self.config.failure_threshold,
            CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        };

        if should_open {
            warn!(
                "Circuit opened after {} consecutive failures (cooldown {}s)",
                inner.consecutive_failures,
                self.config.cooldown.as_secs()
            );
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            inner.trips += 1;
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.read().state
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.read();
        CircuitBreakerStats {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            trips: inner.trips,
            total_failures: inner.total_failures,
            total_successes: inner.total_successes,
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}
