//! Failure-ratio circuit breaker for outbound fetches.
//!
//! Samples outcomes over a sliding window. Once the window holds at least
//! `minimum_throughput` samples and the failure ratio reaches
//! `failure_ratio`, the circuit opens and calls fail fast for
//! `break_duration`. After that a single probe is let through: success
//! closes the circuit, failure opens it again.
//!
//! ```text
//! ┌────────┐   ratio >= threshold   ┌──────┐   break elapsed   ┌──────────┐
//! │ Closed │ ─────────────────────→ │ Open │ ────────────────→ │ HalfOpen │
//! └────────┘                        └──────┘ ←── probe fails ── └──────────┘
//!      ↑                                                             │
//!      └─────────────────────── probe succeeds ──────────────────────┘
//! ```

use std::{collections::VecDeque, fmt, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::{CircuitBreakerConfig, MAX_BREAKER_DURATION_SECS};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, all requests pass through.
    Closed,
    /// Requests are rejected until `until`.
    Open { until: Instant },
    /// One probe is in flight since `probe_started`.
    HalfOpen { probe_started: Instant },
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open { .. } => write!(f, "open"),
            Self::HalfOpen { .. } => write!(f, "half_open"),
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    /// (when, succeeded)
    samples: VecDeque<(Instant, bool)>,
}

impl Inner {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some((at, _)) = self.samples.front() {
            if now.duration_since(*at) > window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    fn failure_ratio(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let failures = self.samples.iter().filter(|(_, ok)| !ok).count();
        failures as f64 / self.samples.len() as f64
    }
}

/// Thread-safe circuit breaker, cheap to clone.
///
/// All state is behind a `parking_lot::Mutex` with short critical
/// sections (no I/O under the lock).
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    name: Arc<str>,
    config: Arc<CircuitBreakerConfig>,
    inner: Arc<Mutex<Inner>>,
}

impl CircuitBreaker {
    pub fn new(name: &str, config: CircuitBreakerConfig) -> Self {
        Self {
            name: Arc::from(name),
            config: Arc::new(config),
            inner: Arc::new(Mutex::new(Inner {
                state: CircuitState::Closed,
                samples: VecDeque::new(),
            })),
        }
    }

    /// End of a break starting at `now`. Configs are validated, but a
    /// breaker built from a raw config must not overflow `Instant`.
    fn reopen_at(&self, now: Instant) -> Instant {
        let max = Duration::from_secs(MAX_BREAKER_DURATION_SECS);
        now + self.config.break_duration().min(max)
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Whether a call may proceed. `false` means fail fast.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open { until } if now >= until => {
                inner.state = CircuitState::HalfOpen { probe_started: now };
                tracing::info!(
                    circuit = %self.name,
                    new_state = "half_open",
                    "circuit breaker letting a probe request through",
                );
                true
            }
            CircuitState::Open { .. } => false,
            // A probe whose caller went away never reports back, so allow
            // a new one once a full break has passed.
            CircuitState::HalfOpen { probe_started }
                if now.duration_since(probe_started) >= self.config.break_duration() =>
            {
                inner.state = CircuitState::HalfOpen { probe_started: now };
                true
            }
            CircuitState::HalfOpen { .. } => false,
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        match inner.state {
            CircuitState::Closed => {
                inner.samples.push_back((now, true));
                inner.prune(now, self.config.sampling_window());
            }
            CircuitState::HalfOpen { .. } => {
                inner.state = CircuitState::Closed;
                inner.samples.clear();
                tracing::info!(
                    circuit = %self.name,
                    new_state = "closed",
                    "circuit breaker closed after successful probe",
                );
            }
            CircuitState::Open { .. } => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        match inner.state {
            CircuitState::Closed => {
                inner.samples.push_back((now, false));
                inner.prune(now, self.config.sampling_window());
                let throughput = inner.samples.len();
                let ratio = inner.failure_ratio();
                if throughput >= self.config.minimum_throughput as usize &&
                    ratio >= self.config.failure_ratio
                {
                    inner.state = CircuitState::Open {
                        until: self.reopen_at(now),
                    };
                    inner.samples.clear();
                    tracing::warn!(
                        circuit = %self.name,
                        throughput,
                        failure_ratio = ratio,
                        break_secs = self.config.break_duration_secs,
                        "circuit breaker opened",
                    );
                }
            }
            CircuitState::HalfOpen { .. } => {
                inner.state = CircuitState::Open {
                    until: self.reopen_at(now),
                };
                tracing::warn!(
                    circuit = %self.name,
                    new_state = "open",
                    "circuit breaker probe failed, reopening",
                );
            }
            CircuitState::Open { .. } => {}
        }
    }
}
