use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use switchyard_core::{BackendId, SwitchyardError, SwitchyardResult};
use tokio::time::Instant;
use tracing::{info, warn};

/// Circuit breaker tuning, shared by every backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Time after the last failure before a probe is admitted.
    #[serde(default = "default_recovery_timeout_secs")]
    pub recovery_timeout_secs: u64,
    /// Probe successes that close the circuit again.
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
    /// Concurrent probes allowed while half-open.
    #[serde(default = "default_half_open_max_calls")]
    pub half_open_max_calls: u32,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_timeout_secs() -> u64 {
    60
}

fn default_success_threshold() -> u32 {
    2
}

fn default_half_open_max_calls() -> u32 {
    1
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_secs: default_recovery_timeout_secs(),
            success_threshold: default_success_threshold(),
            half_open_max_calls: default_half_open_max_calls(),
        }
    }
}

impl BreakerConfig {
    /// [`recovery_timeout_secs`](Self::recovery_timeout_secs) as a duration.
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }
}

/// Circuit state of one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Calls are rejected until the recovery timeout elapses.
    Open,
    /// A limited number of probe calls decide whether to close again.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    /// Current state.
    pub state: CircuitState,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// Successful probes since the circuit went half-open.
    pub probe_successes: u32,
    /// Half-open probes currently running.
    pub probes_in_flight: u32,
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    probe_successes: u32,
    probes_in_flight: u32,
}

/// Failure-isolation state machine for one backend.
///
/// ```text
/// Closed --(failure_threshold failures)--> Open
/// Open --(call after recovery_timeout)--> HalfOpen
/// HalfOpen --(success_threshold successes)--> Closed
/// HalfOpen --(any failure)--> Open
/// ```
pub struct CircuitBreaker {
    backend: BackendId,
    failure_threshold: u32,
    success_threshold: u32,
    half_open_max_calls: u32,
    recovery_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// A closed breaker for `backend`.
    pub fn new(backend: BackendId, config: &BreakerConfig) -> Self {
        Self {
            backend,
            failure_threshold: config.failure_threshold.max(1),
            success_threshold: config.success_threshold.max(1),
            half_open_max_calls: config.half_open_max_calls.max(1),
            recovery_timeout: config.recovery_timeout(),
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure_at: None,
                probe_successes: 0,
                probes_in_flight: 0,
            }),
        }
    }

    /// The backend this breaker guards.
    pub fn backend(&self) -> &BackendId {
        &self.backend
    }

    fn open_error(&self) -> SwitchyardError {
        SwitchyardError::CircuitOpen {
            backend: self.backend.clone(),
        }
    }

    fn recovery_elapsed(&self, inner: &Inner, now: Instant) -> bool {
        inner
            .last_failure_at
            .map_or(true, |at| now.duration_since(at) >= self.recovery_timeout)
    }

    /// Whether a call would be admitted right now, without changing state.
    pub fn check(&self) -> SwitchyardResult<()> {
        let inner = self.inner.lock();
        let admitted = match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => self.recovery_elapsed(&inner, Instant::now()),
            CircuitState::HalfOpen => inner.probes_in_flight < self.half_open_max_calls,
        };
        if admitted {
            Ok(())
        } else {
            Err(self.open_error())
        }
    }

    /// Admit one call. The returned permit must be resolved with
    /// [`BreakerPermit::success`] or [`BreakerPermit::failure`]; dropping it
    /// unresolved gives a half-open probe slot back without changing state.
    pub fn acquire(&self) -> SwitchyardResult<BreakerPermit<'_>> {
        let mut inner = self.inner.lock();
        let probe = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                if !self.recovery_elapsed(&inner, Instant::now()) {
                    return Err(self.open_error());
                }
                inner.state = CircuitState::HalfOpen;
                inner.probe_successes = 0;
                inner.probes_in_flight = 0;
                info!(backend = %self.backend, "Circuit half-open, admitting probe");
                true
            }
            CircuitState::HalfOpen => {
                if inner.probes_in_flight >= self.half_open_max_calls {
                    return Err(self.open_error());
                }
                true
            }
        };
        if probe {
            inner.probes_in_flight += 1;
        }
        Ok(BreakerPermit {
            breaker: self,
            probe,
            resolved: false,
        })
    }

    fn on_success(&self, probe: bool) {
        let mut inner = self.inner.lock();
        if probe {
            inner.probes_in_flight = inner.probes_in_flight.saturating_sub(1);
        }
        match inner.state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen if probe => {
                inner.probe_successes += 1;
                if inner.probe_successes >= self.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.probe_successes = 0;
                    inner.probes_in_flight = 0;
                    info!(backend = %self.backend, "Circuit closed");
                }
            }
            // A call admitted before the circuit opened; it does not count as a probe.
            CircuitState::HalfOpen | CircuitState::Open => {}
        }
    }

    fn on_failure(&self, probe: bool) {
        let mut inner = self.inner.lock();
        if probe {
            inner.probes_in_flight = inner.probes_in_flight.saturating_sub(1);
        }
        let now = Instant::now();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_failure_at = Some(now);
        match inner.state {
            CircuitState::Closed => {
                if inner.consecutive_failures >= self.failure_threshold {
                    inner.state = CircuitState::Open;
                    warn!(
                        backend = %self.backend,
                        failures = inner.consecutive_failures,
                        "Circuit opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.probe_successes = 0;
                inner.probes_in_flight = 0;
                inner.consecutive_failures = inner.consecutive_failures.max(self.failure_threshold);
                warn!(backend = %self.backend, "Probe failed, circuit re-opened");
            }
            CircuitState::Open => {}
        }
    }

    fn on_release(&self, probe: bool) {
        if probe {
            let mut inner = self.inner.lock();
            inner.probes_in_flight = inner.probes_in_flight.saturating_sub(1);
        }
    }

    /// Current state, without applying the recovery timeout.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Copy of the counters for health reporting.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            probe_successes: inner.probe_successes,
            probes_in_flight: inner.probes_in_flight,
        }
    }
}

/// An admitted call. Resolving it reports the outcome to the breaker.
#[must_use = "resolve the permit with success() or failure()"]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    resolved: bool,
}

impl BreakerPermit<'_> {
    /// Whether this call is a half-open probe.
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    /// Report a successful call.
    pub fn success(mut self) {
        self.resolved = true;
        self.breaker.on_success(self.probe);
    }

    /// Report a failed call.
    pub fn failure(mut self) {
        self.resolved = true;
        self.breaker.on_failure(self.probe);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.resolved {
            self.breaker.on_release(self.probe);
        }
    }
}

/// One breaker per backend, fixed at startup.
pub struct BreakerSet {
    breakers: HashMap<BackendId, CircuitBreaker>,
}

impl BreakerSet {
    /// One closed breaker for each of `backends`.
    pub fn new<'a>(
        config: &BreakerConfig,
        backends: impl IntoIterator<Item = &'a BackendId>,
    ) -> Self {
        let breakers = backends
            .into_iter()
            .map(|id| (id.clone(), CircuitBreaker::new(id.clone(), config)))
            .collect();
        Self { breakers }
    }

    /// The breaker for `backend`, if it was configured.
    pub fn get(&self, backend: &BackendId) -> Option<&CircuitBreaker> {
        self.breakers.get(backend)
    }
}
