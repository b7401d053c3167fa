use crate::breaker::CircuitState;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use switchyard_core::{AgentResponse, BackendId};

/// Cumulative call counters for one backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendMetrics {
    /// Invocations that reached the backend.
    pub calls: u64,
    /// Invocations that returned a response.
    pub successes: u64,
    /// Invocations that failed or timed out.
    pub failures: u64,
    /// Calls rejected before contact (admission or open circuit).
    pub rejections: u64,
    /// Invocations abandoned by the caller.
    pub cancellations: u64,
    /// Tokens reported by successful calls.
    pub tokens_used: u64,
    /// Cost of successful calls.
    pub cost_units: f64,
    /// Wall time spent in invocations.
    pub total_duration_ms: u64,
}

impl BackendMetrics {
    /// Mean duration of invocations that reached the backend.
    pub fn avg_duration_ms(&self) -> Option<u64> {
        (self.calls > 0).then(|| self.total_duration_ms / self.calls)
    }
}

/// Health of one backend, as reported by `Orchestrator::health`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendHealth {
    /// Breaker state.
    pub circuit_state: CircuitState,
    /// Learned score.
    pub reward_score: f64,
    /// Calls admitted in the current rate window.
    pub calls_this_window: u32,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// Cumulative counters.
    pub metrics: BackendMetrics,
}

/// Health of every configured backend, keyed by id.
pub type HealthSnapshot = BTreeMap<BackendId, BackendHealth>;

/// Tracks call metrics for every backend. One lock per backend.
pub struct BackendMonitor {
    metrics: HashMap<BackendId, Mutex<BackendMetrics>>,
}

impl BackendMonitor {
    /// Zeroed counters for each of `backends`.
    pub fn new<'a>(backends: impl IntoIterator<Item = &'a BackendId>) -> Self {
        Self {
            metrics: backends
                .into_iter()
                .map(|id| (id.clone(), Mutex::new(BackendMetrics::default())))
                .collect(),
        }
    }

    fn with(&self, backend: &BackendId, f: impl FnOnce(&mut BackendMetrics)) {
        if let Some(m) = self.metrics.get(backend) {
            f(&mut m.lock());
        }
    }

    /// Count a completed call.
    pub fn record_success(&self, response: &AgentResponse) {
        self.with(&response.backend_id, |m| {
            m.calls += 1;
            m.successes += 1;
            m.tokens_used += response.tokens_used;
            m.cost_units += response.cost_units;
            m.total_duration_ms += response.duration_ms;
        });
    }

    /// Count a failed or timed-out call.
    pub fn record_failure(&self, backend: &BackendId, duration_ms: u64) {
        self.with(backend, |m| {
            m.calls += 1;
            m.failures += 1;
            m.total_duration_ms += duration_ms;
        });
    }

    /// Count a call the caller abandoned.
    pub fn record_cancellation(&self, backend: &BackendId, duration_ms: u64) {
        self.with(backend, |m| {
            m.calls += 1;
            m.cancellations += 1;
            m.total_duration_ms += duration_ms;
        });
    }

    /// Count a call refused before contact.
    pub fn record_rejection(&self, backend: &BackendId) {
        self.with(backend, |m| m.rejections += 1);
    }

    /// Current counters for `backend`.
    pub fn get(&self, backend: &BackendId) -> Option<BackendMetrics> {
        self.metrics.get(backend).map(|m| m.lock().clone())
    }

    /// Totals across all backends.
    pub fn aggregate(&self) -> BackendMetrics {
        let mut total = BackendMetrics::default();
        for m in self.metrics.values() {
            let m = m.lock();
            total.calls += m.calls;
            total.successes += m.successes;
            total.failures += m.failures;
            total.rejections += m.rejections;
            total.cancellations += m.cancellations;
            total.tokens_used += m.tokens_used;
            total.cost_units += m.cost_units;
            total.total_duration_ms += m.total_duration_ms;
        }
        total
    }
}
