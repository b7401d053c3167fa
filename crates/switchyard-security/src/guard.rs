use crate::constraint::ConstraintSet;
use crate::rate_limit::{RateLimiter, DEFAULT_WINDOW};
use crate::sanitizer::Sanitizer;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use switchyard_core::{BackendId, SwitchyardError, SwitchyardResult, Task};
use tracing::warn;

/// The parameters of one backend call, as seen by admission control.
#[derive(Debug, Clone, Copy)]
pub struct ToolCall<'a> {
    /// Task the call serves.
    pub task_id: &'a str,
    /// Prompt text.
    pub prompt: &'a str,
    /// Referenced files.
    pub file_refs: &'a [String],
}

impl<'a> ToolCall<'a> {
    /// The call a task would make.
    pub fn from_task(task: &'a Task) -> Self {
        Self {
            task_id: &task.id,
            prompt: &task.prompt,
            file_refs: &task.file_refs,
        }
    }
}

/// Per-backend call admission: static allow-list, parameter constraints and
/// a rolling call budget.
///
/// Checks run in that order, so a call that violates a constraint never
/// consumes budget. The guard is built once at startup; the allow-list cannot
/// change afterwards.
pub struct AdmissionGuard {
    constraints: HashMap<BackendId, ConstraintSet>,
    limiter: RateLimiter,
    sanitizer: Sanitizer,
}

impl AdmissionGuard {
    /// An empty guard (rejects every backend) with a one-minute window.
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }

    /// An empty guard using a custom rate-limit window.
    pub fn with_window(window: Duration) -> Self {
        Self {
            constraints: HashMap::new(),
            limiter: RateLimiter::new(window),
            sanitizer: Sanitizer::default(),
        }
    }

    /// Replace the sanitizer used for prompt and path checks.
    pub fn with_sanitizer(mut self, sanitizer: Sanitizer) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    /// Add a backend to the allow-list.
    pub fn register(
        &mut self,
        backend: BackendId,
        calls_per_window: u32,
        constraints: ConstraintSet,
    ) {
        self.limiter.register(backend.clone(), calls_per_window);
        self.constraints.insert(backend, constraints);
    }

    /// Whether `backend` is on the allow-list.
    pub fn is_allowed(&self, backend: &BackendId) -> bool {
        self.constraints.contains_key(backend)
    }

    /// Allow-listed backends, sorted.
    pub fn allowed_backends(&self) -> BTreeSet<BackendId> {
        self.constraints.keys().cloned().collect()
    }

    /// Admit one call to `backend` or explain why it was rejected.
    pub fn admit(&self, backend: &BackendId, call: &ToolCall<'_>) -> SwitchyardResult<()> {
        let Some(constraints) = self.constraints.get(backend) else {
            warn!(backend = %backend, task_id = call.task_id, "Rejected call to unknown backend");
            return Err(SwitchyardError::UnknownBackend {
                backend: backend.clone(),
            });
        };

        if let Err(reason) = constraints.validate(&self.sanitizer, call.prompt, call.file_refs) {
            warn!(
                backend = %backend,
                task_id = call.task_id,
                reason = %reason,
                "Security violation, call blocked"
            );
            return Err(SwitchyardError::SecurityViolation {
                backend: backend.clone(),
                reason,
            });
        }

        self.limiter.try_acquire(backend).inspect_err(|_| {
            warn!(backend = %backend, task_id = call.task_id, "Rate limit exceeded");
        })
    }

    /// Calls admitted for `backend` in the current window.
    pub fn calls_in_window(&self, backend: &BackendId) -> u32 {
        self.limiter.calls_in_window(backend)
    }

    /// The underlying rate limiter.
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }
}

impl Default for AdmissionGuard {
    fn default() -> Self {
        Self::new()
    }
}
