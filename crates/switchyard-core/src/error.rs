use crate::backend::BackendId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level error type for Switchyard.
///
/// Variants that concern a specific backend carry its id so callers outside
/// the core can decide whether to retry at a higher level.
#[derive(Debug, thiserror::Error)]
pub enum SwitchyardError {
    /// The submitted task failed validation (empty id, empty prompt, ...).
    #[error("Invalid task: {0}")]
    InvalidTask(String),

    /// The backend is not on the static allow-list.
    #[error("Unknown backend: {backend}")]
    UnknownBackend {
        /// Rejected backend.
        backend: BackendId,
    },

    /// The backend's rolling call budget is exhausted.
    #[error("Rate limit exceeded for backend {backend}: {limit} calls per {window_secs}s")]
    RateLimitExceeded {
        /// Rate-limited backend.
        backend: BackendId,
        /// Calls allowed per window.
        limit: u32,
        /// Window length in seconds.
        window_secs: u64,
    },

    /// Call parameters violated a backend constraint; the call never reached the backend.
    #[error("Security violation for backend {backend}: {reason}")]
    SecurityViolation {
        /// Backend the call was addressed to.
        backend: BackendId,
        /// Which constraint was violated.
        reason: String,
    },

    /// The backend's circuit breaker is open.
    #[error("Circuit open for backend {backend}")]
    CircuitOpen {
        /// Backend whose circuit rejected the call.
        backend: BackendId,
    },

    /// The backend did not finish before the task deadline.
    #[error("Backend {backend} timed out after {elapsed_ms}ms")]
    Timeout {
        /// Backend that timed out.
        backend: BackendId,
        /// Time spent before the call was abandoned.
        elapsed_ms: u64,
    },

    /// The backend was contacted and reported (or caused) a failure.
    #[error("Backend {backend} failed: {message}")]
    Backend {
        /// Failing backend.
        backend: BackendId,
        /// Human-readable failure description.
        message: String,
    },

    /// The caller cancelled the execution while the backend was running.
    #[error("Execution on backend {backend} was cancelled")]
    Cancelled {
        /// Backend whose call was abandoned.
        backend: BackendId,
    },

    /// Routing found no backend able to take the task.
    #[error("No eligible backend: {0}")]
    NoEligibleBackend(String),

    /// Session persistence or lookup failed.
    #[error("Session error: {0}")]
    Session(String),

    /// Configuration parsing or validation failed.
    #[error("Config error: {0}")]
    Config(String),

    /// An orchestrator task died without producing a result.
    #[error("Internal error: {0}")]
    Internal(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`SwitchyardError`].
pub type SwitchyardResult<T> = Result<T, SwitchyardError>;

/// Machine-readable classification of a [`SwitchyardError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// [`SwitchyardError::InvalidTask`].
    InvalidTask,
    /// [`SwitchyardError::UnknownBackend`].
    UnknownBackend,
    /// [`SwitchyardError::RateLimitExceeded`].
    RateLimitExceeded,
    /// [`SwitchyardError::SecurityViolation`].
    SecurityViolation,
    /// [`SwitchyardError::CircuitOpen`].
    CircuitOpen,
    /// [`SwitchyardError::Timeout`].
    Timeout,
    /// [`SwitchyardError::Backend`].
    BackendError,
    /// [`SwitchyardError::Cancelled`].
    Cancelled,
    /// [`SwitchyardError::NoEligibleBackend`].
    NoEligibleBackend,
    /// [`SwitchyardError::Session`].
    Session,
    /// [`SwitchyardError::Config`].
    Config,
    /// [`SwitchyardError::Internal`].
    Internal,
    /// [`SwitchyardError::Json`].
    Serialization,
    /// [`SwitchyardError::Io`].
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidTask => "invalid_task",
            ErrorKind::UnknownBackend => "unknown_backend",
            ErrorKind::RateLimitExceeded => "rate_limit_exceeded",
            ErrorKind::SecurityViolation => "security_violation",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::Timeout => "timeout",
            ErrorKind::BackendError => "backend_error",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::NoEligibleBackend => "no_eligible_backend",
            ErrorKind::Session => "session",
            ErrorKind::Config => "config",
            ErrorKind::Internal => "internal",
            ErrorKind::Serialization => "serialization",
            ErrorKind::Io => "io",
        };
        f.write_str(s)
    }
}

impl SwitchyardError {
    /// Shorthand for a [`SwitchyardError::Backend`] failure.
    pub fn backend_failure(backend: &BackendId, message: impl Into<String>) -> Self {
        Self::Backend {
            backend: backend.clone(),
            message: message.into(),
        }
    }

    /// The machine-readable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidTask(_) => ErrorKind::InvalidTask,
            Self::UnknownBackend { .. } => ErrorKind::UnknownBackend,
            Self::RateLimitExceeded { .. } => ErrorKind::RateLimitExceeded,
            Self::SecurityViolation { .. } => ErrorKind::SecurityViolation,
            Self::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Backend { .. } => ErrorKind::BackendError,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::NoEligibleBackend(_) => ErrorKind::NoEligibleBackend,
            Self::Session(_) => ErrorKind::Session,
            Self::Config(_) => ErrorKind::Config,
            Self::Internal(_) => ErrorKind::Internal,
            Self::Json(_) => ErrorKind::Serialization,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// The backend this error is attributed to, if any.
    pub fn backend(&self) -> Option<&BackendId> {
        match self {
            Self::UnknownBackend { backend }
            | Self::RateLimitExceeded { backend, .. }
            | Self::SecurityViolation { backend, .. }
            | Self::CircuitOpen { backend }
            | Self::Timeout { backend, .. }
            | Self::Backend { backend, .. }
            | Self::Cancelled { backend } => Some(backend),
            _ => None,
        }
    }

    /// Rejected before any backend contact by the allow-list, rate limiter or constraints.
    pub fn is_admission(&self) -> bool {
        matches!(
            self,
            Self::UnknownBackend { .. }
                | Self::RateLimitExceeded { .. }
                | Self::SecurityViolation { .. }
        )
    }

    /// Rejected before contact because of earlier failures.
    pub fn is_availability(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Failed during or after backend contact. Execution errors count as a
    /// circuit-breaker failure and are eligible for a single fallback.
    pub fn is_execution(&self) -> bool {
        matches!(self, Self::Backend { .. } | Self::Timeout { .. })
    }

    /// Converts an arbitrary error raised while talking to `backend` into an
    /// execution error attributed to it. Execution errors and cancellations
    /// pass through unchanged.
    pub fn into_execution(self, backend: &BackendId) -> Self {
        match self {
            e @ (Self::Backend { .. } | Self::Timeout { .. } | Self::Cancelled { .. }) => e,
            other => Self::backend_failure(backend, other.to_string()),
        }
    }
}
