use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use switchyard_core::BackendId;

/// Idle time after which a session is forgotten.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600);

/// Continuation state for one task on one backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Caller-supplied task id.
    pub task_id: String,
    /// Backend that issued the token.
    pub backend_id: BackendId,
    /// Opaque token understood only by `backend_id`.
    pub token: String,
    /// First successful call.
    pub created_at: DateTime<Utc>,
    /// Most recent successful call.
    pub last_used_at: DateTime<Utc>,
}

impl SessionRecord {
    /// A fresh record stamped with the current time.
    pub fn new(
        task_id: impl Into<String>,
        backend_id: BackendId,
        token: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            task_id: task_id.into(),
            backend_id,
            token: token.into(),
            created_at: now,
            last_used_at: now,
        }
    }

    /// Replace the backend and token after another successful call.
    pub fn touch(&mut self, backend_id: BackendId, token: impl Into<String>) {
        self.backend_id = backend_id;
        self.token = token.into();
        self.last_used_at = Utc::now();
    }

    /// Whether the record has been idle for at least `ttl` at `now`.
    pub fn is_expired_at(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        now.signed_duration_since(self.last_used_at) >= ttl
    }

    /// Whether the record has been idle for at least `ttl`.
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.is_expired_at(ttl, Utc::now())
    }
}
