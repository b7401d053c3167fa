use crate::backend::BackendId;
use crate::error::SwitchyardError;
use crate::response::AgentResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a [`TaskEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Routing picked a backend; emitted before invocation.
    BackendSelected,
    /// Partial output or status from the running backend.
    Progress,
    /// Terminal: the task produced a response.
    Completed,
    /// Terminal: the task failed.
    Failed,
}

impl EventKind {
    /// Whether no further events follow this one for the same task.
    pub fn is_terminal(self) -> bool {
        matches!(self, EventKind::Completed | EventKind::Failed)
    }
}

/// A progress or outcome notification for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    /// What happened.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// The task this event belongs to.
    pub task_id: String,
    /// Backend involved, when one was chosen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_id: Option<BackendId>,
    /// Kind-specific details.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
}

impl TaskEvent {
    /// Creates an event stamped with the current time.
    pub fn new(
        kind: EventKind,
        task_id: impl Into<String>,
        backend_id: Option<BackendId>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            kind,
            task_id: task_id.into(),
            backend_id,
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Routing picked `backend`; `payload` carries the reason.
    pub fn backend_selected(
        task_id: &str,
        backend: &BackendId,
        payload: serde_json::Value,
    ) -> Self {
        Self::new(EventKind::BackendSelected, task_id, Some(backend.clone()), payload)
    }

    /// Partial output or status from `backend`.
    pub fn progress(task_id: &str, backend: &BackendId, payload: serde_json::Value) -> Self {
        Self::new(EventKind::Progress, task_id, Some(backend.clone()), payload)
    }

    /// Terminal success event summarising the response (content included).
    pub fn completed(task_id: &str, response: &AgentResponse) -> Self {
        Self::new(
            EventKind::Completed,
            task_id,
            Some(response.backend_id.clone()),
            serde_json::json!({
                "content": response.content,
                "tokens_used": response.tokens_used,
                "cost_units": response.cost_units,
                "duration_ms": response.duration_ms,
            }),
        )
    }

    /// Terminal failure event carrying the error kind and message.
    pub fn failed(task_id: &str, error: &SwitchyardError) -> Self {
        Self::new(
            EventKind::Failed,
            task_id,
            error.backend().cloned(),
            serde_json::json!({
                "kind": error.kind(),
                "message": error.to_string(),
            }),
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_event_carries_kind_and_backend() {
        let err = SwitchyardError::Timeout {
            backend: BackendId::from("slow"),
            elapsed_ms: 5_000,
        };
        let event = TaskEvent::failed("t1", &err);
        assert_eq!(event.kind, EventKind::Failed);
        assert!(event.kind.is_terminal());
        assert_eq!(event.backend_id, Some(BackendId::from("slow")));
        assert_eq!(event.payload["kind"], "timeout");
    }

    #[test]
    fn test_event_wire_shape() {
        let event =
            TaskEvent::progress("t1", &BackendId::from("a"), serde_json::json!({"text": "hi"}));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["task_id"], "t1");
        assert_eq!(json["backend_id"], "a");
        assert!(json.get("timestamp").is_some());
        assert!(!EventKind::Progress.is_terminal());
    }
}
