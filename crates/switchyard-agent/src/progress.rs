use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A partial result reported by a running backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Progress {
    /// A chunk of output text.
    Text {
        /// Output text.
        text: String,
    },
    /// A lifecycle note from the transport (process started, request sent, ...).
    Status {
        /// Short status note.
        status: String,
    },
}

impl Progress {
    /// A [`Progress::Text`] chunk.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// A [`Progress::Status`] note.
    pub fn status(status: impl Into<String>) -> Self {
        Self::Status {
            status: status.into(),
        }
    }
}

/// Callback a client uses to report [`Progress`] before it returns.
///
/// Cheap to clone; the orchestrator wires it to the task's event channel.
#[derive(Clone)]
pub struct ProgressSink {
    inner: Arc<dyn Fn(Progress) + Send + Sync>,
}

impl ProgressSink {
    /// Wrap a callback.
    pub fn new(f: impl Fn(Progress) + Send + Sync + 'static) -> Self {
        Self { inner: Arc::new(f) }
    }

    /// A sink that discards everything.
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    /// Report one progress item.
    pub fn emit(&self, progress: Progress) {
        (self.inner)(progress);
    }
}

impl fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressSink").finish_non_exhaustive()
    }
}
