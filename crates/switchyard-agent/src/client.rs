use crate::progress::ProgressSink;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use switchyard_core::{BackendId, SwitchyardResult, Task};

/// The arguments of one backend call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    /// Task prompt, passed through verbatim.
    pub prompt: String,
    /// Continuation token from an earlier call on the same backend.
    #[serde(default)]
    pub session_token: Option<String>,
    /// Files the task refers to.
    #[serde(default)]
    pub file_refs: Vec<String>,
}

impl Invocation {
    /// The invocation for `task`, resuming `session_token` when given.
    pub fn for_task(task: &Task, session_token: Option<String>) -> Self {
        Self {
            prompt: task.prompt.clone(),
            session_token,
            file_refs: task.file_refs.clone(),
        }
    }
}

/// What a backend returned from one successful call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvocationOutput {
    /// Final output text.
    pub content: String,
    /// Tokens consumed by the call.
    #[serde(default)]
    pub tokens_used: u64,
    /// Reported cost. `None` lets the caller derive it from the backend's rate.
    #[serde(default)]
    pub cost_units: Option<f64>,
    /// Token to resume this conversation later.
    #[serde(default)]
    pub session_token: Option<String>,
    /// Backend-specific extras.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl InvocationOutput {
    /// An output carrying only `content`.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }
}

/// Uniform wrapper around one external worker backend.
///
/// To add a new transport:
/// 1. Create a module in `backends/`
/// 2. Implement `AgentClient` for your struct
/// 3. Add a variant to [`Transport`](crate::config::Transport)
/// 4. Build it in [`AgentRegistry::from_configs`](crate::registry::AgentRegistry::from_configs)
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// The backend this client talks to.
    fn id(&self) -> &BackendId;

    /// Run one call to completion.
    ///
    /// `progress` may be invoked any number of times before the call returns.
    /// Dropping the returned future must abandon the call (and kill any child
    /// process).
    async fn invoke(
        &self,
        invocation: &Invocation,
        progress: &ProgressSink,
    ) -> SwitchyardResult<InvocationOutput>;
}
