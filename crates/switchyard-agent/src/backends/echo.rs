use crate::client::{AgentClient, Invocation, InvocationOutput};
use crate::progress::{Progress, ProgressSink};
use async_trait::async_trait;
use switchyard_core::{BackendId, SwitchyardResult};
use uuid::Uuid;

/// Free local backend that returns the prompt unchanged. Useful for dry runs
/// of routing and configuration.
pub struct EchoBackend {
    id: BackendId,
}

impl EchoBackend {
    /// An echo backend registered as `id`.
    pub fn new(id: BackendId) -> Self {
        Self { id }
    }
}

#[async_trait]
impl AgentClient for EchoBackend {
    fn id(&self) -> &BackendId {
        &self.id
    }

    async fn invoke(
        &self,
        invocation: &Invocation,
        progress: &ProgressSink,
    ) -> SwitchyardResult<InvocationOutput> {
        progress.emit(Progress::text(invocation.prompt.clone()));

        let token = invocation
            .session_token
            .clone()
            .unwrap_or_else(|| format!("echo-{}", Uuid::new_v4()));

        let mut out = InvocationOutput::new(invocation.prompt.clone());
        out.tokens_used = invocation.prompt.split_whitespace().count() as u64;
        out.cost_units = Some(0.0);
        out.session_token = Some(token);
        out.metadata.insert(
            "file_refs".to_string(),
            serde_json::json!(invocation.file_refs.len()),
        );
        Ok(out)
    }
}
