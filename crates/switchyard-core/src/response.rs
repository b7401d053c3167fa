use crate::backend::BackendId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The result of one execution attempt on one backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Backend that produced the response.
    pub backend_id: BackendId,
    /// Final textual output.
    pub content: String,
    /// Tokens consumed (as reported by the backend, 0 if unknown).
    pub tokens_used: u64,
    /// Monetary cost; 0 for free backends.
    pub cost_units: f64,
    /// Wall-clock duration of the invocation.
    pub duration_ms: u64,
    /// Opaque continuation token for the next call on the same task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    /// Free-form backend metadata.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AgentResponse {
    /// A response carrying no output, used to score failed attempts.
    pub fn failed(backend_id: BackendId, duration_ms: u64) -> Self {
        Self {
            backend_id,
            content: String::new(),
            tokens_used: 0,
            cost_units: 0.0,
            duration_ms,
            session_token: None,
            metadata: HashMap::new(),
        }
    }

    /// Throughput in tokens per second, if it can be computed.
    pub fn tokens_per_second(&self) -> Option<f64> {
        if self.duration_ms == 0 {
            return None;
        }
        Some(self.tokens_used as f64 / (self.duration_ms as f64 / 1000.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_per_second() {
        let mut resp = AgentResponse::failed(BackendId::from("a"), 2_000);
        resp.tokens_used = 100;
        assert_eq!(resp.tokens_per_second(), Some(50.0));
        resp.duration_ms = 0;
        assert_eq!(resp.tokens_per_second(), None);
    }
}
