use crate::client::{AgentClient, Invocation, InvocationOutput};
use crate::progress::{Progress, ProgressSink};
use crate::wire::WireCollector;
use async_trait::async_trait;
use futures_util::StreamExt;
use switchyard_core::{BackendId, SwitchyardError, SwitchyardResult};
use tracing::{debug, info};

/// Remote backend reached over HTTP.
///
/// Each call POSTs the invocation as JSON and reads the response body as the
/// line-oriented wire protocol, so servers can stream progress before the
/// final result line.
pub struct HttpBackend {
    id: BackendId,
    url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl HttpBackend {
    /// A backend posting to `url` without authentication.
    pub fn new(id: BackendId, url: impl Into<String>) -> Self {
        Self {
            id,
            url: url.into(),
            api_key: None,
            http: reqwest::Client::new(),
        }
    }

    /// Bearer token sent with every request.
    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key;
        self
    }

    /// Read the bearer token from `var`, if set and non-empty.
    pub fn with_api_key_env(self, var: Option<&str>) -> Self {
        let key = var
            .and_then(|v| std::env::var(v).ok())
            .filter(|k| !k.trim().is_empty());
        self.with_api_key(key)
    }

    fn http_error(&self, message: impl Into<String>) -> SwitchyardError {
        SwitchyardError::backend_failure(&self.id, message)
    }
}

#[async_trait]
impl AgentClient for HttpBackend {
    fn id(&self) -> &BackendId {
        &self.id
    }

    async fn invoke(
        &self,
        invocation: &Invocation,
        progress: &ProgressSink,
    ) -> SwitchyardResult<InvocationOutput> {
        let mut request = self
            .http
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(invocation);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        info!(
            backend = %self.id,
            url = %self.url,
            prompt_len = invocation.prompt.len(),
            resumed = invocation.session_token.is_some(),
            "Sending backend request"
        );

        let resp = request
            .send()
            .await
            .map_err(|e| self.http_error(format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            let excerpt: String = body.chars().take(500).collect();
            return Err(self.http_error(format!("HTTP {status}: {excerpt}")));
        }
        progress.emit(Progress::status("response started"));

        let mut stream = resp.bytes_stream();
        let mut collector = WireCollector::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| self.http_error(format!("stream read error: {e}")))?;
            collector.push_chunk(&chunk, progress);
        }
        collector.flush(progress);

        debug!(backend = %self.id, lines = collector.lines(), "Backend response finished");
        collector.finish(&self.id)
    }
}
