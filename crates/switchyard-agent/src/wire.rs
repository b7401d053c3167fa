use crate::client::InvocationOutput;
use crate::progress::{Progress, ProgressSink};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use switchyard_core::{BackendId, SwitchyardError, SwitchyardResult};

/// One line of backend output.
///
/// Backends write newline-delimited JSON. Lines that do not parse as a
/// message are treated as plain output text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    /// Partial output.
    Progress {
        /// Output text.
        text: String,
    },
    /// Final result of the call.
    Result {
        /// Final output text.
        content: String,
        /// Token to resume the conversation.
        #[serde(default)]
        session_token: Option<String>,
        /// Tokens consumed.
        #[serde(default)]
        tokens_used: u64,
        /// Reported cost, if the backend knows it.
        #[serde(default)]
        cost_units: Option<f64>,
        /// Backend-specific extras.
        #[serde(default)]
        metadata: HashMap<String, serde_json::Value>,
    },
    /// The backend gave up.
    Error {
        /// Why the call failed.
        message: String,
    },
}

impl WireMessage {
    /// Parse a line. Returns `None` for anything that is not a wire message.
    pub fn parse(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if !trimmed.starts_with('{') {
            return None;
        }
        serde_json::from_str(trimmed).ok()
    }
}

/// Folds a stream of output lines into one [`InvocationOutput`], forwarding
/// progress as it goes.
#[derive(Debug, Default)]
pub struct WireCollector {
    text: String,
    result: Option<InvocationOutput>,
    error: Option<String>,
    lines: usize,
    /// Bytes of an incomplete line from [`push_chunk`](Self::push_chunk).
    pending: Vec<u8>,
}

impl WireCollector {
    /// An empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one line of output.
    pub fn push_line(&mut self, line: &str, progress: &ProgressSink) {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return;
        }
        self.lines += 1;

        match WireMessage::parse(line) {
            Some(WireMessage::Progress { text }) => progress.emit(Progress::text(text)),
            Some(WireMessage::Result {
                content,
                session_token,
                tokens_used,
                cost_units,
                metadata,
            }) => {
                self.result = Some(InvocationOutput {
                    content,
                    tokens_used,
                    cost_units,
                    session_token,
                    metadata,
                });
            }
            Some(WireMessage::Error { message }) => {
                if self.error.is_none() {
                    self.error = Some(message);
                }
            }
            None => {
                if !self.text.is_empty() {
                    self.text.push('\n');
                }
                self.text.push_str(line);
                progress.emit(Progress::text(line));
            }
        }
    }

    /// Consume raw bytes that may end mid-line or mid-character.
    ///
    /// Only complete lines are decoded, so a UTF-8 sequence split across two
    /// chunks is reassembled before decoding.
    pub fn push_chunk(&mut self, chunk: &[u8], progress: &ProgressSink) {
        self.pending.extend_from_slice(chunk);
        while let Some(end) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=end).collect();
            self.push_line(&String::from_utf8_lossy(&line), progress);
        }
    }

    /// Consume whatever [`push_chunk`](Self::push_chunk) left after the last newline.
    pub fn flush(&mut self, progress: &ProgressSink) {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.push_line(&String::from_utf8_lossy(&rest), progress);
        }
    }

    /// Number of non-empty lines seen so far.
    pub fn lines(&self) -> usize {
        self.lines
    }

    /// The final output: an explicit error wins, then an explicit result,
    /// then the accumulated plain text.
    pub fn finish(self, backend: &BackendId) -> SwitchyardResult<InvocationOutput> {
        if let Some(message) = self.error {
            return Err(SwitchyardError::backend_failure(backend, message));
        }
        Ok(self.result.unwrap_or_else(|| InvocationOutput::new(self.text)))
    }
}
