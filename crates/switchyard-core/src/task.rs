use crate::error::{SwitchyardError, SwitchyardResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Rough token estimate for one referenced file when the caller gave no hint.
pub const TOKENS_PER_FILE_ESTIMATE: u64 = 2_000;

/// Routing category of a [`Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskCategory {
    /// Security review or hardening; always routed to the highest-trust backend.
    Security,
    /// Architecture and design work.
    Architecture,
    /// Large read-mostly analysis over many files.
    #[serde(alias = "bulk_analysis")]
    BulkAnalysis,
    /// Workflow and integration automation.
    Workflow,
    /// Writing new code.
    #[serde(alias = "code_generation")]
    CodeGeneration,
    /// Diagnosing and fixing defects.
    Debugging,
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskCategory::Security => "security",
            TaskCategory::Architecture => "architecture",
            TaskCategory::BulkAnalysis => "bulk-analysis",
            TaskCategory::Workflow => "workflow",
            TaskCategory::CodeGeneration => "code-generation",
            TaskCategory::Debugging => "debugging",
        };
        f.write_str(s)
    }
}

/// A unit of work submitted to the orchestrator.
///
/// Tasks are immutable once submitted. The `id` doubles as the session key:
/// submitting a task with the same id again continues the backend session
/// started by the earlier call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Caller-assigned unique identifier.
    pub id: String,
    /// Free-text instruction for the backend.
    pub prompt: String,
    /// Routing category.
    pub category: TaskCategory,
    /// Working-set scope, in the order the caller listed it.
    #[serde(default, alias = "fileRefs")]
    pub file_refs: Vec<String>,
    /// Estimated input size in tokens (0 = unknown).
    #[serde(default, alias = "contextSizeHint")]
    pub context_size_hint: u64,
    /// Forces routing to the highest-trust backend.
    #[serde(default, alias = "requiresSecurity")]
    pub requires_security: bool,
    /// Informational difficulty estimate in `[0, 1]`.
    #[serde(default)]
    pub complexity: f32,
}

impl Task {
    /// Creates a task with no file scope and default hints.
    pub fn new(id: impl Into<String>, prompt: impl Into<String>, category: TaskCategory) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            category,
            file_refs: Vec::new(),
            context_size_hint: 0,
            requires_security: false,
            complexity: 0.0,
        }
    }

    /// Creates a task with a freshly generated id.
    pub fn generated(prompt: impl Into<String>, category: TaskCategory) -> Self {
        Self::new(Uuid::new_v4().to_string(), prompt, category)
    }

    /// Set the referenced files.
    pub fn with_file_refs(mut self, refs: Vec<String>) -> Self {
        self.file_refs = refs;
        self
    }

    /// Set the estimated context size in tokens.
    pub fn with_context_size_hint(mut self, hint: u64) -> Self {
        self.context_size_hint = hint;
        self
    }

    /// Mark the task security-sensitive regardless of category.
    pub fn requiring_security(mut self) -> Self {
        self.requires_security = true;
        self
    }

    /// Set the complexity estimate in `[0, 1]`.
    pub fn with_complexity(mut self, complexity: f32) -> Self {
        self.complexity = complexity;
        self
    }

    /// Checks the invariants every submitted task must satisfy.
    pub fn validate(&self) -> SwitchyardResult<()> {
        if self.id.trim().is_empty() {
            return Err(SwitchyardError::InvalidTask("task id is empty".into()));
        }
        if self.prompt.trim().is_empty() {
            return Err(SwitchyardError::InvalidTask(format!(
                "task '{}' has an empty prompt",
                self.id
            )));
        }
        if !(0.0..=1.0).contains(&self.complexity) {
            return Err(SwitchyardError::InvalidTask(format!(
                "task '{}' complexity {} is outside [0, 1]",
                self.id, self.complexity
            )));
        }
        Ok(())
    }

    /// Input size used for routing: the caller's hint when present, otherwise
    /// an estimate derived from the number of referenced files.
    pub fn effective_context_size(&self) -> u64 {
        if self.context_size_hint > 0 {
            self.context_size_hint
        } else {
            self.file_refs.len() as u64 * TOKENS_PER_FILE_ESTIMATE
        }
    }

    /// Whether routing must ignore scores and pick the highest-trust backend.
    pub fn is_security_sensitive(&self) -> bool {
        self.requires_security || self.category == TaskCategory::Security
    }
}
