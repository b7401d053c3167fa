use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use switchyard_core::{BackendId, TaskCategory};
use switchyard_security::ConstraintSet;

/// Routing attributes of a backend, as seen by the selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendProfile {
    /// Unique backend id.
    pub id: BackendId,
    /// Relative trust level; security tasks go to the highest.
    #[serde(default = "default_trust")]
    pub trust: u8,
    /// Largest input the backend accepts, in tokens.
    #[serde(default = "default_context_window")]
    pub context_window: u64,
    /// Price per 1000 tokens. Zero marks a free backend.
    #[serde(default)]
    pub cost_per_1k_tokens: f64,
    /// Categories this backend is the designated specialist for.
    #[serde(default)]
    pub specialties: Vec<TaskCategory>,
    /// Tie-break order; lower wins.
    #[serde(default = "default_priority")]
    pub priority: u32,
}

fn default_trust() -> u8 {
    50
}

fn default_context_window() -> u64 {
    128_000
}

fn default_priority() -> u32 {
    100
}

impl BackendProfile {
    /// A profile with default trust, context window and priority, and no cost.
    pub fn new(id: impl Into<BackendId>) -> Self {
        Self {
            id: id.into(),
            trust: default_trust(),
            context_window: default_context_window(),
            cost_per_1k_tokens: 0.0,
            specialties: Vec::new(),
            priority: default_priority(),
        }
    }

    /// Set the trust level.
    pub fn with_trust(mut self, trust: u8) -> Self {
        self.trust = trust;
        self
    }

    /// Set the context window in tokens.
    pub fn with_context_window(mut self, tokens: u64) -> Self {
        self.context_window = tokens;
        self
    }

    /// Set the price per 1000 tokens.
    pub fn with_cost_per_1k_tokens(mut self, cost: f64) -> Self {
        self.cost_per_1k_tokens = cost;
        self
    }

    /// Add a specialty category.
    pub fn with_specialty(mut self, category: TaskCategory) -> Self {
        if !self.specialties.contains(&category) {
            self.specialties.push(category);
        }
        self
    }

    /// Set the tie-break priority.
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Whether the backend charges nothing.
    pub fn is_free(&self) -> bool {
        self.cost_per_1k_tokens <= 0.0
    }

    /// Whether `category` is one of the backend's specialties.
    pub fn specializes_in(&self, category: TaskCategory) -> bool {
        self.specialties.contains(&category)
    }

    /// Cost of `tokens` at this backend's rate.
    pub fn derive_cost(&self, tokens: u64) -> f64 {
        if self.is_free() {
            return 0.0;
        }
        tokens as f64 / 1000.0 * self.cost_per_1k_tokens
    }
}

/// How to reach a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Transport {
    /// Spawn a local program per call; the prompt goes to stdin.
    Command {
        /// Executable name or path.
        program: String,
        /// Arguments passed before the file references.
        #[serde(default)]
        args: Vec<String>,
        /// Extra environment variables.
        #[serde(default)]
        env: HashMap<String, String>,
        /// Working directory of the child process.
        #[serde(default)]
        working_dir: Option<PathBuf>,
        /// Flag placed before each file reference. Without it file refs are
        /// appended as positional arguments.
        #[serde(default)]
        file_arg: Option<String>,
        /// Flag placed before the session token. Without it the token is not passed.
        #[serde(default)]
        session_arg: Option<String>,
    },
    /// POST to an HTTP endpoint that answers with the wire protocol.
    Http {
        /// Endpoint receiving the invocation as JSON.
        url: String,
        /// Environment variable holding a bearer token.
        #[serde(default)]
        api_key_env: Option<String>,
    },
    /// Local backend that returns the prompt unchanged.
    Echo,
}

/// Full configuration of one backend: routing profile, admission policy and transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Routing profile.
    #[serde(flatten)]
    pub profile: BackendProfile,
    /// Rolling call budget per minute.
    #[serde(default = "default_calls_per_minute")]
    pub calls_per_minute: u32,
    /// Admission constraints.
    #[serde(default)]
    pub constraints: ConstraintSet,
    /// How to reach the backend.
    pub transport: Transport,
}

fn default_calls_per_minute() -> u32 {
    60
}

impl BackendConfig {
    /// A config with the default call budget and no constraints.
    pub fn new(profile: BackendProfile, transport: Transport) -> Self {
        Self {
            profile,
            calls_per_minute: default_calls_per_minute(),
            constraints: ConstraintSet::new(),
            transport,
        }
    }

    /// The backend id.
    pub fn id(&self) -> &BackendId {
        &self.profile.id
    }
}
