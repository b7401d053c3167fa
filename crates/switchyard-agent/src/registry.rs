use crate::backends::{CommandBackend, EchoBackend, HttpBackend};
use crate::client::AgentClient;
use crate::config::{BackendConfig, BackendProfile, Transport};
use std::collections::HashMap;
use std::sync::Arc;
use switchyard_core::{BackendId, SwitchyardError, SwitchyardResult};
use switchyard_security::ConstraintSet;
use tracing::info;

/// A configured backend: routing profile, admission policy and client.
#[derive(Clone)]
pub struct BackendEntry {
    /// Routing profile.
    pub profile: BackendProfile,
    /// Rolling call budget per minute.
    pub calls_per_minute: u32,
    /// Admission constraints.
    pub constraints: ConstraintSet,
    /// The client that performs calls.
    pub client: Arc<dyn AgentClient>,
}

impl BackendEntry {
    /// An entry with 60 calls per minute and no constraints.
    pub fn new(profile: BackendProfile, client: Arc<dyn AgentClient>) -> Self {
        Self {
            profile,
            calls_per_minute: 60,
            constraints: ConstraintSet::new(),
            client,
        }
    }

    /// Set the call budget.
    pub fn with_calls_per_minute(mut self, limit: u32) -> Self {
        self.calls_per_minute = limit;
        self
    }

    /// Set the admission constraints.
    pub fn with_constraints(mut self, constraints: ConstraintSet) -> Self {
        self.constraints = constraints;
        self
    }

    /// The backend id.
    pub fn id(&self) -> &BackendId {
        &self.profile.id
    }
}

/// Lookup table of backends keyed by id.
///
/// Resolved once at startup; the orchestrator never adds or removes
/// backends afterwards.
pub struct AgentRegistry {
    entries: HashMap<BackendId, BackendEntry>,
}

impl AgentRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Build every configured backend's client.
    pub fn from_configs(configs: &[BackendConfig]) -> SwitchyardResult<Self> {
        let mut registry = Self::new();
        for config in configs {
            let entry = BackendEntry::new(config.profile.clone(), build_client(config))
                .with_calls_per_minute(config.calls_per_minute)
                .with_constraints(config.constraints.clone());
            registry.register(entry)?;
        }
        Ok(registry)
    }

    /// Add a backend. Empty or duplicate ids are configuration errors, as is a client whose id differs from the profile's.
    pub fn register(&mut self, entry: BackendEntry) -> SwitchyardResult<()> {
        let id = entry.id().clone();
        if id.as_str().trim().is_empty() {
            return Err(SwitchyardError::Config("backend id is empty".into()));
        }
        if entry.client.id() != &id {
            return Err(SwitchyardError::Config(format!(
                "client for backend '{id}' reports id '{}'",
                entry.client.id()
            )));
        }
        if self.entries.contains_key(&id) {
            return Err(SwitchyardError::Config(format!(
                "backend '{id}' is configured twice"
            )));
        }
        info!(
            backend = %id,
            trust = entry.profile.trust,
            free = entry.profile.is_free(),
            calls_per_minute = entry.calls_per_minute,
            "Registered backend"
        );
        self.entries.insert(id, entry);
        Ok(())
    }

    /// The entry for `id`.
    pub fn get(&self, id: &BackendId) -> Option<&BackendEntry> {
        self.entries.get(id)
    }

    /// The client for `id`.
    pub fn client(&self, id: &BackendId) -> Option<Arc<dyn AgentClient>> {
        self.entries.get(id).map(|e| Arc::clone(&e.client))
    }

    /// The routing profile for `id`.
    pub fn profile(&self, id: &BackendId) -> Option<&BackendProfile> {
        self.entries.get(id).map(|e| &e.profile)
    }

    /// Every profile in priority order (ties by id).
    pub fn profiles(&self) -> Vec<BackendProfile> {
        let mut profiles: Vec<BackendProfile> =
            self.entries.values().map(|e| e.profile.clone()).collect();
        profiles.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        profiles
    }

    /// Every entry in priority order.
    pub fn entries(&self) -> Vec<&BackendEntry> {
        let mut entries: Vec<&BackendEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| {
            a.profile
                .priority
                .cmp(&b.profile.priority)
                .then_with(|| a.id().cmp(b.id()))
        });
        entries
    }

    /// Number of registered backends.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no backend is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn build_client(config: &BackendConfig) -> Arc<dyn AgentClient> {
    let id = config.id().clone();
    match &config.transport {
        Transport::Command {
            program,
            args,
            env,
            working_dir,
            file_arg,
            session_arg,
        } => Arc::new(
            CommandBackend::new(id, program.clone())
                .with_args(args.clone())
                .with_env(env.clone())
                .with_working_dir(working_dir.clone())
                .with_file_arg(file_arg.clone())
                .with_session_arg(session_arg.clone()),
        ),
        Transport::Http { url, api_key_env } => Arc::new(
            HttpBackend::new(id, url.clone()).with_api_key_env(api_key_env.as_deref()),
        ),
        Transport::Echo => Arc::new(EchoBackend::new(id)),
    }
}
