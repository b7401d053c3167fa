use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use switchyard_agent::{AgentRegistry, BackendConfig};
use switchyard_orchestrator::{
    default_backends, BreakerConfig, EventBroadcaster, EventsConfig, FileRewardStore,
    InMemoryRewardStore, Orchestrator, OrchestratorConfig, RewardConfig, RewardStore,
    SelectorConfig,
};
use switchyard_session::{FileSessionStore, MemorySessionStore, SessionStore, DEFAULT_SESSION_TTL};
use tracing::{info, warn};

/// Contents of `switchyard.toml`. Every section is optional.
#[derive(Debug, Default, Deserialize)]
pub struct SwitchyardConfig {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub selector: SelectorConfig,
    #[serde(default)]
    pub reward: RewardConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
}

#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_ttl_secs")]
    pub ttl_secs: u64,
    /// Persist sessions under this directory instead of in memory.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_session_ttl_secs() -> u64 {
    DEFAULT_SESSION_TTL.as_secs()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl_secs(),
            dir: None,
        }
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl SwitchyardConfig {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let mut config: Self = toml::from_str(text)?;
        if config.backends.is_empty() {
            config.backends = default_backends();
        }
        Ok(config)
    }

    /// Read `path`, or use the built-in backend set when it does not exist.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Self::parse(&text)
                .with_context(|| format!("Failed to parse config file '{}'", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Config file not found, using built-in echo backends");
                Ok(Self {
                    backends: default_backends(),
                    ..Self::default()
                })
            }
            Err(e) => Err(anyhow::anyhow!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            )),
        }
    }

    /// Resolve clients and stores and assemble the orchestrator.
    pub async fn build(&self, events: Arc<EventBroadcaster>) -> anyhow::Result<Orchestrator> {
        let registry = AgentRegistry::from_configs(&self.backends)?;

        let rewards: Arc<dyn RewardStore> = match &self.reward.persist_path {
            Some(path) => Arc::new(FileRewardStore::open(path.clone(), self.reward.clone()).await?),
            None => Arc::new(InMemoryRewardStore::new(self.reward.clone())),
        };
        let sessions: Arc<dyn SessionStore> = match &self.session.dir {
            Some(dir) => {
                info!(dir = %dir.display(), "Using file session store");
                Arc::new(FileSessionStore::new(dir.clone(), self.session.ttl()).await?)
            }
            None => Arc::new(MemorySessionStore::new(self.session.ttl())),
        };

        let orchestrator = Orchestrator::builder(registry)
            .config(self.orchestrator.clone())
            .selector_config(self.selector.clone())
            .breaker_config(self.breaker.clone())
            .reward_store(rewards)
            .session_store(sessions)
            .broadcaster(events)
            .build()?;
        Ok(orchestrator)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use switchyard_agent::Transport;
    use switchyard_core::{BackendId, Task, TaskCategory};

    const SAMPLE: &str = r#"
[orchestrator]
max_in_flight = 2
fallback = false

[breaker]
failure_threshold = 3

[session]
ttl_secs = 60

[[backends]]
id = "local"
trust = 80
transport = { type = "echo" }

[[backends]]
id = "remote"
trust = 50
cost_per_1k_tokens = 0.01
calls_per_minute = 10
transport = { type = "http", url = "http://127.0.0.1:9/invoke" }
"#;

    #[test]
    fn test_parse_sections_with_defaults() {
        let config = SwitchyardConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.orchestrator.max_in_flight, 2);
        assert!(!config.orchestrator.fallback);
        assert_eq!(config.orchestrator.task_timeout_secs, 300);
        assert_eq!(config.breaker.failure_threshold, 3);
        assert_eq!(config.breaker.success_threshold, 2);
        assert_eq!(config.session.ttl(), Duration::from_secs(60));
        assert_eq!(config.events.channel_capacity, 256);
        assert_eq!(config.selector, SelectorConfig::default());
        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.backends[1].calls_per_minute, 10);
        assert!(matches!(config.backends[0].transport, Transport::Echo));
    }

    #[test]
    fn test_empty_config_uses_default_backends() {
        let config = SwitchyardConfig::parse("").unwrap();
        assert_eq!(config.backends.len(), default_backends().len());
        assert!(config.session.dir.is_none());
        assert_eq!(config.session.ttl_secs, 3600);
    }

    #[test]
    fn test_invalid_toml_rejected() {
        assert!(SwitchyardConfig::parse("[orchestrator\nmax_in_flight = ").is_err());
    }

    #[tokio::test]
    async fn test_missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let config = SwitchyardConfig::load(&dir.path().join("absent.toml"))
            .await
            .unwrap();
        assert_eq!(config.backends.len(), default_backends().len());
    }

    #[tokio::test]
    async fn test_build_with_file_stores() {
        let dir = tempfile::tempdir().unwrap();
        let text = format!(
            "[reward]\npersist_path = {:?}\n\n[session]\ndir = {:?}\n",
            dir.path().join("rewards.json"),
            dir.path().join("sessions"),
        );
        let config = SwitchyardConfig::parse(&text).unwrap();
        let orch = config
            .build(Arc::new(EventBroadcaster::new(&config.events)))
            .await
            .unwrap();

        let task = Task::new("cli-1", "hello there", TaskCategory::Debugging);
        let resp = orch.execute_task(&task).await.unwrap();
        assert_eq!(resp.content, "hello there");
        assert!(dir.path().join("rewards.json").exists());

        let health = orch.health().await;
        assert!(health.contains_key(&BackendId::from("claude")));
    }
}
