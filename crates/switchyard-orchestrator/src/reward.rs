use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use switchyard_core::{AgentResponse, BackendId, SwitchyardError, SwitchyardResult};
use tracing::{debug, info};

/// Reward formula and EMA tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardConfig {
    /// EMA smoothing factor.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Weight of the throughput term.
    #[serde(default = "default_speed_weight")]
    pub speed_weight: f64,
    /// Weight of the cost term.
    #[serde(default = "default_cost_weight")]
    pub cost_weight: f64,
    /// Weight of the success term.
    #[serde(default = "default_outcome_weight")]
    pub outcome_weight: f64,
    /// Throughput (tokens/s) that earns a full speed score.
    #[serde(default = "default_speed_norm")]
    pub speed_norm: f64,
    /// Cost at which the cost score reaches zero.
    #[serde(default = "default_cost_norm")]
    pub cost_norm: f64,
    /// Outcome score of a failed attempt.
    #[serde(default = "default_failure_penalty")]
    pub failure_penalty: f64,
    /// Score of a backend with no history.
    #[serde(default = "default_prior")]
    pub default_prior: f64,
    /// JSON snapshot location for durable scores.
    #[serde(default)]
    pub persist_path: Option<PathBuf>,
}

fn default_alpha() -> f64 {
    0.1
}

fn default_speed_weight() -> f64 {
    0.3
}

fn default_cost_weight() -> f64 {
    0.3
}

fn default_outcome_weight() -> f64 {
    0.4
}

fn default_speed_norm() -> f64 {
    50.0
}

fn default_cost_norm() -> f64 {
    1.0
}

fn default_failure_penalty() -> f64 {
    0.2
}

fn default_prior() -> f64 {
    0.5
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            speed_weight: default_speed_weight(),
            cost_weight: default_cost_weight(),
            outcome_weight: default_outcome_weight(),
            speed_norm: default_speed_norm(),
            cost_norm: default_cost_norm(),
            failure_penalty: default_failure_penalty(),
            default_prior: default_prior(),
            persist_path: None,
        }
    }
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

impl RewardConfig {
    /// Throughput component in `[0, 1]`.
    pub fn speed_score(&self, response: &AgentResponse) -> f64 {
        if response.tokens_used == 0 {
            return 0.0;
        }
        if response.duration_ms == 0 || self.speed_norm <= 0.0 {
            return 1.0;
        }
        let tps = response.tokens_used as f64 / (response.duration_ms as f64 / 1000.0);
        finite_or(tps / self.speed_norm, 0.0).clamp(0.0, 1.0)
    }

    /// Cost component in `[0, 1]`. Free calls score 1.
    pub fn cost_score(&self, response: &AgentResponse) -> f64 {
        let cost = finite_or(response.cost_units, 0.0);
        if cost <= 0.0 {
            return 1.0;
        }
        if self.cost_norm <= 0.0 {
            return 0.0;
        }
        (1.0 - cost / self.cost_norm).max(0.0)
    }

    /// Weighted reward of one attempt, in `[0, 1]`.
    pub fn reward(&self, response: &AgentResponse, success: bool) -> f64 {
        let outcome = if success { 1.0 } else { self.failure_penalty };
        let reward = self.speed_weight * self.speed_score(response)
            + self.cost_weight * self.cost_score(response)
            + self.outcome_weight * outcome;
        finite_or(reward, 0.0).clamp(0.0, 1.0)
    }

    /// EMA step. A non-finite reward leaves the score unchanged.
    pub fn blend(&self, score: f64, reward: f64) -> f64 {
        let score = finite_or(score, self.prior());
        if !reward.is_finite() {
            return score.clamp(0.0, 1.0);
        }
        let alpha = finite_or(self.alpha, default_alpha()).clamp(0.0, 1.0);
        ((1.0 - alpha) * score + alpha * reward).clamp(0.0, 1.0)
    }

    /// The prior, clamped to `[0, 1]`.
    pub fn prior(&self) -> f64 {
        finite_or(self.default_prior, default_prior()).clamp(0.0, 1.0)
    }
}

/// Per-backend running performance score.
#[async_trait]
pub trait RewardStore: Send + Sync {
    /// Current score; the prior for a backend with no history.
    async fn score(&self, backend: &BackendId) -> f64;
    /// Fold one attempt into the backend's score and return the new score.
    async fn update(
        &self,
        backend: &BackendId,
        response: &AgentResponse,
        success: bool,
    ) -> SwitchyardResult<f64>;
    /// Every backend with a recorded score.
    async fn snapshot(&self) -> HashMap<BackendId, f64>;
}

/// In-memory scores with one lock per backend.
pub struct InMemoryRewardStore {
    config: RewardConfig,
    entries: RwLock<HashMap<BackendId, Arc<Mutex<f64>>>>,
}

impl InMemoryRewardStore {
    /// An empty store; every backend starts at the prior.
    pub fn new(config: RewardConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Seed scores, e.g. from a persisted snapshot. Values are clamped.
    pub fn with_scores(self, scores: HashMap<BackendId, f64>) -> Self {
        {
            let mut entries = self.entries.write();
            for (backend, score) in scores {
                let score = finite_or(score, self.config.prior()).clamp(0.0, 1.0);
                entries.insert(backend, Arc::new(Mutex::new(score)));
            }
        }
        self
    }

    /// Reward tuning.
    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    fn entry(&self, backend: &BackendId) -> Arc<Mutex<f64>> {
        if let Some(entry) = self.entries.read().get(backend) {
            return Arc::clone(entry);
        }
        let prior = self.config.prior();
        Arc::clone(
            self.entries
                .write()
                .entry(backend.clone())
                .or_insert_with(|| Arc::new(Mutex::new(prior))),
        )
    }

    fn apply(&self, backend: &BackendId, response: &AgentResponse, success: bool) -> f64 {
        let reward = self.config.reward(response, success);
        let entry = self.entry(backend);
        let mut score = entry.lock();
        *score = self.config.blend(*score, reward);
        debug!(backend = %backend, reward, score = *score, success, "Reward updated");
        *score
    }

    fn scores(&self) -> HashMap<BackendId, f64> {
        self.entries
            .read()
            .iter()
            .map(|(id, score)| (id.clone(), *score.lock()))
            .collect()
    }
}

impl Default for InMemoryRewardStore {
    fn default() -> Self {
        Self::new(RewardConfig::default())
    }
}

#[async_trait]
impl RewardStore for InMemoryRewardStore {
    async fn score(&self, backend: &BackendId) -> f64 {
        self.entries
            .read()
            .get(backend)
            .map(|s| *s.lock())
            .unwrap_or_else(|| self.config.prior())
    }

    async fn update(
        &self,
        backend: &BackendId,
        response: &AgentResponse,
        success: bool,
    ) -> SwitchyardResult<f64> {
        Ok(self.apply(backend, response, success))
    }

    async fn snapshot(&self) -> HashMap<BackendId, f64> {
        self.scores()
    }
}

/// Scores persisted as a JSON object (`{"backend": score}`) after every update.
pub struct FileRewardStore {
    path: PathBuf,
    inner: InMemoryRewardStore,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileRewardStore {
    /// Load the snapshot at `path` if it exists.
    pub async fn open(path: PathBuf, config: RewardConfig) -> SwitchyardResult<Self> {
        let scores: HashMap<BackendId, f64> = match tokio::fs::read_to_string(&path).await {
            Ok(data) => serde_json::from_str(&data).map_err(|e| {
                SwitchyardError::Config(format!(
                    "invalid reward snapshot {}: {e}",
                    path.display()
                ))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        info!(path = %path.display(), backends = scores.len(), "Loaded reward snapshot");
        Ok(Self {
            path,
            inner: InMemoryRewardStore::new(config).with_scores(scores),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    async fn persist(&self) -> SwitchyardResult<()> {
        let _guard = self.write_lock.lock().await;
        let json = serde_json::to_string_pretty(&self.inner.scores())?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl RewardStore for FileRewardStore {
    async fn score(&self, backend: &BackendId) -> f64 {
        self.inner.score(backend).await
    }

    async fn update(
        &self,
        backend: &BackendId,
        response: &AgentResponse,
        success: bool,
    ) -> SwitchyardResult<f64> {
        let score = self.inner.apply(backend, response, success);
        self.persist().await?;
        Ok(score)
    }

    async fn snapshot(&self) -> HashMap<BackendId, f64> {
        self.inner.scores()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn response(tokens: u64, duration_ms: u64, cost: f64) -> AgentResponse {
        let mut r = AgentResponse::failed(BackendId::from("b"), duration_ms);
        r.tokens_used = tokens;
        r.cost_units = cost;
        r
    }

    #[test]
    fn test_reward_components() {
        let c = RewardConfig::default();
        // 100 tokens in 1s = 100 tok/s, above the 50 tok/s norm.
        assert_eq!(c.speed_score(&response(100, 1_000, 0.0)), 1.0);
        assert!((c.speed_score(&response(25, 1_000, 0.0)) - 0.5).abs() < 1e-9);
        assert_eq!(c.speed_score(&response(10, 0, 0.0)), 1.0);
        assert_eq!(c.speed_score(&response(0, 0, 0.0)), 0.0);

        assert_eq!(c.cost_score(&response(0, 1, 0.0)), 1.0);
        assert!((c.cost_score(&response(0, 1, 0.25)) - 0.75).abs() < 1e-9);
        assert_eq!(c.cost_score(&response(0, 1, 3.0)), 0.0);

        // Fast, free success earns the full reward.
        assert!((c.reward(&response(100, 1_000, 0.0), true) - 1.0).abs() < 1e-9);
        // A failed empty attempt: speed 0, free, outcome 0.2.
        let r = c.reward(&response(0, 500, 0.0), false);
        assert!((r - (0.3 + 0.4 * 0.2)).abs() < 1e-9);
    }

    #[test]
    fn test_blend_guards_nan() {
        let c = RewardConfig::default();
        assert!((c.blend(0.5, 1.0) - 0.55).abs() < 1e-9);
        assert_eq!(c.blend(0.5, f64::NAN), 0.5);
        assert_eq!(c.blend(f64::NAN, f64::NAN), 0.5);
        assert_eq!(c.blend(0.9, f64::INFINITY), 0.9);
    }

    #[tokio::test]
    async fn test_lazy_prior_and_bounds() {
        let store = InMemoryRewardStore::default();
        let b = BackendId::from("b");
        assert_eq!(store.score(&b).await, 0.5);
        assert!(store.snapshot().await.is_empty());

        for i in 0..500 {
            let resp = response(i * 7, i % 3, f64::from(i as u32) * 0.01);
            let s = store.update(&b, &resp, i % 2 == 0).await.unwrap();
            assert!((0.0..=1.0).contains(&s));
        }
        let mut nan = response(10, 10, f64::NAN);
        nan.tokens_used = u64::MAX;
        let s = store.update(&b, &nan, true).await.unwrap();
        assert!((0.0..=1.0).contains(&s));
        assert_eq!(store.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state").join("rewards.json");
        let b = BackendId::from("gemini");
        {
            let store = FileRewardStore::open(path.clone(), RewardConfig::default())
                .await
                .unwrap();
            store.update(&b, &response(100, 1_000, 0.0), true).await.unwrap();
        }
        let reopened = FileRewardStore::open(path, RewardConfig::default())
            .await
            .unwrap();
        assert!((reopened.score(&b).await - 0.55).abs() < 1e-9);
    }
}
