use crate::reward::RewardStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use switchyard_agent::BackendProfile;
use switchyard_core::{BackendId, SwitchyardError, SwitchyardResult, Task, TaskCategory};
use tracing::info;

/// Routing thresholds and cost weighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Context size (tokens) above which the largest-window backend is used.
    #[serde(default = "default_large_context_threshold")]
    pub large_context_threshold: u64,
    /// File count above which the largest-window backend is used.
    #[serde(default = "default_file_count_threshold")]
    pub file_count_threshold: usize,
    /// Score multiplier for free backends (> 1).
    #[serde(default = "default_free_cost_weight")]
    pub free_cost_weight: f64,
    /// Score multiplier for paid backends (< 1).
    #[serde(default = "default_paid_cost_weight")]
    pub paid_cost_weight: f64,
}

fn default_large_context_threshold() -> u64 {
    100_000
}

fn default_file_count_threshold() -> usize {
    50
}

fn default_free_cost_weight() -> f64 {
    1.2
}

fn default_paid_cost_weight() -> f64 {
    0.8
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            large_context_threshold: default_large_context_threshold(),
            file_count_threshold: default_file_count_threshold(),
            free_cost_weight: default_free_cost_weight(),
            paid_cost_weight: default_paid_cost_weight(),
        }
    }
}

/// Why a backend was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum SelectionReason {
    /// Security task sent to the highest-trust backend.
    SecurityOverride,
    /// Large task sent to the widest context window.
    LargeContext,
    /// Workflow task sent to its specialist.
    WorkflowSpecialist,
    /// Highest reward-weighted score.
    Scored {
        /// Reward times the cost weight.
        score: f64,
    },
}

impl fmt::Display for SelectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionReason::SecurityOverride => f.write_str("security_override"),
            SelectionReason::LargeContext => f.write_str("large_context"),
            SelectionReason::WorkflowSpecialist => f.write_str("workflow_specialist"),
            SelectionReason::Scored { score } => write!(f, "scored({score:.4})"),
        }
    }
}

/// The routing decision for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    /// Chosen backend.
    pub backend_id: BackendId,
    /// Rule that chose it.
    pub reason: SelectionReason,
}

/// Chooses a backend per task: rule overrides first, then reward-weighted
/// scoring with fixed priority tie-breaks.
pub struct AgentSelector {
    config: SelectorConfig,
    /// Sorted by priority, then id.
    profiles: Vec<BackendProfile>,
    rewards: Arc<dyn RewardStore>,
}

impl AgentSelector {
    /// Selector over `profiles`, scored with `rewards`.
    pub fn new(
        config: SelectorConfig,
        mut profiles: Vec<BackendProfile>,
        rewards: Arc<dyn RewardStore>,
    ) -> Self {
        profiles.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        Self {
            config,
            profiles,
            rewards,
        }
    }

    /// Selection thresholds and weights.
    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Profiles in selection order.
    pub fn profiles(&self) -> &[BackendProfile] {
        &self.profiles
    }

    /// Pick a backend for `task`.
    pub async fn select(&self, task: &Task) -> SwitchyardResult<Selection> {
        self.select_excluding(task, &[]).await
    }

    /// Pick a backend for `task`, never one of `excluded`.
    pub async fn select_excluding(
        &self,
        task: &Task,
        excluded: &[BackendId],
    ) -> SwitchyardResult<Selection> {
        let mut scores = HashMap::with_capacity(self.profiles.len());
        for p in &self.profiles {
            scores.insert(p.id.clone(), self.rewards.score(&p.id).await);
        }
        let selection = self.select_with_scores(task, &scores, excluded)?;
        info!(
            task_id = %task.id,
            backend = %selection.backend_id,
            reason = %selection.reason,
            excluded = excluded.len(),
            "Backend selected"
        );
        Ok(selection)
    }

    /// The deterministic core of selection over a fixed score snapshot.
    /// Backends missing from `scores` use the neutral prior 0.5.
    pub fn select_with_scores(
        &self,
        task: &Task,
        scores: &HashMap<BackendId, f64>,
        excluded: &[BackendId],
    ) -> SwitchyardResult<Selection> {
        if self.profiles.is_empty() {
            return Err(SwitchyardError::NoEligibleBackend(
                "no backends configured".into(),
            ));
        }
        let eligible = |p: &&BackendProfile| !excluded.contains(&p.id);

        if task.is_security_sensitive() {
            // First profile in priority order among those with the highest trust.
            let trusted = self
                .profiles
                .iter()
                .rev()
                .max_by_key(|p| p.trust)
                .map(|p| p.id.clone());
            return match trusted {
                Some(id) if !excluded.contains(&id) => Ok(Selection {
                    backend_id: id,
                    reason: SelectionReason::SecurityOverride,
                }),
                _ => Err(SwitchyardError::NoEligibleBackend(format!(
                    "security task '{}' requires the highest-trust backend, which is unavailable",
                    task.id
                ))),
            };
        }

        if task.effective_context_size() > self.config.large_context_threshold
            || task.file_refs.len() > self.config.file_count_threshold
        {
            if let Some(p) = self
                .profiles
                .iter()
                .filter(eligible)
                .rev()
                .max_by_key(|p| p.context_window)
            {
                return Ok(Selection {
                    backend_id: p.id.clone(),
                    reason: SelectionReason::LargeContext,
                });
            }
        }

        if task.category == TaskCategory::Workflow {
            if let Some(p) = self
                .profiles
                .iter()
                .filter(eligible)
                .find(|p| p.specializes_in(TaskCategory::Workflow))
            {
                return Ok(Selection {
                    backend_id: p.id.clone(),
                    reason: SelectionReason::WorkflowSpecialist,
                });
            }
        }

        let mut best: Option<(&BackendProfile, f64)> = None;
        for p in self.profiles.iter().filter(eligible) {
            let reward = scores.get(&p.id).copied().unwrap_or(0.5);
            let reward = if reward.is_finite() { reward } else { 0.0 };
            let weight = if p.is_free() {
                self.config.free_cost_weight
            } else {
                self.config.paid_cost_weight
            };
            let adjusted = reward * weight;
            // Strictly greater keeps the earlier (higher-priority) backend on ties.
            if best.map_or(true, |(_, s)| adjusted > s) {
                best = Some((p, adjusted));
            }
        }

        best.map(|(p, score)| Selection {
            backend_id: p.id.clone(),
            reason: SelectionReason::Scored { score },
        })
        .ok_or_else(|| {
            SwitchyardError::NoEligibleBackend(format!(
                "every backend is excluded for task '{}'",
                task.id
            ))
        })
    }
}
