use crate::breaker::{BreakerConfig, BreakerSet, CircuitState};
use crate::broadcast::{EventBroadcaster, EventStream};
use crate::monitor::{BackendHealth, BackendMonitor, HealthSnapshot};
use crate::reward::{InMemoryRewardStore, RewardStore};
use crate::selector::{AgentSelector, Selection, SelectorConfig};
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use switchyard_agent::{AgentRegistry, Invocation, ProgressSink};
use switchyard_core::{
    AgentResponse, BackendId, SwitchyardError, SwitchyardResult, Task, TaskEvent,
};
use switchyard_security::rate_limit::DEFAULT_WINDOW;
use switchyard_security::{AdmissionGuard, ToolCall};
use switchyard_session::{MemorySessionStore, SessionStore};
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Dispatch settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Tasks of one batch running at the same time.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// Deadline for a single backend call.
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
    /// Retry once on another backend after an execution error.
    #[serde(default = "default_fallback")]
    pub fallback: bool,
}

fn default_max_in_flight() -> usize {
    8
}

fn default_task_timeout_secs() -> u64 {
    300
}

fn default_fallback() -> bool {
    true
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            task_timeout_secs: default_task_timeout_secs(),
            fallback: default_fallback(),
        }
    }
}

impl OrchestratorConfig {
    /// [`task_timeout_secs`](Self::task_timeout_secs) as a duration.
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }
}

/// Assembles an [`Orchestrator`] from a registry and optional collaborators.
pub struct OrchestratorBuilder {
    registry: AgentRegistry,
    config: OrchestratorConfig,
    selector: SelectorConfig,
    breaker: BreakerConfig,
    rate_window: Duration,
    rewards: Option<Arc<dyn RewardStore>>,
    sessions: Option<Arc<dyn SessionStore>>,
    events: Option<Arc<EventBroadcaster>>,
}

impl OrchestratorBuilder {
    /// Dispatch settings.
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Selection thresholds and weights.
    pub fn selector_config(mut self, config: SelectorConfig) -> Self {
        self.selector = config;
        self
    }

    /// Breaker tuning shared by all backends.
    pub fn breaker_config(mut self, config: BreakerConfig) -> Self {
        self.breaker = config;
        self
    }

    /// Rate-limit window; one minute unless overridden.
    pub fn rate_window(mut self, window: Duration) -> Self {
        self.rate_window = window;
        self
    }

    /// Score store; in memory unless set.
    pub fn reward_store(mut self, store: Arc<dyn RewardStore>) -> Self {
        self.rewards = Some(store);
        self
    }

    /// Session store; in memory unless set.
    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.sessions = Some(store);
        self
    }

    /// Share an existing broadcaster, e.g. to subscribe before building.
    pub fn broadcaster(mut self, events: Arc<EventBroadcaster>) -> Self {
        self.events = Some(events);
        self
    }

    /// Wire everything together. Fails when the registry is empty.
    pub fn build(self) -> SwitchyardResult<Orchestrator> {
        if self.registry.is_empty() {
            return Err(SwitchyardError::Config("no backends configured".into()));
        }

        let mut guard = AdmissionGuard::with_window(self.rate_window);
        for entry in self.registry.entries() {
            guard.register(
                entry.id().clone(),
                entry.calls_per_minute,
                entry.constraints.clone(),
            );
        }

        let profiles = self.registry.profiles();
        let ids: Vec<BackendId> = profiles.iter().map(|p| p.id.clone()).collect();
        let rewards = self
            .rewards
            .unwrap_or_else(|| Arc::new(InMemoryRewardStore::default()));
        let selector = AgentSelector::new(self.selector, profiles, Arc::clone(&rewards));

        info!(
            backends = ids.len(),
            max_in_flight = self.config.max_in_flight,
            task_timeout_secs = self.config.task_timeout_secs,
            fallback = self.config.fallback,
            "Orchestrator ready"
        );

        Ok(Orchestrator {
            breakers: BreakerSet::new(&self.breaker, &ids),
            monitor: BackendMonitor::new(&ids),
            config: self.config,
            registry: self.registry,
            guard,
            selector,
            rewards,
            sessions: self
                .sessions
                .unwrap_or_else(|| Arc::new(MemorySessionStore::default())),
            events: self.events.unwrap_or_default(),
        })
    }
}

/// Routes tasks to backends and runs them with failure isolation.
///
/// Every call to [`execute_task`](Self::execute_task) publishes
/// `backend_selected` and `progress` events on the task's channel and ends
/// with exactly one `completed` or `failed` event, after which the channel is
/// retired.
pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: AgentRegistry,
    guard: AdmissionGuard,
    breakers: BreakerSet,
    selector: AgentSelector,
    rewards: Arc<dyn RewardStore>,
    sessions: Arc<dyn SessionStore>,
    events: Arc<EventBroadcaster>,
    monitor: BackendMonitor,
}

impl Orchestrator {
    /// Start configuring an orchestrator over `registry`.
    pub fn builder(registry: AgentRegistry) -> OrchestratorBuilder {
        OrchestratorBuilder {
            registry,
            config: OrchestratorConfig::default(),
            selector: SelectorConfig::default(),
            breaker: BreakerConfig::default(),
            rate_window: DEFAULT_WINDOW,
            rewards: None,
            sessions: None,
            events: None,
        }
    }

    /// An orchestrator with default settings and in-memory stores.
    pub fn new(registry: AgentRegistry) -> SwitchyardResult<Self> {
        Self::builder(registry).build()
    }

    /// Dispatch settings.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Configured backends.
    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// The event broadcaster.
    pub fn events(&self) -> &Arc<EventBroadcaster> {
        &self.events
    }

    /// Events of one task, from now until its terminal event.
    pub fn subscribe(&self, task_id: &str) -> EventStream {
        self.events.subscribe(task_id)
    }

    /// Events of every task.
    pub fn subscribe_all(&self) -> EventStream {
        self.events.subscribe_all()
    }

    /// The routing decision for `task`, without running it.
    pub async fn route(&self, task: &Task) -> SwitchyardResult<Selection> {
        task.validate()?;
        self.selector.select(task).await
    }

    /// Run one task.
    pub async fn execute_task(&self, task: &Task) -> SwitchyardResult<AgentResponse> {
        self.execute_task_with_cancel(task, CancellationToken::new())
            .await
    }

    /// Run one task, abandoning the backend call when `cancel` fires.
    pub async fn execute_task_with_cancel(
        &self,
        task: &Task,
        cancel: CancellationToken,
    ) -> SwitchyardResult<AgentResponse> {
        let result = self.run(task, &cancel).await;
        match &result {
            Ok(resp) => {
                info!(
                    task_id = %task.id,
                    backend = %resp.backend_id,
                    tokens = resp.tokens_used,
                    cost = resp.cost_units,
                    duration_ms = resp.duration_ms,
                    "Task completed"
                );
                self.events
                    .publish(&task.id, TaskEvent::completed(&task.id, resp));
            }
            Err(e) => {
                warn!(task_id = %task.id, kind = %e.kind(), error = %e, "Task failed");
                self.events.publish(&task.id, TaskEvent::failed(&task.id, e));
            }
        }
        self.events.retire(&task.id);
        result
    }

    /// Run every task concurrently, at most `max_in_flight` at a time.
    ///
    /// Returns one result per task in input order. A failing or panicking
    /// task never affects the others.
    pub async fn execute_parallel(
        self: &Arc<Self>,
        tasks: Vec<Task>,
    ) -> Vec<SwitchyardResult<AgentResponse>> {
        let max_in_flight = self.config.max_in_flight.max(1);
        let limit = Arc::new(Semaphore::new(max_in_flight));
        info!(tasks = tasks.len(), max_in_flight, "Executing batch");

        let handles: Vec<_> = tasks
            .into_iter()
            .map(|task| {
                let orch = Arc::clone(self);
                let limit = Arc::clone(&limit);
                let task_id = task.id.clone();
                let handle = tokio::spawn(async move {
                    let _permit = limit.acquire_owned().await.map_err(|_| {
                        SwitchyardError::Internal("batch semaphore closed".into())
                    })?;
                    orch.execute_task(&task).await
                });
                (task_id, handle)
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (task_id, handle) in handles {
            results.push(match handle.await {
                Ok(result) => result,
                Err(e) => {
                    error!(task_id = %task_id, error = %e, "Task aborted");
                    Err(SwitchyardError::Internal(format!(
                        "task '{task_id}' aborted: {e}"
                    )))
                }
            });
        }
        results
    }

    /// Health of every configured backend.
    pub async fn health(&self) -> HealthSnapshot {
        let mut snapshot = HealthSnapshot::new();
        for entry in self.registry.entries() {
            let id = entry.id();
            let (circuit_state, consecutive_failures) = self
                .breakers
                .get(id)
                .map(|b| {
                    let s = b.snapshot();
                    (s.state, s.consecutive_failures)
                })
                .unwrap_or((CircuitState::Closed, 0));
            snapshot.insert(
                id.clone(),
                BackendHealth {
                    circuit_state,
                    reward_score: self.rewards.score(id).await,
                    calls_this_window: self.guard.calls_in_window(id),
                    consecutive_failures,
                    metrics: self.monitor.get(id).unwrap_or_default(),
                },
            );
        }
        snapshot
    }

    /// Drop expired session records.
    pub async fn purge_expired_sessions(&self) -> SwitchyardResult<usize> {
        let purged = self.sessions.purge_expired().await?;
        if purged > 0 {
            info!(purged, "Purged expired sessions");
        }
        Ok(purged)
    }

    async fn run(
        &self,
        task: &Task,
        cancel: &CancellationToken,
    ) -> SwitchyardResult<AgentResponse> {
        task.validate()?;
        let selection = self.selector.select(task).await?;

        let err = match self.attempt(task, &selection, cancel, false).await {
            Ok(resp) => return Ok(resp),
            Err(e) => e,
        };
        if !self.config.fallback || !err.is_execution() {
            return Err(err);
        }

        let failed = selection.backend_id;
        let fallback = match self
            .selector
            .select_excluding(task, std::slice::from_ref(&failed))
            .await
        {
            Ok(selection) => selection,
            Err(reason) => {
                info!(task_id = %task.id, backend = %failed, reason = %reason, "No fallback available");
                return Err(err);
            }
        };

        warn!(
            task_id = %task.id,
            from = %failed,
            to = %fallback.backend_id,
            error = %err,
            "Falling back to another backend"
        );
        self.events.publish(
            &task.id,
            TaskEvent::progress(
                &task.id,
                &failed,
                serde_json::json!({
                    "status": "fallback",
                    "from": failed,
                    "to": fallback.backend_id,
                    "error": err.to_string(),
                }),
            ),
        );
        self.attempt(task, &fallback, cancel, true).await
    }

    /// One admission-checked invocation of the selected backend.
    async fn attempt(
        &self,
        task: &Task,
        selection: &Selection,
        cancel: &CancellationToken,
        is_fallback: bool,
    ) -> SwitchyardResult<AgentResponse> {
        let backend = &selection.backend_id;
        self.events.publish(
            &task.id,
            TaskEvent::backend_selected(
                &task.id,
                backend,
                serde_json::json!({ "reason": selection.reason, "fallback": is_fallback }),
            ),
        );

        let (Some(entry), Some(breaker)) =
            (self.registry.get(backend), self.breakers.get(backend))
        else {
            return Err(SwitchyardError::UnknownBackend {
                backend: backend.clone(),
            });
        };

        // The breaker slot is taken before the rate budget is touched; a
        // guard rejection drops the permit and hands the slot back.
        let admitted = breaker.acquire().and_then(|permit| {
            self.guard
                .admit(backend, &ToolCall::from_task(task))
                .map(|()| permit)
        });
        let permit = match admitted {
            Ok(permit) => permit,
            Err(e) => {
                self.monitor.record_rejection(backend);
                warn!(task_id = %task.id, backend = %backend, kind = %e.kind(), "Call rejected");
                return Err(e);
            }
        };

        let session_token = match self.sessions.get(&task.id).await {
            Ok(Some(record)) if record.backend_id == *backend => Some(record.token),
            Ok(_) => None,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Session lookup failed, starting fresh");
                None
            }
        };
        let invocation = Invocation::for_task(task, session_token);
        let sink = self.progress_sink(&task.id, backend);

        debug!(
            task_id = %task.id,
            backend = %backend,
            probe = permit.is_probe(),
            resumed = invocation.session_token.is_some(),
            "Invoking backend"
        );

        let timeout = self.config.task_timeout();
        let started = Instant::now();
        let call = AssertUnwindSafe(entry.client.invoke(&invocation, &sink)).catch_unwind();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SwitchyardError::Cancelled { backend: backend.clone() }),
            res = tokio::time::timeout(timeout, call) => match res {
                Ok(Ok(result)) => result.map_err(|e| e.into_execution(backend)),
                Ok(Err(panic)) => Err(SwitchyardError::backend_failure(
                    backend,
                    format!("client panicked: {}", panic_message(&*panic)),
                )),
                Err(_) => Err(SwitchyardError::Timeout {
                    backend: backend.clone(),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                }),
            },
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) => {
                permit.success();
                let cost_units = output
                    .cost_units
                    .filter(|c| c.is_finite())
                    .unwrap_or_else(|| entry.profile.derive_cost(output.tokens_used));
                let response = AgentResponse {
                    backend_id: backend.clone(),
                    content: output.content,
                    tokens_used: output.tokens_used,
                    cost_units,
                    duration_ms,
                    session_token: output.session_token,
                    metadata: output.metadata,
                };
                self.monitor.record_success(&response);
                self.update_reward(backend, &response, true).await;
                if let Some(token) = &response.session_token {
                    if let Err(e) = self.sessions.put(&task.id, backend, token).await {
                        warn!(task_id = %task.id, error = %e, "Failed to store session");
                    }
                }
                Ok(response)
            }
            Err(e @ SwitchyardError::Cancelled { .. }) => {
                // Not the backend's fault: the permit is released without an outcome.
                drop(permit);
                self.monitor.record_cancellation(backend, duration_ms);
                info!(task_id = %task.id, backend = %backend, duration_ms, "Execution cancelled");
                Err(e)
            }
            Err(e) => {
                permit.failure();
                self.monitor.record_failure(backend, duration_ms);
                self.update_reward(
                    backend,
                    &AgentResponse::failed(backend.clone(), duration_ms),
                    false,
                )
                .await;
                warn!(task_id = %task.id, backend = %backend, error = %e, "Backend call failed");
                Err(e)
            }
        }
    }

    fn progress_sink(&self, task_id: &str, backend: &BackendId) -> ProgressSink {
        let events = Arc::clone(&self.events);
        let task_id = task_id.to_string();
        let backend = backend.clone();
        ProgressSink::new(move |progress| {
            let payload = serde_json::to_value(&progress).unwrap_or_default();
            events.publish(&task_id, TaskEvent::progress(&task_id, &backend, payload));
        })
    }

    async fn update_reward(&self, backend: &BackendId, response: &AgentResponse, success: bool) {
        if let Err(e) = self.rewards.update(backend, response, success).await {
            warn!(backend = %backend, error = %e, "Failed to record reward");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
