//! End-to-end orchestration tests.
//!
//! Drives the full dispatch path (selection, admission, circuit breaking,
//! sessions, timeouts, cancellation, fallback and event fan-out) against
//! scripted mock backends.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use switchyard_agent::{
    AgentClient, AgentRegistry, BackendEntry, BackendProfile, Invocation, InvocationOutput,
    Progress, ProgressSink,
};
use switchyard_core::{
    BackendId, ErrorKind, EventKind, SwitchyardError, SwitchyardResult, Task, TaskCategory,
    TaskEvent,
};
use switchyard_orchestrator::*;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Mock backend: behavior can be switched between calls
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Behavior {
    Succeed,
    Fail,
    Sleep(Duration),
}

struct MockClient {
    id: BackendId,
    behavior: Mutex<Behavior>,
    calls: AtomicUsize,
    seen_tokens: Mutex<Vec<Option<String>>>,
    started: Notify,
}

impl MockClient {
    fn new(id: &str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            id: BackendId::from(id),
            behavior: Mutex::new(behavior),
            calls: AtomicUsize::new(0),
            seen_tokens: Mutex::new(Vec::new()),
            started: Notify::new(),
        })
    }

    fn set(&self, behavior: Behavior) {
        *self.behavior.lock() = behavior;
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn output(&self, invocation: &Invocation) -> InvocationOutput {
        let mut out = InvocationOutput::new(format!("{}: {}", self.id, invocation.prompt));
        out.tokens_used = 1_000;
        out.session_token = Some(format!("{}-session", self.id));
        out
    }
}

#[async_trait]
impl AgentClient for MockClient {
    fn id(&self) -> &BackendId {
        &self.id
    }

    async fn invoke(
        &self,
        invocation: &Invocation,
        progress: &ProgressSink,
    ) -> SwitchyardResult<InvocationOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_tokens
            .lock()
            .push(invocation.session_token.clone());
        self.started.notify_one();
        progress.emit(Progress::text("working"));

        if invocation.prompt.starts_with("panic") {
            panic!("scripted panic");
        }
        if invocation.prompt.starts_with("fail") {
            return Err(SwitchyardError::backend_failure(&self.id, "scripted failure"));
        }

        let behavior = *self.behavior.lock();
        match behavior {
            Behavior::Succeed => Ok(self.output(invocation)),
            Behavior::Fail => Err(SwitchyardError::backend_failure(&self.id, "boom")),
            Behavior::Sleep(d) => {
                tokio::time::sleep(d).await;
                Ok(self.output(invocation))
            }
        }
    }
}

fn entry(client: &Arc<MockClient>, profile: BackendProfile) -> BackendEntry {
    BackendEntry::new(profile, Arc::clone(client) as Arc<dyn AgentClient>)
        .with_calls_per_minute(100)
}

fn registry(entries: Vec<BackendEntry>) -> AgentRegistry {
    let mut registry = AgentRegistry::new();
    for e in entries {
        registry.register(e).unwrap();
    }
    registry
}

fn task(id: &str, prompt: &str) -> Task {
    Task::new(id, prompt, TaskCategory::Debugging)
}

fn single(client: &Arc<MockClient>) -> Orchestrator {
    Orchestrator::new(registry(vec![entry(
        client,
        BackendProfile::new(client.id.as_str()),
    )]))
    .unwrap()
}

async fn collect(stream: EventStream) -> Vec<TaskEvent> {
    stream.collect().await
}

fn terminal_count(events: &[TaskEvent]) -> usize {
    events.iter().filter(|e| e.kind.is_terminal()).count()
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_security_task_routes_to_trusted_backend() {
    let cheap = MockClient::new("cheap", Behavior::Succeed);
    let trusted = MockClient::new("trusted", Behavior::Succeed);
    let orch = Orchestrator::new(registry(vec![
        entry(&cheap, BackendProfile::new("cheap").with_trust(40).with_priority(1)),
        entry(
            &trusted,
            BackendProfile::new("trusted")
                .with_trust(90)
                .with_cost_per_1k_tokens(0.02)
                .with_priority(2),
        ),
    ]))
    .unwrap();

    let secure = task("audit", "review the auth flow").requiring_security();
    let resp = orch.execute_task(&secure).await.unwrap();
    assert_eq!(resp.backend_id, BackendId::from("trusted"));
    // Cost derived from the profile when the backend reports none.
    assert!((resp.cost_units - 0.02).abs() < 1e-9);
    assert_eq!(cheap.calls(), 0);

    let category = Task::new("audit-2", "check input handling", TaskCategory::Security);
    let selection = orch.route(&category).await.unwrap();
    assert_eq!(selection.backend_id, BackendId::from("trusted"));
    assert_eq!(selection.reason, SelectionReason::SecurityOverride);
}

#[tokio::test]
async fn test_invalid_task_emits_single_failed_event() {
    let client = MockClient::new("solo", Behavior::Succeed);
    let orch = single(&client);
    let stream = orch.subscribe("bad");

    let err = orch.execute_task(&task("bad", "   ")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTask);
    assert_eq!(client.calls(), 0);

    let events = collect(stream).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Failed);
}

// ---------------------------------------------------------------------------
// Circuit breaking
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_breaker_opens_after_five_failures() {
    let client = MockClient::new("flaky", Behavior::Fail);
    let orch = single(&client);

    for i in 0..5 {
        let err = orch
            .execute_task(&task(&format!("t{i}"), "do work"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendError);
    }
    assert_eq!(client.calls(), 5);

    let err = orch.execute_task(&task("t5", "do work")).await.unwrap_err();
    assert!(matches!(err, SwitchyardError::CircuitOpen { .. }));
    assert_eq!(client.calls(), 5, "open circuit must not reach the backend");

    let health = orch.health().await;
    let flaky = &health[&BackendId::from("flaky")];
    assert_eq!(flaky.circuit_state, CircuitState::Open);
    assert_eq!(flaky.consecutive_failures, 5);
    assert_eq!(flaky.metrics.failures, 5);
    assert_eq!(flaky.metrics.rejections, 1);
    // Rejected before the rate budget was touched.
    assert_eq!(flaky.calls_this_window, 5);
    assert!(flaky.reward_score < 0.5);
}

#[tokio::test(start_paused = true)]
async fn test_breaker_probe_recovery_and_reopen() {
    let client = MockClient::new("flaky", Behavior::Fail);
    let orch = single(&client);
    let id = BackendId::from("flaky");

    for i in 0..5 {
        let _ = orch.execute_task(&task(&format!("t{i}"), "x")).await;
    }
    assert_eq!(orch.health().await[&id].circuit_state, CircuitState::Open);

    // A failed probe re-opens the circuit.
    tokio::time::advance(Duration::from_secs(61)).await;
    let _ = orch.execute_task(&task("probe-1", "x")).await;
    assert_eq!(client.calls(), 6);
    assert_eq!(orch.health().await[&id].circuit_state, CircuitState::Open);
    let err = orch.execute_task(&task("blocked", "x")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CircuitOpen);
    assert_eq!(client.calls(), 6);

    // Two successful probes close it.
    tokio::time::advance(Duration::from_secs(61)).await;
    client.set(Behavior::Succeed);
    orch.execute_task(&task("probe-2", "x")).await.unwrap();
    assert_eq!(orch.health().await[&id].circuit_state, CircuitState::HalfOpen);
    orch.execute_task(&task("probe-3", "x")).await.unwrap();
    let health = orch.health().await;
    assert_eq!(health[&id].circuit_state, CircuitState::Closed);
    assert_eq!(health[&id].consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_rejection_keeps_rate_budget() {
    let client = MockClient::new("flaky", Behavior::Fail);
    let orch = Arc::new(single(&client));
    let id = BackendId::from("flaky");

    for i in 0..5 {
        let _ = orch.execute_task(&task(&format!("t{i}"), "x")).await;
    }
    tokio::time::advance(Duration::from_secs(61)).await;

    // The first call after recovery holds the only half-open slot.
    client.set(Behavior::Sleep(Duration::from_secs(10)));
    let holder = tokio::spawn({
        let orch = Arc::clone(&orch);
        async move { orch.execute_task(&task("slow", "x")).await }
    });
    while client.calls() < 6 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    let before = orch.health().await[&id].calls_this_window;
    assert_eq!(before, 1);

    for i in 0..3 {
        let err = orch
            .execute_task(&task(&format!("late-{i}"), "x"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CircuitOpen);
    }
    let health = orch.health().await;
    assert_eq!(health[&id].calls_this_window, before);
    assert_eq!(health[&id].metrics.rejections, 3);
    assert_eq!(client.calls(), 6);

    holder.await.unwrap().unwrap();
    assert_eq!(orch.health().await[&id].circuit_state, CircuitState::HalfOpen);
}

#[tokio::test]
async fn test_failing_backend_leaves_others_closed() {
    let broken = MockClient::new("broken", Behavior::Fail);
    let healthy = MockClient::new("healthy", Behavior::Succeed);
    let orch = Orchestrator::builder(registry(vec![
        entry(
            &broken,
            BackendProfile::new("broken").with_trust(90).with_priority(1),
        ),
        entry(
            &healthy,
            BackendProfile::new("healthy")
                .with_trust(40)
                .with_specialty(TaskCategory::Workflow)
                .with_priority(2),
        ),
    ]))
    .config(OrchestratorConfig {
        fallback: false,
        ..OrchestratorConfig::default()
    })
    .build()
    .unwrap();

    // Security tasks always pick the highest-trust backend.
    for i in 0..5 {
        let secure = task(&format!("s{i}"), "audit").requiring_security();
        let err = orch.execute_task(&secure).await.unwrap_err();
        assert_eq!(err.backend(), Some(&BackendId::from("broken")));
    }
    let workflow = Task::new("ok", "chain the steps", TaskCategory::Workflow);
    orch.execute_task(&workflow).await.unwrap();

    let health = orch.health().await;
    let broken_health = &health[&BackendId::from("broken")];
    assert_eq!(broken_health.circuit_state, CircuitState::Open);
    assert_eq!(broken_health.consecutive_failures, 5);

    let healthy_health = &health[&BackendId::from("healthy")];
    assert_eq!(healthy_health.circuit_state, CircuitState::Closed);
    assert_eq!(healthy_health.consecutive_failures, 0);
    assert_eq!(healthy_health.metrics.failures, 0);
    assert_eq!(healthy_health.metrics.successes, 1);
    assert_eq!(broken.calls(), 5);
    assert_eq!(healthy.calls(), 1);
}

// ---------------------------------------------------------------------------
// Admission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_rate_limit_rejection_leaves_breaker_untouched() {
    let client = MockClient::new("metered", Behavior::Succeed);
    let orch = Orchestrator::new(registry(vec![entry(
        &client,
        BackendProfile::new("metered"),
    )
    .with_calls_per_minute(2)]))
    .unwrap();

    orch.execute_task(&task("a", "one")).await.unwrap();
    orch.execute_task(&task("b", "two")).await.unwrap();
    let err = orch.execute_task(&task("c", "three")).await.unwrap_err();
    match err {
        SwitchyardError::RateLimitExceeded {
            backend,
            limit,
            window_secs,
        } => {
            assert_eq!(backend, BackendId::from("metered"));
            assert_eq!(limit, 2);
            assert_eq!(window_secs, 60);
        }
        other => panic!("expected rate limit, got {other:?}"),
    }
    assert_eq!(client.calls(), 2);

    let health = orch.health().await;
    let metered = &health[&BackendId::from("metered")];
    assert_eq!(metered.circuit_state, CircuitState::Closed);
    assert_eq!(metered.consecutive_failures, 0);
    assert_eq!(metered.metrics.rejections, 1);
    assert_eq!(metered.metrics.failures, 0);
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_session_token_reused_for_same_task_id() {
    let client = MockClient::new("solo", Behavior::Succeed);
    let orch = single(&client);

    let first = orch.execute_task(&task("conv", "start")).await.unwrap();
    assert_eq!(first.session_token.as_deref(), Some("solo-session"));
    orch.execute_task(&task("conv", "continue")).await.unwrap();
    orch.execute_task(&task("other", "fresh")).await.unwrap();

    let seen = client.seen_tokens.lock().clone();
    assert_eq!(
        seen,
        vec![None, Some("solo-session".to_string()), None]
    );
}

// ---------------------------------------------------------------------------
// Deadlines and cancellation
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_timeout_counts_as_failure() {
    let client = MockClient::new("slow", Behavior::Sleep(Duration::from_secs(10)));
    let orch = Orchestrator::builder(registry(vec![entry(
        &client,
        BackendProfile::new("slow"),
    )]))
    .config(OrchestratorConfig {
        task_timeout_secs: 1,
        ..OrchestratorConfig::default()
    })
    .build()
    .unwrap();

    let err = orch.execute_task(&task("t", "wait")).await.unwrap_err();
    match err {
        SwitchyardError::Timeout { backend, elapsed_ms } => {
            assert_eq!(backend, BackendId::from("slow"));
            assert!(elapsed_ms >= 1_000);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    let health = orch.health().await;
    assert_eq!(health[&BackendId::from("slow")].consecutive_failures, 1);
    assert_eq!(health[&BackendId::from("slow")].metrics.failures, 1);
}

#[tokio::test]
async fn test_cancellation_is_not_a_backend_failure() {
    let hanging = MockClient::new("hanging", Behavior::Sleep(Duration::from_secs(30)));
    let backup = MockClient::new("backup", Behavior::Succeed);
    let orch = Arc::new(
        Orchestrator::new(registry(vec![
            entry(&hanging, BackendProfile::new("hanging").with_priority(1)),
            entry(&backup, BackendProfile::new("backup").with_priority(2)),
        ]))
        .unwrap(),
    );
    let cancel = CancellationToken::new();

    let handle = tokio::spawn({
        let orch = Arc::clone(&orch);
        let cancel = cancel.clone();
        async move {
            orch.execute_task_with_cancel(&task("c", "long job"), cancel)
                .await
        }
    });
    hanging.started.notified().await;
    cancel.cancel();

    let err = handle.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(backup.calls(), 0, "cancellation must not trigger fallback");

    let health = orch.health().await;
    let hanging_health = &health[&BackendId::from("hanging")];
    assert_eq!(hanging_health.circuit_state, CircuitState::Closed);
    assert_eq!(hanging_health.consecutive_failures, 0);
    assert_eq!(hanging_health.metrics.cancellations, 1);
    assert!((hanging_health.reward_score - 0.5).abs() < 1e-9);
}

// ---------------------------------------------------------------------------
// Fallback and events
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_fallback_after_backend_error() {
    let primary = MockClient::new("primary", Behavior::Fail);
    let backup = MockClient::new("backup", Behavior::Succeed);
    let orch = Orchestrator::new(registry(vec![
        entry(&primary, BackendProfile::new("primary").with_priority(1)),
        entry(&backup, BackendProfile::new("backup").with_priority(2)),
    ]))
    .unwrap();
    let stream = orch.subscribe("fb");

    let resp = orch.execute_task(&task("fb", "fix it")).await.unwrap();
    assert_eq!(resp.backend_id, BackendId::from("backup"));
    assert_eq!(primary.calls(), 1);
    assert_eq!(backup.calls(), 1);

    let events = collect(stream).await;
    assert_eq!(terminal_count(&events), 1);
    assert_eq!(events.last().unwrap().kind, EventKind::Completed);

    let selected: Vec<_> = events
        .iter()
        .filter(|e| e.kind == EventKind::BackendSelected)
        .map(|e| e.backend_id.clone().unwrap())
        .collect();
    assert_eq!(
        selected,
        vec![BackendId::from("primary"), BackendId::from("backup")]
    );

    let fallback = events
        .iter()
        .find(|e| e.kind == EventKind::Progress && e.payload["status"] == "fallback")
        .expect("fallback progress event");
    assert_eq!(fallback.payload["from"], "primary");
    assert_eq!(fallback.payload["to"], "backup");

    let progress_text = events
        .iter()
        .filter(|e| e.kind == EventKind::Progress && e.payload["type"] == "text")
        .count();
    assert_eq!(progress_text, 2);

    let health = orch.health().await;
    assert_eq!(health[&BackendId::from("primary")].consecutive_failures, 1);
}

#[tokio::test]
async fn test_fallback_failure_surfaces_fallback_error() {
    let first = MockClient::new("first", Behavior::Fail);
    let second = MockClient::new("second", Behavior::Fail);
    let orch = Orchestrator::new(registry(vec![
        entry(&first, BackendProfile::new("first").with_priority(1)),
        entry(&second, BackendProfile::new("second").with_priority(2)),
    ]))
    .unwrap();
    let stream = orch.subscribe("t");

    let err = orch.execute_task(&task("t", "x")).await.unwrap_err();
    assert_eq!(err.backend(), Some(&BackendId::from("second")));

    let events = collect(stream).await;
    assert_eq!(terminal_count(&events), 1);
    assert_eq!(events.last().unwrap().kind, EventKind::Failed);
    assert_eq!(
        events.last().unwrap().backend_id,
        Some(BackendId::from("second"))
    );
}

#[tokio::test]
async fn test_fallback_disabled() {
    let primary = MockClient::new("primary", Behavior::Fail);
    let backup = MockClient::new("backup", Behavior::Succeed);
    let orch = Orchestrator::builder(registry(vec![
        entry(&primary, BackendProfile::new("primary").with_priority(1)),
        entry(&backup, BackendProfile::new("backup").with_priority(2)),
    ]))
    .config(OrchestratorConfig {
        fallback: false,
        ..OrchestratorConfig::default()
    })
    .build()
    .unwrap();

    let err = orch.execute_task(&task("t", "x")).await.unwrap_err();
    assert_eq!(err.backend(), Some(&BackendId::from("primary")));
    assert_eq!(backup.calls(), 0);
}

#[tokio::test]
async fn test_security_task_never_falls_back_to_untrusted() {
    let trusted = MockClient::new("trusted", Behavior::Fail);
    let cheap = MockClient::new("cheap", Behavior::Succeed);
    let orch = Orchestrator::new(registry(vec![
        entry(&trusted, BackendProfile::new("trusted").with_trust(90)),
        entry(&cheap, BackendProfile::new("cheap").with_trust(30)),
    ]))
    .unwrap();

    let err = orch
        .execute_task(&task("s", "rotate keys").requiring_security())
        .await
        .unwrap_err();
    assert_eq!(err.backend(), Some(&BackendId::from("trusted")));
    assert_eq!(cheap.calls(), 0);
}

#[tokio::test]
async fn test_firehose_sees_every_task() {
    let client = MockClient::new("solo", Behavior::Succeed);
    let orch = single(&client);
    let mut all = orch.subscribe_all();

    orch.execute_task(&task("a", "one")).await.unwrap();
    orch.execute_task(&task("b", "two")).await.unwrap();

    let mut completed = Vec::new();
    while completed.len() < 2 {
        let event = all.next().await.unwrap();
        if event.kind == EventKind::Completed {
            completed.push(event.task_id);
        }
    }
    assert_eq!(completed, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(orch.events().channel_count(), 0);
}

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_parallel_batch_isolates_failures_and_keeps_order() {
    let client = MockClient::new("solo", Behavior::Succeed);
    let orch = Arc::new(
        Orchestrator::builder(registry(vec![entry(&client, BackendProfile::new("solo"))]))
            .config(OrchestratorConfig {
                max_in_flight: 2,
                fallback: false,
                ..OrchestratorConfig::default()
            })
            .build()
            .unwrap(),
    );

    let tasks = vec![
        task("p0", "first"),
        task("p1", "fail here"),
        task("p2", "panic here"),
        task("p3", "last"),
    ];
    let results = orch.execute_parallel(tasks).await;
    assert_eq!(results.len(), 4);

    assert_eq!(results[0].as_ref().unwrap().content, "solo: first");
    assert_eq!(results[1].as_ref().unwrap_err().kind(), ErrorKind::BackendError);
    let panicked = results[2].as_ref().unwrap_err();
    assert_eq!(panicked.kind(), ErrorKind::BackendError);
    assert!(panicked.to_string().contains("scripted panic"));
    assert_eq!(results[3].as_ref().unwrap().content, "solo: last");
    assert_eq!(client.calls(), 4);
}

/// Records the peak number of overlapping invocations.
struct GaugeClient {
    id: BackendId,
    current: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl AgentClient for GaugeClient {
    fn id(&self) -> &BackendId {
        &self.id
    }

    async fn invoke(
        &self,
        invocation: &Invocation,
        _progress: &ProgressSink,
    ) -> SwitchyardResult<InvocationOutput> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(InvocationOutput::new(invocation.prompt.clone()))
    }
}

#[tokio::test]
async fn test_parallel_batch_respects_max_in_flight() {
    let gauge = Arc::new(GaugeClient {
        id: BackendId::from("gauge"),
        current: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let gauge_entry = BackendEntry::new(
        BackendProfile::new("gauge"),
        Arc::clone(&gauge) as Arc<dyn AgentClient>,
    )
    .with_calls_per_minute(100);
    let orch = Arc::new(
        Orchestrator::builder(registry(vec![gauge_entry]))
            .config(OrchestratorConfig {
                max_in_flight: 2,
                ..OrchestratorConfig::default()
            })
            .build()
            .unwrap(),
    );

    let tasks: Vec<Task> = (0..6).map(|i| task(&format!("g{i}"), "count")).collect();
    let results = orch.execute_parallel(tasks).await;
    assert!(results.iter().all(|r| r.is_ok()));

    let peak = gauge.peak.load(Ordering::SeqCst);
    assert!(peak >= 1);
    assert!(peak <= 2, "{peak} invocations overlapped");
    assert_eq!(gauge.current.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_parallel_empty_batch() {
    let client = MockClient::new("solo", Behavior::Succeed);
    let orch = Arc::new(single(&client));
    assert!(orch.execute_parallel(Vec::new()).await.is_empty());
}

// ---------------------------------------------------------------------------
// Learning
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_rewards_shift_scored_selection() {
    let a = MockClient::new("a", Behavior::Fail);
    let b = MockClient::new("b", Behavior::Succeed);
    let rewards = Arc::new(InMemoryRewardStore::default());
    let orch = Orchestrator::builder(registry(vec![
        entry(&a, BackendProfile::new("a").with_priority(1)),
        entry(&b, BackendProfile::new("b").with_priority(2)),
    ]))
    .reward_store(Arc::clone(&rewards) as Arc<dyn RewardStore>)
    .build()
    .unwrap();

    let probe = task("r", "anything");
    assert_eq!(orch.route(&probe).await.unwrap().backend_id, BackendId::from("a"));

    // "a" fails and hands over to "b"; both scores move.
    orch.execute_task(&task("r1", "x")).await.unwrap();
    let scores: HashMap<BackendId, f64> = rewards.snapshot().await;
    assert!(scores[&BackendId::from("a")] < 0.5);
    assert!(scores[&BackendId::from("b")] > 0.5);

    let selection = orch.route(&probe).await.unwrap();
    assert_eq!(selection.backend_id, BackendId::from("b"));
    assert!(matches!(selection.reason, SelectionReason::Scored { .. }));
}
