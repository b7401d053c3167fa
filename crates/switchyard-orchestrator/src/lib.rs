//! Task routing and failure isolation for Switchyard.
//!
//! The [`Orchestrator`] picks a backend for each task, admits the call
//! through the security guard and the backend's circuit breaker, runs it
//! under a deadline, learns from the outcome and fans progress out to
//! subscribers. Batches run concurrently with per-task isolation.
//!
//! # Main types
//!
//! - [`Orchestrator`]: Dispatch engine for single tasks and batches.
//! - [`AgentSelector`]: Deterministic rule-based backend selection.
//! - [`CircuitBreaker`]: Per-backend Closed / Open / HalfOpen state machine.
//! - [`RewardStore`]: Learned per-backend scores (in memory or persisted to a file).
//! - [`EventBroadcaster`]: Bounded per-task event channels plus a firehose.
//! - [`BackendMonitor`]: Call counters behind [`Orchestrator::health`].

/// Circuit breakers.
pub mod breaker;
/// Task event fan-out.
pub mod broadcast;
/// The dispatch engine.
pub mod engine;
/// Backend call metrics and health reporting.
pub mod monitor;
/// Built-in backend set.
pub mod profiles;
/// Learned backend scores.
pub mod reward;
/// Backend selection rules.
pub mod selector;

pub use breaker::{
    BreakerConfig, BreakerPermit, BreakerSet, BreakerSnapshot, CircuitBreaker, CircuitState,
};
pub use broadcast::{EventBroadcaster, EventStream, EventsConfig};
pub use engine::{Orchestrator, OrchestratorBuilder, OrchestratorConfig};
pub use monitor::{BackendHealth, BackendMetrics, BackendMonitor, HealthSnapshot};
pub use profiles::default_backends;
pub use reward::{FileRewardStore, InMemoryRewardStore, RewardConfig, RewardStore};
pub use selector::{AgentSelector, Selection, SelectionReason, SelectorConfig};
