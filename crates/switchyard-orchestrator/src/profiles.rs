use switchyard_agent::{BackendConfig, BackendProfile, Transport};
use switchyard_core::TaskCategory;
use switchyard_security::{Constraint, ConstraintSet};

/// A starter backend set covering every routing rule: a high-trust paid
/// backend, a free wide-context backend, a paid code backend and a free
/// workflow specialist.
///
/// All of them use the echo transport, so the set is safe for dry runs; a
/// real deployment replaces the transports in its config file.
pub fn default_backends() -> Vec<BackendConfig> {
    vec![
        trusted_backend(),
        wide_context_backend(),
        coder_backend(),
        workflow_backend(),
    ]
}

fn trusted_backend() -> BackendConfig {
    let profile = BackendProfile::new("claude")
        .with_trust(90)
        .with_context_window(200_000)
        .with_cost_per_1k_tokens(0.015)
        .with_specialty(TaskCategory::Security)
        .with_specialty(TaskCategory::Architecture)
        .with_priority(1);
    let mut config = BackendConfig::new(profile, Transport::Echo);
    config.calls_per_minute = 30;
    config
}

fn wide_context_backend() -> BackendConfig {
    let profile = BackendProfile::new("gemini")
        .with_trust(60)
        .with_context_window(1_000_000)
        .with_specialty(TaskCategory::BulkAnalysis)
        .with_priority(2);
    let mut config = BackendConfig::new(profile, Transport::Echo);
    config.calls_per_minute = 60;
    config
}

fn coder_backend() -> BackendConfig {
    let profile = BackendProfile::new("codex")
        .with_trust(70)
        .with_context_window(128_000)
        .with_cost_per_1k_tokens(0.01)
        .with_specialty(TaskCategory::CodeGeneration)
        .with_specialty(TaskCategory::Debugging)
        .with_priority(3);
    let mut config = BackendConfig::new(profile, Transport::Echo);
    config.calls_per_minute = 30;
    config
}

fn workflow_backend() -> BackendConfig {
    let profile = BackendProfile::new("flow")
        .with_trust(40)
        .with_context_window(32_000)
        .with_specialty(TaskCategory::Workflow)
        .with_priority(4);
    let mut config = BackendConfig::new(profile, Transport::Echo);
    config.calls_per_minute = 120;
    config.constraints = ConstraintSet::from_iter([
        Constraint::MaxFileRefs { count: 20 },
        Constraint::MaxPromptLength { chars: 20_000 },
    ]);
    config
}
