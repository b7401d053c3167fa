//! The `switchyard` command-line tool: run, batch, route and inspect tasks
//! against the backends configured in `switchyard.toml`.

mod config;

use clap::{Parser, Subcommand};
use config::SwitchyardConfig;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use switchyard_core::{SwitchyardResult, Task};
use switchyard_orchestrator::{EventBroadcaster, Orchestrator};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "switchyard",
    version,
    about = "Switchyard: routes coding tasks across AI agent backends"
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "switchyard.toml")]
    config: PathBuf,

    /// Stream task events to stderr as JSON lines
    #[arg(long, global = true)]
    events: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one task read from a JSON file
    Run {
        /// Task file (`-` for stdin)
        task: PathBuf,
    },
    /// Execute a JSON array of tasks concurrently
    Batch {
        /// Tasks file (`-` for stdin)
        tasks: PathBuf,
    },
    /// Show which backend a task would be routed to, without running it
    Route {
        /// Task file (`-` for stdin)
        task: PathBuf,
    },
    /// Print the health snapshot of every configured backend
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let config = SwitchyardConfig::load(&cli.config).await?;

    let events = Arc::new(EventBroadcaster::new(&config.events));
    let printer = cli.events.then(|| {
        let mut stream = events.subscribe_all();
        tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                if let Ok(line) = serde_json::to_string(&event) {
                    eprintln!("{line}");
                }
            }
        })
    });

    let orchestrator = Arc::new(config.build(Arc::clone(&events)).await?);
    info!(
        backends = orchestrator.registry().len(),
        config = %cli.config.display(),
        "Switchyard started"
    );

    let outcome = execute(&orchestrator, cli.command).await;

    // The firehose ends once the last sender is gone.
    drop(orchestrator);
    drop(events);
    if let Some(printer) = printer {
        let _ = printer.await;
    }
    outcome
}

async fn execute(
    orchestrator: &Arc<Orchestrator>,
    command: Commands,
) -> anyhow::Result<()> {
    match command {
        Commands::Run { task } => {
            let task: Task = read_json(&task).await?;
            purge_sessions(orchestrator).await;
            let response = orchestrator.execute_task(&task).await?;
            print_json(&response)
        }
        Commands::Batch { tasks } => {
            let tasks: Vec<Task> = read_json(&tasks).await?;
            purge_sessions(orchestrator).await;
            let ids: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();
            let results = orchestrator.execute_parallel(tasks).await;

            let failed = results.iter().filter(|r| r.is_err()).count();
            let report: Vec<serde_json::Value> = ids
                .iter()
                .zip(&results)
                .map(|(id, result)| batch_entry(id, result))
                .collect();
            print_json(&report)?;
            if failed > 0 {
                anyhow::bail!("{failed} of {} tasks failed", results.len());
            }
            Ok(())
        }
        Commands::Route { task } => {
            let task: Task = read_json(&task).await?;
            let selection = orchestrator.route(&task).await?;
            print_json(&serde_json::json!({
                "task_id": task.id,
                "backend": selection.backend_id,
                "reason": selection.reason,
                "summary": selection.reason.to_string(),
            }))
        }
        Commands::Health => print_json(&orchestrator.health().await),
    }
}

/// Housekeeping before a run. A broken session store must not stop the task.
async fn purge_sessions(orchestrator: &Orchestrator) {
    if let Err(e) = orchestrator.purge_expired_sessions().await {
        warn!(error = %e, "Failed to purge expired sessions");
    }
}

fn batch_entry<T: serde::Serialize>(id: &str, result: &SwitchyardResult<T>) -> serde_json::Value {
    match result {
        Ok(response) => serde_json::json!({ "task_id": id, "ok": response }),
        Err(e) => serde_json::json!({
            "task_id": id,
            "error": { "kind": e.kind(), "backend": e.backend(), "message": e.to_string() },
        }),
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = if path == Path::new("-") {
        let mut buf = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut tokio::io::stdin(), &mut buf).await?;
        buf
    } else {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read '{}': {}", path.display(), e))?
    };
    serde_json::from_str(&text)
        .map_err(|e| anyhow::anyhow!("Invalid task JSON in '{}': {}", path.display(), e))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
