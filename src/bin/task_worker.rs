//! Task Worker Binary
//!
//! Runs the task executor against the embedded orchestration platform and
//! serves the health and task submission API.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use taskrelay::config::ConfigManager;
use taskrelay::engine::HttpEngine;
use taskrelay::logging::init_structured_logging;
use taskrelay::orchestration::{InMemoryPlatform, WorkflowDefinition};
use taskrelay::web::{create_worker_app, WorkerWebState};
use taskrelay::worker::{ActivitySettings, AgentActivity, HealthService, RelayClient, TaskExecutor};

#[derive(Debug, Parser)]
#[command(name = "task_worker", about = "Agent query task executor")]
struct Args {
    /// Directory containing taskrelay.toml
    #[arg(long, default_value = "config")]
    config_dir: PathBuf,

    /// Environment overlay to apply (defaults to TASKRELAY_ENV)
    #[arg(long)]
    environment: Option<String>,

    /// Override worker.bind_address
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_structured_logging();
    let args = Args::parse();

    let environment = args
        .environment
        .unwrap_or_else(ConfigManager::detect_environment);
    let manager = ConfigManager::load_from_directory_with_env(Some(args.config_dir), &environment)
        .context("failed to load configuration")?;
    let config = manager.config().clone();
    let bind_address = args
        .bind
        .unwrap_or_else(|| config.worker.bind_address.clone());

    let shutdown = CancellationToken::new();
    let platform = Arc::new(InMemoryPlatform::from_config(&config.platform));
    let supervisor = platform.spawn_supervisor(config.platform.supervisor_tick(), shutdown.clone());

    let engine = Arc::new(HttpEngine::new(&config.engine).context("invalid engine configuration")?);
    let relay_client =
        Arc::new(RelayClient::new(&config.relay_client).context("failed to build relay client")?);
    let activity = Arc::new(AgentActivity::new(
        engine,
        platform.clone(),
        relay_client,
        ActivitySettings::from_config(&config.worker, &config.workflow),
    ));

    let executor = Arc::new(TaskExecutor::new(platform.clone(), activity, &config.worker));
    let task_queue = executor.task_queue().to_string();
    let definition = WorkflowDefinition::agent_query(task_queue.clone(), &config.workflow);
    let health = HealthService::new(platform.clone(), executor.state(), task_queue.clone());

    let executor_task = {
        let executor = Arc::clone(&executor);
        tokio::spawn(async move {
            if let Err(e) = executor.run().await {
                error!(error = %e, "Task executor stopped with error");
            }
        })
    };

    let app = create_worker_app(Arc::new(WorkerWebState::new(
        platform.clone(),
        definition,
        health,
    )));
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    info!(
        address = %bind_address,
        task_queue = %task_queue,
        platform = %config.platform.address,
        "Task worker listening"
    );

    let executor_shutdown = executor.shutdown_token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received, draining in-flight tasks");
            executor_shutdown.cancel();
        })
        .await
        .context("worker server failed")?;

    executor.shutdown_token().cancel();
    let _ = executor_task.await;
    shutdown.cancel();
    let _ = supervisor.await;
    info!("Task worker stopped");
    Ok(())
}
