//! Event Relay Binary
//!
//! Serves session streams and accepts events posted by workers.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use taskrelay::config::ConfigManager;
use taskrelay::logging::init_structured_logging;
use taskrelay::relay::{spawn_reaper, SessionRegistry};
use taskrelay::web::{create_relay_app, RelayWebState};

#[derive(Debug, Parser)]
#[command(name = "event_relay", about = "Session-scoped event relay")]
struct Args {
    /// Directory containing taskrelay.toml
    #[arg(long, default_value = "config")]
    config_dir: PathBuf,

    /// Environment overlay to apply (defaults to TASKRELAY_ENV)
    #[arg(long)]
    environment: Option<String>,

    /// Override relay.bind_address
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
    let config = manager.config().relay.clone();
    let bind_address = args.bind.unwrap_or_else(|| config.bind_address.clone());

    let registry = Arc::new(SessionRegistry::new(&config));
    let shutdown = CancellationToken::new();
    let reaper = spawn_reaper(
        Arc::clone(&registry),
        config.reaper_interval(),
        shutdown.clone(),
    );

    let app = create_relay_app(Arc::new(RelayWebState::new(registry)));
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    info!(
        address = %bind_address,
        max_queue_depth = config.max_queue_depth,
        idle_timeout_seconds = config.idle_timeout_seconds,
        "Event relay listening"
    );

    let stop = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
            stop.cancel();
        })
        .await
        .context("relay server failed")?;

    shutdown.cancel();
    let _ = reaper.await;
    info!("Event relay stopped");
    Ok(())
}
