//! Riskwatch - Web Server Entry Point
//!
//! Serves the ingestion and read APIs. When `workers.embedded` is true (the default) and
//! a job queue is reachable, batch workers run in-process alongside the server. For
//! separate worker scaling, set `workers.embedded: false` and run `riskwatch-worker`.

use anyhow::Context;
use clap::Parser;
use riskwatch::{
    api::create_router,
    config::Config,
    logging,
    state::AppState,
    workers::{create_workers, spawn_workers_with_config, WorkerRunnerConfig, WorkerState},
};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "riskwatch-server", about = "Riskwatch ingestion API server", version)]
struct Cli {
    /// Configuration file; defaults to ./config.{toml,yaml} when present
    #[arg(short, long, env = "RISKWATCH_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration first to get logging settings
    let config = Config::load_from(cli.config.as_deref()).context("Failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {e}"))?;

    let _logging_guard =
        logging::init_logging(&config.logging).context("Failed to initialize logging")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = config.logging.deployment_environment,
        "Starting Riskwatch server"
    );

    let addr = config
        .socket_addr()
        .context("Failed to determine socket address")?;

    let state = AppState::new(config)
        .await
        .context("Failed to initialize application state")?;

    let worker_handles = spawn_embedded_workers(&state);

    let app = create_router(state);

    tracing::info!("Riskwatch listening on http://{}", addr);
    tracing::info!("Health check: http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind TCP listener on {addr}"))?;

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "Server terminated unexpectedly");
    }

    if let Some(handles) = worker_handles {
        tracing::info!("Shutting down embedded workers...");
        let _ = handles.shutdown_tx.send(true);
        for handle in handles.join_handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!("Embedded worker ended with error: {}", e),
                Err(e) => tracing::error!("Embedded worker task join error: {}", e),
            }
        }
        tracing::info!("Embedded workers stopped");
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

struct EmbeddedWorkerHandles {
    shutdown_tx: tokio::sync::watch::Sender<bool>,
    join_handles: Vec<tokio::task::JoinHandle<riskwatch::Result<()>>>,
}

/// Run batch workers in this process over the server's own queue and processor.
fn spawn_embedded_workers(state: &AppState) -> Option<EmbeddedWorkerHandles> {
    let config = state.config.as_ref();
    if !config.workers.enabled {
        tracing::info!("Workers disabled");
        return None;
    }
    if !config.workers.embedded {
        tracing::info!("Embedded workers disabled; use the separate riskwatch-worker binary");
        return None;
    }
    let Some(job_queue) = state.queue.queue() else {
        tracing::info!("No job queue available; embedded workers not started");
        return None;
    };

    let worker_state = WorkerState::from_parts(
        Arc::clone(&state.config),
        job_queue.clone(),
        state.processor.clone(),
    );
    let workers = create_workers(&worker_state);
    tracing::info!(worker_count = workers.len(), "Spawning embedded workers");

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let join_handles = spawn_workers_with_config(
        workers,
        job_queue.clone(),
        WorkerRunnerConfig::from_config(config),
        shutdown_rx,
    );

    Some(EmbeddedWorkerHandles {
        shutdown_tx,
        join_handles,
    })
}

/// Wait for SIGTERM (Docker) or SIGINT (Ctrl+C)
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            tracing::warn!(error = %e, "SIGTERM handler unavailable; waiting for Ctrl+C only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("SIGINT received, starting graceful shutdown...");
        }
        _ = sigterm.recv() => {
            tracing::info!("SIGTERM received, starting graceful shutdown...");
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown...");
}
