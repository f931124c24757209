//! Riskwatch - Background Worker Entry Point
//!
//! Claims queued batch jobs from Postgres and processes them. Run this binary when
//! `workers.embedded` is false so workers scale independently of the API server.

use anyhow::Context;
use clap::Parser;
use riskwatch::{
    config::Config,
    logging,
    workers::{
        create_workers, jittered_duration, spawn_workers_with_config, WorkerRunnerConfig,
        WorkerState,
    },
};
use tokio::time::{sleep, Duration};

#[derive(Parser)]
#[command(name = "riskwatch-worker", about = "Riskwatch background batch worker", version)]
struct Cli {
    /// Configuration file; defaults to ./config.{toml,yaml} when present
    #[arg(short, long, env = "RISKWATCH_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load_from(cli.config.as_deref()).context("Failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {e}"))?;

    let _logging_guard =
        logging::init_logging(&config.logging).context("Failed to initialize logging")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = config.logging.deployment_environment,
        "Starting Riskwatch background workers"
    );

    if !config.workers.enabled {
        tracing::warn!("Workers are disabled in configuration");
        return Ok(());
    }

    if config.workers.embedded {
        tracing::warn!(
            "workers.embedded is true, so the server process also runs workers. \
             Set workers.embedded=false when scaling with this binary."
        );
    }

    tracing::info!(
        max_concurrent = config.workers.max_concurrent_jobs,
        poll_interval_seconds = config.workers.poll_interval_seconds,
        max_attempts = config.queue.max_attempts,
        "Worker configuration loaded"
    );

    // Retry on DB connectivity errors so workers don't exit on transient startup issues.
    let state = init_worker_state_with_retry(&config).await?;

    let workers = create_workers(&state);
    for worker in &workers {
        tracing::info!(worker_name = worker.name(), "Worker registered");
    }

    let runner_config = WorkerRunnerConfig::from_config(&config);
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handles = spawn_workers_with_config(
        workers,
        state.job_queue.clone(),
        runner_config,
        shutdown_rx,
    );

    tracing::info!("Workers running. Press Ctrl+C to stop.");

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
    for handle in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("Worker task ended with error: {}", e),
            Err(e) => tracing::error!("Worker task join error: {}", e),
        }
    }

    tracing::info!("Worker shutdown complete");
    Ok(())
}

async fn init_worker_state_with_retry(config: &Config) -> anyhow::Result<WorkerState> {
    let initial = Duration::from_secs(config.workers.reconnect_initial_seconds.max(1));
    let max = Duration::from_secs(config.workers.reconnect_max_seconds.max(1));
    let jitter_ratio = config.workers.reconnect_jitter_ratio;

    let mut retry_delay = initial;
    loop {
        match WorkerState::new(config.clone()).await {
            Ok(state) => return Ok(state),
            Err(riskwatch::Error::Database(e)) => {
                tracing::error!(
                    "Failed to initialize worker state (db unavailable): {} (retrying in {:?})",
                    e,
                    retry_delay
                );
                sleep(jittered_duration(retry_delay, jitter_ratio)).await;
                retry_delay = (retry_delay * 2).min(max);
            }
            Err(e) => return Err(anyhow::anyhow!(e)).context("Failed to initialize worker state"),
        }
    }
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
            tracing::info!("SIGINT received, stopping workers...");
        }
        _ = sigterm.recv() => {
            tracing::info!("SIGTERM received, stopping workers...");
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutdown signal received, stopping workers...");
}
