//! Worker runner
//!
//! Each worker listens on the job queue and runs claimed jobs as separate tasks. A shared
//! semaphore bounds the number of jobs in flight; a job is only claimed once a permit is
//! held, so unclaimed work stays visible to other processes. A maintenance task flags
//! stalled jobs and purges expired ones.

use super::base::Worker;
use crate::{
    config::Config,
    queue::{JobQueue, RetentionPolicy},
    Result,
};
use futures::StreamExt;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{watch, Semaphore},
    task::{JoinHandle, JoinSet},
    time::MissedTickBehavior,
};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct WorkerRunnerConfig {
    pub max_concurrent_jobs: usize,
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
    pub reconnect_jitter_ratio: f64,
    pub maintenance_interval: Duration,
    pub stall_timeout: Duration,
    pub retention: RetentionPolicy,
}

impl WorkerRunnerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_concurrent_jobs: config.workers.max_concurrent_jobs.max(1),
            reconnect_initial: Duration::from_secs(config.workers.reconnect_initial_seconds.max(1)),
            reconnect_max: Duration::from_secs(config.workers.reconnect_max_seconds.max(1)),
            reconnect_jitter_ratio: config.workers.reconnect_jitter_ratio,
            maintenance_interval: Duration::from_secs(
                config.queue.maintenance_interval_seconds.max(1),
            ),
            stall_timeout: config.queue.stall_timeout(),
            retention: config.queue.retention_policy(),
        }
    }
}

/// Spawn every worker plus the queue maintenance task.
///
/// All tasks exit once `shutdown` flips to `true` or its sender is dropped; workers first
/// wait for their in-flight jobs to finish.
pub fn spawn_workers_with_config(
    workers: Vec<Arc<dyn Worker>>,
    job_queue: Arc<dyn JobQueue>,
    config: WorkerRunnerConfig,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<Result<()>>> {
    let permits = Arc::new(Semaphore::new(config.max_concurrent_jobs));

    let mut handles: Vec<JoinHandle<Result<()>>> = workers
        .into_iter()
        .map(|worker| {
            tokio::spawn(run_worker(
                worker,
                job_queue.clone(),
                permits.clone(),
                config.clone(),
                shutdown.clone(),
            ))
        })
        .collect();

    handles.push(tokio::spawn(run_maintenance(
        job_queue,
        config,
        shutdown,
    )));
    handles
}

async fn run_worker(
    worker: Arc<dyn Worker>,
    job_queue: Arc<dyn JobQueue>,
    permits: Arc<Semaphore>,
    config: WorkerRunnerConfig,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let worker_id = format!("{}-{}", worker.name(), Uuid::new_v4());
    worker.start().await?;

    let mut in_flight = JoinSet::new();
    let mut retry_delay = config.reconnect_initial;

    'listen: while !shutdown_requested(&shutdown) {
        let mut stream = match job_queue.listen(&worker_id).await {
            Ok(stream) => {
                retry_delay = config.reconnect_initial;
                stream
            }
            Err(e) => {
                let delay = jittered_duration(retry_delay, config.reconnect_jitter_ratio);
                tracing::error!(
                    worker_id = %worker_id,
                    error = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    "Failed to start job listener"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.changed() => {}
                }
                retry_delay = (retry_delay * 2).min(config.reconnect_max);
                continue;
            }
        };

        loop {
            // Reap finished jobs so the set does not grow unbounded
            while let Some(joined) = in_flight.try_join_next() {
                log_job_task(joined);
            }

            let permit = tokio::select! {
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break 'listen,
                },
                _ = shutdown.changed() => break 'listen,
            };

            let next = tokio::select! {
                next = stream.next() => next,
                _ = shutdown.changed() => break 'listen,
            };

            match next {
                Some(Ok(job)) => {
                    let worker = worker.clone();
                    in_flight.spawn(async move {
                        let _permit = permit;
                        let job_id = job.id;
                        if let Err(e) = worker.process_job(job).await {
                            tracing::error!(
                                job_id = %job_id,
                                error = %e,
                                "Job state could not be recorded; awaiting stall recovery"
                            );
                        }
                    });
                }
                Some(Err(e)) => {
                    tracing::error!(worker_id = %worker_id, error = %e, "Job listener error");
                    break;
                }
                None => {
                    tracing::warn!(worker_id = %worker_id, "Job listener stream ended");
                    break;
                }
            }
        }

        drop(stream);
        let delay = jittered_duration(retry_delay, config.reconnect_jitter_ratio);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => {}
        }
        retry_delay = (retry_delay * 2).min(config.reconnect_max);
    }

    tracing::info!(
        worker_id = %worker_id,
        in_flight = in_flight.len(),
        "Waiting for in-flight jobs"
    );
    while let Some(joined) = in_flight.join_next().await {
        log_job_task(joined);
    }

    worker.stop().await
}

/// A dropped sender counts as a shutdown request.
fn shutdown_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow() || shutdown.has_changed().is_err()
}

fn log_job_task(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "Job task panicked or was aborted");
    }
}

async fn run_maintenance(
    job_queue: Arc<dyn JobQueue>,
    config: WorkerRunnerConfig,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let mut interval = tokio::time::interval(config.maintenance_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => break,
        }
        if shutdown_requested(&shutdown) {
            break;
        }
        run_maintenance_pass(job_queue.as_ref(), &config).await;
    }
    Ok(())
}

/// One stall detection and retention sweep. Errors are logged and retried next tick.
pub async fn run_maintenance_pass(job_queue: &dyn JobQueue, config: &WorkerRunnerConfig) {
    match job_queue.mark_stalled(config.stall_timeout).await {
        Ok(stalled) if !stalled.is_empty() => {
            tracing::warn!(jobs = ?stalled, "Re-dispatching stalled jobs");
        }
        Ok(_) => {}
        Err(e) => tracing::error!(error = %e, "Stall detection failed"),
    }

    if let Err(e) = job_queue.cleanup_expired(config.retention).await {
        tracing::error!(error = %e, "Job retention cleanup failed");
    }
}

/// Spread `base` by up to `jitter_ratio` in either direction.
pub fn jittered_duration(base: Duration, jitter_ratio: f64) -> Duration {
    if base.is_zero() || jitter_ratio <= 0.0 {
        return base;
    }

    let value = Uuid::new_v4().as_u128() as u64;
    let unit = (value as f64) / (u64::MAX as f64); // [0,1]
    let signed = unit * 2.0 - 1.0; // [-1,1]
    let factor = (1.0 + signed * jitter_ratio).max(0.0);
    base.mul_f64(factor)
}
