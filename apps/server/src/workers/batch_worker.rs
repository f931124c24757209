//! Batch ingestion worker

use super::base::Worker;
use crate::{
    models::BatchSummary,
    queue::{Job, JobQueue, RetryPolicy},
    services::ingest::{progress_percent, remove_scratch_file, BatchProcessor, ProgressSink},
    Error, Result,
};
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Liveness interval while a job runs, well inside the default stall timeout.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Refresh the job heartbeat until the returned task is aborted.
fn spawn_heartbeat(queue: Arc<dyn JobQueue>, job_id: Uuid) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(e) = queue.heartbeat(job_id).await {
                tracing::warn!(job_id = %job_id, error = %e, "Failed to refresh job heartbeat");
            }
        }
    })
}

/// Reports row progress of a running job to the queue.
struct JobProgress {
    queue: Arc<dyn JobQueue>,
    job_id: Uuid,
}

#[async_trait]
impl ProgressSink for JobProgress {
    async fn report(&self, _processed: usize, success: usize, total: usize) {
        let progress = progress_percent(success, total);
        if let Err(e) = self.queue.update_progress(self.job_id, progress).await {
            tracing::warn!(job_id = %self.job_id, error = %e, "Failed to record job progress");
        }
    }
}

enum AttemptOutcome {
    Completed(BatchSummary),
    Failed(Error),
}

/// Runs queued batches with bounded retries and cleans up their scratch files.
pub struct BatchIngestWorker {
    job_queue: Arc<dyn JobQueue>,
    processor: Arc<BatchProcessor>,
    retry_policy: RetryPolicy,
}

impl BatchIngestWorker {
    pub fn new(
        job_queue: Arc<dyn JobQueue>,
        processor: Arc<BatchProcessor>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            job_queue,
            processor,
            retry_policy,
        }
    }

    /// Attempt the job until it succeeds, fails permanently, or runs out of attempts.
    ///
    /// Attempts already started by a previous owner of a stalled job count towards the
    /// limit.
    async fn run_attempts(&self, job: &Job) -> Result<AttemptOutcome> {
        let policy = RetryPolicy {
            max_attempts: job.max_attempts.max(1),
            ..self.retry_policy
        };
        let mut attempt = job.attempts;
        let mut last_error: Option<String> = None;

        loop {
            attempt += 1;
            if attempt > policy.max_attempts {
                return Ok(AttemptOutcome::Failed(Error::JobRetryExhausted {
                    job_id: job.id,
                    attempts: policy.max_attempts,
                    cause: last_error
                        .unwrap_or_else(|| "attempts exhausted before re-dispatch".to_string()),
                }));
            }

            self.job_queue.start_attempt(job.id, attempt).await?;
            let progress = JobProgress {
                queue: self.job_queue.clone(),
                job_id: job.id,
            };

            match self
                .processor
                .process_file(&job.file_path, job.record_type, &progress)
                .await
            {
                Ok(summary) => return Ok(AttemptOutcome::Completed(summary)),
                Err(e) if !e.is_retryable() => {
                    tracing::warn!(job_id = %job.id, attempt, error = %e, "Batch rejected, not retrying");
                    return Ok(AttemptOutcome::Failed(e));
                }
                Err(e) if policy.can_retry(attempt) => {
                    let delay = policy.calculate_delay(attempt);
                    tracing::warn!(
                        job_id = %job.id,
                        attempt,
                        max_attempts = policy.max_attempts,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %e,
                        "Batch attempt failed, retrying"
                    );
                    self.job_queue
                        .record_attempt_failure(job.id, &e.to_string())
                        .await?;
                    last_error = Some(e.to_string());
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Ok(AttemptOutcome::Failed(Error::JobRetryExhausted {
                        job_id: job.id,
                        attempts: attempt,
                        cause: e.to_string(),
                    }));
                }
            }
        }
    }
}

#[async_trait]
impl Worker for BatchIngestWorker {
    fn name(&self) -> &str {
        "BatchIngestWorker"
    }

    async fn start(&self) -> Result<()> {
        tracing::info!(
            worker = self.name(),
            max_attempts = self.retry_policy.max_attempts,
            "Worker starting"
        );
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        tracing::info!(worker = self.name(), "Worker stopping");
        Ok(())
    }

    async fn process_job(&self, job: Job) -> Result<()> {
        tracing::info!(
            worker = self.name(),
            job_id = %job.id,
            record_type = %job.record_type,
            attempts = job.attempts,
            "Processing batch job"
        );

        let heartbeat = spawn_heartbeat(self.job_queue.clone(), job.id);
        let outcome = self.run_attempts(&job).await;
        heartbeat.abort();

        match outcome? {
            AttemptOutcome::Completed(summary) => {
                self.job_queue.complete_job(job.id, &summary).await?;
                tracing::info!(
                    job_id = %job.id,
                    records_processed = summary.records_processed(),
                    records_success = summary.records_success(),
                    records_failed = summary.records_failed(),
                    "Batch job completed"
                );
            }
            AttemptOutcome::Failed(e) => {
                self.job_queue.fail_job(job.id, &e.to_string()).await?;
            }
        }

        remove_scratch_file(&job.file_path).await;
        Ok(())
    }
}
