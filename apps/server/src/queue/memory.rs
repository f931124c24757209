//! In-process job queue implementation.
//!
//! Jobs live in a mutex-guarded map and are dispatched to workers running in the same
//! process. Nothing survives a restart; use the Postgres queue for durable dispatch.

use super::{BatchJobParams, Job, JobListFilter, JobQueue, JobStatus, RetentionPolicy};
use crate::{models::BatchSummary, Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::BoxStream;
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
    time::Duration,
};
use tokio::{sync::Notify, time::MissedTickBehavior};
use uuid::Uuid;

pub struct MemoryJobQueue {
    jobs: Mutex<HashMap<Uuid, Job>>,
    notify: Notify,
    poll_interval: Duration,
}

impl MemoryJobQueue {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            notify: Notify::new(),
            poll_interval: poll_interval.max(Duration::from_millis(10)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Uuid, Job>>> {
        self.jobs
            .lock()
            .map_err(|_| Error::Internal("job queue lock poisoned".to_string()))
    }

    fn update_job<F>(&self, job_id: Uuid, f: F) -> Result<()>
    where
        F: FnOnce(&mut Job),
    {
        let mut jobs = self.lock()?;
        if let Some(job) = jobs.get_mut(&job_id) {
            f(job);
        }
        Ok(())
    }
}

impl Default for MemoryJobQueue {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, params: BatchJobParams, max_attempts: u32) -> Result<Uuid> {
        let job = Job::new(params, max_attempts);
        let job_id = job.id;
        self.lock()?.insert(job_id, job);
        self.notify.notify_waiters();

        tracing::info!(job_id = %job_id, backend = "memory", "Enqueued batch job");
        Ok(job_id)
    }

    async fn dequeue(&self, worker_id: &str) -> Result<Option<Job>> {
        let mut jobs = self.lock()?;
        let next = jobs
            .values()
            .filter(|j| j.status.is_dispatchable())
            .min_by_key(|j| j.created_at)
            .map(|j| j.id);

        let Some(job_id) = next else {
            return Ok(None);
        };

        let now = Utc::now();
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| Error::Internal(format!("job {} vanished during dequeue", job_id)))?;
        job.status = JobStatus::Active;
        job.worker_id = Some(worker_id.to_string());
        job.started_at.get_or_insert(now);
        job.heartbeat_at = Some(now);

        tracing::info!(job_id = %job_id, worker_id, "Dequeued batch job");
        Ok(Some(job.clone()))
    }

    async fn listen<'a>(&'a self, worker_id: &'a str) -> Result<BoxStream<'a, Result<Job>>> {
        let stream = async_stream::stream! {
            let mut interval = tokio::time::interval(self.poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                // Register interest before draining so an enqueue between the drain and
                // the wait is not missed.
                let notified = self.notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                loop {
                    match self.dequeue(worker_id).await {
                        Ok(Some(job)) => yield Ok(job),
                        Ok(None) => break,
                        Err(e) => {
                            yield Err(e);
                            break;
                        }
                    }
                }

                tokio::select! {
                    _ = &mut notified => {}
                    _ = interval.tick() => {}
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>> {
        Ok(self.lock()?.get(&job_id).cloned())
    }

    async fn list_jobs(&self, filter: &JobListFilter) -> Result<(Vec<Job>, i64)> {
        let jobs = self.lock()?;
        let mut matching: Vec<&Job> = jobs
            .values()
            .filter(|j| filter.status.map_or(true, |s| j.status == s))
            .filter(|j| filter.record_type.map_or(true, |t| j.record_type == t))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn start_attempt(&self, job_id: Uuid, attempt: u32) -> Result<()> {
        self.update_job(job_id, |job| {
            job.attempts = job.attempts.max(attempt);
            job.heartbeat_at = Some(Utc::now());
        })
    }

    async fn record_attempt_failure(&self, job_id: Uuid, error_message: &str) -> Result<()> {
        self.update_job(job_id, |job| {
            job.error_message = Some(error_message.to_string());
            job.heartbeat_at = Some(Utc::now());
        })
    }

    async fn update_progress(&self, job_id: Uuid, progress: u8) -> Result<()> {
        self.update_job(job_id, |job| {
            job.progress = job.progress.max(progress.min(100));
            job.heartbeat_at = Some(Utc::now());
        })
    }

    async fn heartbeat(&self, job_id: Uuid) -> Result<()> {
        self.update_job(job_id, |job| {
            job.heartbeat_at = Some(Utc::now());
        })
    }

    async fn complete_job(&self, job_id: Uuid, summary: &BatchSummary) -> Result<()> {
        let now = Utc::now();
        self.update_job(job_id, |job| {
            job.status = JobStatus::Completed;
            job.progress = 100;
            job.summary = Some(summary.clone());
            job.completed_at = Some(now);
        })?;
        tracing::info!(job_id = %job_id, "Job completed");
        Ok(())
    }

    async fn fail_job(&self, job_id: Uuid, error_message: &str) -> Result<()> {
        let now = Utc::now();
        self.update_job(job_id, |job| {
            job.status = JobStatus::Failed;
            job.error_message = Some(error_message.to_string());
            job.completed_at = Some(now);
        })?;
        tracing::error!(job_id = %job_id, error = error_message, "Job failed");
        Ok(())
    }

    async fn mark_stalled(&self, stall_after: Duration) -> Result<Vec<Uuid>> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(stall_after)
                .map_err(|e| Error::Internal(format!("Invalid stall timeout: {}", e)))?;

        let mut stalled = Vec::new();
        {
            let mut jobs = self.lock()?;
            for job in jobs.values_mut() {
                let stale = job.heartbeat_at.map_or(true, |hb| hb < cutoff);
                if job.status == JobStatus::Active && stale {
                    job.status = JobStatus::Stalled;
                    job.worker_id = None;
                    stalled.push(job.id);
                }
            }
        }

        if !stalled.is_empty() {
            tracing::warn!(count = stalled.len(), "Flagged stalled jobs for re-dispatch");
            self.notify.notify_waiters();
        }
        Ok(stalled)
    }

    async fn cleanup_expired(&self, retention: RetentionPolicy) -> Result<u64> {
        let now = Utc::now();
        let completed_cutoff = now - chrono::Duration::from_std(retention.completed).unwrap_or_default();
        let failed_cutoff = now - chrono::Duration::from_std(retention.failed).unwrap_or_default();

        let mut jobs = self.lock()?;
        let before = jobs.len();
        jobs.retain(|_, job| match (job.status, job.completed_at) {
            (JobStatus::Completed, Some(at)) => at >= completed_cutoff,
            (JobStatus::Failed, Some(at)) => at >= failed_cutoff,
            _ => true,
        });
        Ok((before - jobs.len()) as u64)
    }

    async fn health_check(&self) -> Result<serde_json::Value> {
        let jobs = self.lock()?;
        let count = |status: JobStatus| jobs.values().filter(|j| j.status == status).count();
        Ok(serde_json::json!({
            "status": "ok",
            "backend": "memory",
            "jobs": {
                "total": jobs.len(),
                "queued": count(JobStatus::Queued),
                "active": count(JobStatus::Active),
                "stalled": count(JobStatus::Stalled),
                "completed": count(JobStatus::Completed),
                "failed": count(JobStatus::Failed),
            }
        }))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
