//! Job queue trait definition

use super::models::*;
use crate::{models::BatchSummary, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::time::Duration;
use uuid::Uuid;

/// Abstract interface for durable job queue backends.
///
/// Queues only store and dispatch jobs. Retry decisions and backoff belong to the
/// worker executing the job.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a new batch job
    async fn enqueue(&self, params: BatchJobParams, max_attempts: u32) -> Result<Uuid>;

    /// Claim the oldest queued or stalled job, marking it active
    async fn dequeue(&self, worker_id: &str) -> Result<Option<Job>>;

    /// Stream of claimed jobs, woken by enqueue notifications and a periodic poll
    async fn listen<'a>(&'a self, worker_id: &'a str) -> Result<BoxStream<'a, Result<Job>>>;

    /// Get job by ID
    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>>;

    /// List jobs, newest first, with the total number of matches
    async fn list_jobs(&self, filter: &JobListFilter) -> Result<(Vec<Job>, i64)>;

    /// Record that attempt number `attempt` has started
    async fn start_attempt(&self, job_id: Uuid, attempt: u32) -> Result<()>;

    /// Record a failed attempt that will be retried
    async fn record_attempt_failure(&self, job_id: Uuid, error_message: &str) -> Result<()>;

    /// Raise job progress; lower values are ignored. Also refreshes the heartbeat.
    async fn update_progress(&self, job_id: Uuid, progress: u8) -> Result<()>;

    /// Refresh the liveness heartbeat of an active job
    async fn heartbeat(&self, job_id: Uuid) -> Result<()>;

    /// Mark job as completed with its summary
    async fn complete_job(&self, job_id: Uuid, summary: &BatchSummary) -> Result<()>;

    /// Mark job as permanently failed
    async fn fail_job(&self, job_id: Uuid, error_message: &str) -> Result<()>;

    /// Flag active jobs whose heartbeat is older than `stall_after` as stalled
    async fn mark_stalled(&self, stall_after: Duration) -> Result<Vec<Uuid>>;

    /// Delete terminal jobs past their retention window
    async fn cleanup_expired(&self, retention: RetentionPolicy) -> Result<u64>;

    /// Health check
    async fn health_check(&self) -> Result<serde_json::Value>;

    fn backend_name(&self) -> &'static str;
}
