//! PostgreSQL-backed job queue implementation using LISTEN/NOTIFY

use super::{models::*, traits::JobQueue};
use crate::{models::BatchSummary, Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use sqlx::{PgPool, Row};
use std::path::PathBuf;
use tokio::time::{Duration, MissedTickBehavior};
use uuid::Uuid;

const NOTIFY_CHANNEL: &str = "ingest_jobs";

const JOB_COLUMNS: &str = "id, record_type, file_path, status, progress, attempts, max_attempts, \
     summary, error_message, worker_id, created_at, started_at, heartbeat_at, completed_at";

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    record_type: String,
    file_path: String,
    status: String,
    progress: i16,
    attempts: i32,
    max_attempts: i32,
    summary: Option<serde_json::Value>,
    error_message: Option<String>,
    worker_id: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    heartbeat_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<JobRow> for Job {
    type Error = Error;

    fn try_from(row: JobRow) -> Result<Self> {
        let summary = row
            .summary
            .map(serde_json::from_value::<BatchSummary>)
            .transpose()?;

        Ok(Job {
            id: row.id,
            record_type: row.record_type.parse()?,
            file_path: PathBuf::from(row.file_path),
            status: row.status.parse()?,
            progress: row.progress.clamp(0, 100) as u8,
            attempts: row.attempts.max(0) as u32,
            max_attempts: row.max_attempts.max(0) as u32,
            summary,
            error_message: row.error_message,
            worker_id: row.worker_id,
            created_at: row.created_at,
            started_at: row.started_at,
            heartbeat_at: row.heartbeat_at,
            completed_at: row.completed_at,
        })
    }
}

/// Claim the oldest dispatchable job. Concurrent workers skip rows another transaction
/// already holds, so each job is handed out once.
async fn try_dequeue_job(pool: &PgPool, worker_id: &str) -> Result<Option<Job>> {
    let query = format!(
        r#"
        UPDATE ingest_jobs
        SET status = 'active',
            worker_id = $1,
            started_at = COALESCE(started_at, NOW()),
            heartbeat_at = NOW()
        WHERE id = (
            SELECT id
            FROM ingest_jobs
            WHERE status IN ('queued', 'stalled')
            ORDER BY created_at ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
        )
        RETURNING {}
        "#,
        JOB_COLUMNS
    );

    let row = sqlx::query_as::<_, JobRow>(&query)
        .bind(worker_id)
        .fetch_optional(pool)
        .await
        .map_err(Error::Database)?;

    row.map(Job::try_from).transpose()
}

pub struct PostgresJobQueue {
    pool: PgPool,
    listen_poll_interval: Duration,
}

impl PostgresJobQueue {
    pub fn new(pool: PgPool, listen_poll_interval_seconds: u64) -> Self {
        Self {
            pool,
            listen_poll_interval: Duration::from_secs(listen_poll_interval_seconds.max(1)),
        }
    }

    async fn execute_for_job(&self, sql: &str, job_id: Uuid) -> Result<()> {
        sqlx::query(sql)
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }
}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    async fn enqueue(&self, params: BatchJobParams, max_attempts: u32) -> Result<Uuid> {
        let job = Job::new(params, max_attempts);

        sqlx::query(
            r#"
            INSERT INTO ingest_jobs (id, record_type, file_path, status, max_attempts, created_at)
            VALUES ($1, $2, $3, 'queued', $4, $5)
            "#,
        )
        .bind(job.id)
        .bind(job.record_type.as_str())
        .bind(job.file_path.to_string_lossy().as_ref())
        .bind(max_attempts as i32)
        .bind(job.created_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        // Wake waiting workers
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(NOTIFY_CHANNEL)
            .bind(job.id.to_string())
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        tracing::info!(
            job_id = %job.id,
            record_type = %job.record_type,
            backend = "postgres",
            "Enqueued batch job"
        );

        Ok(job.id)
    }

    async fn dequeue(&self, worker_id: &str) -> Result<Option<Job>> {
        let job = try_dequeue_job(&self.pool, worker_id).await?;
        if let Some(ref job) = job {
            tracing::info!(job_id = %job.id, worker_id, "Dequeued batch job");
        }
        Ok(job)
    }

    async fn listen<'a>(&'a self, worker_id: &'a str) -> Result<BoxStream<'a, Result<Job>>> {
        let mut listener = sqlx::postgres::PgListener::connect_with(&self.pool)
            .await
            .map_err(Error::Database)?;

        listener
            .listen(NOTIFY_CHANNEL)
            .await
            .map_err(Error::Database)?;

        tracing::info!(channel = NOTIFY_CHANNEL, worker_id, "Job queue listener started");

        let pool = self.pool.clone();
        let listen_poll_interval = self.listen_poll_interval;

        let stream = async_stream::stream! {
            // Drain whatever is already waiting before blocking on notifications
            loop {
                match try_dequeue_job(&pool, worker_id).await {
                    Ok(Some(job)) => yield Ok(job),
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!(error = %e, "Error polling for jobs");
                        yield Err(e);
                        break;
                    }
                }
            }

            let mut interval = tokio::time::interval(listen_poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    recv_res = listener.recv() => {
                        if let Err(e) = recv_res {
                            tracing::error!(error = %e, "Error receiving job notification");
                            yield Err(Error::Database(e));
                            break;
                        }
                    }
                    // Stalled jobs produce no notification; the poll picks them up.
                    _ = interval.tick() => {
                        tracing::trace!("Periodic queue poll tick");
                    }
                }

                loop {
                    match try_dequeue_job(&pool, worker_id).await {
                        Ok(Some(job)) => yield Ok(job),
                        Ok(None) => break,
                        Err(e) => {
                            tracing::error!(error = %e, "Error dequeuing job");
                            yield Err(e);
                            break;
                        }
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>> {
        let query = format!("SELECT {} FROM ingest_jobs WHERE id = $1", JOB_COLUMNS);
        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.map(Job::try_from).transpose()
    }

    async fn list_jobs(&self, filter: &JobListFilter) -> Result<(Vec<Job>, i64)> {
        let query = format!(
            r#"
            SELECT {}
            FROM ingest_jobs
            WHERE ($1::TEXT IS NULL OR status = $1)
              AND ($2::TEXT IS NULL OR record_type = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
            JOB_COLUMNS
        );

        let rows = sqlx::query_as::<_, JobRow>(&query)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.record_type.map(|t| t.as_str()))
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM ingest_jobs
            WHERE ($1::TEXT IS NULL OR status = $1)
              AND ($2::TEXT IS NULL OR record_type = $2)
            "#,
        )
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.record_type.map(|t| t.as_str()))
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        let jobs = rows
            .into_iter()
            .map(Job::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok((jobs, total))
    }

    async fn start_attempt(&self, job_id: Uuid, attempt: u32) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE ingest_jobs
            SET attempts = GREATEST(attempts, $2),
                heartbeat_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(attempt as i32)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn record_attempt_failure(&self, job_id: Uuid, error_message: &str) -> Result<()> {
        sqlx::query(
            "UPDATE ingest_jobs SET error_message = $2, heartbeat_at = NOW() WHERE id = $1",
        )
        .bind(job_id)
        .bind(error_message)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn update_progress(&self, job_id: Uuid, progress: u8) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE ingest_jobs
            SET progress = GREATEST(progress, $2),
                heartbeat_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(i16::from(progress.min(100)))
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn heartbeat(&self, job_id: Uuid) -> Result<()> {
        self.execute_for_job("UPDATE ingest_jobs SET heartbeat_at = NOW() WHERE id = $1", job_id)
            .await
    }

    async fn complete_job(&self, job_id: Uuid, summary: &BatchSummary) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE ingest_jobs
            SET status = 'completed',
                progress = 100,
                summary = $2,
                completed_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(serde_json::to_value(summary)?)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        tracing::info!(job_id = %job_id, "Job completed");
        Ok(())
    }

    async fn fail_job(&self, job_id: Uuid, error_message: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE ingest_jobs
            SET status = 'failed',
                error_message = $2,
                completed_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(error_message)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        tracing::error!(job_id = %job_id, error = error_message, "Job failed");
        Ok(())
    }

    async fn mark_stalled(&self, stall_after: Duration) -> Result<Vec<Uuid>> {
        let rows = sqlx::query(
            r#"
            UPDATE ingest_jobs
            SET status = 'stalled',
                worker_id = NULL
            WHERE status = 'active'
              AND (heartbeat_at IS NULL
                   OR heartbeat_at < NOW() - make_interval(secs => $1))
            RETURNING id
            "#,
        )
        .bind(stall_after.as_secs_f64())
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let stalled: Vec<Uuid> = rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<std::result::Result<_, _>>()
            .map_err(Error::Database)?;

        if !stalled.is_empty() {
            tracing::warn!(count = stalled.len(), "Flagged stalled jobs for re-dispatch");
        }
        Ok(stalled)
    }

    async fn cleanup_expired(&self, retention: RetentionPolicy) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM ingest_jobs
            WHERE (status = 'completed' AND completed_at < NOW() - make_interval(secs => $1))
               OR (status = 'failed' AND completed_at < NOW() - make_interval(secs => $2))
            "#,
        )
        .bind(retention.completed.as_secs_f64())
        .bind(retention.failed.as_secs_f64())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            tracing::info!(deleted, "Cleaned up expired jobs");
        }
        Ok(deleted)
    }

    async fn health_check(&self) -> Result<serde_json::Value> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) as total,
                COUNT(*) FILTER (WHERE status = 'queued') as queued,
                COUNT(*) FILTER (WHERE status = 'active') as active,
                COUNT(*) FILTER (WHERE status = 'stalled') as stalled,
                COUNT(*) FILTER (WHERE status = 'completed') as completed,
                COUNT(*) FILTER (WHERE status = 'failed') as failed
            FROM ingest_jobs
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        let count = |column: &str| row.try_get::<i64, _>(column).unwrap_or(0);

        Ok(serde_json::json!({
            "status": "ok",
            "backend": "postgres",
            "jobs": {
                "total": count("total"),
                "queued": count("queued"),
                "active": count("active"),
                "stalled": count("stalled"),
                "completed": count("completed"),
                "failed": count("failed"),
            }
        }))
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
