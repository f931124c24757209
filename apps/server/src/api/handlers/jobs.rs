//! Ingest job tracking handlers

use crate::{
    models::RecordType,
    queue::{Job, JobListFilter, JobQueue, JobStatus},
    state::AppState,
    Error, Result,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListJobsQuery {
    pub status: Option<String>,
    pub record_type: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn job_queue(state: &AppState) -> Result<&Arc<dyn JobQueue>> {
    state.queue.queue().ok_or_else(|| {
        Error::QueueUnavailable("batches are being processed synchronously".to_string())
    })
}

/// Client view of a job. The scratch file location stays internal.
fn job_json(job: &Job) -> serde_json::Value {
    json!({
        "id": job.id,
        "recordType": job.record_type,
        "status": job.status,
        "progress": job.progress,
        "attempts": job.attempts,
        "maxAttempts": job.max_attempts,
        "result": job.summary,
        "errorMessage": job.error_message,
        "workerId": job.worker_id,
        "createdAt": job.created_at,
        "startedAt": job.started_at,
        "completedAt": job.completed_at,
    })
}

/// List ingest jobs with optional filtering
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(q): Query<ListJobsQuery>,
) -> Result<Response> {
    let queue = job_queue(&state)?;

    let filter = JobListFilter {
        status: q.status.as_deref().map(str::parse::<JobStatus>).transpose()?,
        record_type: q
            .record_type
            .as_deref()
            .map(str::parse::<RecordType>)
            .transpose()?,
        limit: q.limit.unwrap_or(50).clamp(1, 1000),
        offset: q.offset.unwrap_or(0).max(0),
    };

    let (jobs, total) = queue.list_jobs(&filter).await?;
    let jobs_json: Vec<serde_json::Value> = jobs.iter().map(job_json).collect();

    Ok((
        StatusCode::OK,
        Json(json!({
            "jobs": jobs_json,
            "total": total,
            "limit": filter.limit,
            "offset": filter.offset
        })),
    )
        .into_response())
}

/// Get a single job by ID
pub async fn get_job(State(state): State<AppState>, Path(job_id): Path<Uuid>) -> Result<Response> {
    let job = job_queue(&state)?.get_job(job_id).await?;

    match job {
        Some(job) => Ok((StatusCode::OK, Json(job_json(&job))).into_response()),
        None => Err(Error::NotFound {
            entity: "Job".to_string(),
            id: job_id.to_string(),
        }),
    }
}

/// Get queue health and statistics
pub async fn get_queue_health(State(state): State<AppState>) -> Result<Response> {
    let health = job_queue(&state)?.health_check().await?;
    Ok((StatusCode::OK, Json(health)).into_response())
}

/// Purge terminal jobs past their retention window
pub async fn cleanup_expired_jobs(State(state): State<AppState>) -> Result<Response> {
    let retention = state.config.queue.retention_policy();
    let deleted = job_queue(&state)?.cleanup_expired(retention).await?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "deleted": deleted,
            "completedRetentionSeconds": retention.completed.as_secs(),
            "failedRetentionSeconds": retention.failed.as_secs()
        })),
    )
        .into_response())
}
