//! Job queue data models

use crate::{
    models::{BatchSummary, RecordType},
    Error,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, str::FromStr, time::Duration};
use uuid::Uuid;

/// Job lifecycle state.
///
/// `queued → active → completed | failed`. An active job whose heartbeat goes stale is
/// flagged `stalled` and becomes eligible for dispatch again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Active,
    Completed,
    Failed,
    Stalled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Active => "active",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Stalled => "stalled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// States a worker may pick a job up from.
    pub fn is_dispatchable(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Stalled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "active" => Ok(JobStatus::Active),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "stalled" => Ok(JobStatus::Stalled),
            other => Err(Error::Validation(format!("Unknown job status '{}'", other))),
        }
    }
}

/// Target of a batch ingestion job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchJobParams {
    pub record_type: RecordType,
    /// Scratch copy of the uploaded file.
    pub file_path: PathBuf,
}

/// Bounded exponential backoff for job attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 2_000,
            backoff_multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following failed attempt number `attempt` (1-based).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = u64::from(self.backoff_multiplier).saturating_pow(exponent);
        Duration::from_millis(self.initial_delay_ms.saturating_mul(factor))
    }

    pub fn can_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// A batch ingestion job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    pub record_type: RecordType,
    pub file_path: PathBuf,
    pub status: JobStatus,
    /// 0-100, never decreases.
    pub progress: u8,
    /// Attempts started so far.
    pub attempts: u32,
    pub max_attempts: u32,
    pub summary: Option<BatchSummary>,
    pub error_message: Option<String>,
    pub worker_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(params: BatchJobParams, max_attempts: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            record_type: params.record_type,
            file_path: params.file_path,
            status: JobStatus::Queued,
            progress: 0,
            attempts: 0,
            max_attempts,
            summary: None,
            error_message: None,
            worker_id: None,
            created_at: Utc::now(),
            started_at: None,
            heartbeat_at: None,
            completed_at: None,
        }
    }

    pub fn params(&self) -> BatchJobParams {
        BatchJobParams {
            record_type: self.record_type,
            file_path: self.file_path.clone(),
        }
    }
}

/// Filter for job listings.
#[derive(Debug, Clone, Default)]
pub struct JobListFilter {
    pub status: Option<JobStatus>,
    pub record_type: Option<RecordType>,
    pub limit: i64,
    pub offset: i64,
}

/// Retention windows applied by [`crate::queue::JobQueue::cleanup_expired`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub completed: Duration,
    pub failed: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            completed: Duration::from_secs(60 * 60),
            failed: Duration::from_secs(24 * 60 * 60),
        }
    }
}
