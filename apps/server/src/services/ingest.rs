//! Batch ingestion
//!
//! [`IngestService::submit`] accepts an uploaded batch, writes it to a scratch file and
//! either hands it to the job queue or processes it in place. Both paths end up in
//! [`BatchProcessor::process_file`], which runs every row through parse → validate →
//! resolve risk → upsert and accounts for the outcome.

use crate::{
    cache::CacheInvalidator,
    config::IngestConfig,
    db::PatientStore,
    models::{BatchAccountant, BatchSummary, RecordType},
    queue::{BatchJobParams, QueueHandle},
    services::{
        parser::{self, RawRow},
        scorer::ScorerAdapter,
    },
    Error, Result,
};
use async_trait::async_trait;
use chrono::Utc;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use uuid::Uuid;

/// Receives per-row progress of a running batch.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, processed: usize, success: usize, total: usize);
}

/// Sink for batches nobody is watching (the synchronous path).
pub struct NoProgress;

#[async_trait]
impl ProgressSink for NoProgress {
    async fn report(&self, _processed: usize, _success: usize, _total: usize) {}
}

/// Progress percentage of a batch that is still running.
///
/// Capped at 99 so that 100 is only ever observed once the job has completed.
pub fn progress_percent(success: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let percent = success.saturating_mul(100) / total;
    percent.min(99) as u8
}

/// Row processing shared by the queued and synchronous paths.
pub struct BatchProcessor {
    store: Arc<dyn PatientStore>,
    scorer: Arc<ScorerAdapter>,
    invalidator: CacheInvalidator,
}

impl BatchProcessor {
    pub fn new(
        store: Arc<dyn PatientStore>,
        scorer: Arc<ScorerAdapter>,
        invalidator: CacheInvalidator,
    ) -> Self {
        Self {
            store,
            scorer,
            invalidator,
        }
    }

    pub async fn process_file(
        &self,
        path: &Path,
        record_type: RecordType,
        progress: &dyn ProgressSink,
    ) -> Result<BatchSummary> {
        let content = tokio::fs::read(path).await?;
        self.process_bytes(&content, record_type, progress).await
    }

    /// Process one batch. Only a parse failure aborts; row failures are counted.
    pub async fn process_bytes(
        &self,
        content: &[u8],
        record_type: RecordType,
        progress: &dyn ProgressSink,
    ) -> Result<BatchSummary> {
        let rows = parser::parse_all(content, record_type)?;
        let total = rows.len();
        let mut accountant = BatchAccountant::new();

        for row in &rows {
            match self.process_row(row, record_type).await {
                Ok(()) => accountant.record_success(),
                Err(e) => {
                    tracing::debug!(
                        record_type = %record_type,
                        line = row.line(),
                        error = %e,
                        "Row rejected"
                    );
                    accountant.record_failure(e.to_string());
                }
            }
            progress
                .report(accountant.processed_count(), accountant.success_count(), total)
                .await;
        }

        let summary = accountant.finish();
        self.invalidator
            .invalidate_after_batch(record_type, summary.records_success())
            .await;

        tracing::info!(
            record_type = %record_type,
            records_processed = summary.records_processed(),
            records_success = summary.records_success(),
            records_failed = summary.records_failed(),
            "Batch processed"
        );

        Ok(summary)
    }

    async fn process_row(&self, row: &RawRow, record_type: RecordType) -> Result<()> {
        let draft = parser::to_draft(row, record_type)?;
        let resolution = self.scorer.resolve(&draft).await;
        let record = draft.into_record(resolution.score, resolution.level, Utc::now());
        self.store.create_or_update(&record).await?;
        Ok(())
    }
}

/// An uploaded batch as received over HTTP.
#[derive(Debug, Clone)]
pub struct Upload {
    pub record_type: RecordType,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// How a submission was handled.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Handed to the job queue; poll the job for the summary.
    Queued { job_id: Uuid },
    /// Processed in the request path.
    Completed(BatchSummary),
}

pub struct IngestService {
    processor: Arc<BatchProcessor>,
    queue: QueueHandle,
    settings: IngestConfig,
    max_attempts: u32,
}

impl IngestService {
    pub fn new(
        processor: Arc<BatchProcessor>,
        queue: QueueHandle,
        settings: IngestConfig,
        max_attempts: u32,
    ) -> Self {
        Self {
            processor,
            queue,
            settings,
            max_attempts,
        }
    }

    pub fn queue(&self) -> &QueueHandle {
        &self.queue
    }

    pub async fn submit(&self, upload: Upload) -> Result<SubmitOutcome> {
        self.check_upload(&upload)?;

        // Reject unparseable input up front so both paths answer it the same way.
        parser::parse_all(upload.body.as_slice(), upload.record_type)?;

        let path = self.write_scratch_file(&upload).await?;

        if let Some(queue) = self.queue.queue() {
            let params = BatchJobParams {
                record_type: upload.record_type,
                file_path: path.clone(),
            };
            match queue.enqueue(params, self.max_attempts).await {
                Ok(job_id) => return Ok(SubmitOutcome::Queued { job_id }),
                Err(e) => {
                    tracing::warn!(
                        record_type = %upload.record_type,
                        error = %e,
                        "Enqueue failed; processing batch synchronously"
                    );
                }
            }
        }

        let result = self
            .processor
            .process_file(&path, upload.record_type, &NoProgress)
            .await;
        remove_scratch_file(&path).await;

        result.map(SubmitOutcome::Completed)
    }

    fn check_upload(&self, upload: &Upload) -> Result<()> {
        match upload.content_type.as_deref() {
            Some(content_type) if self.settings.allows_content_type(content_type) => {}
            Some(content_type) => {
                return Err(Error::UnsupportedContentType(content_type.to_string()))
            }
            None => return Err(Error::UnsupportedContentType("none".to_string())),
        }

        if upload.body.iter().all(u8::is_ascii_whitespace) {
            return Err(Error::Validation("Uploaded file is empty".to_string()));
        }
        if upload.body.len() > self.settings.max_upload_bytes {
            return Err(Error::Validation(format!(
                "Uploaded file exceeds {} bytes",
                self.settings.max_upload_bytes
            )));
        }
        Ok(())
    }

    async fn write_scratch_file(&self, upload: &Upload) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.settings.scratch_dir).await?;
        let path = self.settings.scratch_dir.join(format!(
            "{}-{}.csv",
            upload.record_type,
            Uuid::new_v4()
        ));
        tokio::fs::write(&path, &upload.body).await?;
        tracing::debug!(path = %path.display(), bytes = upload.body.len(), "Wrote scratch file");
        Ok(path)
    }
}

/// Delete a batch's scratch file. Failures are logged and otherwise ignored.
pub async fn remove_scratch_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed scratch file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "Scratch file already gone");
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove scratch file");
        }
    }
}
