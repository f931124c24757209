//! State for background workers
//!
//! The standalone worker process needs the store, the job queue and the scorer, but none
//! of the HTTP services. Embedded workers reuse the server's components through
//! [`WorkerState::from_parts`].

use super::{base::Worker, batch_worker::BatchIngestWorker};
use crate::{
    cache::{CacheHandle, CacheInvalidator},
    config::{Config, QueueBackend, StorageBackend},
    db::{self, PatientStore, PoolRole, PostgresPatientStore},
    queue::{JobQueue, PostgresJobQueue, RetryPolicy},
    services::{BatchProcessor, ScorerAdapter},
    Error, Result,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct WorkerState {
    pub config: Arc<Config>,
    pub job_queue: Arc<dyn JobQueue>,
    pub processor: Arc<BatchProcessor>,
    pub retry_policy: RetryPolicy,
}

impl WorkerState {
    /// Initialize state for a standalone worker process.
    ///
    /// A separate process can only share jobs and records through Postgres, so both the
    /// queue and the store must use it. The worker has no view of the server's cache;
    /// cached reads on the server expire by TTL.
    pub async fn new(config: Config) -> Result<Self> {
        tracing::info!("Initializing worker state...");

        if config.queue.backend != QueueBackend::Postgres {
            return Err(Error::QueueUnavailable(format!(
                "standalone workers require queue.backend = postgres (configured: {:?})",
                config.queue.backend
            )));
        }
        if config.storage.backend != StorageBackend::Postgres {
            return Err(Error::Internal(format!(
                "standalone workers require storage.backend = postgres (configured: {:?})",
                config.storage.backend
            )));
        }

        let pool = db::create_pool(&config.database, PoolRole::Worker).await?;
        db::run_migrations(&pool).await?;

        let job_queue: Arc<dyn JobQueue> = Arc::new(PostgresJobQueue::new(
            pool.clone(),
            config.workers.poll_interval_seconds,
        ));
        let store: Arc<dyn PatientStore> = Arc::new(PostgresPatientStore::new(pool));
        let scorer = Arc::new(ScorerAdapter::from_config(&config.scorer)?);
        let processor = Arc::new(BatchProcessor::new(
            store,
            scorer,
            CacheInvalidator::new(CacheHandle::disabled()),
        ));

        tracing::info!("Worker state initialized");
        Ok(Self::from_parts(Arc::new(config), job_queue, processor))
    }

    pub fn from_parts(
        config: Arc<Config>,
        job_queue: Arc<dyn JobQueue>,
        processor: Arc<BatchProcessor>,
    ) -> Self {
        let retry_policy = config.queue.retry_policy();
        Self {
            config,
            job_queue,
            processor,
            retry_policy,
        }
    }
}

/// Every worker this process runs. Concurrency comes from the runner, so one
/// batch worker covers all ingest jobs.
pub fn create_workers(state: &WorkerState) -> Vec<Arc<dyn Worker>> {
    vec![Arc::new(BatchIngestWorker::new(
        state.job_queue.clone(),
        state.processor.clone(),
        state.retry_policy,
    ))]
}
