//! Shared application state

use crate::{
    cache::{CacheHandle, CacheInvalidator, MemoryCache},
    config::{Config, QueueBackend, StorageBackend},
    db::{self, InMemoryPatientStore, PatientStore, PoolRole, PostgresPatientStore},
    queue::{JobQueue, MemoryJobQueue, PostgresJobQueue, QueueHandle},
    services::{AnalyticsService, BatchProcessor, IngestService, PatientService, ScorerAdapter},
    Result,
};
use sqlx::PgPool;
use std::{sync::Arc, time::Duration};

#[derive(Debug, Clone)]
pub struct AppStateOptions {
    pub run_migrations: bool,
}

impl Default for AppStateOptions {
    fn default() -> Self {
        Self {
            run_migrations: true,
        }
    }
}

/// Shared application state passed to all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn PatientStore>,
    pub queue: QueueHandle,
    pub cache: CacheHandle,
    pub scorer: Arc<ScorerAdapter>,
    pub processor: Arc<BatchProcessor>,
    pub ingest_service: Arc<IngestService>,
    pub patient_service: Arc<PatientService>,
    pub analytics_service: Arc<AnalyticsService>,
}

impl AppState {
    /// Initialize the application state
    pub async fn new(config: Config) -> Result<Self> {
        Self::new_with_options(config, AppStateOptions::default()).await
    }

    pub async fn new_with_options(config: Config, options: AppStateOptions) -> Result<Self> {
        tracing::info!(
            storage = ?config.storage.backend,
            queue = ?config.queue.backend,
            "Initializing application state..."
        );

        let needs_pool = config.storage.backend == StorageBackend::Postgres
            || config.queue.backend == QueueBackend::Postgres;
        let pool = if needs_pool {
            Some(connect(&config, &options).await)
        } else {
            None
        };

        let store: Arc<dyn PatientStore> = match (config.storage.backend, &pool) {
            (StorageBackend::Postgres, Some(Ok(pool))) => {
                Arc::new(PostgresPatientStore::new(pool.clone()))
            }
            (StorageBackend::Postgres, Some(Err(e))) => {
                return Err(crate::Error::Internal(format!(
                    "Patient store unavailable: {}",
                    e
                )))
            }
            _ => Arc::new(InMemoryPatientStore::new()),
        };

        let queue = match (config.queue.backend, &pool) {
            (QueueBackend::Postgres, Some(Ok(pool))) => {
                let queue: Arc<dyn JobQueue> = Arc::new(PostgresJobQueue::new(
                    pool.clone(),
                    config.workers.poll_interval_seconds,
                ));
                QueueHandle::probe(queue).await
            }
            (QueueBackend::Postgres, _) => {
                tracing::warn!("Job queue database unreachable; batches will be processed synchronously");
                QueueHandle::Unavailable
            }
            (QueueBackend::Memory, _) => {
                let queue: Arc<dyn JobQueue> = Arc::new(MemoryJobQueue::new(
                    Duration::from_secs(config.workers.poll_interval_seconds.max(1)),
                ));
                QueueHandle::probe(queue).await
            }
            (QueueBackend::Disabled, _) => {
                tracing::info!("Job queue disabled; batches will be processed synchronously");
                QueueHandle::Unavailable
            }
        };

        let scorer = Arc::new(ScorerAdapter::from_config(&config.scorer)?);
        Ok(Self::from_components(config, store, queue, scorer))
    }

    /// Assemble services over already constructed backends.
    pub fn from_components(
        config: Config,
        store: Arc<dyn PatientStore>,
        queue: QueueHandle,
        scorer: Arc<ScorerAdapter>,
    ) -> Self {
        let config = Arc::new(config);

        let cache = if config.cache.enabled {
            CacheHandle::new(Arc::new(MemoryCache::new(config.cache.capacity)))
        } else {
            tracing::info!("Read cache disabled");
            CacheHandle::disabled()
        };

        let processor = Arc::new(BatchProcessor::new(
            store.clone(),
            scorer.clone(),
            CacheInvalidator::new(cache.clone()),
        ));
        let ingest_service = Arc::new(IngestService::new(
            processor.clone(),
            queue.clone(),
            config.ingest.clone(),
            config.queue.max_attempts,
        ));
        let patient_service = Arc::new(PatientService::new(
            store.clone(),
            scorer.clone(),
            cache.clone(),
            config.cache.list_ttl(),
        ));
        let analytics_service = Arc::new(AnalyticsService::new(
            store.clone(),
            cache.clone(),
            config.cache.aggregate_ttl(),
        ));

        tracing::info!(
            store = store.backend_name(),
            queue_mode = queue.mode(),
            cache = cache.mode(),
            scorer = scorer.has_scorer(),
            "Application state initialized"
        );

        Self {
            config,
            store,
            queue,
            cache,
            scorer,
            processor,
            ingest_service,
            patient_service,
            analytics_service,
        }
    }
}

async fn connect(config: &Config, options: &AppStateOptions) -> Result<PgPool> {
    let pool = db::create_pool(&config.database, PoolRole::Server).await?;
    if options.run_migrations {
        db::run_migrations(&pool).await?;
    }
    Ok(pool)
}
