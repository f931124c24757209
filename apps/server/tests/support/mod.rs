//! Shared harness for integration tests
//!
//! Builds the full application over in-memory backends (store, queue and cache), runs
//! embedded workers when a queue is available and drives the router in-process.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode},
    Router,
};
use futures::{future::BoxFuture, stream::BoxStream};
use riskwatch::{
    api::create_router,
    config::{Config, QueueBackend, StorageBackend},
    db::{InMemoryPatientStore, PatientStore},
    models::{BatchSummary, RecordType, RiskLevel},
    queue::{
        BatchJobParams, Job, JobListFilter, JobQueue, MemoryJobQueue, QueueHandle,
        RetentionPolicy,
    },
    services::{
        scorer::{Prediction, RiskFeatures},
        RiskScorer, ScorerAdapter,
    },
    state::AppState,
    workers::{create_workers, spawn_workers_with_config, WorkerRunnerConfig, WorkerState},
    Error,
};
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tempfile::TempDir;
use tokio::sync::watch;
use tower::ServiceExt;
use uuid::Uuid;

pub type TestFuture = BoxFuture<'static, anyhow::Result<()>>;

#[derive(Clone)]
pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub store: Arc<dyn PatientStore>,
    scratch: Arc<TempDir>,
}

impl TestApp {
    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch.path().to_path_buf()
    }

    /// Number of scratch files still on disk.
    pub fn scratch_file_count(&self) -> usize {
        std::fs::read_dir(self.scratch.path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> anyhow::Result<(StatusCode, HeaderMap, Vec<u8>)> {
        let headers: &[(&str, &str)] = if body.is_some() {
            &[("content-type", "application/json")]
        } else {
            &[]
        };
        self.request_with_extra_headers(method, path, body, headers)
            .await
    }

    pub async fn request_with_extra_headers(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
        headers: &[(&str, &str)],
    ) -> anyhow::Result<(StatusCode, HeaderMap, Vec<u8>)> {
        let mut builder = Request::builder().method(method).uri(path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(body.map(Body::from).unwrap_or_else(Body::empty))?;

        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        Ok((status, headers, bytes.to_vec()))
    }

    /// Upload `csv` as a batch of `record_type` with a `text/csv` content type.
    pub async fn upload_csv(
        &self,
        record_type: &str,
        csv: &str,
    ) -> anyhow::Result<(StatusCode, serde_json::Value)> {
        self.upload(record_type, Some("text/csv"), csv.as_bytes().to_vec())
            .await
    }

    pub async fn upload(
        &self,
        record_type: &str,
        content_type: Option<&str>,
        body: Vec<u8>,
    ) -> anyhow::Result<(StatusCode, serde_json::Value)> {
        let headers: Vec<(&str, &str)> = content_type
            .map(|ct| vec![("content-type", ct)])
            .unwrap_or_default();
        let (status, _headers, body) = self
            .request_with_extra_headers(
                Method::POST,
                &format!("/api/ingest/{}", record_type),
                Some(body),
                &headers,
            )
            .await?;
        Ok((status, serde_json::from_slice(&body)?))
    }

    pub async fn get_json(&self, path: &str) -> anyhow::Result<(StatusCode, serde_json::Value)> {
        let (status, _headers, body) = self.request(Method::GET, path, None).await?;
        let value = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body)?
        };
        Ok((status, value))
    }

    /// Poll a job until it reaches a terminal state and its scratch file is gone.
    pub async fn wait_for_job(&self, job_id: &str) -> anyhow::Result<serde_json::Value> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let (status, job) = self.get_json(&format!("/api/jobs/{}", job_id)).await?;
            assert_status(status, StatusCode::OK, "get job");
            let terminal = matches!(job["status"].as_str(), Some("completed" | "failed"));
            if terminal && self.scratch_file_count() == 0 {
                return Ok(job);
            }
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("job {} did not finish in time: {}", job_id, job);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

pub fn to_json_body(value: &serde_json::Value) -> anyhow::Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

pub fn assert_status(actual: StatusCode, expected: StatusCode, context: &str) {
    assert_eq!(
        actual, expected,
        "unexpected status for {}: got {}, expected {}",
        context, actual, expected
    );
}

/// Overrides applied on top of the in-memory defaults.
#[derive(Default)]
pub struct TestAppOptions {
    pub scorer: Option<Arc<dyn RiskScorer>>,
    pub queue: Option<Arc<dyn JobQueue>>,
}

pub async fn with_test_app<F>(f: F) -> anyhow::Result<()>
where
    F: FnOnce(TestApp) -> TestFuture,
{
    with_test_app_with_options(|_| {}, TestAppOptions::default(), f).await
}

pub async fn with_test_app_with_config<C, F>(configure: C, f: F) -> anyhow::Result<()>
where
    C: FnOnce(&mut Config),
    F: FnOnce(TestApp) -> TestFuture,
{
    with_test_app_with_options(configure, TestAppOptions::default(), f).await
}

pub async fn with_test_app_with_options<C, F>(
    configure: C,
    options: TestAppOptions,
    f: F,
) -> anyhow::Result<()>
where
    C: FnOnce(&mut Config),
    F: FnOnce(TestApp) -> TestFuture,
{
    let scratch = Arc::new(tempfile::tempdir()?);

    let mut config = Config::from_defaults()?;
    config.storage.backend = StorageBackend::Memory;
    config.queue.backend = QueueBackend::Memory;
    config.queue.initial_backoff_ms = 5;
    config.ingest.scratch_dir = scratch.path().to_path_buf();
    config.workers.poll_interval_seconds = 1;
    configure(&mut config);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid test config: {e}"))?;

    let store: Arc<dyn PatientStore> = Arc::new(InMemoryPatientStore::new());
    let scorer = Arc::new(ScorerAdapter::new(options.scorer, config.scorer.timeout()));

    let queue = match (options.queue, config.queue.backend) {
        (Some(queue), _) => QueueHandle::Available(queue),
        (None, QueueBackend::Disabled) => QueueHandle::Unavailable,
        (None, _) => QueueHandle::Available(Arc::new(MemoryJobQueue::new(Duration::from_millis(
            50,
        )))),
    };

    let state = AppState::from_components(config, store.clone(), queue, scorer);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = match (state.queue.queue(), state.config.workers.enabled) {
        (Some(job_queue), true) => {
            let worker_state = WorkerState::from_parts(
                state.config.clone(),
                job_queue.clone(),
                state.processor.clone(),
            );
            spawn_workers_with_config(
                create_workers(&worker_state),
                job_queue.clone(),
                WorkerRunnerConfig::from_config(&state.config),
                shutdown_rx,
            )
        }
        _ => Vec::new(),
    };

    let app = TestApp {
        router: create_router(state.clone()),
        state,
        store,
        scratch,
    };

    let result = f(app).await;

    let _ = shutdown_tx.send(true);
    for handle in handles {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    result
}

/// Scorer whose every call fails, forcing the fallback heuristic.
pub struct FailingScorer {
    pub calls: AtomicUsize,
}

impl FailingScorer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RiskScorer for FailingScorer {
    async fn predict(
        &self,
        _record_type: RecordType,
        _features: &RiskFeatures,
    ) -> riskwatch::Result<Prediction> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::ScorerUnavailable("connection refused".to_string()))
    }
}

/// Scorer answering a fixed prediction and counting calls.
pub struct CountingScorer {
    pub calls: AtomicUsize,
    pub score: u8,
}

impl CountingScorer {
    pub fn new(score: u8) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            score,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RiskScorer for CountingScorer {
    async fn predict(
        &self,
        _record_type: RecordType,
        _features: &RiskFeatures,
    ) -> riskwatch::Result<Prediction> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Prediction {
            risk_score: self.score,
            risk_level: RiskLevel::from_score(self.score),
        })
    }
}

/// Queue that probes healthy but refuses every operation, as when the backend drops
/// between startup and submission.
pub struct DownQueue;

fn down() -> Error {
    Error::QueueUnavailable("connection refused".to_string())
}

#[async_trait]
impl JobQueue for DownQueue {
    async fn enqueue(&self, _params: BatchJobParams, _max_attempts: u32) -> riskwatch::Result<Uuid> {
        Err(down())
    }

    async fn dequeue(&self, _worker_id: &str) -> riskwatch::Result<Option<Job>> {
        Err(down())
    }

    async fn listen<'a>(
        &'a self,
        _worker_id: &'a str,
    ) -> riskwatch::Result<BoxStream<'a, riskwatch::Result<Job>>> {
        Err(down())
    }

    async fn get_job(&self, _job_id: Uuid) -> riskwatch::Result<Option<Job>> {
        Err(down())
    }

    async fn list_jobs(&self, _filter: &JobListFilter) -> riskwatch::Result<(Vec<Job>, i64)> {
        Err(down())
    }

    async fn start_attempt(&self, _job_id: Uuid, _attempt: u32) -> riskwatch::Result<()> {
        Err(down())
    }

    async fn record_attempt_failure(
        &self,
        _job_id: Uuid,
        _error_message: &str,
    ) -> riskwatch::Result<()> {
        Err(down())
    }

    async fn update_progress(&self, _job_id: Uuid, _progress: u8) -> riskwatch::Result<()> {
        Err(down())
    }

    async fn heartbeat(&self, _job_id: Uuid) -> riskwatch::Result<()> {
        Err(down())
    }

    async fn complete_job(&self, _job_id: Uuid, _summary: &BatchSummary) -> riskwatch::Result<()> {
        Err(down())
    }

    async fn fail_job(&self, _job_id: Uuid, _error_message: &str) -> riskwatch::Result<()> {
        Err(down())
    }

    async fn mark_stalled(&self, _stall_after: Duration) -> riskwatch::Result<Vec<Uuid>> {
        Err(down())
    }

    async fn cleanup_expired(&self, _retention: RetentionPolicy) -> riskwatch::Result<u64> {
        Err(down())
    }

    async fn health_check(&self) -> riskwatch::Result<serde_json::Value> {
        Err(down())
    }

    fn backend_name(&self) -> &'static str {
        "down"
    }
}

pub const MATERNAL_CSV: &str = "Patient ID,Name,Age,Risk Factors\n\
M-001,Ada Obi,29,anemia\n\
M-002,Bea Kim,41,hypertension;diabetes\n\
M-003,Cleo Dunn,35,\"previous c-section, obesity\"\n";

pub const PEDIATRIC_CSV: &str = "Child ID,Name,Birth Weight,Gestation Weeks,Risk Factors\n\
C-001,Dan Ode,1.4,30,prematurity\n\
C-002,Eve Ray,3.2,39,jaundice\n";
