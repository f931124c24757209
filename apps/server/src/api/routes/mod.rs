use crate::api::handlers::{analytics, health, ingest, jobs, patients};
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health::health))
}

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Batch ingestion
        .route("/ingest/:record_type", post(ingest::ingest_batch))
        // Job tracking
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/health", get(jobs::get_queue_health))
        .route("/jobs/cleanup", post(jobs::cleanup_expired_jobs))
        .route("/jobs/:id", get(jobs::get_job))
        // Patient records
        .route("/patients/:record_type", get(patients::list_patients))
        .route(
            "/patients/:record_type/:id",
            get(patients::get_patient)
                .put(patients::put_patient)
                .delete(patients::delete_patient),
        )
        // Aggregates
        .route("/dashboard/stats", get(analytics::dashboard_stats))
        .route("/analytics/insights", get(analytics::insights))
        .route("/analytics/trends", get(analytics::trends))
}
