use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// Liveness plus the processing mode batches will currently take.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let queue_backend = state.queue.queue().map(|q| q.backend_name());
    let scorer = if state.scorer.has_scorer() {
        "model"
    } else {
        "fallback"
    };

    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "storage": state.store.backend_name(),
            "queue": {
                "mode": state.queue.mode(),
                "backend": queue_backend,
            },
            "cache": state.cache.mode(),
            "scorer": scorer,
        })),
    )
}
