//! Batch ingestion handler

use crate::{
    error::error_response,
    models::RecordType,
    services::{SubmitOutcome, Upload},
    state::AppState,
};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// `POST /api/ingest/:record_type` with the CSV file as the request body.
///
/// Answers `{jobId, status: "queued"}` when the batch was handed to the job queue, or
/// the batch summary when it was processed in the request path.
pub async fn ingest_batch(
    State(state): State<AppState>,
    Path(record_type): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let expose_details = state.config.expose_error_details();

    let record_type = match record_type.parse::<RecordType>() {
        Ok(record_type) => record_type,
        Err(e) => return error_response(&e, expose_details),
    };

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let upload = Upload {
        record_type,
        content_type,
        body: body.to_vec(),
    };

    match state.ingest_service.submit(upload).await {
        Ok(SubmitOutcome::Queued { job_id }) => (
            StatusCode::OK,
            Json(json!({
                "jobId": job_id,
                "status": "queued",
                "message": "Batch queued for processing"
            })),
        )
            .into_response(),
        Ok(SubmitOutcome::Completed(summary)) => {
            (StatusCode::OK, Json(summary)).into_response()
        }
        Err(e) => {
            if e.status_code().is_server_error() {
                tracing::error!(record_type = %record_type, error = %e, "Batch ingestion failed");
            } else {
                tracing::info!(record_type = %record_type, error = %e, "Batch rejected");
            }
            error_response(&e, expose_details)
        }
    }
}
