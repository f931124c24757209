//! Error types shared across the ingestion pipeline

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The batch could not be tokenized. Fatal for the whole batch.
    #[error("Failed to parse batch{}: {message}", line.map(|l| format!(" at line {l}")).unwrap_or_default())]
    Parse { line: Option<u64>, message: String },

    /// A single row is unusable. Recorded and skipped, never aborts a batch.
    #[error("{0}")]
    RowValidation(String),

    #[error("Risk scorer unavailable: {0}")]
    ScorerUnavailable(String),

    #[error("Failed to write record {id}: {message}")]
    StoreWrite { id: String, message: String },

    #[error("Job queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("Job {job_id} failed after {attempts} attempt(s): {cause}")]
    JobRetryExhausted {
        job_id: uuid::Uuid,
        attempts: u32,
        cause: String,
    },

    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn parse(line: Option<u64>, message: impl Into<String>) -> Self {
        Error::Parse {
            line,
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Parse { .. }
            | Error::RowValidation(_)
            | Error::UnsupportedContentType(_)
            | Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::ScorerUnavailable(_) | Error::QueueUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Error::StoreWrite { .. }
            | Error::JobRetryExhausted { .. }
            | Error::Database(_)
            | Error::Io(_)
            | Error::Serialization(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether a job attempt that ended with this error may be attempted again.
    ///
    /// Malformed input fails identically on every attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Error::Parse { .. }
                | Error::RowValidation(_)
                | Error::UnsupportedContentType(_)
                | Error::Validation(_)
        )
    }

    /// Message safe to show to any caller.
    pub fn public_message(&self) -> String {
        if self.status_code().is_server_error() {
            "Batch processing failed".to_string()
        } else {
            self.to_string()
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

/// Builds an error response, attaching the underlying cause when `expose_details` is set.
pub fn error_response(err: &Error, expose_details: bool) -> Response {
    let status = err.status_code();
    let mut body = json!({ "error": err.public_message() });
    if expose_details {
        body["details"] = json!(err.to_string());
    }
    (status, Json(body)).into_response()
}
