//! Patient record handlers

use crate::{
    db::UpsertOutcome,
    models::RecordType,
    services::patients::{ListQuery, PatientInput},
    state::AppState,
    Result,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

pub async fn list_patients(
    State(state): State<AppState>,
    Path(record_type): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Response> {
    let record_type: RecordType = record_type.parse()?;
    let page = state.patient_service.list(record_type, query).await?;
    Ok((StatusCode::OK, Json(page)).into_response())
}

pub async fn get_patient(
    State(state): State<AppState>,
    Path((record_type, id)): Path<(String, String)>,
) -> Result<Response> {
    let record_type: RecordType = record_type.parse()?;
    let record = state.patient_service.get(record_type, &id).await?;
    Ok((StatusCode::OK, Json(record)).into_response())
}

/// Create or replace a record. 201 when the identity key was new.
pub async fn put_patient(
    State(state): State<AppState>,
    Path((record_type, id)): Path<(String, String)>,
    Json(input): Json<PatientInput>,
) -> Result<Response> {
    let record_type: RecordType = record_type.parse()?;
    let (record, outcome) = state
        .patient_service
        .upsert(record_type, &id, input)
        .await?;

    let status = match outcome {
        UpsertOutcome::Created => StatusCode::CREATED,
        UpsertOutcome::Updated => StatusCode::OK,
    };
    Ok((status, Json(record)).into_response())
}

pub async fn delete_patient(
    State(state): State<AppState>,
    Path((record_type, id)): Path<(String, String)>,
) -> Result<Response> {
    let record_type: RecordType = record_type.parse()?;
    state.patient_service.delete(record_type, &id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
