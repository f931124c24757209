//! Dashboard and analytics handlers

use crate::{state::AppState, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

pub async fn dashboard_stats(State(state): State<AppState>) -> Result<Response> {
    let stats = state.analytics_service.dashboard_stats().await?;
    Ok((StatusCode::OK, Json(stats)).into_response())
}

pub async fn insights(State(state): State<AppState>) -> Result<Response> {
    let insights = state.analytics_service.insights().await?;
    Ok((StatusCode::OK, Json(insights)).into_response())
}

pub async fn trends(State(state): State<AppState>) -> Result<Response> {
    let trends = state.analytics_service.trends().await?;
    Ok((StatusCode::OK, Json(trends)).into_response())
}
