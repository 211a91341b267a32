use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::dtos::{FinalizeCallRequest, ResendUsageResponse, StartCallRequest};
use crate::models::{Call, UsageMetrics};
use crate::services::FinalizedCost;
use crate::startup::AppState;

#[tracing::instrument(skip(state, request), fields(agent_id = %request.agent_id))]
pub async fn start_call(
    State(state): State<AppState>,
    Json(request): Json<StartCallRequest>,
) -> Result<(StatusCode, Json<Call>), AppError> {
    let call = state
        .service
        .start_call(request.agent_id, request.started_utc)
        .await?;
    Ok((StatusCode::CREATED, Json(call)))
}

#[tracing::instrument(skip(state, request), fields(send_remote = request.send_remote))]
pub async fn finalize_call(
    State(state): State<AppState>,
    Path(call_id): Path<Uuid>,
    Json(request): Json<FinalizeCallRequest>,
) -> Result<Json<FinalizedCost>, AppError> {
    let usage = UsageMetrics::from_json(&request.usage_metrics)?;

    let result = state
        .service
        .finalize_call_cost(call_id, &usage, request.send_remote)
        .await?;

    Ok(Json(result))
}

#[tracing::instrument(skip(state))]
pub async fn resend_usage(
    State(state): State<AppState>,
    Path(call_id): Path<Uuid>,
) -> Result<Json<ResendUsageResponse>, AppError> {
    let usage_events = state.service.resend_call_usage(call_id).await?;
    Ok(Json(ResendUsageResponse {
        call_id,
        usage_events,
    }))
}
