use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{AssignPlanRequest, HistoryQuery, HistoryResponse, RemovePlanRequest};
use crate::models::PricingHistoryRecord;
use crate::startup::AppState;

#[tracing::instrument(skip(state, request), fields(plan_id = %request.plan_id))]
pub async fn assign_plan(
    State(state): State<AppState>,
    Path(agent_id): Path<Uuid>,
    Json(request): Json<AssignPlanRequest>,
) -> Result<(StatusCode, Json<PricingHistoryRecord>), AppError> {
    request.validate()?;

    let record = state
        .service
        .assign_plan(agent_id, &request.plan_id, &request.actor_id, request.comment)
        .await?;

    Ok((StatusCode::CREATED, Json(record)))
}

#[tracing::instrument(skip(state, request))]
pub async fn remove_plan(
    State(state): State<AppState>,
    Path(agent_id): Path<Uuid>,
    Json(request): Json<RemovePlanRequest>,
) -> Result<Json<PricingHistoryRecord>, AppError> {
    request.validate()?;

    let record = state
        .service
        .remove_plan(agent_id, &request.actor_id, request.comment)
        .await?;

    Ok(Json(record))
}

pub async fn get_history(
    State(state): State<AppState>,
    Path(agent_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, AppError> {
    let records = state.service.get_history(agent_id, query.limit).await?;
    Ok(Json(HistoryResponse { agent_id, records }))
}
