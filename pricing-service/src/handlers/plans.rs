use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;

use crate::models::PricingPlan;
use crate::services::PlanSyncReport;
use crate::startup::AppState;

/// Mirror every remote plan locally.
#[tracing::instrument(skip(state))]
pub async fn sync_all_plans(
    State(state): State<AppState>,
) -> Result<Json<PlanSyncReport>, AppError> {
    let report = state.service.sync_all_plans().await?;
    Ok(Json(report))
}

#[tracing::instrument(skip(state))]
pub async fn sync_plan(
    State(state): State<AppState>,
    Path(plan_id): Path<String>,
) -> Result<Json<PricingPlan>, AppError> {
    let plan = state.service.sync_plan(&plan_id).await?;
    Ok(Json(plan))
}

pub async fn list_plans(State(state): State<AppState>) -> Result<Json<Vec<PricingPlan>>, AppError> {
    let plans = state.service.list_plans().await?;
    Ok(Json(plans))
}

pub async fn get_plan(
    State(state): State<AppState>,
    Path(plan_id): Path<String>,
) -> Result<Json<PricingPlan>, AppError> {
    let plan = state.service.get_plan(&plan_id).await?;
    Ok(Json(plan))
}

#[tracing::instrument(skip(state))]
pub async fn deactivate_plan(
    State(state): State<AppState>,
    Path(plan_id): Path<String>,
) -> Result<Json<PricingPlan>, AppError> {
    let plan = state.service.deactivate_plan(&plan_id).await?;
    Ok(Json(plan))
}
