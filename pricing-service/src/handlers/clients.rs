use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{CreateAgentRequest, CreateClientRequest, SyncClientResponse, UsageSummaryQuery};
use crate::models::{Agent, Client, CreateAgent, CreateClient};
use crate::startup::AppState;

#[tracing::instrument(skip(state, request))]
pub async fn create_client(
    State(state): State<AppState>,
    Json(request): Json<CreateClientRequest>,
) -> Result<(StatusCode, Json<Client>), AppError> {
    request.validate()?;

    let client = state
        .service
        .store()
        .create_client(&CreateClient {
            name: request.name,
            email: request.email,
        })
        .await?;

    tracing::info!(client_id = %client.client_id, "Client created");
    Ok((StatusCode::CREATED, Json(client)))
}

#[tracing::instrument(skip(state, request))]
pub async fn create_agent(
    State(state): State<AppState>,
    Path(client_id): Path<Uuid>,
    Json(request): Json<CreateAgentRequest>,
) -> Result<(StatusCode, Json<Agent>), AppError> {
    request.validate()?;

    let agent = state
        .service
        .store()
        .create_agent(&CreateAgent {
            client_id,
            name: request.name,
        })
        .await?;

    tracing::info!(agent_id = %agent.agent_id, client_id = %client_id, "Agent created");
    Ok((StatusCode::CREATED, Json(agent)))
}

#[tracing::instrument(skip(state))]
pub async fn sync_client(
    State(state): State<AppState>,
    Path(client_id): Path<Uuid>,
) -> Result<Json<SyncClientResponse>, AppError> {
    let remote_customer_id = state.service.sync_client(client_id).await?;
    Ok(Json(SyncClientResponse {
        client_id,
        remote_customer_id,
    }))
}

pub async fn usage_summary(
    State(state): State<AppState>,
    Path(client_id): Path<Uuid>,
    Query(query): Query<UsageSummaryQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let summary = state
        .service
        .get_usage_summary(client_id, query.start, query.end)
        .await?;
    Ok(Json(summary))
}
