//! Request and response bodies for the HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::PricingHistoryRecord;
use crate::services::UsageEventResult;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateClientRequest {
    #[validate(length(min = 1, max = 255, message = "Client name is required"))]
    pub name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAgentRequest {
    #[validate(length(min = 1, max = 255, message = "Agent name is required"))]
    pub name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AssignPlanRequest {
    #[validate(length(min = 1, message = "plan_id is required"))]
    pub plan_id: String,
    #[validate(length(min = 1, message = "actor_id is required"))]
    pub actor_id: String,
    #[validate(length(max = 1000, message = "Comment is too long"))]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RemovePlanRequest {
    #[validate(length(min = 1, message = "actor_id is required"))]
    pub actor_id: String,
    #[validate(length(max = 1000, message = "Comment is too long"))]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: i64,
}

fn default_history_limit() -> i64 {
    20
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub agent_id: Uuid,
    pub records: Vec<PricingHistoryRecord>,
}

#[derive(Debug, Deserialize)]
pub struct StartCallRequest {
    pub agent_id: Uuid,
    pub started_utc: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct FinalizeCallRequest {
    /// Object of `metric name -> non-negative number`.
    #[serde(default)]
    pub usage_metrics: serde_json::Value,
    #[serde(default)]
    pub send_remote: bool,
}

#[derive(Debug, Serialize)]
pub struct ResendUsageResponse {
    pub call_id: Uuid,
    pub usage_events: Vec<UsageEventResult>,
}

#[derive(Debug, Serialize)]
pub struct SyncClientResponse {
    pub client_id: Uuid,
    pub remote_customer_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UsageSummaryQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}
