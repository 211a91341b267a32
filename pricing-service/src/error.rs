//! Error taxonomy for pricing-service.

use service_core::error::AppError;
use service_core::retry::Retryable;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PricingError {
    /// Failure reported by (or while reaching) the remote billing service.
    /// `status` is `None` when no HTTP response was received.
    #[error("Remote billing error (status {}): {message}", status_label(.status))]
    RemoteBilling {
        status: Option<u16>,
        message: String,
        payload: Option<serde_json::Value>,
    },

    #[error("Pricing plan not found: {0}")]
    PlanNotFound(String),

    #[error("Invalid pricing plan {plan_id}: {reason}")]
    InvalidPlan { plan_id: String, reason: String },

    #[error("Call {0} has no pricing plan assigned")]
    NoPricingPlanAssigned(Uuid),

    #[error("Invalid usage metrics: {0}")]
    InvalidUsageMetrics(String),

    #[error("Pricing history for agent {0} changed concurrently, retry the assignment")]
    ConcurrentHistoryConflict(Uuid),

    #[error("Cost for call {0} is already finalized")]
    CostAlreadyFinalized(Uuid),

    #[error("Cost for call {0} has not been finalized")]
    CallNotFinalized(Uuid),

    #[error("Agent not found: {0}")]
    AgentNotFound(Uuid),

    #[error("Call not found: {0}")]
    CallNotFound(Uuid),

    #[error("Client not found: {0}")]
    ClientNotFound(Uuid),

    #[error("Invalid time range: start {start} is not before end {end}")]
    InvalidTimeRange { start: String, end: String },

    #[error("Database error: {0}")]
    Database(anyhow::Error),
}

fn status_label(status: &Option<u16>) -> String {
    status
        .map(|code| code.to_string())
        .unwrap_or_else(|| "none".to_string())
}

impl PricingError {
    pub fn remote(status: Option<u16>, message: impl Into<String>) -> Self {
        PricingError::RemoteBilling {
            status,
            message: message.into(),
            payload: None,
        }
    }

    /// Remote status code, if this is a remote failure that got a response.
    pub fn remote_status(&self) -> Option<u16> {
        match self {
            PricingError::RemoteBilling { status, .. } => *status,
            _ => None,
        }
    }

    /// Short label used for metrics and per-event results.
    pub fn kind(&self) -> &'static str {
        match self {
            PricingError::RemoteBilling { .. } => "remote_billing",
            PricingError::PlanNotFound(_) => "plan_not_found",
            PricingError::InvalidPlan { .. } => "invalid_plan",
            PricingError::NoPricingPlanAssigned(_) => "no_pricing_plan_assigned",
            PricingError::InvalidUsageMetrics(_) => "invalid_usage_metrics",
            PricingError::ConcurrentHistoryConflict(_) => "concurrent_history_conflict",
            PricingError::CostAlreadyFinalized(_) => "cost_already_finalized",
            PricingError::CallNotFinalized(_) => "call_not_finalized",
            PricingError::AgentNotFound(_) => "agent_not_found",
            PricingError::CallNotFound(_) => "call_not_found",
            PricingError::ClientNotFound(_) => "client_not_found",
            PricingError::InvalidTimeRange { .. } => "invalid_time_range",
            PricingError::Database(_) => "database",
        }
    }
}

/// Rate limiting, server-side failures and transport failures are transient.
impl Retryable for PricingError {
    fn is_retryable(&self) -> bool {
        match self {
            PricingError::RemoteBilling { status: None, .. } => true,
            PricingError::RemoteBilling {
                status: Some(code), ..
            } => *code == 429 || (500..600).contains(code),
            _ => false,
        }
    }
}

impl From<sqlx::Error> for PricingError {
    fn from(err: sqlx::Error) -> Self {
        PricingError::Database(anyhow::Error::new(err))
    }
}

impl From<PricingError> for AppError {
    fn from(err: PricingError) -> Self {
        let message = err.to_string();
        match err {
            PricingError::PlanNotFound(_)
            | PricingError::AgentNotFound(_)
            | PricingError::CallNotFound(_)
            | PricingError::ClientNotFound(_) => AppError::NotFound(anyhow::anyhow!(message)),
            PricingError::ConcurrentHistoryConflict(_)
            | PricingError::CostAlreadyFinalized(_)
            | PricingError::CallNotFinalized(_) => AppError::Conflict(anyhow::anyhow!(message)),
            PricingError::NoPricingPlanAssigned(_) | PricingError::InvalidPlan { .. } => {
                AppError::UnprocessableEntity(anyhow::anyhow!(message))
            }
            PricingError::InvalidUsageMetrics(_) | PricingError::InvalidTimeRange { .. } => {
                AppError::BadRequest(anyhow::anyhow!(message))
            }
            PricingError::RemoteBilling { .. } => AppError::BadGateway(message),
            PricingError::Database(e) => AppError::DatabaseError(e),
        }
    }
}
