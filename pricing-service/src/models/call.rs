//! Call model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A call handled by an agent.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Call {
    pub call_id: Uuid,
    pub agent_id: Uuid,
    pub client_id: Uuid,
    /// Plan snapshot copied from the agent at call start; never changes afterwards.
    pub pricing_plan_id: Option<String>,
    pub cost: Option<Decimal>,
    pub currency: Option<String>,
    /// Validated metrics the cost was computed from.
    pub usage_metrics: Option<serde_json::Value>,
    pub started_utc: DateTime<Utc>,
    pub finalized_utc: Option<DateTime<Utc>>,
}

impl Call {
    pub fn is_finalized(&self) -> bool {
        self.cost.is_some()
    }
}

/// Input for starting a call.
#[derive(Debug, Clone)]
pub struct CreateCall {
    pub agent_id: Uuid,
    pub client_id: Uuid,
    pub pricing_plan_id: Option<String>,
    pub started_utc: DateTime<Utc>,
}
