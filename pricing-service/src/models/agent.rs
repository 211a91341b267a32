//! Agent model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Voice agent owned by a client.
///
/// `pricing_plan_id` is only written by the history tracker's transitions.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Agent {
    pub agent_id: Uuid,
    pub client_id: Uuid,
    pub name: String,
    pub pricing_plan_id: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Input for creating an agent.
#[derive(Debug, Clone)]
pub struct CreateAgent {
    pub client_id: Uuid,
    pub name: String,
}
