//! Pricing history model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// What a history record did to the agent's plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Assigned,
    Changed,
    Removed,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Assigned => "assigned",
            HistoryAction::Changed => "changed",
            HistoryAction::Removed => "removed",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "changed" => HistoryAction::Changed,
            "removed" => HistoryAction::Removed,
            _ => HistoryAction::Assigned,
        }
    }
}

/// Immutable audit entry for a plan change on an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PricingHistoryRecord {
    pub history_id: Uuid,
    pub agent_id: Uuid,
    /// Plan in effect after this change; `None` for removals.
    pub pricing_id: Option<String>,
    pub previous_pricing_id: Option<String>,
    pub action: String,
    pub actor_id: String,
    pub comment: Option<String>,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
}

impl PricingHistoryRecord {
    pub fn action(&self) -> HistoryAction {
        HistoryAction::from_string(&self.action)
    }
}

/// One atomic history step: retire `expected_active_id`, append `record`,
/// and point the agent at `record.pricing_id`.
#[derive(Debug, Clone)]
pub struct HistoryTransition {
    /// Active record observed before the write; `None` means the agent had none.
    pub expected_active_id: Option<Uuid>,
    pub record: PricingHistoryRecord,
}
