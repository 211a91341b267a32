//! Pricing plan model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Charge kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeKind {
    Usage,
    Fixed,
}

/// A single billable rule within a plan.
///
/// Unknown `type` tags fail deserialization, so a plan carrying a charge kind
/// this service does not understand is rejected at sync time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Charge {
    /// `usage[metric_name] * rate`
    Usage { metric_name: String, rate: Decimal },
    /// Flat amount, independent of usage.
    Fixed { amount: Decimal },
}

impl Charge {
    pub fn kind(&self) -> ChargeKind {
        match self {
            Charge::Usage { .. } => ChargeKind::Usage,
            Charge::Fixed { .. } => ChargeKind::Fixed,
        }
    }

    /// Check the charge invariants: non-negative rate/amount, non-empty metric key.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Charge::Usage { metric_name, rate } => {
                if metric_name.trim().is_empty() {
                    return Err("usage charge has an empty metric_name".to_string());
                }
                if *rate < Decimal::ZERO {
                    return Err(format!("usage charge '{}' has negative rate {}", metric_name, rate));
                }
                Ok(())
            }
            Charge::Fixed { amount } => {
                if *amount < Decimal::ZERO {
                    return Err(format!("fixed charge has negative amount {}", amount));
                }
                Ok(())
            }
        }
    }
}

/// Local mirror of a remote pricing plan.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PricingPlan {
    pub plan_id: String,
    pub name: String,
    pub description: Option<String>,
    pub currency: String,
    #[sqlx(json)]
    pub charges: Vec<Charge>,
    pub metadata: Option<serde_json::Value>,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl PricingPlan {
    /// Distinct metric names referenced by usage charges, in charge order.
    pub fn usage_metrics(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for charge in &self.charges {
            if let Charge::Usage { metric_name, .. } = charge {
                if !names.contains(&metric_name.as_str()) {
                    names.push(metric_name);
                }
            }
        }
        names
    }
}

/// Input for inserting or fully replacing a plan keyed by its remote id.
#[derive(Debug, Clone)]
pub struct UpsertPlan {
    pub plan_id: String,
    pub name: String,
    pub description: Option<String>,
    pub currency: String,
    pub charges: Vec<Charge>,
    pub metadata: Option<serde_json::Value>,
    pub is_active: bool,
}
