//! Wire types of the remote billing API.

use crate::error::PricingError;
use crate::models::{Charge, UpsertPlan};
use serde::{Deserialize, Serialize};

/// Cursor-paginated list envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct RemotePage<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub pagination_metadata: PaginationMetadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaginationMetadata {
    #[serde(default)]
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

/// Customer record on the remote side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCustomer {
    pub id: String,
    pub external_customer_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Plan as the remote service describes it. Charges stay untyped until
/// [`RemotePlan::into_upsert`] validates them.
#[derive(Debug, Clone, Deserialize)]
pub struct RemotePlan {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub charges: Vec<serde_json::Value>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub status: Option<String>,
}

impl RemotePlan {
    /// Validate the charges and convert into a local upsert.
    ///
    /// Unknown charge kinds and negative rates or amounts reject the plan.
    pub fn into_upsert(self, default_currency: &str) -> Result<UpsertPlan, PricingError> {
        let mut charges = Vec::with_capacity(self.charges.len());
        for (index, raw) in self.charges.into_iter().enumerate() {
            let charge: Charge =
                serde_json::from_value(raw).map_err(|e| PricingError::InvalidPlan {
                    plan_id: self.id.clone(),
                    reason: format!("charge {}: {}", index, e),
                })?;
            charge.validate().map_err(|reason| PricingError::InvalidPlan {
                plan_id: self.id.clone(),
                reason: format!("charge {}: {}", index, reason),
            })?;
            charges.push(charge);
        }

        let is_active = self
            .status
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case("active"))
            .unwrap_or(true);

        Ok(UpsertPlan {
            plan_id: self.id,
            name: self.name,
            description: self.description,
            currency: self
                .currency
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| default_currency.to_string()),
            charges,
            metadata: self.metadata,
            is_active,
        })
    }
}
