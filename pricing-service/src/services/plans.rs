//! Plan cache: local durable mirror of the remote pricing plans.

use crate::error::PricingError;
use crate::models::PricingPlan;
use crate::remote::{RemoteBillingClient, RemotePlan};
use crate::services::metrics::record_plan_sync;
use crate::services::store::PricingStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Remote plan that failed charge validation during a sync.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedPlan {
    pub plan_id: String,
    pub reason: String,
}

/// Outcome of a full sync.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlanSyncReport {
    pub count: usize,
    pub plan_ids: Vec<String>,
    pub rejected: Vec<RejectedPlan>,
}

/// Reads go to the local store; writes are upserts keyed by the remote plan id.
///
/// Plans missing from a remote listing are left in place: calls and history
/// records may still reference them.
#[derive(Clone)]
pub struct PlanCatalog {
    store: Arc<dyn PricingStore>,
    remote: RemoteBillingClient,
    default_currency: String,
}

impl PlanCatalog {
    pub fn new(
        store: Arc<dyn PricingStore>,
        remote: RemoteBillingClient,
        default_currency: impl Into<String>,
    ) -> Self {
        Self {
            store,
            remote,
            default_currency: default_currency.into(),
        }
    }

    /// Fetch every remote plan and upsert each valid one.
    ///
    /// A plan with an invalid charge is reported in `rejected`; it does not
    /// stop the rest of the listing from syncing.
    #[instrument(skip(self))]
    pub async fn sync_all(&self) -> Result<PlanSyncReport, PricingError> {
        let remote_plans = self.remote.list_plans().await?;
        let mut report = PlanSyncReport::default();

        for remote_plan in remote_plans {
            let plan_id = remote_plan.id.clone();
            match self.upsert_remote(remote_plan).await {
                Ok(plan) => {
                    report.plan_ids.push(plan.plan_id);
                }
                Err(PricingError::InvalidPlan { reason, .. }) => {
                    warn!(plan_id = %plan_id, reason = %reason, "Skipping invalid remote plan");
                    record_plan_sync("rejected");
                    report.rejected.push(RejectedPlan { plan_id, reason });
                }
                Err(e) => return Err(e),
            }
        }

        report.count = report.plan_ids.len();
        info!(
            synced = report.count,
            rejected = report.rejected.len(),
            "Plan sync completed"
        );
        Ok(report)
    }

    /// Fetch and upsert one plan.
    #[instrument(skip(self))]
    pub async fn sync_one(&self, plan_id: &str) -> Result<PricingPlan, PricingError> {
        let remote_plan = self
            .remote
            .get_plan(plan_id)
            .await?
            .ok_or_else(|| PricingError::PlanNotFound(plan_id.to_string()))?;

        let plan = self.upsert_remote(remote_plan).await?;
        info!(plan_id = %plan.plan_id, "Plan synced");
        Ok(plan)
    }

    /// Local plan, or a fetch-and-cache from the remote when it is not stored yet.
    #[instrument(skip(self))]
    pub async fn resolve(&self, plan_id: &str) -> Result<PricingPlan, PricingError> {
        if let Some(plan) = self.store.get_plan(plan_id).await? {
            return Ok(plan);
        }

        info!(plan_id = %plan_id, "Plan not cached locally, fetching from remote");
        self.sync_one(plan_id).await
    }

    /// Local plan only.
    pub async fn get(&self, plan_id: &str) -> Result<PricingPlan, PricingError> {
        self.store
            .get_plan(plan_id)
            .await?
            .ok_or_else(|| PricingError::PlanNotFound(plan_id.to_string()))
    }

    pub async fn list_active(&self) -> Result<Vec<PricingPlan>, PricingError> {
        self.store.list_active_plans().await
    }

    /// Hide a plan from listings and new assignments. The row is kept.
    #[instrument(skip(self))]
    pub async fn deactivate(&self, plan_id: &str) -> Result<PricingPlan, PricingError> {
        let plan = self
            .store
            .set_plan_active(plan_id, false)
            .await?
            .ok_or_else(|| PricingError::PlanNotFound(plan_id.to_string()))?;
        info!(plan_id = %plan_id, "Plan deactivated");
        Ok(plan)
    }

    async fn upsert_remote(&self, remote_plan: RemotePlan) -> Result<PricingPlan, PricingError> {
        let input = remote_plan.into_upsert(&self.default_currency)?;
        let plan = self.store.upsert_plan(&input).await?;
        record_plan_sync("synced");
        Ok(plan)
    }
}
