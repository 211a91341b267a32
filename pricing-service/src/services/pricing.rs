//! Pricing orchestration: plan sync, plan assignment, call cost finalization,
//! usage reporting and usage summaries.

use crate::config::PricingSettings;
use crate::cost::{compute_breakdown, CostBreakdown};
use crate::error::PricingError;
use crate::models::{
    Agent, Call, CreateCall, PricingHistoryRecord, PricingPlan, UsageEvent, UsageMetrics,
};
use crate::remote::RemoteBillingClient;
use crate::services::clock::Clock;
use crate::services::history::HistoryTracker;
use crate::services::metrics::{record_cost_finalized, record_usage_event};
use crate::services::plans::{PlanCatalog, PlanSyncReport};
use crate::services::store::PricingStore;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Upper bound for a single history page.
pub const MAX_HISTORY_LIMIT: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageEventStatus {
    Sent,
    Failed,
}

/// Submission outcome for one metric of a call.
#[derive(Debug, Clone, Serialize)]
pub struct UsageEventResult {
    pub metric_name: String,
    pub quantity: Decimal,
    pub idempotency_key: String,
    pub status: UsageEventStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UsageEventResult {
    pub fn is_sent(&self) -> bool {
        self.status == UsageEventStatus::Sent
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FinalizedCost {
    pub call_id: Uuid,
    pub cost: Decimal,
    pub currency: String,
    pub breakdown: CostBreakdown,
    /// Empty when remote reporting was not requested.
    pub usage_events: Vec<UsageEventResult>,
}

/// Entry point for every pricing operation.
///
/// Holds its collaborators explicitly; one instance is built at startup and
/// shared by all requests.
#[derive(Clone)]
pub struct PricingService {
    store: Arc<dyn PricingStore>,
    remote: RemoteBillingClient,
    plans: PlanCatalog,
    history: HistoryTracker,
    clock: Arc<dyn Clock>,
    summary_window: Duration,
}

impl PricingService {
    pub fn new(
        store: Arc<dyn PricingStore>,
        remote: RemoteBillingClient,
        clock: Arc<dyn Clock>,
        settings: &PricingSettings,
    ) -> Self {
        let plans = PlanCatalog::new(
            store.clone(),
            remote.clone(),
            settings.default_currency.clone(),
        );
        let history = HistoryTracker::new(store.clone(), clock.clone());

        Self {
            store,
            remote,
            plans,
            history,
            clock,
            summary_window: Duration::days(settings.summary_window_days),
        }
    }

    pub fn store(&self) -> &Arc<dyn PricingStore> {
        &self.store
    }

    // =========================================================================
    // Plans
    // =========================================================================

    pub async fn sync_all_plans(&self) -> Result<PlanSyncReport, PricingError> {
        self.plans.sync_all().await
    }

    pub async fn sync_plan(&self, plan_id: &str) -> Result<PricingPlan, PricingError> {
        self.plans.sync_one(plan_id).await
    }

    pub async fn list_plans(&self) -> Result<Vec<PricingPlan>, PricingError> {
        self.plans.list_active().await
    }

    pub async fn get_plan(&self, plan_id: &str) -> Result<PricingPlan, PricingError> {
        self.plans.get(plan_id).await
    }

    pub async fn deactivate_plan(&self, plan_id: &str) -> Result<PricingPlan, PricingError> {
        self.plans.deactivate(plan_id).await
    }

    // =========================================================================
    // Agent pricing
    // =========================================================================

    /// Assign `plan_id` to the agent, fetching the plan from the remote if it
    /// is not cached. Deactivated plans cannot be assigned.
    #[instrument(skip(self, comment))]
    pub async fn assign_plan(
        &self,
        agent_id: Uuid,
        plan_id: &str,
        actor_id: &str,
        comment: Option<String>,
    ) -> Result<PricingHistoryRecord, PricingError> {
        self.require_agent(agent_id).await?;

        let plan = self.plans.resolve(plan_id).await?;
        if !plan.is_active {
            return Err(PricingError::InvalidPlan {
                plan_id: plan.plan_id,
                reason: "plan is deactivated".to_string(),
            });
        }

        self.history
            .assign(agent_id, Some(plan.plan_id), actor_id, comment)
            .await
    }

    /// Clear the agent's plan. Recorded as a `removed` history entry.
    #[instrument(skip(self, comment))]
    pub async fn remove_plan(
        &self,
        agent_id: Uuid,
        actor_id: &str,
        comment: Option<String>,
    ) -> Result<PricingHistoryRecord, PricingError> {
        self.require_agent(agent_id).await?;
        self.history.assign(agent_id, None, actor_id, comment).await
    }

    /// Newest first; `limit` is clamped to `1..=MAX_HISTORY_LIMIT`.
    pub async fn get_history(
        &self,
        agent_id: Uuid,
        limit: i64,
    ) -> Result<Vec<PricingHistoryRecord>, PricingError> {
        self.require_agent(agent_id).await?;
        self.history
            .history(agent_id, limit.clamp(1, MAX_HISTORY_LIMIT))
            .await
    }

    // =========================================================================
    // Calls
    // =========================================================================

    /// Open a call for the agent, snapshotting the agent's current plan.
    #[instrument(skip(self))]
    pub async fn start_call(
        &self,
        agent_id: Uuid,
        started_utc: Option<DateTime<Utc>>,
    ) -> Result<Call, PricingError> {
        let agent = self.require_agent(agent_id).await?;

        let call = self
            .store
            .create_call(&CreateCall {
                agent_id,
                client_id: agent.client_id,
                pricing_plan_id: agent.pricing_plan_id,
                started_utc: started_utc.unwrap_or_else(|| self.clock.now()),
            })
            .await?;

        info!(
            call_id = %call.call_id,
            pricing_plan_id = ?call.pricing_plan_id,
            "Call started"
        );
        Ok(call)
    }

    /// Compute and store the call's cost, then optionally report usage.
    ///
    /// The cost is written at most once; a second finalization fails with
    /// [`PricingError::CostAlreadyFinalized`]. Usage submission failures are
    /// returned per metric and never undo the stored cost.
    #[instrument(skip(self, usage))]
    pub async fn finalize_call_cost(
        &self,
        call_id: Uuid,
        usage: &UsageMetrics,
        send_remote: bool,
    ) -> Result<FinalizedCost, PricingError> {
        let call = self.require_call(call_id).await?;
        if call.is_finalized() {
            return Err(PricingError::CostAlreadyFinalized(call_id));
        }

        let plan_id = call
            .pricing_plan_id
            .as_deref()
            .ok_or(PricingError::NoPricingPlanAssigned(call_id))?;
        let plan = self.plans.resolve(plan_id).await?;

        let breakdown = compute_breakdown(&plan.charges, usage)?;
        let finalized_utc = self.clock.now();

        let stored = self
            .store
            .finalize_call_cost(
                call_id,
                breakdown.total,
                &plan.currency,
                &usage.to_json(),
                finalized_utc,
            )
            .await?;

        record_cost_finalized(&plan.currency);
        info!(
            call_id = %call_id,
            plan_id = %plan.plan_id,
            cost = %breakdown.total,
            currency = %plan.currency,
            "Call cost finalized"
        );

        let usage_events = if send_remote {
            self.submit_usage(&stored, &plan, usage, finalized_utc).await
        } else {
            Vec::new()
        };

        Ok(FinalizedCost {
            call_id,
            cost: breakdown.total,
            currency: plan.currency,
            breakdown,
            usage_events,
        })
    }

    /// Re-submit the usage events of a finalized call with their original
    /// idempotency keys, so events the remote already accepted are not
    /// counted twice.
    #[instrument(skip(self))]
    pub async fn resend_call_usage(
        &self,
        call_id: Uuid,
    ) -> Result<Vec<UsageEventResult>, PricingError> {
        let call = self.require_call(call_id).await?;
        if !call.is_finalized() {
            return Err(PricingError::CallNotFinalized(call_id));
        }

        let plan_id = call
            .pricing_plan_id
            .as_deref()
            .ok_or(PricingError::NoPricingPlanAssigned(call_id))?;
        let plan = self.plans.resolve(plan_id).await?;

        let usage = match &call.usage_metrics {
            Some(value) => UsageMetrics::from_json(value)?,
            None => UsageMetrics::default(),
        };
        let timestamp = call.finalized_utc.unwrap_or_else(|| self.clock.now());

        Ok(self.submit_usage(&call, &plan, &usage, timestamp).await)
    }

    /// One event per distinct usage metric of the plan that is present and
    /// nonzero, each submitted on its own.
    async fn submit_usage(
        &self,
        call: &Call,
        plan: &PricingPlan,
        usage: &UsageMetrics,
        timestamp: DateTime<Utc>,
    ) -> Vec<UsageEventResult> {
        let mut results = Vec::new();

        for metric_name in plan.usage_metrics() {
            let quantity = usage.get(metric_name);
            if !usage.contains(metric_name) || quantity.is_zero() {
                continue;
            }

            let event = UsageEvent {
                external_customer_id: call.client_id.to_string(),
                metric_name: metric_name.to_string(),
                quantity,
                idempotency_key: UsageEvent::idempotency_key_for(call.call_id, metric_name),
                timestamp,
                metadata: json!({
                    "call_id": call.call_id,
                    "agent_id": call.agent_id,
                    "plan_id": plan.plan_id,
                }),
            };

            let result = match self.remote.submit_usage_event(&event).await {
                Ok(_) => {
                    record_usage_event("sent");
                    UsageEventResult {
                        metric_name: event.metric_name,
                        quantity,
                        idempotency_key: event.idempotency_key,
                        status: UsageEventStatus::Sent,
                        remote_status: None,
                        error_kind: None,
                        error: None,
                    }
                }
                Err(e) => {
                    record_usage_event("failed");
                    warn!(
                        call_id = %call.call_id,
                        metric_name = %event.metric_name,
                        error_kind = e.kind(),
                        error = %e,
                        "Usage event submission failed"
                    );
                    UsageEventResult {
                        metric_name: event.metric_name,
                        quantity,
                        idempotency_key: event.idempotency_key,
                        status: UsageEventStatus::Failed,
                        remote_status: e.remote_status(),
                        error_kind: Some(e.kind()),
                        error: Some(e.to_string()),
                    }
                }
            };
            results.push(result);
        }

        results
    }

    // =========================================================================
    // Clients
    // =========================================================================

    /// Make sure the client exists remotely and return its remote id.
    ///
    /// Already-synced clients return the stored id without a remote call. An
    /// existing remote customer with the same external id is adopted rather
    /// than duplicated.
    #[instrument(skip(self))]
    pub async fn sync_client(&self, client_id: Uuid) -> Result<String, PricingError> {
        let client = self
            .store
            .get_client(client_id)
            .await?
            .ok_or(PricingError::ClientNotFound(client_id))?;

        if let Some(remote_id) = client.remote_customer_id {
            return Ok(remote_id);
        }

        let external_id = client.external_id();
        let customer = match self.remote.find_customer_by_external_id(&external_id).await? {
            Some(existing) => {
                info!(client_id = %client_id, remote_customer_id = %existing.id, "Adopting existing remote customer");
                existing
            }
            None => {
                self.remote
                    .create_customer(
                        &external_id,
                        &client.name,
                        client.email.as_deref(),
                        Some(format!("customer-{}", client_id)),
                    )
                    .await?
            }
        };

        self.store
            .set_client_remote_id(client_id, &customer.id)
            .await?;
        Ok(customer.id)
    }

    /// Remote usage aggregate for the client over `[start, end)`.
    ///
    /// `end` defaults to now and `start` to `end` minus the configured window.
    #[instrument(skip(self))]
    pub async fn get_usage_summary(
        &self,
        client_id: Uuid,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<serde_json::Value, PricingError> {
        let client = self
            .store
            .get_client(client_id)
            .await?
            .ok_or(PricingError::ClientNotFound(client_id))?;

        let end = end.unwrap_or_else(|| self.clock.now());
        let start = start.unwrap_or(end - self.summary_window);
        if start >= end {
            return Err(PricingError::InvalidTimeRange {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }

        self.remote
            .get_usage_summary(&client.external_id(), start, end)
            .await
    }

    async fn require_agent(&self, agent_id: Uuid) -> Result<Agent, PricingError> {
        self.store
            .get_agent(agent_id)
            .await?
            .ok_or(PricingError::AgentNotFound(agent_id))
    }

    async fn require_call(&self, call_id: Uuid) -> Result<Call, PricingError> {
        self.store
            .get_call(call_id)
            .await?
            .ok_or(PricingError::CallNotFound(call_id))
    }
}
