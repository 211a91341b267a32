//! Persistence collaborator for pricing-service.

use crate::error::PricingError;
use crate::models::{
    Agent, Call, Client, CreateAgent, CreateCall, CreateClient, HistoryTransition,
    PricingHistoryRecord, PricingPlan, UpsertPlan,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Key-indexed storage for plans, clients, agents, calls and pricing history.
///
/// Implementations must apply [`PricingStore::apply_history_transition`] as a
/// single unit and [`PricingStore::finalize_call_cost`] at most once per call.
#[async_trait]
pub trait PricingStore: Send + Sync {
    async fn health_check(&self) -> Result<(), PricingError>;

    // Plans

    /// Insert the plan, or replace every field of an existing plan with the same id.
    async fn upsert_plan(&self, input: &UpsertPlan) -> Result<PricingPlan, PricingError>;

    async fn get_plan(&self, plan_id: &str) -> Result<Option<PricingPlan>, PricingError>;

    async fn list_active_plans(&self) -> Result<Vec<PricingPlan>, PricingError>;

    async fn set_plan_active(
        &self,
        plan_id: &str,
        is_active: bool,
    ) -> Result<Option<PricingPlan>, PricingError>;

    // Clients

    async fn create_client(&self, input: &CreateClient) -> Result<Client, PricingError>;

    async fn get_client(&self, client_id: Uuid) -> Result<Option<Client>, PricingError>;

    async fn set_client_remote_id(
        &self,
        client_id: Uuid,
        remote_customer_id: &str,
    ) -> Result<Client, PricingError>;

    // Agents

    async fn create_agent(&self, input: &CreateAgent) -> Result<Agent, PricingError>;

    async fn get_agent(&self, agent_id: Uuid) -> Result<Option<Agent>, PricingError>;

    // Pricing history

    async fn get_active_history(
        &self,
        agent_id: Uuid,
    ) -> Result<Option<PricingHistoryRecord>, PricingError>;

    /// Deactivate the expected active record, append the new one and move the
    /// agent's plan pointer, all or nothing.
    ///
    /// Fails with [`PricingError::ConcurrentHistoryConflict`] when the agent's
    /// active record is no longer `expected_active_id`.
    async fn apply_history_transition(
        &self,
        transition: &HistoryTransition,
    ) -> Result<PricingHistoryRecord, PricingError>;

    /// Newest first by write order (not `created_utc`), at most `limit` records.
    async fn list_history(
        &self,
        agent_id: Uuid,
        limit: i64,
    ) -> Result<Vec<PricingHistoryRecord>, PricingError>;

    // Calls

    async fn create_call(&self, input: &CreateCall) -> Result<Call, PricingError>;

    async fn get_call(&self, call_id: Uuid) -> Result<Option<Call>, PricingError>;

    /// Set the call's cost if none is stored yet.
    ///
    /// Fails with [`PricingError::CostAlreadyFinalized`] otherwise.
    async fn finalize_call_cost(
        &self,
        call_id: Uuid,
        cost: Decimal,
        currency: &str,
        usage_metrics: &serde_json::Value,
        finalized_utc: DateTime<Utc>,
    ) -> Result<Call, PricingError>;
}
