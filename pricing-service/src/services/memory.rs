//! In-memory store, used when no database is wired in (tests, local runs).

use crate::error::PricingError;
use crate::models::{
    Agent, Call, Client, CreateAgent, CreateCall, CreateClient, HistoryTransition,
    PricingHistoryRecord, PricingPlan, UpsertPlan,
};
use crate::services::store::PricingStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    plans: HashMap<String, PricingPlan>,
    clients: HashMap<Uuid, Client>,
    agents: HashMap<Uuid, Agent>,
    calls: HashMap<Uuid, Call>,
    /// Append-only, oldest first.
    history: HashMap<Uuid, Vec<PricingHistoryRecord>>,
}

/// [`PricingStore`] over a single lock; every write holds it for its whole
/// duration, so multi-record writes are never partially visible.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PricingStore for InMemoryStore {
    async fn health_check(&self) -> Result<(), PricingError> {
        Ok(())
    }

    async fn upsert_plan(&self, input: &UpsertPlan) -> Result<PricingPlan, PricingError> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let created_utc = state
            .plans
            .get(&input.plan_id)
            .map(|existing| existing.created_utc)
            .unwrap_or(now);

        let plan = PricingPlan {
            plan_id: input.plan_id.clone(),
            name: input.name.clone(),
            description: input.description.clone(),
            currency: input.currency.clone(),
            charges: input.charges.clone(),
            metadata: input.metadata.clone(),
            is_active: input.is_active,
            created_utc,
            updated_utc: now,
        };
        state.plans.insert(plan.plan_id.clone(), plan.clone());
        Ok(plan)
    }

    async fn get_plan(&self, plan_id: &str) -> Result<Option<PricingPlan>, PricingError> {
        Ok(self.state.read().await.plans.get(plan_id).cloned())
    }

    async fn list_active_plans(&self) -> Result<Vec<PricingPlan>, PricingError> {
        let state = self.state.read().await;
        let mut plans: Vec<PricingPlan> = state
            .plans
            .values()
            .filter(|plan| plan.is_active)
            .cloned()
            .collect();
        plans.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.plan_id.cmp(&b.plan_id)));
        Ok(plans)
    }

    async fn set_plan_active(
        &self,
        plan_id: &str,
        is_active: bool,
    ) -> Result<Option<PricingPlan>, PricingError> {
        let mut state = self.state.write().await;
        Ok(state.plans.get_mut(plan_id).map(|plan| {
            plan.is_active = is_active;
            plan.updated_utc = Utc::now();
            plan.clone()
        }))
    }

    async fn create_client(&self, input: &CreateClient) -> Result<Client, PricingError> {
        let now = Utc::now();
        let client = Client {
            client_id: Uuid::new_v4(),
            name: input.name.clone(),
            email: input.email.clone(),
            remote_customer_id: None,
            created_utc: now,
            updated_utc: now,
        };
        self.state
            .write()
            .await
            .clients
            .insert(client.client_id, client.clone());
        Ok(client)
    }

    async fn get_client(&self, client_id: Uuid) -> Result<Option<Client>, PricingError> {
        Ok(self.state.read().await.clients.get(&client_id).cloned())
    }

    async fn set_client_remote_id(
        &self,
        client_id: Uuid,
        remote_customer_id: &str,
    ) -> Result<Client, PricingError> {
        let mut state = self.state.write().await;
        let client = state
            .clients
            .get_mut(&client_id)
            .ok_or(PricingError::ClientNotFound(client_id))?;
        client.remote_customer_id = Some(remote_customer_id.to_string());
        client.updated_utc = Utc::now();
        Ok(client.clone())
    }

    async fn create_agent(&self, input: &CreateAgent) -> Result<Agent, PricingError> {
        let mut state = self.state.write().await;
        if !state.clients.contains_key(&input.client_id) {
            return Err(PricingError::ClientNotFound(input.client_id));
        }
        let now = Utc::now();
        let agent = Agent {
            agent_id: Uuid::new_v4(),
            client_id: input.client_id,
            name: input.name.clone(),
            pricing_plan_id: None,
            created_utc: now,
            updated_utc: now,
        };
        state.agents.insert(agent.agent_id, agent.clone());
        Ok(agent)
    }

    async fn get_agent(&self, agent_id: Uuid) -> Result<Option<Agent>, PricingError> {
        Ok(self.state.read().await.agents.get(&agent_id).cloned())
    }

    async fn get_active_history(
        &self,
        agent_id: Uuid,
    ) -> Result<Option<PricingHistoryRecord>, PricingError> {
        let state = self.state.read().await;
        Ok(state
            .history
            .get(&agent_id)
            .and_then(|records| records.iter().find(|r| r.is_active))
            .cloned())
    }

    async fn apply_history_transition(
        &self,
        transition: &HistoryTransition,
    ) -> Result<PricingHistoryRecord, PricingError> {
        let agent_id = transition.record.agent_id;
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        if !state.agents.contains_key(&agent_id) {
            return Err(PricingError::AgentNotFound(agent_id));
        }

        let records = state.history.entry(agent_id).or_default();
        let current = records
            .iter()
            .position(|r| r.is_active)
            .map(|idx| (idx, records[idx].history_id));

        if current.map(|(_, id)| id) != transition.expected_active_id {
            return Err(PricingError::ConcurrentHistoryConflict(agent_id));
        }

        if let Some((idx, _)) = current {
            records[idx].is_active = false;
        }

        let mut record = transition.record.clone();
        record.is_active = true;
        records.push(record.clone());

        if let Some(agent) = state.agents.get_mut(&agent_id) {
            agent.pricing_plan_id = record.pricing_id.clone();
            agent.updated_utc = Utc::now();
        }

        Ok(record)
    }

    async fn list_history(
        &self,
        agent_id: Uuid,
        limit: i64,
    ) -> Result<Vec<PricingHistoryRecord>, PricingError> {
        let state = self.state.read().await;
        let limit = usize::try_from(limit.max(0)).unwrap_or(0);
        Ok(state
            .history
            .get(&agent_id)
            .map(|records| records.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn create_call(&self, input: &CreateCall) -> Result<Call, PricingError> {
        let call = Call {
            call_id: Uuid::new_v4(),
            agent_id: input.agent_id,
            client_id: input.client_id,
            pricing_plan_id: input.pricing_plan_id.clone(),
            cost: None,
            currency: None,
            usage_metrics: None,
            started_utc: input.started_utc,
            finalized_utc: None,
        };
        self.state
            .write()
            .await
            .calls
            .insert(call.call_id, call.clone());
        Ok(call)
    }

    async fn get_call(&self, call_id: Uuid) -> Result<Option<Call>, PricingError> {
        Ok(self.state.read().await.calls.get(&call_id).cloned())
    }

    async fn finalize_call_cost(
        &self,
        call_id: Uuid,
        cost: Decimal,
        currency: &str,
        usage_metrics: &serde_json::Value,
        finalized_utc: DateTime<Utc>,
    ) -> Result<Call, PricingError> {
        let mut state = self.state.write().await;
        let call = state
            .calls
            .get_mut(&call_id)
            .ok_or(PricingError::CallNotFound(call_id))?;

        if call.cost.is_some() {
            return Err(PricingError::CostAlreadyFinalized(call_id));
        }

        call.cost = Some(cost);
        call.currency = Some(currency.to_string());
        call.usage_metrics = Some(usage_metrics.clone());
        call.finalized_utc = Some(finalized_utc);
        Ok(call.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HistoryAction;

    async fn seeded_agent(store: &InMemoryStore) -> Agent {
        let client = store
            .create_client(&CreateClient {
                name: "Acme".to_string(),
                email: None,
            })
            .await
            .unwrap();
        store
            .create_agent(&CreateAgent {
                client_id: client.client_id,
                name: "Front desk".to_string(),
            })
            .await
            .unwrap()
    }

    fn record(agent_id: Uuid, pricing_id: Option<&str>) -> PricingHistoryRecord {
        PricingHistoryRecord {
            history_id: Uuid::new_v4(),
            agent_id,
            pricing_id: pricing_id.map(str::to_string),
            previous_pricing_id: None,
            action: HistoryAction::Assigned.as_str().to_string(),
            actor_id: "admin".to_string(),
            comment: None,
            is_active: true,
            created_utc: Utc::now(),
        }
    }

    #[tokio::test]
    async fn stale_expected_active_id_is_a_conflict() {
        let store = InMemoryStore::new();
        let agent = seeded_agent(&store).await;

        let first = store
            .apply_history_transition(&HistoryTransition {
                expected_active_id: None,
                record: record(agent.agent_id, Some("plan_a")),
            })
            .await
            .unwrap();

        // A writer that still believes there is no active record
        let err = store
            .apply_history_transition(&HistoryTransition {
                expected_active_id: None,
                record: record(agent.agent_id, Some("plan_b")),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PricingError::ConcurrentHistoryConflict(_)));

        let active = store.get_active_history(agent.agent_id).await.unwrap();
        assert_eq!(active.unwrap().history_id, first.history_id);
        let agent = store.get_agent(agent.agent_id).await.unwrap().unwrap();
        assert_eq!(agent.pricing_plan_id.as_deref(), Some("plan_a"));
    }

    #[tokio::test]
    async fn finalize_is_at_most_once() {
        let store = InMemoryStore::new();
        let agent = seeded_agent(&store).await;
        let call = store
            .create_call(&CreateCall {
                agent_id: agent.agent_id,
                client_id: agent.client_id,
                pricing_plan_id: Some("plan_a".to_string()),
                started_utc: Utc::now(),
            })
            .await
            .unwrap();

        store
            .finalize_call_cost(call.call_id, Decimal::ONE, "USD", &serde_json::json!({}), Utc::now())
            .await
            .unwrap();
        let err = store
            .finalize_call_cost(call.call_id, Decimal::TWO, "USD", &serde_json::json!({}), Utc::now())
            .await
            .unwrap_err();

        assert!(matches!(err, PricingError::CostAlreadyFinalized(_)));
        let stored = store.get_call(call.call_id).await.unwrap().unwrap();
        assert_eq!(stored.cost, Some(Decimal::ONE));
    }

    #[tokio::test]
    async fn history_lists_in_write_order() {
        let store = InMemoryStore::new();
        let agent = seeded_agent(&store).await;

        let first = store
            .apply_history_transition(&HistoryTransition {
                expected_active_id: None,
                record: record(agent.agent_id, Some("plan_a")),
            })
            .await
            .unwrap();

        let mut skewed = record(agent.agent_id, None);
        skewed.created_utc = first.created_utc - chrono::Duration::hours(1);
        let second = store
            .apply_history_transition(&HistoryTransition {
                expected_active_id: Some(first.history_id),
                record: skewed,
            })
            .await
            .unwrap();

        let history = store.list_history(agent.agent_id, 10).await.unwrap();
        let ids: Vec<Uuid> = history.iter().map(|r| r.history_id).collect();
        assert_eq!(ids, vec![second.history_id, first.history_id]);
    }
}
