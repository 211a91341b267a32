//! Pricing history tracker.
//!
//! Each agent holds zero or one active history record. Every plan change
//! appends a record and retires the previous active one in the same write
//! that moves the agent's plan pointer.

use crate::error::PricingError;
use crate::models::{HistoryAction, HistoryTransition, PricingHistoryRecord};
use crate::services::clock::Clock;
use crate::services::metrics::record_plan_assignment;
use crate::services::store::PricingStore;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Clone)]
pub struct HistoryTracker {
    store: Arc<dyn PricingStore>,
    clock: Arc<dyn Clock>,
}

impl HistoryTracker {
    pub fn new(store: Arc<dyn PricingStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Point the agent at `new_plan_id` (`None` removes the plan).
    ///
    /// The action is `removed` for `None`, `assigned` when the agent had no
    /// plan before, `changed` otherwise. Fails with
    /// [`PricingError::ConcurrentHistoryConflict`] if another writer moved the
    /// agent's active record after it was read here; the caller must retry.
    #[instrument(skip(self, comment))]
    pub async fn assign(
        &self,
        agent_id: Uuid,
        new_plan_id: Option<String>,
        actor_id: &str,
        comment: Option<String>,
    ) -> Result<PricingHistoryRecord, PricingError> {
        let current = self.store.get_active_history(agent_id).await?;
        let previous_pricing_id = current.as_ref().and_then(|r| r.pricing_id.clone());

        let action = match (&new_plan_id, &previous_pricing_id) {
            (None, _) => HistoryAction::Removed,
            (Some(_), None) => HistoryAction::Assigned,
            (Some(_), Some(_)) => HistoryAction::Changed,
        };

        let transition = HistoryTransition {
            expected_active_id: current.as_ref().map(|r| r.history_id),
            record: PricingHistoryRecord {
                history_id: Uuid::new_v4(),
                agent_id,
                pricing_id: new_plan_id,
                previous_pricing_id,
                action: action.as_str().to_string(),
                actor_id: actor_id.to_string(),
                comment,
                is_active: true,
                created_utc: self.clock.now(),
            },
        };

        let record = self.store.apply_history_transition(&transition).await?;

        record_plan_assignment(action.as_str());
        info!(
            agent_id = %agent_id,
            action = action.as_str(),
            pricing_id = ?record.pricing_id,
            previous_pricing_id = ?record.previous_pricing_id,
            "Pricing history updated"
        );

        Ok(record)
    }

    /// Newest first.
    pub async fn history(
        &self,
        agent_id: Uuid,
        limit: i64,
    ) -> Result<Vec<PricingHistoryRecord>, PricingError> {
        self.store.list_history(agent_id, limit).await
    }
}
