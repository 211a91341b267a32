//! PostgreSQL store for pricing-service.

use crate::error::PricingError;
use crate::models::{
    Agent, Call, Client, CreateAgent, CreateCall, CreateClient, HistoryTransition,
    PricingHistoryRecord, PricingPlan, UpsertPlan,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::PricingStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const PLAN_COLUMNS: &str =
    "plan_id, name, description, currency, charges, metadata, is_active, created_utc, updated_utc";
const CLIENT_COLUMNS: &str =
    "client_id, name, email, remote_customer_id, created_utc, updated_utc";
const AGENT_COLUMNS: &str =
    "agent_id, client_id, name, pricing_plan_id, created_utc, updated_utc";
const CALL_COLUMNS: &str = "call_id, agent_id, client_id, pricing_plan_id, cost, currency, usage_metrics, started_utc, finalized_utc";
const HISTORY_COLUMNS: &str = "history_id, agent_id, pricing_id, previous_pricing_id, action, actor_id, comment, is_active, created_utc";

fn db_error(context: &str, e: sqlx::Error) -> PricingError {
    PricingError::Database(anyhow::anyhow!("{}: {}", context, e))
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "pricing-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, PricingError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| db_error("Failed to connect", e))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), PricingError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| PricingError::Database(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl PricingStore for Database {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), PricingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Health check failed", e))?;

        timer.observe_duration();
        Ok(())
    }

    // =========================================================================
    // Plan Operations
    // =========================================================================

    #[instrument(skip(self, input), fields(plan_id = %input.plan_id))]
    async fn upsert_plan(&self, input: &UpsertPlan) -> Result<PricingPlan, PricingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["upsert_plan"])
            .start_timer();

        let plan = sqlx::query_as::<_, PricingPlan>(&format!(
            r#"
            INSERT INTO pricing_plans (plan_id, name, description, currency, charges, metadata, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (plan_id) DO UPDATE
            SET name = EXCLUDED.name,
                description = EXCLUDED.description,
                currency = EXCLUDED.currency,
                charges = EXCLUDED.charges,
                metadata = EXCLUDED.metadata,
                is_active = EXCLUDED.is_active,
                updated_utc = NOW()
            RETURNING {PLAN_COLUMNS}
            "#
        ))
        .bind(&input.plan_id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.currency)
        .bind(Json(&input.charges))
        .bind(&input.metadata)
        .bind(input.is_active)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to upsert plan", e))?;

        timer.observe_duration();

        Ok(plan)
    }

    #[instrument(skip(self))]
    async fn get_plan(&self, plan_id: &str) -> Result<Option<PricingPlan>, PricingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_plan"])
            .start_timer();

        let plan = sqlx::query_as::<_, PricingPlan>(&format!(
            "SELECT {PLAN_COLUMNS} FROM pricing_plans WHERE plan_id = $1"
        ))
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get plan", e))?;

        timer.observe_duration();

        Ok(plan)
    }

    #[instrument(skip(self))]
    async fn list_active_plans(&self) -> Result<Vec<PricingPlan>, PricingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_active_plans"])
            .start_timer();

        let plans = sqlx::query_as::<_, PricingPlan>(&format!(
            "SELECT {PLAN_COLUMNS} FROM pricing_plans WHERE is_active ORDER BY name, plan_id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list plans", e))?;

        timer.observe_duration();

        Ok(plans)
    }

    #[instrument(skip(self))]
    async fn set_plan_active(
        &self,
        plan_id: &str,
        is_active: bool,
    ) -> Result<Option<PricingPlan>, PricingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_plan_active"])
            .start_timer();

        let plan = sqlx::query_as::<_, PricingPlan>(&format!(
            r#"
            UPDATE pricing_plans SET is_active = $2, updated_utc = NOW()
            WHERE plan_id = $1
            RETURNING {PLAN_COLUMNS}
            "#
        ))
        .bind(plan_id)
        .bind(is_active)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to update plan", e))?;

        timer.observe_duration();

        Ok(plan)
    }

    // =========================================================================
    // Client Operations
    // =========================================================================

    #[instrument(skip(self, input))]
    async fn create_client(&self, input: &CreateClient) -> Result<Client, PricingError> {
        let client = sqlx::query_as::<_, Client>(&format!(
            r#"
            INSERT INTO clients (client_id, name, email)
            VALUES ($1, $2, $3)
            RETURNING {CLIENT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&input.name)
        .bind(&input.email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to create client", e))?;

        Ok(client)
    }

    #[instrument(skip(self))]
    async fn get_client(&self, client_id: Uuid) -> Result<Option<Client>, PricingError> {
        sqlx::query_as::<_, Client>(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients WHERE client_id = $1"
        ))
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get client", e))
    }

    #[instrument(skip(self))]
    async fn set_client_remote_id(
        &self,
        client_id: Uuid,
        remote_customer_id: &str,
    ) -> Result<Client, PricingError> {
        sqlx::query_as::<_, Client>(&format!(
            r#"
            UPDATE clients SET remote_customer_id = $2, updated_utc = NOW()
            WHERE client_id = $1
            RETURNING {CLIENT_COLUMNS}
            "#
        ))
        .bind(client_id)
        .bind(remote_customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to update client", e))?
        .ok_or(PricingError::ClientNotFound(client_id))
    }

    // =========================================================================
    // Agent Operations
    // =========================================================================

    #[instrument(skip(self, input), fields(client_id = %input.client_id))]
    async fn create_agent(&self, input: &CreateAgent) -> Result<Agent, PricingError> {
        sqlx::query_as::<_, Agent>(&format!(
            r#"
            INSERT INTO agents (agent_id, client_id, name)
            VALUES ($1, $2, $3)
            RETURNING {AGENT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(input.client_id)
        .bind(&input.name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                PricingError::ClientNotFound(input.client_id)
            }
            e => db_error("Failed to create agent", e),
        })
    }

    #[instrument(skip(self))]
    async fn get_agent(&self, agent_id: Uuid) -> Result<Option<Agent>, PricingError> {
        sqlx::query_as::<_, Agent>(&format!(
            "SELECT {AGENT_COLUMNS} FROM agents WHERE agent_id = $1"
        ))
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get agent", e))
    }

    // =========================================================================
    // Pricing History Operations
    // =========================================================================

    #[instrument(skip(self))]
    async fn get_active_history(
        &self,
        agent_id: Uuid,
    ) -> Result<Option<PricingHistoryRecord>, PricingError> {
        sqlx::query_as::<_, PricingHistoryRecord>(&format!(
            "SELECT {HISTORY_COLUMNS} FROM pricing_history WHERE agent_id = $1 AND is_active"
        ))
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get active history", e))
    }

    #[instrument(skip(self, transition), fields(agent_id = %transition.record.agent_id))]
    async fn apply_history_transition(
        &self,
        transition: &HistoryTransition,
    ) -> Result<PricingHistoryRecord, PricingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["apply_history_transition"])
            .start_timer();

        let record = &transition.record;
        let agent_id = record.agent_id;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        // Serialize writers per agent
        let locked = sqlx::query_scalar::<_, Uuid>(
            "SELECT agent_id FROM agents WHERE agent_id = $1 FOR UPDATE",
        )
        .bind(agent_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to lock agent", e))?;

        if locked.is_none() {
            tx.rollback().await.ok();
            return Err(PricingError::AgentNotFound(agent_id));
        }

        let current = sqlx::query_scalar::<_, Uuid>(
            "SELECT history_id FROM pricing_history WHERE agent_id = $1 AND is_active",
        )
        .bind(agent_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to read active history", e))?;

        if current != transition.expected_active_id {
            tx.rollback().await.ok();
            warn!(
                expected = ?transition.expected_active_id,
                found = ?current,
                "Active pricing history changed between read and write"
            );
            return Err(PricingError::ConcurrentHistoryConflict(agent_id));
        }

        if let Some(previous_id) = current {
            sqlx::query(
                "UPDATE pricing_history SET is_active = FALSE WHERE history_id = $1 AND is_active",
            )
            .bind(previous_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to deactivate history", e))?;
        }

        let inserted = sqlx::query_as::<_, PricingHistoryRecord>(&format!(
            r#"
            INSERT INTO pricing_history (history_id, agent_id, pricing_id, previous_pricing_id, action, actor_id, comment, is_active, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE, $8)
            RETURNING {HISTORY_COLUMNS}
            "#
        ))
        .bind(record.history_id)
        .bind(agent_id)
        .bind(&record.pricing_id)
        .bind(&record.previous_pricing_id)
        .bind(&record.action)
        .bind(&record.actor_id)
        .bind(&record.comment)
        .bind(record.created_utc)
        .fetch_one(&mut *tx)
        .await;

        let inserted = match inserted {
            Ok(row) => row,
            Err(sqlx::Error::Database(ref db_err)) if db_err.is_unique_violation() => {
                tx.rollback().await.ok();
                return Err(PricingError::ConcurrentHistoryConflict(agent_id));
            }
            Err(e) => {
                tx.rollback().await.ok();
                return Err(db_error("Failed to insert history", e));
            }
        };

        sqlx::query("UPDATE agents SET pricing_plan_id = $2, updated_utc = NOW() WHERE agent_id = $1")
            .bind(agent_id)
            .bind(&record.pricing_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to update agent plan", e))?;

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit history transition", e))?;

        timer.observe_duration();

        Ok(inserted)
    }

    #[instrument(skip(self))]
    async fn list_history(
        &self,
        agent_id: Uuid,
        limit: i64,
    ) -> Result<Vec<PricingHistoryRecord>, PricingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_history"])
            .start_timer();

        let records = sqlx::query_as::<_, PricingHistoryRecord>(&format!(
            r#"
            SELECT {HISTORY_COLUMNS} FROM pricing_history
            WHERE agent_id = $1
            ORDER BY seq DESC
            LIMIT $2
            "#
        ))
        .bind(agent_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list history", e))?;

        timer.observe_duration();

        Ok(records)
    }

    // =========================================================================
    // Call Operations
    // =========================================================================

    #[instrument(skip(self, input), fields(agent_id = %input.agent_id))]
    async fn create_call(&self, input: &CreateCall) -> Result<Call, PricingError> {
        sqlx::query_as::<_, Call>(&format!(
            r#"
            INSERT INTO calls (call_id, agent_id, client_id, pricing_plan_id, started_utc)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {CALL_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(input.agent_id)
        .bind(input.client_id)
        .bind(&input.pricing_plan_id)
        .bind(input.started_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to create call", e))
    }

    #[instrument(skip(self))]
    async fn get_call(&self, call_id: Uuid) -> Result<Option<Call>, PricingError> {
        sqlx::query_as::<_, Call>(&format!(
            "SELECT {CALL_COLUMNS} FROM calls WHERE call_id = $1"
        ))
        .bind(call_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get call", e))
    }

    #[instrument(skip(self, usage_metrics))]
    async fn finalize_call_cost(
        &self,
        call_id: Uuid,
        cost: Decimal,
        currency: &str,
        usage_metrics: &serde_json::Value,
        finalized_utc: DateTime<Utc>,
    ) -> Result<Call, PricingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["finalize_call_cost"])
            .start_timer();

        let call = sqlx::query_as::<_, Call>(&format!(
            r#"
            UPDATE calls
            SET cost = $2, currency = $3, usage_metrics = $4, finalized_utc = $5
            WHERE call_id = $1 AND cost IS NULL
            RETURNING {CALL_COLUMNS}
            "#
        ))
        .bind(call_id)
        .bind(cost)
        .bind(currency)
        .bind(usage_metrics)
        .bind(finalized_utc)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to finalize call cost", e))?;

        timer.observe_duration();

        match call {
            Some(call) => Ok(call),
            None => match self.get_call(call_id).await? {
                Some(_) => Err(PricingError::CostAlreadyFinalized(call_id)),
                None => Err(PricingError::CallNotFound(call_id)),
            },
        }
    }
}
