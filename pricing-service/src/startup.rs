//! Application startup and lifecycle management.

use crate::config::PricingConfig;
use crate::handlers::{agents, calls, clients, health, plans};
use crate::remote::{HttpTransport, RemoteBillingClient};
use crate::services::{init_metrics, Database, PricingService, PricingStore, SystemClock};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{metrics_middleware, request_id_middleware};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PricingService>,
}

impl AppState {
    pub fn new(service: PricingService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

/// HTTP routes over the pricing operations.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics_handler))
        // Plans
        .route("/plans", get(plans::list_plans))
        .route("/plans/sync", post(plans::sync_all_plans))
        .route("/plans/:plan_id", get(plans::get_plan))
        .route("/plans/:plan_id/sync", post(plans::sync_plan))
        .route("/plans/:plan_id/deactivate", post(plans::deactivate_plan))
        // Clients and agents
        .route("/clients", post(clients::create_client))
        .route("/clients/:client_id/agents", post(clients::create_agent))
        .route("/clients/:client_id/sync", post(clients::sync_client))
        .route("/clients/:client_id/usage", get(clients::usage_summary))
        .route(
            "/agents/:agent_id/pricing",
            post(agents::assign_plan).delete(agents::remove_plan),
        )
        .route("/agents/:agent_id/pricing/history", get(agents::get_history))
        // Calls
        .route("/calls", post(calls::start_call))
        .route("/calls/:call_id/finalize", post(calls::finalize_call))
        .route("/calls/:call_id/usage/resend", post(calls::resend_usage))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: PricingConfig) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            AppError::from(e)
        })?;

        db.run_migrations().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to run migrations");
            AppError::from(e)
        })?;

        let transport = HttpTransport::new(&config.remote_billing)?;
        if transport.is_configured() {
            tracing::info!(
                base_url = %config.remote_billing.base_url,
                "Remote billing client initialized"
            );
        } else {
            tracing::warn!("BILLING_API_KEY not configured - remote billing calls will be rejected");
        }

        let remote = RemoteBillingClient::new(
            Arc::new(transport),
            config.remote_billing.retry_config(),
        );
        let store: Arc<dyn PricingStore> = Arc::new(db);
        let service = PricingService::new(store, remote, Arc::new(SystemClock), &config.pricing);
        let state = AppState::new(service);

        // Port 0 = random port for testing
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Pricing service listener bound");

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let app = router(self.state);

        tracing::info!(
            service = "pricing-service",
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );

        axum::serve(self.listener, app).await
    }
}
