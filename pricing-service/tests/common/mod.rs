#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use pricing_service::config::{PricingSettings, RemoteBillingConfig};
use pricing_service::error::PricingError;
use pricing_service::models::{Agent, Client, CreateAgent, CreateClient, UpsertPlan};
use pricing_service::remote::{
    BillingTransport, HttpTransport, RemoteBillingClient, TransportRequest, TransportResponse,
};
use pricing_service::services::{InMemoryStore, ManualClock, PricingService, PricingStore};
use secrecy::Secret;
use serde_json::json;
use service_core::retry::RetryConfig;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::MockServer;

pub const TEST_API_KEY: &str = "test-billing-key";
pub const VOICE_PLAN_ID: &str = "plan_voice";

/// Fixed start time for the manual clock.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

/// Same doubling schedule as production, scaled down to milliseconds.
pub fn fast_retry() -> RetryConfig {
    RetryConfig::exponential(3, Duration::from_millis(1))
}

pub fn remote_config(base_url: &str) -> RemoteBillingConfig {
    RemoteBillingConfig {
        base_url: base_url.to_string(),
        api_key: Secret::new(TEST_API_KEY.to_string()),
        timeout_secs: 5,
        max_retries: 3,
        initial_backoff_ms: 1,
    }
}

/// Remote representation of the voice plan:
/// `0.05 * voice_minutes + 0.01 * api_calls + 10.00`.
pub fn voice_plan_json(plan_id: &str) -> serde_json::Value {
    json!({
        "id": plan_id,
        "name": "Voice Standard",
        "description": "Per-minute voice with API surcharge",
        "currency": "USD",
        "status": "active",
        "charges": [
            { "type": "usage", "metric_name": "voice_minutes", "rate": "0.05" },
            { "type": "usage", "metric_name": "api_calls", "rate": "0.01" },
            { "type": "fixed", "amount": "10.00" }
        ],
        "metadata": { "tier": "standard" }
    })
}

pub fn voice_plan_upsert(plan_id: &str) -> UpsertPlan {
    let remote: pricing_service::remote::RemotePlan =
        serde_json::from_value(voice_plan_json(plan_id)).unwrap();
    remote.into_upsert("USD").unwrap()
}

/// Service over an in-memory store, a manual clock and a wiremock remote.
pub struct TestContext {
    pub server: MockServer,
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<ManualClock>,
    pub service: PricingService,
}

impl TestContext {
    pub async fn new() -> Self {
        let server = MockServer::start().await;
        let transport = HttpTransport::new(&remote_config(&server.uri())).unwrap();
        let remote = RemoteBillingClient::new(Arc::new(transport), fast_retry());

        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let service = PricingService::new(
            store.clone() as Arc<dyn PricingStore>,
            remote,
            clock.clone(),
            &PricingSettings::default(),
        );

        Self {
            server,
            store,
            clock,
            service,
        }
    }

    pub async fn seed_client(&self) -> Client {
        self.store
            .create_client(&CreateClient {
                name: "Acme Dental".to_string(),
                email: Some("billing@acme.test".to_string()),
            })
            .await
            .unwrap()
    }

    pub async fn seed_agent(&self) -> (Client, Agent) {
        let client = self.seed_client().await;
        let agent = self
            .store
            .create_agent(&CreateAgent {
                client_id: client.client_id,
                name: "Reception".to_string(),
            })
            .await
            .unwrap();
        (client, agent)
    }

    pub async fn seed_plan(&self, plan_id: &str) {
        self.store
            .upsert_plan(&voice_plan_upsert(plan_id))
            .await
            .unwrap();
    }

    pub async fn remote_request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }
}

/// What a [`ScriptedTransport`] does for one request.
#[derive(Debug, Clone)]
pub enum Scripted {
    Respond(u16, serde_json::Value),
    /// No HTTP response at all (connect failure, timeout).
    Unreachable,
}

/// Substitute transport replaying a fixed script and recording when each
/// request arrived. Once the script runs out every request gets a 500.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<(tokio::time::Instant, TransportRequest)>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(_, r)| r.clone())
            .collect()
    }

    /// Arrival of each request relative to the first.
    pub fn offsets(&self) -> Vec<Duration> {
        let requests = self.requests.lock().unwrap();
        let Some((first, _)) = requests.first() else {
            return Vec::new();
        };
        requests.iter().map(|(at, _)| *at - *first).collect()
    }
}

#[async_trait]
impl BillingTransport for ScriptedTransport {
    async fn send(&self, request: &TransportRequest) -> Result<TransportResponse, PricingError> {
        self.requests
            .lock()
            .unwrap()
            .push((tokio::time::Instant::now(), request.clone()));

        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Scripted::Respond(500, json!({ "message": "script exhausted" })));

        match step {
            Scripted::Respond(status, body) => Ok(TransportResponse {
                status,
                body: body.to_string(),
            }),
            Scripted::Unreachable => Err(PricingError::remote(None, "connection refused")),
        }
    }
}
