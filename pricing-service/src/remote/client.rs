//! Retrying client for the remote billing API.

use super::transport::{BillingTransport, TransportRequest, TransportResponse};
use super::types::{RemoteCustomer, RemotePage, RemotePlan};
use crate::error::PricingError;
use crate::models::UsageEvent;
use crate::services::metrics::{record_remote_request, record_remote_retry};
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::json;
use service_core::retry::{retry_with_backoff, RetryConfig};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{info, instrument};

/// Page size requested when listing plans.
const PLAN_PAGE_SIZE: u32 = 100;

/// Client for the remote metering/billing service.
///
/// Constructed once at startup and shared; holds no per-request state.
#[derive(Clone)]
pub struct RemoteBillingClient {
    transport: Arc<dyn BillingTransport>,
    retry: RetryConfig,
}

impl RemoteBillingClient {
    pub fn new(transport: Arc<dyn BillingTransport>, retry: RetryConfig) -> Self {
        Self { transport, retry }
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Send a request, retrying rate-limited, 5xx and transport failures.
    ///
    /// Returns the decoded JSON body (`Null` for an empty body). Other statuses
    /// fail immediately with the status, message and raw payload attached.
    pub async fn request(
        &self,
        operation: &str,
        request: TransportRequest,
    ) -> Result<serde_json::Value, PricingError> {
        let attempts = AtomicU32::new(0);

        let result = retry_with_backoff(&self.retry, operation, || {
            if attempts.fetch_add(1, Ordering::SeqCst) > 0 {
                record_remote_retry(operation);
            }
            let request = &request;
            async move {
                let response = self.transport.send(request).await?;
                decode_response(response)
            }
        })
        .await;

        record_remote_request(operation, if result.is_ok() { "success" } else { "failure" });
        result
    }

    async fn request_as<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: TransportRequest,
    ) -> Result<T, PricingError> {
        let value = self.request(operation, request).await?;
        serde_json::from_value(value.clone()).map_err(|e| PricingError::RemoteBilling {
            status: None,
            message: format!("Unexpected {} response shape: {}", operation, e),
            payload: Some(value),
        })
    }

    /// Look up a customer by external id. `None` if the remote has no such customer.
    #[instrument(skip(self))]
    pub async fn find_customer_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<RemoteCustomer>, PricingError> {
        let path = format!(
            "/customers/external_customer_id/{}",
            urlencoding::encode(external_id)
        );
        not_found_as_none(
            self.request_as("find_customer", TransportRequest::new(Method::GET, path))
                .await,
        )
    }

    /// Create a customer keyed by `external_id`.
    #[instrument(skip(self, email, idempotency_key))]
    pub async fn create_customer(
        &self,
        external_id: &str,
        name: &str,
        email: Option<&str>,
        idempotency_key: Option<String>,
    ) -> Result<RemoteCustomer, PricingError> {
        let request = TransportRequest::new(Method::POST, "/customers")
            .body(json!({
                "external_customer_id": external_id,
                "name": name,
                "email": email,
            }))
            .idempotency_key(idempotency_key);

        let customer: RemoteCustomer = self.request_as("create_customer", request).await?;
        info!(remote_customer_id = %customer.id, external_id = %external_id, "Remote customer created");
        Ok(customer)
    }

    /// List every plan, following pagination cursors until exhausted.
    #[instrument(skip(self))]
    pub async fn list_plans(&self) -> Result<Vec<RemotePlan>, PricingError> {
        let mut plans = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut request = TransportRequest::new(Method::GET, "/plans")
                .query("limit", PLAN_PAGE_SIZE.to_string());
            if let Some(c) = &cursor {
                request = request.query("cursor", c.clone());
            }

            let page: RemotePage<RemotePlan> = self.request_as("list_plans", request).await?;
            plans.extend(page.data);

            match page.pagination_metadata.next_cursor {
                Some(next) if page.pagination_metadata.has_more => cursor = Some(next),
                _ => break,
            }
        }

        Ok(plans)
    }

    /// Fetch one plan. `None` if the remote reports it does not exist.
    #[instrument(skip(self))]
    pub async fn get_plan(&self, plan_id: &str) -> Result<Option<RemotePlan>, PricingError> {
        let path = format!("/plans/{}", urlencoding::encode(plan_id));
        not_found_as_none(
            self.request_as("get_plan", TransportRequest::new(Method::GET, path))
                .await,
        )
    }

    /// Submit one usage event; the event's idempotency key is passed through untouched.
    #[instrument(skip(self, event), fields(metric_name = %event.metric_name, idempotency_key = %event.idempotency_key))]
    pub async fn submit_usage_event(
        &self,
        event: &UsageEvent,
    ) -> Result<serde_json::Value, PricingError> {
        let body = serde_json::to_value(event).map_err(|e| {
            PricingError::remote(None, format!("Failed to encode usage event: {}", e))
        })?;
        let request = TransportRequest::new(Method::POST, "/events")
            .body(body)
            .idempotency_key(Some(event.idempotency_key.clone()));

        self.request("submit_usage_event", request).await
    }

    /// Usage and cost aggregate for a customer over `[start, end)`.
    #[instrument(skip(self))]
    pub async fn get_usage_summary(
        &self,
        external_customer_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<serde_json::Value, PricingError> {
        let path = format!(
            "/customers/external_customer_id/{}/costs",
            urlencoding::encode(external_customer_id)
        );
        let request = TransportRequest::new(Method::GET, path)
            .query(
                "timeframe_start",
                start.to_rfc3339_opts(SecondsFormat::Secs, true),
            )
            .query("timeframe_end", end.to_rfc3339_opts(SecondsFormat::Secs, true));

        self.request("get_usage_summary", request).await
    }
}

fn not_found_as_none<T>(result: Result<T, PricingError>) -> Result<Option<T>, PricingError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.remote_status() == Some(404) => Ok(None),
        Err(err) => Err(err),
    }
}

/// Turn a raw response into a JSON body or a structured error.
fn decode_response(response: TransportResponse) -> Result<serde_json::Value, PricingError> {
    let payload = if response.body.trim().is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_str(&response.body)
            .unwrap_or_else(|_| serde_json::Value::String(response.body.clone()))
    };

    if (200..300).contains(&response.status) {
        if let serde_json::Value::String(_) = payload {
            if !response.body.trim().is_empty() {
                return Err(PricingError::RemoteBilling {
                    status: Some(response.status),
                    message: "Response body is not JSON".to_string(),
                    payload: Some(payload),
                });
            }
        }
        return Ok(payload);
    }

    Err(PricingError::RemoteBilling {
        status: Some(response.status),
        message: error_message(response.status, &payload),
        payload: Some(payload),
    })
}

/// Best-effort human message from an error payload.
fn error_message(status: u16, payload: &serde_json::Value) -> String {
    let from_payload = ["message", "detail", "title", "error"]
        .iter()
        .find_map(|key| match payload.get(key) {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Object(inner)) => inner
                .get("message")
                .and_then(|m| m.as_str())
                .map(|m| m.to_string()),
            _ => None,
        });

    match (from_payload, payload) {
        (Some(message), _) => message,
        (None, serde_json::Value::String(raw)) if !raw.is_empty() => raw.clone(),
        _ => format!("Remote billing service responded with status {}", status),
    }
}
