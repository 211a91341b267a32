//! Transport layer for the remote billing API.

use crate::config::RemoteBillingConfig;
use crate::error::PricingError;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method};
use secrecy::{ExposeSecret, Secret};
use service_core::observability::inject_trace_context;
use std::time::Duration;

pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// One request against the remote billing API.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    /// Path relative to the API base URL, e.g. `/plans`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    /// Forwarded verbatim as the `Idempotency-Key` header.
    pub idempotency_key: Option<String>,
}

impl TransportRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            idempotency_key: None,
        }
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn idempotency_key(mut self, key: Option<String>) -> Self {
        self.idempotency_key = key;
        self
    }
}

/// Raw response: status code and undecoded body.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// Sends a single request without retrying. Only failures to obtain a
/// response are errors; non-2xx responses are returned as-is.
#[async_trait]
pub trait BillingTransport: Send + Sync {
    async fn send(&self, request: &TransportRequest) -> Result<TransportResponse, PricingError>;
}

/// Authenticated HTTPS transport backed by reqwest.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    api_key: Secret<String>,
}

impl HttpTransport {
    pub fn new(config: &RemoteBillingConfig) -> Result<Self, PricingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                PricingError::remote(None, format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// Whether an API key is present.
    pub fn is_configured(&self) -> bool {
        !self.api_key.expose_secret().is_empty()
    }
}

#[async_trait]
impl BillingTransport for HttpTransport {
    async fn send(&self, request: &TransportRequest) -> Result<TransportResponse, PricingError> {
        let url = format!("{}{}", self.base_url, request.path);

        let mut headers = HeaderMap::new();
        inject_trace_context(&mut headers);

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .bearer_auth(self.api_key.expose_secret())
            .headers(headers);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(key) = &request.idempotency_key {
            builder = builder.header(IDEMPOTENCY_KEY_HEADER, key);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            PricingError::remote(None, format!("Request to {} failed: {}", request.path, e))
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            PricingError::remote(None, format!("Failed to read response body: {}", e))
        })?;

        tracing::debug!(
            method = %request.method,
            path = %request.path,
            status = status,
            "Remote billing response"
        );

        Ok(TransportResponse { status, body })
    }
}
