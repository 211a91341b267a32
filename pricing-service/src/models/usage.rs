//! Usage metrics and usage events.

use crate::error::PricingError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::str::FromStr;
use uuid::Uuid;

/// Measured usage for a call, keyed by metric name.
///
/// Construction rejects negative and non-numeric quantities, so every value
/// held here is a valid input to the cost engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct UsageMetrics(BTreeMap<String, Decimal>);

impl UsageMetrics {
    pub fn new<I>(values: I) -> Result<Self, PricingError>
    where
        I: IntoIterator<Item = (String, Decimal)>,
    {
        let mut metrics = BTreeMap::new();
        for (name, quantity) in values {
            if name.trim().is_empty() {
                return Err(PricingError::InvalidUsageMetrics(
                    "metric name must not be empty".to_string(),
                ));
            }
            if quantity < Decimal::ZERO {
                return Err(PricingError::InvalidUsageMetrics(format!(
                    "metric '{}' has negative quantity {}",
                    name, quantity
                )));
            }
            metrics.insert(name, quantity);
        }
        Ok(Self(metrics))
    }

    /// Parse a JSON object of `metric -> number`.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, PricingError> {
        let object = match value {
            serde_json::Value::Object(object) => object,
            serde_json::Value::Null => return Ok(Self::default()),
            other => {
                return Err(PricingError::InvalidUsageMetrics(format!(
                    "usage metrics must be an object, got {}",
                    json_type(other)
                )))
            }
        };

        let mut values = Vec::with_capacity(object.len());
        for (name, raw) in object {
            let number = match raw {
                serde_json::Value::Number(number) => number,
                other => {
                    return Err(PricingError::InvalidUsageMetrics(format!(
                        "metric '{}' is not numeric (got {})",
                        name,
                        json_type(other)
                    )))
                }
            };
            let text = number.to_string();
            let quantity = Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .map_err(|_| {
                    PricingError::InvalidUsageMetrics(format!(
                        "metric '{}' value {} is out of range",
                        name, text
                    ))
                })?;
            values.push((name.clone(), quantity));
        }
        Self::new(values)
    }

    /// JSON object of plain numbers, readable back through [`UsageMetrics::from_json`].
    pub fn to_json(&self) -> serde_json::Value {
        let object = self
            .0
            .iter()
            .map(|(name, quantity)| {
                let number = serde_json::Number::from_str(&quantity.normalize().to_string())
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null);
                (name.clone(), number)
            })
            .collect();
        serde_json::Value::Object(object)
    }

    /// Quantity for `metric_name`, zero when absent.
    pub fn get(&self, metric_name: &str) -> Decimal {
        self.0.get(metric_name).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn contains(&self, metric_name: &str) -> bool {
        self.0.contains_key(metric_name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Billable measurement submitted to the remote billing service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub external_customer_id: String,
    pub metric_name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
    pub idempotency_key: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

impl UsageEvent {
    /// Deterministic key for the usage of `metric_name` on `call_id`.
    ///
    /// Every submission for the same pair carries the same key, which is what
    /// lets the remote side deduplicate re-sends.
    pub fn idempotency_key_for(call_id: Uuid, metric_name: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(call_id.as_bytes());
        hasher.update(b":");
        hasher.update(metric_name.as_bytes());
        format!("call-usage-{}", hex::encode(hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_json_accepts_integers_and_decimals() {
        let metrics = UsageMetrics::from_json(&json!({
            "voice_minutes": 5.5,
            "api_calls": 10
        }))
        .unwrap();

        assert_eq!(metrics.get("voice_minutes"), Decimal::from_str("5.5").unwrap());
        assert_eq!(metrics.get("api_calls"), Decimal::from(10));
        assert_eq!(metrics.get("sms"), Decimal::ZERO);
    }

    #[test]
    fn from_json_rejects_negative_values() {
        let err = UsageMetrics::from_json(&json!({ "voice_minutes": -1 })).unwrap_err();
        assert!(matches!(err, PricingError::InvalidUsageMetrics(_)));
    }

    #[test]
    fn from_json_rejects_non_numeric_values() {
        let err = UsageMetrics::from_json(&json!({ "voice_minutes": "5" })).unwrap_err();
        assert!(matches!(err, PricingError::InvalidUsageMetrics(_)));

        let err = UsageMetrics::from_json(&json!([1, 2])).unwrap_err();
        assert!(matches!(err, PricingError::InvalidUsageMetrics(_)));
    }

    #[test]
    fn to_json_reads_back() {
        let metrics = UsageMetrics::from_json(&json!({ "voice_minutes": 5.5, "api_calls": 10 }))
            .unwrap();
        let again = UsageMetrics::from_json(&metrics.to_json()).unwrap();
        assert_eq!(metrics, again);
    }

    #[test]
    fn idempotency_key_is_stable_per_call_and_metric() {
        let call_id = Uuid::new_v4();
        let first = UsageEvent::idempotency_key_for(call_id, "voice_minutes");
        let second = UsageEvent::idempotency_key_for(call_id, "voice_minutes");
        assert_eq!(first, second);
        assert_ne!(first, UsageEvent::idempotency_key_for(call_id, "api_calls"));
        assert_ne!(
            first,
            UsageEvent::idempotency_key_for(Uuid::new_v4(), "voice_minutes")
        );
    }
}
