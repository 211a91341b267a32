mod common;

use chrono::Utc;
use common::{fast_retry, remote_config, voice_plan_json, Scripted, ScriptedTransport, TEST_API_KEY};
use pricing_service::error::PricingError;
use pricing_service::models::UsageEvent;
use pricing_service::remote::{HttpTransport, RemoteBillingClient, IDEMPOTENCY_KEY_HEADER};
use rust_decimal::Decimal;
use serde_json::json;
use service_core::retry::RetryConfig;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn usage_event(call_id: Uuid, metric: &str) -> UsageEvent {
    UsageEvent {
        external_customer_id: Uuid::new_v4().to_string(),
        metric_name: metric.to_string(),
        quantity: Decimal::new(55, 1),
        idempotency_key: UsageEvent::idempotency_key_for(call_id, metric),
        timestamp: Utc::now(),
        metadata: json!({ "call_id": call_id }),
    }
}

fn production_retry() -> RetryConfig {
    RetryConfig::exponential(3, Duration::from_secs(1))
}

#[tokio::test(start_paused = true)]
async fn transient_failures_retry_at_1_3_7_seconds_then_fail() {
    let transport = ScriptedTransport::new(vec![
        Scripted::Respond(503, json!({ "message": "unavailable" })),
        Scripted::Respond(503, json!({ "message": "unavailable" })),
        Scripted::Respond(503, json!({ "message": "unavailable" })),
        Scripted::Respond(503, json!({ "message": "still unavailable" })),
    ]);
    let client = RemoteBillingClient::new(transport.clone(), production_retry());

    let err = client
        .submit_usage_event(&usage_event(Uuid::new_v4(), "voice_minutes"))
        .await
        .unwrap_err();

    match err {
        PricingError::RemoteBilling {
            status, message, ..
        } => {
            assert_eq!(status, Some(503));
            assert_eq!(message, "still unavailable");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert_eq!(
        transport.offsets(),
        vec![
            Duration::ZERO,
            Duration::from_secs(1),
            Duration::from_secs(3),
            Duration::from_secs(7),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn rate_limit_then_success_returns_body() {
    let transport = ScriptedTransport::new(vec![
        Scripted::Respond(429, json!({ "message": "slow down" })),
        Scripted::Unreachable,
        Scripted::Respond(200, json!({ "event": { "lago_id": "evt_1" } })),
    ]);
    let client = RemoteBillingClient::new(transport.clone(), production_retry());

    let body = client
        .submit_usage_event(&usage_event(Uuid::new_v4(), "api_calls"))
        .await
        .unwrap();

    assert_eq!(body["event"]["lago_id"], "evt_1");
    assert_eq!(transport.requests().len(), 3);
    assert_eq!(transport.offsets()[2], Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn client_errors_are_not_retried() {
    let transport = ScriptedTransport::new(vec![Scripted::Respond(
        422,
        json!({ "error": "Unprocessable", "message": "billable metric not found" }),
    )]);
    let client = RemoteBillingClient::new(transport.clone(), production_retry());

    let err = client
        .submit_usage_event(&usage_event(Uuid::new_v4(), "unknown_metric"))
        .await
        .unwrap_err();

    assert_eq!(err.remote_status(), Some(422));
    assert!(err.to_string().contains("billable metric not found"));
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn idempotency_key_is_passed_through_on_every_submission() {
    let server = MockServer::start().await;
    let call_id = Uuid::new_v4();
    let event = usage_event(call_id, "voice_minutes");

    Mock::given(method("POST"))
        .and(path("/events"))
        .and(header(IDEMPOTENCY_KEY_HEADER, event.idempotency_key.as_str()))
        .and(header("Authorization", format!("Bearer {}", TEST_API_KEY).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "event": {} })))
        .expect(2)
        .mount(&server)
        .await;

    let transport = HttpTransport::new(&remote_config(&server.uri())).unwrap();
    let client = RemoteBillingClient::new(Arc::new(transport), fast_retry());

    // Rebuilt from scratch: the key depends only on (call, metric)
    let resubmitted = usage_event(call_id, "voice_minutes");
    assert_eq!(resubmitted.idempotency_key, event.idempotency_key);

    client.submit_usage_event(&event).await.unwrap();
    client.submit_usage_event(&resubmitted).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let bodies: Vec<serde_json::Value> = requests
        .iter()
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect();
    assert_eq!(bodies[0]["metric_name"], "voice_minutes");
    assert_eq!(bodies[0]["quantity"], 5.5);
    assert_eq!(bodies[0]["idempotency_key"], bodies[1]["idempotency_key"]);
}

#[tokio::test]
async fn plan_listing_follows_cursors() {
    let transport = ScriptedTransport::new(vec![
        Scripted::Respond(
            200,
            json!({
                "data": [voice_plan_json("plan_a")],
                "pagination_metadata": { "has_more": true, "next_cursor": "page-2" }
            }),
        ),
        Scripted::Respond(
            200,
            json!({
                "data": [voice_plan_json("plan_b"), voice_plan_json("plan_c")],
                "pagination_metadata": { "has_more": false, "next_cursor": null }
            }),
        ),
    ]);
    let client = RemoteBillingClient::new(transport.clone(), RetryConfig::no_retry());

    let plans = client.list_plans().await.unwrap();

    let ids: Vec<&str> = plans.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["plan_a", "plan_b", "plan_c"]);

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert!(!requests[0].query.iter().any(|(k, _)| k == "cursor"));
    assert!(requests[1]
        .query
        .contains(&("cursor".to_string(), "page-2".to_string())));
}

#[tokio::test]
async fn missing_plan_and_customer_are_none() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/plans/plan_missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "status": 404, "error": "Not Found", "code": "plan_not_found"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/customers/external_customer_id/client-1"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let transport = HttpTransport::new(&remote_config(&server.uri())).unwrap();
    let client = RemoteBillingClient::new(Arc::new(transport), fast_retry());

    assert!(client.get_plan("plan_missing").await.unwrap().is_none());
    assert!(client
        .find_customer_by_external_id("client-1")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn usage_summary_sends_timeframe() {
    let server = MockServer::start().await;
    let start = Utc::now() - chrono::Duration::days(7);
    let end = Utc::now();

    Mock::given(method("GET"))
        .and(path("/customers/external_customer_id/client-9/costs"))
        .and(query_param(
            "timeframe_start",
            start.to_rfc3339_opts(chrono::SecondsFormat::Secs, true).as_str(),
        ))
        .and(query_param(
            "timeframe_end",
            end.to_rfc3339_opts(chrono::SecondsFormat::Secs, true).as_str(),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "customer_usage": { "total_amount_cents": 1038, "currency": "USD" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let transport = HttpTransport::new(&remote_config(&server.uri())).unwrap();
    let client = RemoteBillingClient::new(Arc::new(transport), fast_retry());

    let summary = client
        .get_usage_summary("client-9", start, end)
        .await
        .unwrap();
    assert_eq!(summary["customer_usage"]["total_amount_cents"], 1038);
}
