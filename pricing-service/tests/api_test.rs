mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use common::{voice_plan_upsert, TestContext, VOICE_PLAN_ID};
use http_body_util::BodyExt;
use pricing_service::models::Charge;
use pricing_service::services::PricingStore;
use pricing_service::startup::{router, AppState};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

fn app(ctx: &TestContext) -> Router {
    router(AppState::new(ctx.service.clone()))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn health_reports_ok() {
    let ctx = TestContext::new().await;
    let app = app(&ctx);

    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, _) = send(&app, Method::GET, "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn call_lifecycle_over_http() {
    let ctx = TestContext::new().await;
    ctx.seed_plan(VOICE_PLAN_ID).await;
    let app = app(&ctx);

    let (status, client) = send(
        &app,
        Method::POST,
        "/clients",
        Some(json!({ "name": "Acme Dental", "email": "billing@acme.test" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let client_id = client["client_id"].as_str().unwrap().to_string();

    let (status, agent) = send(
        &app,
        Method::POST,
        &format!("/clients/{}/agents", client_id),
        Some(json!({ "name": "Reception" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let agent_id = agent["agent_id"].as_str().unwrap().to_string();

    let (status, record) = send(
        &app,
        Method::POST,
        &format!("/agents/{}/pricing", agent_id),
        Some(json!({ "plan_id": VOICE_PLAN_ID, "actor_id": "admin-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(record["action"], "assigned");
    assert_eq!(record["is_active"], true);

    let (status, call) = send(
        &app,
        Method::POST,
        "/calls",
        Some(json!({ "agent_id": agent_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(call["pricing_plan_id"], VOICE_PLAN_ID);
    let call_id = call["call_id"].as_str().unwrap().to_string();

    let finalize_uri = format!("/calls/{}/finalize", call_id);
    let usage = json!({ "usage_metrics": { "voice_minutes": 5.5, "api_calls": 10 } });

    let (status, result) = send(&app, Method::POST, &finalize_uri, Some(usage.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["cost"], "10.38");
    assert_eq!(result["currency"], "USD");

    let (status, body) = send(&app, Method::POST, &finalize_uri, Some(usage)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());

    let (status, history) = send(
        &app,
        Method::GET,
        &format!("/agents/{}/pricing/history?limit=5", agent_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["records"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn invalid_usage_metrics_are_a_bad_request() {
    let ctx = TestContext::new().await;
    let (_, agent) = ctx.seed_agent().await;
    ctx.seed_plan(VOICE_PLAN_ID).await;
    ctx.service
        .assign_plan(agent.agent_id, VOICE_PLAN_ID, "admin", None)
        .await
        .unwrap();
    let call = ctx.service.start_call(agent.agent_id, None).await.unwrap();
    let app = app(&ctx);

    let uri = format!("/calls/{}/finalize", call.call_id);
    for bad in [
        json!({ "usage_metrics": { "voice_minutes": -1 } }),
        json!({ "usage_metrics": { "voice_minutes": "five" } }),
        json!({ "usage_metrics": [1, 2] }),
    ] {
        let (status, _) = send(&app, Method::POST, &uri, Some(bad)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn cost_overflow_is_a_bad_request() {
    let ctx = TestContext::new().await;
    let (_, agent) = ctx.seed_agent().await;

    let mut plan = voice_plan_upsert("plan_premium");
    plan.charges = vec![Charge::Usage {
        metric_name: "voice_minutes".to_string(),
        rate: Decimal::from(10),
    }];
    ctx.store.upsert_plan(&plan).await.unwrap();
    ctx.service
        .assign_plan(agent.agent_id, "plan_premium", "admin", None)
        .await
        .unwrap();
    let call = ctx.service.start_call(agent.agent_id, None).await.unwrap();
    let app = app(&ctx);

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/calls/{}/finalize", call.call_id),
        Some(json!({ "usage_metrics": { "voice_minutes": 1e28 } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let stored = ctx.store.get_call(call.call_id).await.unwrap().unwrap();
    assert_eq!(stored.cost, None);
    assert_eq!(ctx.remote_request_count().await, 0);
}

#[tokio::test]
async fn unknown_agent_history_is_not_found() {
    let ctx = TestContext::new().await;
    let app = app(&ctx);

    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/agents/{}/pricing/history", Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn blank_actor_is_rejected() {
    let ctx = TestContext::new().await;
    let (_, agent) = ctx.seed_agent().await;
    ctx.seed_plan(VOICE_PLAN_ID).await;
    let app = app(&ctx);

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/agents/{}/pricing", agent.agent_id),
        Some(json!({ "plan_id": VOICE_PLAN_ID, "actor_id": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let history = ctx.service.get_history(agent.agent_id, 10).await.unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn finalizing_without_a_plan_is_unprocessable() {
    let ctx = TestContext::new().await;
    let (_, agent) = ctx.seed_agent().await;
    let call = ctx.service.start_call(agent.agent_id, None).await.unwrap();
    let app = app(&ctx);

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/calls/{}/finalize", call.call_id),
        Some(json!({ "usage_metrics": { "voice_minutes": 1 } })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}
