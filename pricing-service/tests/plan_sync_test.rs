mod common;

use common::{voice_plan_json, TestContext, VOICE_PLAN_ID};
use pricing_service::error::PricingError;
use pricing_service::models::Charge;
use pricing_service::services::PricingStore;
use rust_decimal::Decimal;
use serde_json::json;
use std::str::FromStr;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

fn page(plans: Vec<serde_json::Value>) -> serde_json::Value {
    json!({
        "data": plans,
        "pagination_metadata": { "has_more": false, "next_cursor": null }
    })
}

#[tokio::test]
async fn sync_all_upserts_every_valid_plan() {
    let ctx = TestContext::new().await;

    let mut invalid = voice_plan_json("plan_tiered");
    invalid["charges"] = json!([{ "type": "tiered", "tiers": [] }]);

    Mock::given(method("GET"))
        .and(path("/plans"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![
            voice_plan_json("plan_a"),
            invalid,
            voice_plan_json("plan_b"),
        ])))
        .mount(&ctx.server)
        .await;

    let report = ctx.service.sync_all_plans().await.unwrap();

    assert_eq!(report.count, 2);
    assert_eq!(report.plan_ids, vec!["plan_a", "plan_b"]);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].plan_id, "plan_tiered");

    assert!(ctx.store.get_plan("plan_a").await.unwrap().is_some());
    assert!(ctx.store.get_plan("plan_tiered").await.unwrap().is_none());
}

#[tokio::test]
async fn resync_overwrites_and_keeps_plans_missing_remotely() {
    let ctx = TestContext::new().await;
    ctx.seed_plan("plan_legacy").await;
    ctx.seed_plan(VOICE_PLAN_ID).await;

    let mut updated = voice_plan_json(VOICE_PLAN_ID);
    updated["name"] = json!("Voice Premium");
    updated["charges"] = json!([{ "type": "fixed", "amount": "25.00" }]);
    updated["metadata"] = json!({ "tier": "premium" });

    Mock::given(method("GET"))
        .and(path("/plans"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![updated])))
        .mount(&ctx.server)
        .await;

    let report = ctx.service.sync_all_plans().await.unwrap();
    assert_eq!(report.plan_ids, vec![VOICE_PLAN_ID]);

    let plan = ctx.service.get_plan(VOICE_PLAN_ID).await.unwrap();
    assert_eq!(plan.name, "Voice Premium");
    assert_eq!(
        plan.charges,
        vec![Charge::Fixed {
            amount: Decimal::from_str("25.00").unwrap()
        }]
    );
    assert_eq!(plan.metadata, Some(json!({ "tier": "premium" })));

    // Not in the listing, still stored and active
    let legacy = ctx.service.get_plan("plan_legacy").await.unwrap();
    assert!(legacy.is_active);
}

#[tokio::test]
async fn sync_one_unknown_plan_is_not_found() {
    let ctx = TestContext::new().await;

    Mock::given(method("GET"))
        .and(path("/plans/plan_ghost"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "error": "Not Found" })))
        .expect(1)
        .mount(&ctx.server)
        .await;

    let err = ctx.service.sync_plan("plan_ghost").await.unwrap_err();
    assert!(matches!(err, PricingError::PlanNotFound(id) if id == "plan_ghost"));
}

#[tokio::test]
async fn sync_one_with_negative_rate_is_rejected() {
    let ctx = TestContext::new().await;

    let mut plan = voice_plan_json(VOICE_PLAN_ID);
    plan["charges"] = json!([{ "type": "usage", "metric_name": "voice_minutes", "rate": "-0.05" }]);

    Mock::given(method("GET"))
        .and(path(format!("/plans/{}", VOICE_PLAN_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(plan))
        .mount(&ctx.server)
        .await;

    let err = ctx.service.sync_plan(VOICE_PLAN_ID).await.unwrap_err();
    assert!(matches!(err, PricingError::InvalidPlan { .. }));
    assert!(ctx.store.get_plan(VOICE_PLAN_ID).await.unwrap().is_none());
}

#[tokio::test]
async fn sync_all_surfaces_remote_failure() {
    let ctx = TestContext::new().await;

    Mock::given(method("GET"))
        .and(path("/plans"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": "Unauthorized" })))
        .expect(1)
        .mount(&ctx.server)
        .await;

    let err = ctx.service.sync_all_plans().await.unwrap_err();
    assert_eq!(err.remote_status(), Some(401));
}

#[tokio::test]
async fn deactivated_plan_leaves_listing_but_stays_loadable() {
    let ctx = TestContext::new().await;
    ctx.seed_plan("plan_a").await;
    ctx.seed_plan("plan_b").await;
    let (_, agent) = ctx.seed_agent().await;

    ctx.service.deactivate_plan("plan_a").await.unwrap();

    let active: Vec<String> = ctx
        .service
        .list_plans()
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.plan_id)
        .collect();
    assert_eq!(active, vec!["plan_b"]);

    let plan = ctx.service.get_plan("plan_a").await.unwrap();
    assert!(!plan.is_active);

    let err = ctx
        .service
        .assign_plan(agent.agent_id, "plan_a", "admin", None)
        .await
        .unwrap_err();
    assert!(matches!(err, PricingError::InvalidPlan { .. }));
}
