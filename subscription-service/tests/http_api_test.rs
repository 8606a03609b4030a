//! HTTP surface tests against a server on a random port.

mod common;

use common::{TestApp, ACTOR};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};

fn money(value: &Value) -> Decimal {
    serde_json::from_value(value.clone()).expect("Not a decimal")
}

async fn create_advertiser(app: &TestApp, customer_type: &str) -> String {
    let response = app
        .post_json(
            "/advertisers",
            json!({
                "name": "Desert Rose Cafe",
                "phone": "+966511111111",
                "customer_type": customer_type
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    body["advertiser_id"].as_str().unwrap().to_string()
}

async fn create_plan(app: &TestApp, price: &str) -> String {
    let response = app
        .post_json(
            "/plans",
            json!({
                "name": "Kingdom Monthly",
                "duration_days": 30,
                "price": price,
                "coverage_type": "kingdom"
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    body["plan_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_and_readiness_respond() {
    let app = TestApp::spawn().await;

    let response = app.get("/health").await;
    assert!(response.status().is_success());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "subscription-service");

    let response = app.get("/ready").await;
    assert!(response.status().is_success());
}

#[tokio::test]
async fn metrics_endpoint_returns_prometheus_format() {
    let app = TestApp::spawn().await;
    create_advertiser(&app, "new").await;
    create_plan(&app, "100").await;

    let response = app.get("/metrics").await;
    assert!(response.status().is_success());
    let body = response.text().await.unwrap();
    assert!(body.contains("subscription_operations_total"));
}

#[tokio::test]
async fn subscription_order_flow() {
    let app = TestApp::spawn().await;
    let advertiser_id = create_advertiser(&app, "new").await;
    let plan_id = create_plan(&app, "1000").await;

    let response = app
        .post_json(
            "/subscriptions",
            json!({
                "advertiser_id": advertiser_id,
                "plan_id": plan_id,
                "discount": { "discount_type": "percentage", "amount": "20" },
                "initial_payment": { "amount": "200", "payment_method": "card" }
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let created: Value = response.json().await.unwrap();
    let subscription_id = created["subscription_id"].as_str().unwrap().to_string();
    assert!(created["payment_id"].is_string());
    assert_eq!(created["subscription"]["status"], "active");
    assert_eq!(money(&created["subscription"]["total_amount"]), dec!(800));

    let response = app.get(&format!("/subscriptions/{}", subscription_id)).await;
    assert_eq!(response.status().as_u16(), 200);
    let view: Value = response.json().await.unwrap();
    assert_eq!(view["remaining_days"], 30);
    assert_eq!(view["payment_status"], "partial");

    let response = app
        .post_json(
            &format!("/subscriptions/{}/payments", subscription_id),
            json!({ "amount": "600", "payment_method": "bank_transfer" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);

    let response = app
        .post_json(
            &format!("/subscriptions/{}/payments", subscription_id),
            json!({ "amount": "1", "payment_method": "cash" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 422);

    let response = app
        .client
        .post(app.url(&format!("/subscriptions/{}/pause", subscription_id)))
        .header("x-actor-id", ACTOR)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let outcome: Value = response.json().await.unwrap();
    assert_eq!(outcome["status"], "paused");

    let response = app
        .client
        .post(app.url(&format!("/subscriptions/{}/pause", subscription_id)))
        .header("x-actor-id", ACTOR)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 409);

    let response = app
        .post_json(
            &format!("/subscriptions/{}/stop", subscription_id),
            json!({ "reason": "moved to another platform" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);

    let response = app
        .get(&format!("/subscriptions/{}/history", subscription_id))
        .await;
    let history: Value = response.json().await.unwrap();
    assert_eq!(history.as_array().unwrap().len(), 2);

    let response = app
        .get(&format!("/advertisers/{}/financial-summary", advertiser_id))
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let summary: Value = response.json().await.unwrap();
    assert_eq!(money(&summary["total_paid"]), dec!(800));
    assert_eq!(summary["payments"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn mutations_require_an_actor() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(app.url("/plans"))
        .json(&json!({
            "name": "Anonymous",
            "duration_days": 30,
            "price": "10",
            "coverage_type": "kingdom"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);

    let response = app
        .client
        .post(app.url("/sweeps/expirations"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn errors_map_to_http_statuses() {
    let app = TestApp::spawn().await;

    let response = app.get("/subscriptions/does-not-exist").await;
    assert_eq!(response.status().as_u16(), 404);

    let response = app
        .post_json("/plans", json!({ "name": "", "duration_days": 0, "price": "1", "coverage_type": "kingdom" }))
        .await;
    assert_eq!(response.status().as_u16(), 422);

    let advertiser_id = create_advertiser(&app, "vip").await;
    let plan_id = create_plan(&app, "100").await;
    let response = app
        .post_json(
            "/subscriptions",
            json!({
                "advertiser_id": advertiser_id,
                "plan_id": plan_id,
                "discount": { "discount_type": "percentage", "amount": "150" }
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 400);

    let response = app
        .post_json(
            "/subscriptions",
            json!({ "advertiser_id": advertiser_id, "plan_id": "missing-plan" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn sweep_and_grace_over_http() {
    let app = TestApp::spawn().await;
    let advertiser_id = create_advertiser(&app, "trusted").await;
    let plan_id = create_plan(&app, "300").await;

    let response = app
        .post_json(
            "/subscriptions",
            json!({
                "advertiser_id": advertiser_id,
                "plan_id": plan_id,
                "initial_payment": { "amount": "300", "payment_method": "card" }
            }),
        )
        .await;
    let created: Value = response.json().await.unwrap();
    let subscription_id = created["subscription_id"].as_str().unwrap().to_string();

    app.harness.clock.advance_days(31);
    let response = app.post_json("/sweeps/expirations", json!({})).await;
    assert_eq!(response.status().as_u16(), 200);
    let report: Value = response.json().await.unwrap();
    assert_eq!(report["expired"], json!([subscription_id]));

    let response = app
        .post_json(
            &format!("/subscriptions/{}/grace", subscription_id),
            json!({ "days": 5, "reason": "goodwill" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let grace: Value = response.json().await.unwrap();
    assert_eq!(grace["status"], "active");
    assert_eq!(grace["is_in_grace_period"], true);
    assert_eq!(grace["grace_period_end_date"], "2025-02-05");

    let response = app
        .post_json(
            &format!("/subscriptions/{}/grace/end", subscription_id),
            json!({}),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let grace: Value = response.json().await.unwrap();
    assert_eq!(grace["status"], "expired");
}

#[tokio::test]
async fn refunds_and_advertiser_deletion_over_http() {
    let app = TestApp::spawn().await;
    let advertiser_id = create_advertiser(&app, "new").await;
    let plan_id = create_plan(&app, "300").await;

    let response = app
        .post_json(
            "/subscriptions",
            json!({
                "advertiser_id": advertiser_id,
                "plan_id": plan_id,
                "initial_payment": { "amount": "300", "payment_method": "card" }
            }),
        )
        .await;
    let created: Value = response.json().await.unwrap();
    let subscription_id = created["subscription_id"].as_str().unwrap();

    let response = app
        .post_json(
            "/refunds",
            json!({
                "subscription_id": subscription_id,
                "amount": "75",
                "reason": "campaign started late"
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let refund: Value = response.json().await.unwrap();
    let refund_id = refund["refund_id"].as_str().unwrap();

    let response = app
        .client
        .patch(app.url(&format!("/refunds/{}/status", refund_id)))
        .header("x-actor-id", ACTOR)
        .json(&json!({ "status": "approved" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let refund: Value = response.json().await.unwrap();
    assert_eq!(refund["status"], "approved");

    let response = app
        .client
        .delete(app.url(&format!("/advertisers/{}", advertiser_id)))
        .header("x-actor-id", ACTOR)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 202);
    let cascade: Value = response.json().await.unwrap();
    assert_eq!(cascade["status"], "completed");

    let cascade_id = cascade["cascade_id"].as_str().unwrap();
    let response = app.get(&format!("/cascades/{}", cascade_id)).await;
    assert_eq!(response.status().as_u16(), 200);

    let response = app.get(&format!("/advertisers/{}", advertiser_id)).await;
    assert_eq!(response.status().as_u16(), 404);
}
