//! Price alert and notification inbox integration tests.

mod common;

use axum::http::StatusCode;
use common::{TestHarness, SERVICE_API_KEY};
use serde_json::json;

// ============================================================================
// Alerts
// ============================================================================

#[tokio::test]
async fn create_and_list_alert() {
    let harness = TestHarness::new();

    let id = harness.create_alert("B07QXLFLXT", 11_000, 10_000).await;

    let response = harness
        .server
        .get("/v1/alerts")
        .add_header("authorization", harness.user_auth_header())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let alerts = body["alerts"].as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["id"], id);
    assert_eq!(alerts[0]["state"], "watching");
    assert_eq!(alerts[0]["original_price_cents"], 11_000);
    assert_eq!(alerts[0]["product"]["brand"], "Nike");
}

#[tokio::test]
async fn duplicate_alert_conflicts() {
    let harness = TestHarness::new();
    harness.create_alert("B07QXLFLXT", 11_000, 10_000).await;

    let response = harness
        .server
        .post("/v1/alerts")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({
            "product_id": "B07QXLFLXT",
            "product_name": "Air Force 1 '07",
            "target_price_cents": 9_000,
            "current_price_cents": 11_000,
        }))
        .await;

    response.assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn non_positive_target_is_rejected() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/alerts")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({
            "product_id": "B07QXLFLXT",
            "product_name": "Air Force 1 '07",
            "target_price_cents": 0,
            "current_price_cents": 11_000,
        }))
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn price_above_ceiling_is_rejected() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/alerts")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({
            "product_id": "B07QXLFLXT",
            "product_name": "Air Force 1 '07",
            "target_price_cents": 10_000,
            "current_price_cents": i64::MAX / 4,
        }))
        .await;

    response.assert_status_bad_request();

    let response = harness
        .server
        .get("/v1/alerts")
        .add_header("authorization", harness.user_auth_header())
        .await;
    let body: serde_json::Value = response.json();
    assert!(body["alerts"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn alerts_are_private_to_their_owner() {
    let harness = TestHarness::new();
    let id = harness.create_alert("B07QXLFLXT", 11_000, 10_000).await;

    let response = harness
        .server
        .get("/v1/alerts")
        .add_header("authorization", TestHarness::other_user_auth_header())
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert!(body["alerts"].as_array().unwrap().is_empty());

    harness
        .server
        .delete(&format!("/v1/alerts/{id}"))
        .add_header("authorization", TestHarness::other_user_auth_header())
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn delete_alert() {
    let harness = TestHarness::new();
    let id = harness.create_alert("B07QXLFLXT", 11_000, 10_000).await;

    harness
        .server
        .delete(&format!("/v1/alerts/{id}"))
        .add_header("authorization", harness.user_auth_header())
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let response = harness
        .server
        .get("/v1/alerts")
        .add_header("authorization", harness.user_auth_header())
        .await;
    let body: serde_json::Value = response.json();
    assert!(body["alerts"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn delete_with_bad_id_is_rejected() {
    let harness = TestHarness::new();

    harness
        .server
        .delete("/v1/alerts/not-a-uuid")
        .add_header("authorization", harness.user_auth_header())
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn reset_rewatches_a_triggered_alert() {
    let harness = TestHarness::new();
    let id = harness.create_alert("B07QXLFLXT", 11_000, 10_000).await;
    harness.prices.set_price("B07QXLFLXT", Some(8_500));

    harness
        .server
        .post("/v1/jobs/check-prices")
        .add_header("x-api-key", SERVICE_API_KEY.to_string())
        .await
        .assert_status_ok();

    let response = harness
        .server
        .post(&format!("/v1/alerts/{id}/reset"))
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "target_price_cents": 7_500 }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["state"], "watching");
    assert_eq!(body["target_price_cents"], 7_500);
    assert_eq!(body["current_price_cents"], 8_500);
    assert!(body.get("triggered_at").is_none());
}

// ============================================================================
// Notifications
// ============================================================================

#[tokio::test]
async fn triggered_alert_lands_in_inbox_and_can_be_read() {
    let harness = TestHarness::new();
    harness.create_alert("B07QXLFLXT", 11_000, 10_000).await;
    harness.prices.set_price("B07QXLFLXT", Some(8_500));

    harness
        .server
        .post("/v1/jobs/check-prices")
        .add_header("x-api-key", SERVICE_API_KEY.to_string())
        .await
        .assert_status_ok();

    let response = harness
        .server
        .get("/v1/notifications")
        .add_header("authorization", harness.user_auth_header())
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["unread"], 1);
    let n = &body["notifications"][0];
    assert_eq!(n["old_price_cents"], 11_000);
    assert_eq!(n["new_price_cents"], 8_500);
    assert_eq!(n["saved_amount_cents"], 2_500);
    assert_eq!(n["percent_off"], 23);

    let id = n["id"].as_str().unwrap();
    harness
        .server
        .post(&format!("/v1/notifications/{id}/read"))
        .add_header("authorization", harness.user_auth_header())
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let response = harness
        .server
        .get("/v1/notifications")
        .add_header("authorization", harness.user_auth_header())
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["unread"], 0);
    assert_eq!(body["notifications"][0]["read"], true);
}

#[tokio::test]
async fn price_history_is_recorded_by_checks() {
    let harness = TestHarness::new();
    harness.create_alert("B07QXLFLXT", 11_000, 10_000).await;
    harness.prices.set_price("B07QXLFLXT", Some(10_500));

    harness
        .server
        .post("/v1/jobs/check-prices")
        .add_header("x-api-key", SERVICE_API_KEY.to_string())
        .await
        .assert_status_ok();

    let response = harness
        .server
        .get("/v1/products/B07QXLFLXT/price-history")
        .add_header("authorization", harness.user_auth_header())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["product_id"], "B07QXLFLXT");
    assert_eq!(body["history"][0]["price_cents"], 10_500);
    assert_eq!(body["history"][0]["source"], "simulated");
}
