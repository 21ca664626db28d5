//! Batch job integration tests.

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use common::{HarnessOptions, TestHarness, SERVICE_API_KEY};
use solefeed_store::{AlertStore, MonitoringStore, NotificationStore};

async fn run_job(harness: &TestHarness, path: &str) -> axum_test::TestResponse {
    harness
        .server
        .post(path)
        .add_header("x-api-key", SERVICE_API_KEY.to_string())
        .add_header("x-service-name", "cron".to_string())
        .await
}

// ============================================================================
// Price check
// ============================================================================

#[tokio::test]
async fn check_prices_requires_service_key() {
    let harness = TestHarness::new();

    harness
        .server
        .post("/v1/jobs/check-prices")
        .await
        .assert_status_unauthorized();

    harness
        .server
        .post("/v1/jobs/check-prices")
        .add_header("x-api-key", "wrong".to_string())
        .await
        .assert_status_unauthorized();
}

#[tokio::test]
async fn check_prices_with_no_alerts() {
    let harness = TestHarness::new();

    let response = run_job(&harness, "/v1/jobs/check-prices").await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["processed"], 0);
    assert_eq!(body["triggered"], 0);
    assert_eq!(body["errors"], 0);
    assert!(body["duration_ms"].is_u64());
}

#[tokio::test]
async fn check_prices_isolates_failures() {
    let harness = TestHarness::new();
    harness.create_alert("B000000001", 11_000, 10_000).await;
    harness.create_alert("B000000002", 11_000, 10_000).await;
    harness.create_alert("B000000003", 11_000, 10_000).await;
    // B000000001 has no scripted price and fails.
    harness.prices.set_price("B000000002", Some(8_500));
    harness.prices.set_price("B000000003", Some(10_500));

    let response = run_job(&harness, "/v1/jobs/check-prices").await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["processed"], 3);
    assert_eq!(body["triggered"], 1);
    assert_eq!(body["errors"], 1);
}

#[tokio::test]
async fn timed_out_check_still_finishes_the_batch() {
    let harness = TestHarness::with_options(HarnessOptions {
        request_timeout_seconds: 1,
        ..HarnessOptions::default()
    });
    for n in 1..=4 {
        let product_id = format!("B00000000{n}");
        harness.create_alert(&product_id, 11_000, 10_000).await;
        harness.prices.set_price(&product_id, Some(10_500));
    }
    harness.prices.set_delay(Duration::from_millis(700));

    let response = run_job(&harness, "/v1/jobs/check-prices").await;
    response.assert_status(StatusCode::REQUEST_TIMEOUT);

    // The batch keeps running after the caller gave up.
    let mut logs = Vec::new();
    for _ in 0..50 {
        logs = harness.store.list_monitoring_logs(10).await.unwrap();
        if !logs.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].processed, 4);
    assert_eq!(logs[0].errors, 0);

    let alerts = harness
        .store
        .list_alerts_by_user(&harness.test_user_id)
        .await
        .unwrap();
    assert_eq!(alerts.len(), 4);
    assert!(alerts.iter().all(|a| a.last_checked_at.is_some()));
    assert!(alerts.iter().all(|a| a.current_price_cents == 10_500));
}

// ============================================================================
// Delivery
// ============================================================================

#[tokio::test]
async fn send_price_alerts_delivers_and_marks_sent() {
    let harness = TestHarness::new();
    harness
        .store
        .set_contact_email(harness.test_user_id, "runner@example.com")
        .await;
    harness.create_alert("B07QXLFLXT", 11_000, 10_000).await;
    harness.prices.set_price("B07QXLFLXT", Some(8_500));
    run_job(&harness, "/v1/jobs/check-prices").await.assert_status_ok();

    let response = run_job(&harness, "/v1/jobs/send-price-alerts").await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["processed"], 1);
    assert_eq!(body["triggered"], 1);
    assert_eq!(body["errors"], 0);

    {
        let sent = harness.notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "runner@example.com");
        assert_eq!(sent[0].1.new_price_cents, 8_500);
    }

    let stored = harness
        .store
        .list_notifications_by_user(&harness.test_user_id, 10)
        .await
        .unwrap();
    assert!(stored[0].notification_sent);

    // Nothing left to send.
    let again = run_job(&harness, "/v1/jobs/send-price-alerts").await;
    let body: serde_json::Value = again.json();
    assert_eq!(body["processed"], 0);
}

#[tokio::test]
async fn unknown_recipient_is_counted_and_kept() {
    let harness = TestHarness::new();
    harness.create_alert("B07QXLFLXT", 11_000, 10_000).await;
    harness.prices.set_price("B07QXLFLXT", Some(8_500));
    run_job(&harness, "/v1/jobs/check-prices").await.assert_status_ok();

    let response = run_job(&harness, "/v1/jobs/send-price-alerts").await;

    let body: serde_json::Value = response.json();
    assert_eq!(body["errors"], 1);
    assert_eq!(body["triggered"], 0);

    let stored = harness
        .store
        .list_notifications_by_user(&harness.test_user_id, 10)
        .await
        .unwrap();
    assert!(!stored[0].notification_sent);
    assert_eq!(stored[0].delivery_attempts, 1);
    assert!(stored[0].last_delivery_error.is_some());
}

#[tokio::test]
async fn send_without_email_is_a_configuration_error() {
    let harness = TestHarness::with_options(HarnessOptions {
        with_notifier: false,
        ..HarnessOptions::default()
    });

    let response = run_job(&harness, "/v1/jobs/send-price-alerts").await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "configuration_error");
}
