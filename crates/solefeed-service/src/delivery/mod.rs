//! Price-drop notification delivery.
//!
//! Drains notifications that have not been sent, resolves each user's email
//! address, and hands the message to a [`Notifier`]. A row is marked sent only
//! after the notifier confirms. Failures are retried with exponential backoff
//! and given up on after [`MAX_DELIVERY_ATTEMPTS`].

pub mod email;

pub use email::EmailNotifier;

use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use solefeed_core::{BatchSummary, CheckType, MonitoringLogEntry, PriceNotification};
use solefeed_store::{MonitoringStore, NotificationStore, Store, StoreError};

// ============================================================================
// Retry policy
// ============================================================================

/// Failed attempts after which a notification is abandoned.
pub const MAX_DELIVERY_ATTEMPTS: i32 = 5;

/// Wait after the first failure (doubles with each further failure).
const INITIAL_BACKOFF_MINUTES: i64 = 5;

/// Upper bound on the wait between attempts.
const MAX_BACKOFF_HOURS: i64 = 6;

/// Notifications drained per run.
const DELIVERY_BATCH_SIZE: usize = 100;

/// Delivery errors.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The email API rejected the message.
    #[error("email API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },
}

/// Sends a price-drop message to one recipient.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `notification` to `recipient`. `Ok` means the provider accepted it.
    async fn send_price_drop(
        &self,
        recipient: &str,
        notification: &PriceNotification,
    ) -> Result<(), DeliveryError>;
}

/// Wait before the next attempt, given how many attempts have failed.
#[must_use]
pub fn backoff_after(failed_attempts: i32) -> Duration {
    let exponent = u32::try_from(failed_attempts.saturating_sub(1)).unwrap_or(0).min(16);
    let minutes = INITIAL_BACKOFF_MINUTES.saturating_mul(1_i64 << exponent);
    Duration::minutes(minutes).min(Duration::hours(MAX_BACKOFF_HOURS))
}

/// Record a failed attempt on `notification`, scheduling a retry or giving up.
pub fn record_failure(notification: &mut PriceNotification, error: String, now: DateTime<Utc>) {
    notification.delivery_attempts += 1;
    notification.last_delivery_error = Some(error);

    if notification.delivery_attempts >= MAX_DELIVERY_ATTEMPTS {
        notification.delivery_failed = true;
        notification.next_attempt_at = None;
    } else {
        notification.next_attempt_at = Some(now + backoff_after(notification.delivery_attempts));
    }
}

/// Runs one delivery batch.
pub struct AlertDelivery<'a> {
    store: &'a dyn Store,
    notifier: &'a dyn Notifier,
}

impl<'a> AlertDelivery<'a> {
    /// Create a delivery run over `store` sending through `notifier`.
    #[must_use]
    pub fn new(store: &'a dyn Store, notifier: &'a dyn Notifier) -> Self {
        Self { store, notifier }
    }

    /// Attempt every due notification once.
    ///
    /// `triggered` in the summary counts messages sent.
    ///
    /// # Errors
    ///
    /// Returns an error only if pending notifications cannot be listed.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<BatchSummary, StoreError> {
        let started = Instant::now();
        tracing::info!("Alert delivery started");

        let pending = self
            .store
            .list_pending_notifications(now, DELIVERY_BATCH_SIZE)
            .await?;

        let mut summary = BatchSummary::default();
        let mut abandoned = 0u32;

        for mut notification in pending {
            summary.processed += 1;

            let outcome = self.deliver(&notification).await;
            match outcome {
                Ok(()) => {
                    notification.notification_sent = true;
                    notification.last_delivery_error = None;
                    notification.next_attempt_at = None;
                    summary.triggered += 1;
                }
                Err(reason) => {
                    summary.errors += 1;
                    record_failure(&mut notification, reason, now);
                    if notification.delivery_failed {
                        abandoned += 1;
                    }
                    tracing::warn!(
                        notification_id = %notification.id,
                        user_id = %notification.user_id,
                        attempts = notification.delivery_attempts,
                        error = ?notification.last_delivery_error,
                        gave_up = notification.delivery_failed,
                        "Price alert delivery failed"
                    );
                }
            }

            if let Err(e) = self.store.update_delivery(&notification).await {
                tracing::error!(
                    notification_id = %notification.id,
                    error = %e,
                    "Failed to record delivery outcome"
                );
            }
        }

        summary.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        tracing::info!(
            processed = summary.processed,
            sent = summary.triggered,
            errors = summary.errors,
            abandoned,
            duration_ms = summary.duration_ms,
            "Alert delivery finished"
        );

        let entry = MonitoringLogEntry::from_summary(
            CheckType::EmailSend,
            &summary,
            json!({ "abandoned": abandoned }),
        );
        if let Err(e) = self.store.append_monitoring_log(&entry).await {
            tracing::error!(error = %e, "Failed to write delivery log entry");
        }

        Ok(summary)
    }

    /// Resolve the recipient and send. The error string is stored on the row.
    async fn deliver(&self, notification: &PriceNotification) -> Result<(), String> {
        let recipient = self
            .store
            .get_contact_email(&notification.user_id)
            .await
            .map_err(|e| format!("contact lookup failed: {e}"))?
            .ok_or_else(|| "no contact email for user".to_string())?;

        self.notifier
            .send_price_drop(&recipient, notification)
            .await
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use solefeed_core::{NewPriceAlert, PriceAlert, PriceDrop, ProductSnapshot, UserId};
    use solefeed_store::MemoryStore;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_price_drop(
            &self,
            recipient: &str,
            _notification: &PriceNotification,
        ) -> Result<(), DeliveryError> {
            if self.fail {
                return Err(DeliveryError::Api {
                    status: 500,
                    message: "down".into(),
                });
            }
            self.sent.lock().unwrap().push(recipient.to_string());
            Ok(())
        }
    }

    fn notification_for(user_id: UserId) -> PriceNotification {
        let alert = PriceAlert::create(
            user_id,
            NewPriceAlert {
                product_id: "B07QXLFLXT".into(),
                product: ProductSnapshot {
                    name: "Air Max 90".into(),
                    brand: "Nike".into(),
                    image_url: None,
                    purchase_url: None,
                },
                target_price_cents: 10_000,
                current_price_cents: 11_000,
            },
            Utc::now(),
        )
        .unwrap();
        PriceNotification::for_alert(&alert, PriceDrop::between(11_000, 8_500), Utc::now())
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_after(1), Duration::minutes(5));
        assert_eq!(backoff_after(2), Duration::minutes(10));
        assert_eq!(backoff_after(4), Duration::minutes(40));
        assert_eq!(backoff_after(10), Duration::hours(6));
        assert_eq!(backoff_after(i32::MAX), Duration::hours(6));
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let mut n = notification_for(UserId::generate());
        let now = Utc::now();
        for _ in 0..MAX_DELIVERY_ATTEMPTS - 1 {
            record_failure(&mut n, "nope".into(), now);
            assert!(!n.delivery_failed);
            assert!(n.next_attempt_at.is_some());
        }
        record_failure(&mut n, "nope".into(), now);
        assert!(n.delivery_failed);
        assert!(!n.notification_sent);
        assert!(!n.is_due(now + Duration::days(1)));
    }

    #[tokio::test]
    async fn sends_and_marks_sent() {
        let store = MemoryStore::new();
        let user_id = UserId::generate();
        store.set_contact_email(user_id, "runner@example.com").await;
        store.insert_notification(&notification_for(user_id)).await.unwrap();

        let notifier = RecordingNotifier::default();
        let summary = AlertDelivery::new(&store, &notifier).run(Utc::now()).await.unwrap();

        assert_eq!((summary.processed, summary.triggered, summary.errors), (1, 1, 0));
        assert_eq!(*notifier.sent.lock().unwrap(), vec!["runner@example.com".to_string()]);

        let stored = store.list_notifications_by_user(&user_id, 10).await.unwrap();
        assert!(stored[0].notification_sent);
        assert!(store.list_pending_notifications(Utc::now(), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unresolvable_user_stays_unsent_and_backs_off() {
        let store = MemoryStore::new();
        let user_id = UserId::generate();
        store.insert_notification(&notification_for(user_id)).await.unwrap();

        let notifier = RecordingNotifier::default();
        let now = Utc::now();
        let summary = AlertDelivery::new(&store, &notifier).run(now).await.unwrap();
        assert_eq!((summary.processed, summary.triggered, summary.errors), (1, 0, 1));

        let stored = &store.list_notifications_by_user(&user_id, 10).await.unwrap()[0];
        assert!(!stored.notification_sent);
        assert_eq!(stored.delivery_attempts, 1);
        assert_eq!(stored.next_attempt_at, Some(now + Duration::minutes(5)));

        // Not due again until the backoff passes.
        let again = AlertDelivery::new(&store, &notifier).run(now).await.unwrap();
        assert_eq!(again.processed, 0);

        let logs = store.list_monitoring_logs(10).await.unwrap();
        assert_eq!(logs[0].check_type, CheckType::EmailSend);
    }

    #[tokio::test]
    async fn provider_failure_is_retried() {
        let store = MemoryStore::new();
        let user_id = UserId::generate();
        store.set_contact_email(user_id, "runner@example.com").await;
        store.insert_notification(&notification_for(user_id)).await.unwrap();

        let failing = RecordingNotifier {
            fail: true,
            ..RecordingNotifier::default()
        };
        let now = Utc::now();
        AlertDelivery::new(&store, &failing).run(now).await.unwrap();

        let working = RecordingNotifier::default();
        let later = now + Duration::minutes(6);
        let summary = AlertDelivery::new(&store, &working).run(later).await.unwrap();
        assert_eq!(summary.triggered, 1);
    }
}
