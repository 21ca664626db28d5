//! In-memory storage implementation.
//!
//! Holds every table in a single `RwLock`. State lives only as long as the
//! process, so this backend is for tests and local development.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use solefeed_core::{
    AlertId, MonitoringLogEntry, NotificationId, PriceAlert, PriceHistoryEntry, PriceNotification,
    UsageRecord, UserId,
};

use crate::error::{Result, StoreError};
use crate::{AlertStore, MonitoringStore, NotificationStore, UsageStore};

#[derive(Default)]
struct Tables {
    usage: HashMap<UserId, UsageRecord>,
    rate_windows: HashMap<String, (DateTime<Utc>, u32)>,
    alerts: Vec<PriceAlert>,
    notifications: Vec<PriceNotification>,
    contacts: HashMap<UserId, String>,
    price_history: Vec<PriceHistoryEntry>,
    monitoring_logs: Vec<MonitoringLogEntry>,
}

/// Process-local storage backend.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the email address used to reach a user.
    pub async fn set_contact_email(&self, user_id: UserId, email: impl Into<String>) {
        self.tables
            .write()
            .await
            .contacts
            .insert(user_id, email.into());
    }
}

#[async_trait]
impl UsageStore for MemoryStore {
    async fn get_usage(&self, user_id: &UserId) -> Result<Option<UsageRecord>> {
        Ok(self.tables.read().await.usage.get(user_id).cloned())
    }

    async fn upsert_usage(&self, record: &UsageRecord) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables
            .usage
            .entry(record.user_id)
            .and_modify(|stored| {
                stored.used_this_month = record.used_this_month;
                stored.period_start = record.period_start;
                stored.updated_at = record.updated_at;
            })
            .or_insert_with(|| record.clone());
        Ok(())
    }

    async fn set_monthly_limit(
        &self,
        user_id: &UserId,
        monthly_limit: i32,
        period_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<UsageRecord> {
        let mut tables = self.tables.write().await;
        let stored = tables.usage.entry(*user_id).or_insert_with(|| UsageRecord {
            user_id: *user_id,
            monthly_limit,
            used_this_month: 0,
            period_start,
            updated_at: now,
        });
        stored.monthly_limit = monthly_limit;
        stored.updated_at = now;
        Ok(stored.clone())
    }

    async fn release_usage(&self, user_id: &UserId, period_start: DateTime<Utc>) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.usage.get_mut(user_id) {
            Some(record) if record.period_start == period_start => {
                record.used_this_month = (record.used_this_month - 1).max(0);
                record.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn hit_rate_window(&self, key: &str, window_start: DateTime<Utc>) -> Result<u32> {
        let mut tables = self.tables.write().await;
        let entry = tables
            .rate_windows
            .entry(key.to_string())
            .or_insert((window_start, 0));

        if entry.0 != window_start {
            *entry = (window_start, 0);
        }
        entry.1 += 1;
        Ok(entry.1)
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn create_alert(&self, alert: &PriceAlert) -> Result<()> {
        let mut tables = self.tables.write().await;
        let duplicate = tables
            .alerts
            .iter()
            .any(|a| a.user_id == alert.user_id && a.product_id == alert.product_id);
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "alert already exists for product {}",
                alert.product_id
            )));
        }
        tables.alerts.push(alert.clone());
        Ok(())
    }

    async fn get_alert(&self, id: &AlertId) -> Result<Option<PriceAlert>> {
        Ok(self
            .tables
            .read()
            .await
            .alerts
            .iter()
            .find(|a| a.id == *id)
            .cloned())
    }

    async fn list_alerts_by_user(&self, user_id: &UserId) -> Result<Vec<PriceAlert>> {
        Ok(self
            .tables
            .read()
            .await
            .alerts
            .iter()
            .rev()
            .filter(|a| a.user_id == *user_id)
            .cloned()
            .collect())
    }

    async fn list_watching_alerts(&self) -> Result<Vec<PriceAlert>> {
        Ok(self
            .tables
            .read()
            .await
            .alerts
            .iter()
            .filter(|a| !a.triggered)
            .cloned()
            .collect())
    }

    async fn update_alert(&self, alert: &PriceAlert) -> Result<()> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .alerts
            .iter_mut()
            .find(|a| a.id == alert.id)
            .ok_or_else(|| StoreError::not_found("alert", alert.id))?;

        stored.target_price_cents = alert.target_price_cents;
        stored.current_price_cents = alert.current_price_cents;
        stored.triggered = alert.triggered;
        stored.triggered_at = alert.triggered_at;
        stored.last_checked_at = alert.last_checked_at;
        stored.watching_since = alert.watching_since;
        Ok(())
    }

    async fn delete_alert(&self, user_id: &UserId, id: &AlertId) -> Result<()> {
        let mut tables = self.tables.write().await;
        let before = tables.alerts.len();
        tables
            .alerts
            .retain(|a| !(a.id == *id && a.user_id == *user_id));
        if tables.alerts.len() == before {
            return Err(StoreError::not_found("alert", id));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert_notification(&self, notification: &PriceNotification) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let exists = tables.notifications.iter().any(|n| {
            n.alert_id == notification.alert_id && n.watching_since == notification.watching_since
        });
        if exists {
            return Ok(false);
        }
        tables.notifications.push(notification.clone());
        Ok(true)
    }

    async fn list_notifications_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<PriceNotification>> {
        Ok(self
            .tables
            .read()
            .await
            .notifications
            .iter()
            .rev()
            .filter(|n| n.user_id == *user_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_notification_read(&self, user_id: &UserId, id: &NotificationId) -> Result<()> {
        let mut tables = self.tables.write().await;
        let notification = tables
            .notifications
            .iter_mut()
            .find(|n| n.id == *id && n.user_id == *user_id)
            .ok_or_else(|| StoreError::not_found("notification", id))?;
        notification.read = true;
        Ok(())
    }

    async fn list_pending_notifications(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PriceNotification>> {
        Ok(self
            .tables
            .read()
            .await
            .notifications
            .iter()
            .filter(|n| n.is_due(now))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn update_delivery(&self, notification: &PriceNotification) -> Result<()> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .notifications
            .iter_mut()
            .find(|n| n.id == notification.id)
            .ok_or_else(|| StoreError::not_found("notification", notification.id))?;

        stored.notification_sent = notification.notification_sent;
        stored.delivery_attempts = notification.delivery_attempts;
        stored.last_delivery_error.clone_from(&notification.last_delivery_error);
        stored.next_attempt_at = notification.next_attempt_at;
        stored.delivery_failed = notification.delivery_failed;
        Ok(())
    }

    async fn get_contact_email(&self, user_id: &UserId) -> Result<Option<String>> {
        Ok(self.tables.read().await.contacts.get(user_id).cloned())
    }
}

#[async_trait]
impl MonitoringStore for MemoryStore {
    async fn append_price_history(&self, entry: &PriceHistoryEntry) -> Result<()> {
        self.tables
            .write()
            .await
            .price_history
            .push(entry.clone());
        Ok(())
    }

    async fn list_price_history(
        &self,
        product_id: &str,
        limit: usize,
    ) -> Result<Vec<PriceHistoryEntry>> {
        Ok(self
            .tables
            .read()
            .await
            .price_history
            .iter()
            .rev()
            .filter(|e| e.product_id == product_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn append_monitoring_log(&self, entry: &MonitoringLogEntry) -> Result<()> {
        self.tables
            .write()
            .await
            .monitoring_logs
            .push(entry.clone());
        Ok(())
    }

    async fn list_monitoring_logs(&self, limit: usize) -> Result<Vec<MonitoringLogEntry>> {
        Ok(self
            .tables
            .read()
            .await
            .monitoring_logs
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use solefeed_core::{current_period_start, NewPriceAlert, PriceDrop, ProductSnapshot};

    fn alert_for(user_id: UserId, product_id: &str) -> PriceAlert {
        PriceAlert::create(
            user_id,
            NewPriceAlert {
                product_id: product_id.into(),
                product: ProductSnapshot {
                    name: "Samba OG".into(),
                    brand: "adidas".into(),
                    image_url: None,
                    purchase_url: None,
                },
                target_price_cents: 8000,
                current_price_cents: 10000,
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn counter_upsert_keeps_monthly_limit() {
        let store = MemoryStore::new();
        let user_id = UserId::generate();
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();
        let period = current_period_start(now);

        let limited = store.set_monthly_limit(&user_id, 3, period, now).await.unwrap();
        assert_eq!((limited.monthly_limit, limited.used_this_month), (3, 0));

        // A reservation built from a record read before the limit changed.
        let mut stale = UsageRecord::fresh(user_id, now);
        stale.used_this_month = 1;
        store.upsert_usage(&stale).await.unwrap();

        let stored = store.get_usage(&user_id).await.unwrap().unwrap();
        assert_eq!(stored.monthly_limit, 3);
        assert_eq!(stored.used_this_month, 1);
    }

    #[tokio::test]
    async fn usage_upsert_and_release() {
        let store = MemoryStore::new();
        let user_id = UserId::generate();
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();

        let mut record = UsageRecord::fresh(user_id, now);
        record.used_this_month = 1;
        store.upsert_usage(&record).await.unwrap();

        // Wrong period: untouched.
        let september = Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap();
        assert!(!store.release_usage(&user_id, september).await.unwrap());

        assert!(store
            .release_usage(&user_id, current_period_start(now))
            .await
            .unwrap());
        assert!(store
            .release_usage(&user_id, current_period_start(now))
            .await
            .unwrap());

        let stored = store.get_usage(&user_id).await.unwrap().unwrap();
        assert_eq!(stored.used_this_month, 0);
    }

    #[tokio::test]
    async fn rate_window_resets_on_new_window() {
        let store = MemoryStore::new();
        let w1 = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();
        let w2 = Utc.with_ymd_and_hms(2026, 10, 16, 12, 1, 0).unwrap();

        assert_eq!(store.hit_rate_window("analyze:u1", w1).await.unwrap(), 1);
        assert_eq!(store.hit_rate_window("analyze:u1", w1).await.unwrap(), 2);
        assert_eq!(store.hit_rate_window("analyze:u2", w1).await.unwrap(), 1);
        assert_eq!(store.hit_rate_window("analyze:u1", w2).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn one_alert_per_user_and_product() {
        let store = MemoryStore::new();
        let user_id = UserId::generate();

        store.create_alert(&alert_for(user_id, "B0AAAAAAAA")).await.unwrap();
        let result = store.create_alert(&alert_for(user_id, "B0AAAAAAAA")).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));

        // Another user may watch the same product.
        store
            .create_alert(&alert_for(UserId::generate(), "B0AAAAAAAA"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn triggered_alerts_are_not_watched() {
        let store = MemoryStore::new();
        let user_id = UserId::generate();
        let mut alert = alert_for(user_id, "B0BBBBBBBB");
        store.create_alert(&alert).await.unwrap();
        assert_eq!(store.list_watching_alerts().await.unwrap().len(), 1);

        alert.triggered = true;
        alert.triggered_at = Some(Utc::now());
        store.update_alert(&alert).await.unwrap();
        assert!(store.list_watching_alerts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_alert_checks_owner() {
        let store = MemoryStore::new();
        let owner = UserId::generate();
        let alert = alert_for(owner, "B0CCCCCCCC");
        store.create_alert(&alert).await.unwrap();

        let result = store.delete_alert(&UserId::generate(), &alert.id).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));

        store.delete_alert(&owner, &alert.id).await.unwrap();
        assert!(store.get_alert(&alert.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pending_notifications_respect_backoff() {
        let store = MemoryStore::new();
        let alert = alert_for(UserId::generate(), "B0DDDDDDDD");
        let now = Utc::now();

        let mut notification =
            PriceNotification::for_alert(&alert, PriceDrop::between(10000, 7900), now);
        store.insert_notification(&notification).await.unwrap();
        assert_eq!(store.list_pending_notifications(now, 10).await.unwrap().len(), 1);

        notification.delivery_attempts = 1;
        notification.next_attempt_at = Some(now + chrono::Duration::minutes(5));
        store.update_delivery(&notification).await.unwrap();
        assert!(store.list_pending_notifications(now, 10).await.unwrap().is_empty());

        let later = now + chrono::Duration::minutes(6);
        assert_eq!(store.list_pending_notifications(later, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn one_notification_per_watch_cycle() {
        let store = MemoryStore::new();
        let mut alert = alert_for(UserId::generate(), "B0EEEEEEEE");
        let now = Utc::now();

        let first = PriceNotification::for_alert(&alert, PriceDrop::between(10000, 7900), now);
        assert!(store.insert_notification(&first).await.unwrap());

        let retry = PriceNotification::for_alert(&alert, PriceDrop::between(10000, 7800), now);
        assert!(!store.insert_notification(&retry).await.unwrap());

        alert.rewatch(None, now + chrono::Duration::hours(1)).unwrap();
        let next_cycle = PriceNotification::for_alert(&alert, PriceDrop::between(10000, 7000), now);
        assert!(store.insert_notification(&next_cycle).await.unwrap());

        let stored = store.list_notifications_by_user(&alert.user_id, 10).await.unwrap();
        assert_eq!(stored.len(), 2);
    }
}
