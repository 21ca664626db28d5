//! Storage layer for SoleFeed.
//!
//! Storage is split into narrow traits so components only depend on the rows
//! they touch:
//!
//! - [`UsageStore`]: monthly AI-usage counters and rate-limit windows
//! - [`AlertStore`]: price alerts
//! - [`NotificationStore`]: price notifications and contact lookup
//! - [`MonitoringStore`]: price history and the monitoring audit log
//!
//! [`Store`] is the union of all four and is implemented automatically.
//!
//! Two backends are provided: [`PgStore`] (PostgreSQL via sqlx) and
//! [`MemoryStore`] (process-local, for tests and local development).
//!
//! # Concurrency
//!
//! No operation takes a lock across calls. Each write is a single-row upsert
//! or update, so correctness under concurrent invocations rests on the
//! backend's row-level atomicity.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;
pub mod postgres;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use solefeed_core::{
    AlertId, MonitoringLogEntry, NotificationId, PriceAlert, PriceHistoryEntry, PriceNotification,
    UsageRecord, UserId,
};

/// Usage counters and rate-limit windows.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Get a user's usage record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_usage(&self, user_id: &UserId) -> Result<Option<UsageRecord>>;

    /// Insert a user's usage record, or update the counter of an existing
    /// one, keyed by `user_id`.
    ///
    /// `monthly_limit` is only written when the row is created, so a limit
    /// changed concurrently through [`UsageStore::set_monthly_limit`] is kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn upsert_usage(&self, record: &UsageRecord) -> Result<()>;

    /// Set a user's monthly limit without touching the counter. Creates an
    /// empty record for `period_start` if the user has none.
    ///
    /// Returns the stored record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn set_monthly_limit(
        &self,
        user_id: &UserId,
        monthly_limit: i32,
        period_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<UsageRecord>;

    /// Give back one reserved use, but only if the stored record still refers
    /// to `period_start`. The counter never goes below zero.
    ///
    /// Returns `true` if a record was decremented.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn release_usage(&self, user_id: &UserId, period_start: DateTime<Utc>) -> Result<bool>;

    /// Count one hit against `key` in the fixed window starting at
    /// `window_start`, resetting the count when the window changes.
    ///
    /// Returns the number of hits in the current window, including this one.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn hit_rate_window(&self, key: &str, window_start: DateTime<Utc>) -> Result<u32>;
}

/// Price alert rows.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Insert a new alert.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if the user already watches the product.
    async fn create_alert(&self, alert: &PriceAlert) -> Result<()>;

    /// Get an alert by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_alert(&self, id: &AlertId) -> Result<Option<PriceAlert>>;

    /// List a user's alerts, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_alerts_by_user(&self, user_id: &UserId) -> Result<Vec<PriceAlert>>;

    /// List every alert with `triggered = false`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_watching_alerts(&self) -> Result<Vec<PriceAlert>>;

    /// Overwrite the mutable fields of an alert (prices, trigger state, timestamps).
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the alert doesn't exist.
    async fn update_alert(&self, alert: &PriceAlert) -> Result<()>;

    /// Delete one of a user's alerts.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the alert doesn't exist or belongs to
    /// another user.
    async fn delete_alert(&self, user_id: &UserId, id: &AlertId) -> Result<()>;
}

/// Price notification rows and recipient lookup.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Insert a notification unless one already exists for the same
    /// `(alert_id, watching_since)`.
    ///
    /// Returns `true` if the row was inserted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn insert_notification(&self, notification: &PriceNotification) -> Result<bool>;

    /// List a user's notifications, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_notifications_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<PriceNotification>>;

    /// Mark one of a user's notifications as read.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the notification doesn't exist or
    /// belongs to another user.
    async fn mark_notification_read(&self, user_id: &UserId, id: &NotificationId) -> Result<()>;

    /// List notifications due for delivery at `now`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_pending_notifications(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PriceNotification>>;

    /// Persist delivery bookkeeping (sent flag, attempts, next attempt, failure).
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the notification doesn't exist.
    async fn update_delivery(&self, notification: &PriceNotification) -> Result<()>;

    /// Resolve a user to an email address.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_contact_email(&self, user_id: &UserId) -> Result<Option<String>>;
}

/// Append-only batch bookkeeping.
#[async_trait]
pub trait MonitoringStore: Send + Sync {
    /// Append a price observation.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn append_price_history(&self, entry: &PriceHistoryEntry) -> Result<()>;

    /// List a product's price history, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_price_history(
        &self,
        product_id: &str,
        limit: usize,
    ) -> Result<Vec<PriceHistoryEntry>>;

    /// Append a batch summary.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn append_monitoring_log(&self, entry: &MonitoringLogEntry) -> Result<()>;

    /// List recent batch summaries, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_monitoring_logs(&self, limit: usize) -> Result<Vec<MonitoringLogEntry>>;
}

/// Every storage capability the service needs.
pub trait Store: UsageStore + AlertStore + NotificationStore + MonitoringStore {}

impl<T> Store for T where T: UsageStore + AlertStore + NotificationStore + MonitoringStore {}
