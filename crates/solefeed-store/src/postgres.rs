//! PostgreSQL storage implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::Row;

use solefeed_core::{
    AlertId, CheckType, MonitoringLogEntry, NotificationId, PriceAlert, PriceHistoryEntry,
    PriceNotification, PriceSourceKind, ProductSnapshot, UsageRecord, UserId,
};

use crate::error::{Result, StoreError};
use crate::{AlertStore, MonitoringStore, NotificationStore, UsageStore};

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to the database at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be created.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        tracing::info!(max_connections, "PostgreSQL pool ready");
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Database migrations applied");
        Ok(())
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn to_i32(value: u32, field: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| StoreError::Serialization(format!("{field} out of range")))
}

fn to_u32(value: i32, field: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::Serialization(format!("{field} is negative")))
}

fn to_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn usage_from_row(row: &PgRow) -> Result<UsageRecord> {
    Ok(UsageRecord {
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        monthly_limit: row.try_get("monthly_limit")?,
        used_this_month: row.try_get("used_this_month")?,
        period_start: row.try_get("period_start")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn alert_from_row(row: &PgRow) -> Result<PriceAlert> {
    let product: Json<ProductSnapshot> = row.try_get("product")?;
    Ok(PriceAlert {
        id: AlertId::from_uuid(row.try_get("id")?),
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        product_id: row.try_get("product_id")?,
        product: product.0,
        target_price_cents: row.try_get("target_price_cents")?,
        current_price_cents: row.try_get("current_price_cents")?,
        original_price_cents: row.try_get("original_price_cents")?,
        triggered: row.try_get("triggered")?,
        triggered_at: row.try_get("triggered_at")?,
        last_checked_at: row.try_get("last_checked_at")?,
        watching_since: row.try_get("watching_since")?,
        created_at: row.try_get("created_at")?,
    })
}

fn notification_from_row(row: &PgRow) -> Result<PriceNotification> {
    let product: Json<ProductSnapshot> = row.try_get("product")?;
    Ok(PriceNotification {
        id: NotificationId::from_uuid(row.try_get("id")?),
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        alert_id: AlertId::from_uuid(row.try_get("alert_id")?),
        watching_since: row.try_get("watching_since")?,
        product_id: row.try_get("product_id")?,
        product: product.0,
        old_price_cents: row.try_get("old_price_cents")?,
        new_price_cents: row.try_get("new_price_cents")?,
        saved_amount_cents: row.try_get("saved_amount_cents")?,
        percent_off: row.try_get("percent_off")?,
        read: row.try_get("read")?,
        notification_sent: row.try_get("notification_sent")?,
        delivery_attempts: row.try_get("delivery_attempts")?,
        last_delivery_error: row.try_get("last_delivery_error")?,
        next_attempt_at: row.try_get("next_attempt_at")?,
        delivery_failed: row.try_get("delivery_failed")?,
        created_at: row.try_get("created_at")?,
    })
}

fn history_from_row(row: &PgRow) -> Result<PriceHistoryEntry> {
    let id: String = row.try_get("id")?;
    let source: String = row.try_get("source")?;
    Ok(PriceHistoryEntry {
        id: id
            .parse()
            .map_err(|e| StoreError::Serialization(format!("price_history.id: {e}")))?,
        product_id: row.try_get("product_id")?,
        price_cents: row.try_get("price_cents")?,
        source: PriceSourceKind::parse(&source)
            .ok_or_else(|| StoreError::Serialization(format!("unknown price source: {source}")))?,
        recorded_at: row.try_get("recorded_at")?,
    })
}

fn monitoring_from_row(row: &PgRow) -> Result<MonitoringLogEntry> {
    let id: String = row.try_get("id")?;
    let check_type: String = row.try_get("check_type")?;
    let duration_ms: i64 = row.try_get("duration_ms")?;
    let metadata: Json<serde_json::Value> = row.try_get("metadata")?;
    Ok(MonitoringLogEntry {
        id: id
            .parse()
            .map_err(|e| StoreError::Serialization(format!("monitoring_logs.id: {e}")))?,
        check_type: CheckType::parse(&check_type)
            .ok_or_else(|| StoreError::Serialization(format!("unknown check type: {check_type}")))?,
        processed: to_u32(row.try_get("processed")?, "processed")?,
        triggered: to_u32(row.try_get("triggered")?, "triggered")?,
        errors: to_u32(row.try_get("errors")?, "errors")?,
        duration_ms: u64::try_from(duration_ms)
            .map_err(|_| StoreError::Serialization("duration_ms is negative".into()))?,
        metadata: metadata.0,
        created_at: row.try_get("created_at")?,
    })
}

// ============================================================================
// Usage
// ============================================================================

#[async_trait]
impl UsageStore for PgStore {
    async fn get_usage(&self, user_id: &UserId) -> Result<Option<UsageRecord>> {
        let row = sqlx::query(
            r"SELECT user_id, monthly_limit, used_this_month, period_start, updated_at
              FROM ai_usage
              WHERE user_id = $1",
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(usage_from_row).transpose()
    }

    async fn upsert_usage(&self, record: &UsageRecord) -> Result<()> {
        sqlx::query(
            r"INSERT INTO ai_usage
                  (user_id, monthly_limit, used_this_month, period_start, updated_at)
              VALUES ($1, $2, $3, $4, $5)
              ON CONFLICT (user_id) DO UPDATE SET
                  used_this_month = EXCLUDED.used_this_month,
                  period_start = EXCLUDED.period_start,
                  updated_at = EXCLUDED.updated_at",
        )
        .bind(record.user_id.as_uuid())
        .bind(record.monthly_limit)
        .bind(record.used_this_month)
        .bind(record.period_start)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_monthly_limit(
        &self,
        user_id: &UserId,
        monthly_limit: i32,
        period_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<UsageRecord> {
        let row = sqlx::query(
            r"INSERT INTO ai_usage
                  (user_id, monthly_limit, used_this_month, period_start, updated_at)
              VALUES ($1, $2, 0, $3, $4)
              ON CONFLICT (user_id) DO UPDATE SET
                  monthly_limit = EXCLUDED.monthly_limit,
                  updated_at = EXCLUDED.updated_at
              RETURNING user_id, monthly_limit, used_this_month, period_start, updated_at",
        )
        .bind(user_id.as_uuid())
        .bind(monthly_limit)
        .bind(period_start)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        usage_from_row(&row)
    }

    async fn release_usage(&self, user_id: &UserId, period_start: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r"UPDATE ai_usage
              SET used_this_month = GREATEST(used_this_month - 1, 0), updated_at = NOW()
              WHERE user_id = $1 AND period_start = $2",
        )
        .bind(user_id.as_uuid())
        .bind(period_start)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn hit_rate_window(&self, key: &str, window_start: DateTime<Utc>) -> Result<u32> {
        let row = sqlx::query(
            r"INSERT INTO rate_limits (key, window_start, count)
              VALUES ($1, $2, 1)
              ON CONFLICT (key) DO UPDATE SET
                  count = CASE WHEN rate_limits.window_start = EXCLUDED.window_start
                               THEN rate_limits.count + 1 ELSE 1 END,
                  window_start = EXCLUDED.window_start
              RETURNING count",
        )
        .bind(key)
        .bind(window_start)
        .fetch_one(&self.pool)
        .await?;

        to_u32(row.try_get("count")?, "count")
    }
}

// ============================================================================
// Alerts
// ============================================================================

const ALERT_COLUMNS: &str = "id, user_id, product_id, product, target_price_cents, \
    current_price_cents, original_price_cents, triggered, triggered_at, last_checked_at, \
    watching_since, created_at";

#[async_trait]
impl AlertStore for PgStore {
    async fn create_alert(&self, alert: &PriceAlert) -> Result<()> {
        sqlx::query(
            r"INSERT INTO price_alerts (id, user_id, product_id, product, target_price_cents,
                  current_price_cents, original_price_cents, triggered, triggered_at,
                  last_checked_at, watching_since, created_at)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(alert.id.as_uuid())
        .bind(alert.user_id.as_uuid())
        .bind(&alert.product_id)
        .bind(Json(&alert.product))
        .bind(alert.target_price_cents)
        .bind(alert.current_price_cents)
        .bind(alert.original_price_cents)
        .bind(alert.triggered)
        .bind(alert.triggered_at)
        .bind(alert.last_checked_at)
        .bind(alert.watching_since)
        .bind(alert.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_alert(&self, id: &AlertId) -> Result<Option<PriceAlert>> {
        let row = sqlx::query(&format!(
            "SELECT {ALERT_COLUMNS} FROM price_alerts WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(alert_from_row).transpose()
    }

    async fn list_alerts_by_user(&self, user_id: &UserId) -> Result<Vec<PriceAlert>> {
        let rows = sqlx::query(&format!(
            "SELECT {ALERT_COLUMNS} FROM price_alerts WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(alert_from_row).collect()
    }

    async fn list_watching_alerts(&self) -> Result<Vec<PriceAlert>> {
        let rows = sqlx::query(&format!(
            "SELECT {ALERT_COLUMNS} FROM price_alerts
             WHERE triggered = false
             ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(alert_from_row).collect()
    }

    async fn update_alert(&self, alert: &PriceAlert) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE price_alerts
              SET target_price_cents = $2, current_price_cents = $3, triggered = $4,
                  triggered_at = $5, last_checked_at = $6, watching_since = $7
              WHERE id = $1",
        )
        .bind(alert.id.as_uuid())
        .bind(alert.target_price_cents)
        .bind(alert.current_price_cents)
        .bind(alert.triggered)
        .bind(alert.triggered_at)
        .bind(alert.last_checked_at)
        .bind(alert.watching_since)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("alert", alert.id));
        }
        Ok(())
    }

    async fn delete_alert(&self, user_id: &UserId, id: &AlertId) -> Result<()> {
        let result = sqlx::query("DELETE FROM price_alerts WHERE id = $1 AND user_id = $2")
            .bind(id.as_uuid())
            .bind(user_id.as_uuid())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("alert", id));
        }
        Ok(())
    }
}

// ============================================================================
// Notifications
// ============================================================================

const NOTIFICATION_COLUMNS: &str = "id, user_id, alert_id, watching_since, product_id, product, \
    old_price_cents, \
    new_price_cents, saved_amount_cents, percent_off, read, notification_sent, delivery_attempts, \
    last_delivery_error, next_attempt_at, delivery_failed, created_at";

#[async_trait]
impl NotificationStore for PgStore {
    async fn insert_notification(&self, n: &PriceNotification) -> Result<bool> {
        let result = sqlx::query(
            r"INSERT INTO price_notifications (id, user_id, alert_id, watching_since, product_id,
                  product, old_price_cents, new_price_cents, saved_amount_cents, percent_off,
                  read, notification_sent, delivery_attempts, last_delivery_error,
                  next_attempt_at, delivery_failed, created_at)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
              ON CONFLICT (alert_id, watching_since) DO NOTHING",
        )
        .bind(n.id.as_uuid())
        .bind(n.user_id.as_uuid())
        .bind(n.alert_id.as_uuid())
        .bind(n.watching_since)
        .bind(&n.product_id)
        .bind(Json(&n.product))
        .bind(n.old_price_cents)
        .bind(n.new_price_cents)
        .bind(n.saved_amount_cents)
        .bind(n.percent_off)
        .bind(n.read)
        .bind(n.notification_sent)
        .bind(n.delivery_attempts)
        .bind(&n.last_delivery_error)
        .bind(n.next_attempt_at)
        .bind(n.delivery_failed)
        .bind(n.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_notifications_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<PriceNotification>> {
        let rows = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM price_notifications
             WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2"
        ))
        .bind(user_id.as_uuid())
        .bind(to_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(notification_from_row).collect()
    }

    async fn mark_notification_read(&self, user_id: &UserId, id: &NotificationId) -> Result<()> {
        let result =
            sqlx::query("UPDATE price_notifications SET read = true WHERE id = $1 AND user_id = $2")
                .bind(id.as_uuid())
                .bind(user_id.as_uuid())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("notification", id));
        }
        Ok(())
    }

    async fn list_pending_notifications(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PriceNotification>> {
        let rows = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM price_notifications
             WHERE notification_sent = false AND delivery_failed = false
               AND (next_attempt_at IS NULL OR next_attempt_at <= $1)
             ORDER BY created_at ASC LIMIT $2"
        ))
        .bind(now)
        .bind(to_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(notification_from_row).collect()
    }

    async fn update_delivery(&self, n: &PriceNotification) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE price_notifications
              SET notification_sent = $2, delivery_attempts = $3, last_delivery_error = $4,
                  next_attempt_at = $5, delivery_failed = $6
              WHERE id = $1",
        )
        .bind(n.id.as_uuid())
        .bind(n.notification_sent)
        .bind(n.delivery_attempts)
        .bind(&n.last_delivery_error)
        .bind(n.next_attempt_at)
        .bind(n.delivery_failed)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("notification", n.id));
        }
        Ok(())
    }

    async fn get_contact_email(&self, user_id: &UserId) -> Result<Option<String>> {
        let row = sqlx::query("SELECT email FROM user_contacts WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.try_get::<String, _>("email")).transpose()?)
    }
}

// ============================================================================
// Monitoring
// ============================================================================

#[async_trait]
impl MonitoringStore for PgStore {
    async fn append_price_history(&self, entry: &PriceHistoryEntry) -> Result<()> {
        sqlx::query(
            r"INSERT INTO price_history (id, product_id, price_cents, source, recorded_at)
              VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(entry.id.to_string())
        .bind(&entry.product_id)
        .bind(entry.price_cents)
        .bind(entry.source.as_str())
        .bind(entry.recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_price_history(
        &self,
        product_id: &str,
        limit: usize,
    ) -> Result<Vec<PriceHistoryEntry>> {
        let rows = sqlx::query(
            r"SELECT id, product_id, price_cents, source, recorded_at
              FROM price_history
              WHERE product_id = $1
              ORDER BY recorded_at DESC
              LIMIT $2",
        )
        .bind(product_id)
        .bind(to_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(history_from_row).collect()
    }

    async fn append_monitoring_log(&self, entry: &MonitoringLogEntry) -> Result<()> {
        sqlx::query(
            r"INSERT INTO monitoring_logs (id, check_type, processed, triggered, errors,
                  duration_ms, metadata, created_at)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(entry.id.to_string())
        .bind(entry.check_type.as_str())
        .bind(to_i32(entry.processed, "processed")?)
        .bind(to_i32(entry.triggered, "triggered")?)
        .bind(to_i32(entry.errors, "errors")?)
        .bind(i64::try_from(entry.duration_ms).unwrap_or(i64::MAX))
        .bind(Json(&entry.metadata))
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_monitoring_logs(&self, limit: usize) -> Result<Vec<MonitoringLogEntry>> {
        let rows = sqlx::query(
            r"SELECT id, check_type, processed, triggered, errors, duration_ms, metadata, created_at
              FROM monitoring_logs
              ORDER BY created_at DESC
              LIMIT $1",
        )
        .bind(to_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(monitoring_from_row).collect()
    }
}
