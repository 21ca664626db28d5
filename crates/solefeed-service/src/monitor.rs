//! Price monitoring batch.
//!
//! Re-prices every watched alert, records the observation, and fires a
//! notification when the price reaches the alert's target. Each alert is
//! handled independently: a failure is counted and logged, and the batch
//! moves on.

use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::json;

use solefeed_core::{
    BatchSummary, CheckType, MonitoringLogEntry, PriceAlert, PriceDrop, PriceHistoryEntry,
    PriceNotification,
};
use solefeed_store::{AlertStore, MonitoringStore, NotificationStore, Store, StoreError};

use crate::pricing::{PriceSource, PriceSourceError};

/// Why one alert could not be checked.
#[derive(Debug, thiserror::Error)]
pub enum AlertCheckError {
    /// The price source failed.
    #[error(transparent)]
    Source(#[from] PriceSourceError),

    /// The price source did not answer in time.
    #[error("price fetch timed out after {0:?}")]
    Timeout(Duration),

    /// Writing the result failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Runs one price-check batch.
pub struct PriceMonitor<'a> {
    store: &'a dyn Store,
    source: &'a dyn PriceSource,
    fetch_timeout: Duration,
}

impl<'a> PriceMonitor<'a> {
    /// Create a monitor over `store` using `source` for prices.
    #[must_use]
    pub fn new(store: &'a dyn Store, source: &'a dyn PriceSource, fetch_timeout: Duration) -> Self {
        Self {
            store,
            source,
            fetch_timeout,
        }
    }

    /// Check every watched alert once.
    ///
    /// # Errors
    ///
    /// Returns an error only if the watched alerts cannot be listed. Per-alert
    /// failures are reported in the summary's `errors` count.
    pub async fn run(&self) -> Result<BatchSummary, StoreError> {
        let started = Instant::now();
        let price_source = self.source.kind().as_str();
        tracing::info!(price_source, "Price check started");

        let alerts = self.store.list_watching_alerts().await?;
        let mut summary = BatchSummary::default();

        for alert in &alerts {
            summary.processed += 1;
            match self.check_alert(alert).await {
                Ok(true) => summary.triggered += 1,
                Ok(false) => {}
                Err(e) => {
                    summary.errors += 1;
                    tracing::warn!(
                        alert_id = %alert.id,
                        product_id = %alert.product_id,
                        error = %e,
                        "Price check failed for alert"
                    );
                }
            }
        }

        summary.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        tracing::info!(
            processed = summary.processed,
            triggered = summary.triggered,
            errors = summary.errors,
            duration_ms = summary.duration_ms,
            price_source,
            "Price check finished"
        );

        let entry = MonitoringLogEntry::from_summary(
            CheckType::ScheduledPriceCheck,
            &summary,
            json!({ "price_source": price_source }),
        );
        if let Err(e) = self.store.append_monitoring_log(&entry).await {
            tracing::error!(error = %e, "Failed to write price check log entry");
        }

        Ok(summary)
    }

    /// Check one alert. Returns `true` if it triggered.
    async fn check_alert(&self, alert: &PriceAlert) -> Result<bool, AlertCheckError> {
        let quoted = tokio::time::timeout(self.fetch_timeout, self.source.quote(alert))
            .await
            .map_err(|_| AlertCheckError::Timeout(self.fetch_timeout))??;

        let now = Utc::now();
        let old_price = alert.current_price_cents;
        let mut updated = alert.clone();
        updated.last_checked_at = Some(now);

        let Some(new_price) = quoted else {
            tracing::debug!(alert_id = %alert.id, "No price available, keeping previous");
            self.store.update_alert(&updated).await?;
            return Ok(false);
        };

        self.store
            .append_price_history(&PriceHistoryEntry::new(
                &alert.product_id,
                new_price,
                self.source.kind(),
                now,
            ))
            .await?;

        updated.current_price_cents = new_price;
        let hit = alert.is_hit_by(new_price);

        if hit {
            updated.triggered = true;
            updated.triggered_at = Some(now);

            let notification =
                PriceNotification::for_alert(alert, PriceDrop::between(old_price, new_price), now);
            if !self.store.insert_notification(&notification).await? {
                tracing::debug!(
                    alert_id = %alert.id,
                    "Notification for this watch cycle already recorded"
                );
            }

            tracing::info!(
                alert_id = %alert.id,
                user_id = %alert.user_id,
                old_price,
                new_price,
                target = alert.target_price_cents,
                "Price alert triggered"
            );
        }

        self.store.update_alert(&updated).await?;
        Ok(hit)
    }
}
