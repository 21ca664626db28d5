//! Price-drop notification types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AlertId, NotificationId, PriceAlert, ProductSnapshot, UserId};

/// Savings computed for a triggered alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceDrop {
    /// Price before the check (cents).
    pub old_price_cents: i64,
    /// Price observed by the check (cents).
    pub new_price_cents: i64,
    /// `old - new`, floored at zero (cents).
    pub saved_amount_cents: i64,
    /// `round(saved / old * 100)`, or 0 when `old` is not positive.
    pub percent_off: i32,
}

impl PriceDrop {
    /// Compute savings between two prices.
    #[must_use]
    pub fn between(old_price_cents: i64, new_price_cents: i64) -> Self {
        let saved_amount_cents = old_price_cents.saturating_sub(new_price_cents).max(0);
        let percent_off = if old_price_cents > 0 {
            // Round half up; i128 keeps `saved * 100` from overflowing.
            let old = i128::from(old_price_cents);
            let scaled = (i128::from(saved_amount_cents) * 100 + old / 2) / old;
            i32::try_from(scaled).unwrap_or(i32::MAX)
        } else {
            0
        };

        Self {
            old_price_cents,
            new_price_cents,
            saved_amount_cents,
            percent_off,
        }
    }
}

/// A record telling a user their alert fired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceNotification {
    /// Notification ID.
    pub id: NotificationId,
    /// Recipient.
    pub user_id: UserId,
    /// Alert that fired.
    pub alert_id: AlertId,
    /// Watch cycle of the alert that fired. At most one notification exists
    /// per `(alert_id, watching_since)`.
    pub watching_since: DateTime<Utc>,
    /// Catalog product reference.
    pub product_id: String,
    /// Product details copied from the alert.
    pub product: ProductSnapshot,
    /// Price before the drop (cents).
    pub old_price_cents: i64,
    /// Price after the drop (cents).
    pub new_price_cents: i64,
    /// Savings (cents).
    pub saved_amount_cents: i64,
    /// Whole-number percentage saved.
    pub percent_off: i32,
    /// Set by the user from the inbox.
    pub read: bool,
    /// Set once an email was accepted by the delivery provider.
    pub notification_sent: bool,
    /// Failed delivery attempts so far.
    pub delivery_attempts: i32,
    /// Most recent delivery failure.
    pub last_delivery_error: Option<String>,
    /// Earliest time the next delivery attempt may run.
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// Delivery was abandoned after too many attempts.
    pub delivery_failed: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl PriceNotification {
    /// Create the notification for an alert whose price crossed its target.
    #[must_use]
    pub fn for_alert(alert: &PriceAlert, drop: PriceDrop, now: DateTime<Utc>) -> Self {
        Self {
            id: NotificationId::generate(),
            user_id: alert.user_id,
            alert_id: alert.id,
            watching_since: alert.watching_since,
            product_id: alert.product_id.clone(),
            product: alert.product.clone(),
            old_price_cents: drop.old_price_cents,
            new_price_cents: drop.new_price_cents,
            saved_amount_cents: drop.saved_amount_cents,
            percent_off: drop.percent_off,
            read: false,
            notification_sent: false,
            delivery_attempts: 0,
            last_delivery_error: None,
            next_attempt_at: None,
            delivery_failed: false,
            created_at: now,
        }
    }

    /// Whether the delivery step should pick this row up at `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.notification_sent
            && !self.delivery_failed
            && self.next_attempt_at.map_or(true, |at| at <= now)
    }
}
