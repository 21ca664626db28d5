//! Price alert types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::{AlertId, UserId};

/// Highest price an alert accepts, in cents ($1,000,000).
pub const MAX_PRICE_CENTS: i64 = 100_000_000;

fn check_price(field: &str, cents: i64) -> Result<()> {
    if cents <= 0 {
        return Err(CoreError::InvalidPrice(format!("{field} must be positive")));
    }
    if cents > MAX_PRICE_CENTS {
        return Err(CoreError::InvalidPrice(format!(
            "{field} must be at most {MAX_PRICE_CENTS} cents"
        )));
    }
    Ok(())
}

/// Product details copied onto an alert when it is created.
///
/// The snapshot is denormalized so notifications can be rendered without a
/// catalog lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    /// Product name.
    pub name: String,
    /// Brand name.
    pub brand: String,
    /// Product image URL.
    #[serde(default)]
    pub image_url: Option<String>,
    /// Affiliate purchase URL.
    #[serde(default)]
    pub purchase_url: Option<String>,
}

/// Lifecycle state of a price alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    /// Re-priced on every monitoring run.
    Watching,
    /// Target reached; ignored by monitoring until reset.
    Triggered,
}

/// A user's request to be told when a product drops to a target price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceAlert {
    /// Alert ID.
    pub id: AlertId,
    /// Owner.
    pub user_id: UserId,
    /// Catalog product reference.
    pub product_id: String,
    /// Product details at creation time.
    pub product: ProductSnapshot,
    /// Notify when the price is at or below this amount (cents).
    pub target_price_cents: i64,
    /// Last observed price (cents).
    pub current_price_cents: i64,
    /// Price when the alert was created (cents).
    pub original_price_cents: i64,
    /// Whether the target has been reached.
    pub triggered: bool,
    /// When the target was reached.
    pub triggered_at: Option<DateTime<Utc>>,
    /// When monitoring last re-priced the alert.
    pub last_checked_at: Option<DateTime<Utc>>,
    /// Start of the current watch cycle: creation, or the latest reset.
    pub watching_since: DateTime<Utc>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Input for creating a price alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPriceAlert {
    /// Catalog product reference.
    pub product_id: String,
    /// Product details.
    pub product: ProductSnapshot,
    /// Target price (cents).
    pub target_price_cents: i64,
    /// Price at the time the user set the alert (cents).
    pub current_price_cents: i64,
}

impl PriceAlert {
    /// Build a watching alert from validated input.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidPrice` if either price is not positive or is
    /// above [`MAX_PRICE_CENTS`], and
    /// `CoreError::InvalidInput` if the product reference is empty.
    pub fn create(user_id: UserId, input: NewPriceAlert, now: DateTime<Utc>) -> Result<Self> {
        if input.product_id.trim().is_empty() {
            return Err(CoreError::InvalidInput("product_id is required".into()));
        }
        check_price("target price", input.target_price_cents)?;
        check_price("current price", input.current_price_cents)?;

        Ok(Self {
            id: AlertId::generate(),
            user_id,
            product_id: input.product_id.trim().to_string(),
            product: input.product,
            target_price_cents: input.target_price_cents,
            current_price_cents: input.current_price_cents,
            original_price_cents: input.current_price_cents,
            triggered: false,
            triggered_at: None,
            last_checked_at: None,
            watching_since: now,
            created_at: now,
        })
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> AlertState {
        if self.triggered {
            AlertState::Triggered
        } else {
            AlertState::Watching
        }
    }

    /// Whether `price_cents` satisfies the alert's target.
    #[must_use]
    pub const fn is_hit_by(&self, price_cents: i64) -> bool {
        price_cents <= self.target_price_cents
    }

    /// Put a triggered alert back into the watching state.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidPrice` if a new target is given and is out of
    /// range.
    pub fn rewatch(&mut self, new_target_cents: Option<i64>, now: DateTime<Utc>) -> Result<()> {
        if let Some(target) = new_target_cents {
            check_price("target price", target)?;
            self.target_price_cents = target;
        }
        self.triggered = false;
        self.triggered_at = None;
        self.watching_since = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(target: i64, current: i64) -> NewPriceAlert {
        NewPriceAlert {
            product_id: "B0CHX1W1XY".into(),
            product: ProductSnapshot {
                name: "Air Max 90".into(),
                brand: "Nike".into(),
                image_url: None,
                purchase_url: Some("https://www.amazon.com/dp/B0CHX1W1XY?tag=solefeed-20".into()),
            },
            target_price_cents: target,
            current_price_cents: current,
        }
    }

    #[test]
    fn new_alert_is_watching() {
        let alert =
            PriceAlert::create(UserId::generate(), input(10000, 11000), Utc::now()).unwrap();
        assert_eq!(alert.state(), AlertState::Watching);
        assert_eq!(alert.original_price_cents, 11000);
        assert!(alert.last_checked_at.is_none());
    }

    #[test]
    fn target_is_inclusive() {
        let alert =
            PriceAlert::create(UserId::generate(), input(10000, 11000), Utc::now()).unwrap();
        assert!(alert.is_hit_by(10000));
        assert!(alert.is_hit_by(8500));
        assert!(!alert.is_hit_by(10001));
    }

    #[test]
    fn rejects_non_positive_prices() {
        let result = PriceAlert::create(UserId::generate(), input(0, 11000), Utc::now());
        assert!(matches!(result, Err(CoreError::InvalidPrice(_))));
    }

    #[test]
    fn price_ceiling_is_inclusive() {
        let at_cap = PriceAlert::create(
            UserId::generate(),
            input(MAX_PRICE_CENTS, MAX_PRICE_CENTS),
            Utc::now(),
        );
        assert!(at_cap.is_ok());

        let over = PriceAlert::create(
            UserId::generate(),
            input(10000, MAX_PRICE_CENTS + 1),
            Utc::now(),
        );
        assert!(matches!(over, Err(CoreError::InvalidPrice(_))));

        let huge = PriceAlert::create(UserId::generate(), input(10000, i64::MAX / 4), Utc::now());
        assert!(matches!(huge, Err(CoreError::InvalidPrice(_))));
    }

    #[test]
    fn rewatch_rejects_target_over_ceiling() {
        let mut alert =
            PriceAlert::create(UserId::generate(), input(10000, 11000), Utc::now()).unwrap();
        alert.triggered = true;

        assert!(alert.rewatch(Some(MAX_PRICE_CENTS + 1), Utc::now()).is_err());
        assert!(alert.triggered);
        assert_eq!(alert.target_price_cents, 10000);
    }

    #[test]
    fn rewatch_clears_trigger() {
        let mut alert =
            PriceAlert::create(UserId::generate(), input(10000, 11000), Utc::now()).unwrap();
        alert.triggered = true;
        alert.triggered_at = Some(Utc::now());

        let reset_at = Utc::now();
        alert.rewatch(Some(7500), reset_at).unwrap();
        assert_eq!(alert.state(), AlertState::Watching);
        assert_eq!(alert.watching_since, reset_at);
        assert!(alert.triggered_at.is_none());
        assert_eq!(alert.target_price_cents, 7500);
    }
}
