//! Monthly AI-usage quota guard.
//!
//! Quota is reserved before the classifier is called and given back if the
//! call fails. The check and the write are separate store operations, so two
//! concurrent requests from the same user may both pass the check when one
//! analysis is left. That overshoot is accepted as a soft limit.

use chrono::{DateTime, Utc};

use solefeed_core::{current_period_start, UsageRecord, UsageSnapshot, UserId};
use solefeed_store::{StoreError, UsageStore};

use crate::error::ApiError;

/// A successfully reserved analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    /// Who reserved.
    pub user_id: UserId,
    /// Month the reservation was counted against.
    pub period_start: DateTime<Utc>,
    /// Limit at reservation time.
    pub monthly_limit: i32,
    /// Analyses left after this one.
    pub remaining: i32,
}

impl Reservation {
    /// Client-facing usage view.
    #[must_use]
    pub const fn usage(&self) -> UsageSnapshot {
        UsageSnapshot {
            monthly_limit: self.monthly_limit,
            remaining: self.remaining,
        }
    }
}

/// Why a reservation was refused.
#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    /// The allowance for this month is used up. Nothing was written.
    #[error("monthly quota exceeded (limit {monthly_limit})")]
    Exceeded {
        /// Analyses allowed per month.
        monthly_limit: i32,
        /// Always zero.
        remaining: i32,
    },

    /// The store failed. Not a quota decision.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<QuotaError> for ApiError {
    fn from(err: QuotaError) -> Self {
        match err {
            QuotaError::Exceeded {
                monthly_limit,
                remaining,
            } => Self::QuotaExceeded {
                monthly_limit,
                remaining,
            },
            QuotaError::Store(e) => e.into(),
        }
    }
}

/// Gate for the monthly allowance.
pub struct QuotaGuard<'a, S: UsageStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: UsageStore + ?Sized> QuotaGuard<'a, S> {
    /// Create a guard over `store`.
    pub const fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Reserve one analysis for `user_id`.
    ///
    /// A stale record (from an earlier month) counts as zero usage and is
    /// reset by the same write that reserves.
    pub async fn check_and_reserve(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Reservation, QuotaError> {
        let record = self
            .store
            .get_usage(&user_id)
            .await?
            .unwrap_or_else(|| UsageRecord::fresh(user_id, now));

        let used = record.effective_used(now);
        if record.monthly_limit - used <= 0 {
            tracing::info!(
                user_id = %user_id,
                monthly_limit = record.monthly_limit,
                "Monthly analysis quota exhausted"
            );
            return Err(QuotaError::Exceeded {
                monthly_limit: record.monthly_limit,
                remaining: 0,
            });
        }

        let period_start = current_period_start(now);
        let updated = UsageRecord {
            used_this_month: used + 1,
            period_start,
            updated_at: now,
            ..record
        };
        self.store.upsert_usage(&updated).await?;

        let reservation = Reservation {
            user_id,
            period_start,
            monthly_limit: updated.monthly_limit,
            remaining: updated.monthly_limit - updated.used_this_month,
        };

        tracing::debug!(
            user_id = %user_id,
            remaining = reservation.remaining,
            "Analysis quota reserved"
        );

        Ok(reservation)
    }

    /// Give back a reservation after the downstream call failed.
    ///
    /// Only decrements if the stored record still belongs to the reserved
    /// month. Errors are logged and swallowed.
    pub async fn rollback_on_failure(&self, reservation: &Reservation) {
        match self
            .store
            .release_usage(&reservation.user_id, reservation.period_start)
            .await
        {
            Ok(true) => {
                tracing::info!(user_id = %reservation.user_id, "Analysis quota released");
            }
            Ok(false) => {
                tracing::info!(
                    user_id = %reservation.user_id,
                    "Quota period changed since reservation, nothing released"
                );
            }
            Err(e) => {
                tracing::error!(
                    user_id = %reservation.user_id,
                    error = %e,
                    "Failed to release analysis quota"
                );
            }
        }
    }

    /// The user's current usage without changing it.
    pub async fn current(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<UsageRecord, StoreError> {
        let record = self
            .store
            .get_usage(&user_id)
            .await?
            .unwrap_or_else(|| UsageRecord::fresh(user_id, now));

        Ok(as_of(record, now))
    }

    /// Set a per-user monthly limit, keeping the current counter.
    pub async fn set_monthly_limit(
        &self,
        user_id: UserId,
        monthly_limit: i32,
        now: DateTime<Utc>,
    ) -> Result<UsageRecord, StoreError> {
        let record = self
            .store
            .set_monthly_limit(&user_id, monthly_limit, current_period_start(now), now)
            .await?;
        Ok(as_of(record, now))
    }
}

/// A stored record as seen from `now`: a stale month reads as unused.
fn as_of(record: UsageRecord, now: DateTime<Utc>) -> UsageRecord {
    if record.is_current(now) {
        record
    } else {
        UsageRecord {
            used_this_month: 0,
            period_start: current_period_start(now),
            ..record
        }
    }
}
