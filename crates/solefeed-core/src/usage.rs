//! Monthly AI-usage accounting.
//!
//! A user's allowance is tracked in a single [`UsageRecord`]. The counter is
//! only meaningful for the calendar month named by `period_start`; a record
//! from an earlier month counts as zero usage until the next write replaces it.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// Monthly analyses granted to a user without an explicit limit.
pub const DEFAULT_MONTHLY_LIMIT: i32 = 10;

/// Return the first instant of the UTC calendar month containing `now`.
#[must_use]
pub fn current_period_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Per-user monthly usage counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// The user this record belongs to.
    pub user_id: UserId,

    /// Analyses allowed per calendar month.
    pub monthly_limit: i32,

    /// Analyses reserved during `period_start`'s month.
    pub used_this_month: i32,

    /// First instant of the month the counter refers to.
    pub period_start: DateTime<Utc>,

    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

impl UsageRecord {
    /// A record for a user that has never used the feature.
    #[must_use]
    pub fn fresh(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            monthly_limit: DEFAULT_MONTHLY_LIMIT,
            used_this_month: 0,
            period_start: current_period_start(now),
            updated_at: now,
        }
    }

    /// Whether the stored counter belongs to the month containing `now`.
    #[must_use]
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.period_start == current_period_start(now)
    }

    /// Usage that counts against this month's limit.
    #[must_use]
    pub fn effective_used(&self, now: DateTime<Utc>) -> i32 {
        if self.is_current(now) {
            self.used_this_month.max(0)
        } else {
            0
        }
    }

    /// Analyses still available this month (never negative).
    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> i32 {
        (self.monthly_limit - self.effective_used(now)).max(0)
    }

    /// Client-facing view of the record.
    #[must_use]
    pub fn snapshot(&self, now: DateTime<Utc>) -> UsageSnapshot {
        UsageSnapshot {
            monthly_limit: self.monthly_limit,
            remaining: self.remaining(now),
        }
    }
}

/// Remaining allowance as reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    /// Analyses allowed per month.
    pub monthly_limit: i32,
    /// Analyses left this month.
    pub remaining: i32,
}
