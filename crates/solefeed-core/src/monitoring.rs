//! Batch job bookkeeping: price history and the monitoring audit log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::EntryId;

/// Which batch produced a monitoring log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckType {
    /// The price monitoring pipeline.
    ScheduledPriceCheck,
    /// The notification delivery step.
    EmailSend,
}

impl CheckType {
    /// Get the check type as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ScheduledPriceCheck => "scheduled_price_check",
            Self::EmailSend => "email_send",
        }
    }

    /// Parse the stored string form.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "scheduled_price_check" => Some(Self::ScheduledPriceCheck),
            "email_send" => Some(Self::EmailSend),
            _ => None,
        }
    }
}

/// Where a price observation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSourceKind {
    /// Random walk around the last known price.
    Simulated,
    /// External product API.
    Live,
}

impl PriceSourceKind {
    /// Get the source name as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Simulated => "simulated",
            Self::Live => "live",
        }
    }

    /// Parse the stored string form.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "simulated" => Some(Self::Simulated),
            "live" => Some(Self::Live),
            _ => None,
        }
    }
}

/// Counts reported by a batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Items the batch attempted.
    pub processed: u32,
    /// Items that fired (alerts triggered, or notifications delivered).
    pub triggered: u32,
    /// Items that failed and were skipped.
    pub errors: u32,
    /// Wall-clock duration of the run.
    pub duration_ms: u64,
}

impl BatchSummary {
    /// Whether any item in the batch failed.
    #[must_use]
    pub const fn is_partial_failure(&self) -> bool {
        self.errors > 0
    }
}

/// Append-only audit row written once per batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringLogEntry {
    /// Entry ID.
    pub id: EntryId,
    /// Which batch ran.
    pub check_type: CheckType,
    /// Items attempted.
    pub processed: u32,
    /// Items that fired.
    pub triggered: u32,
    /// Items that failed.
    pub errors: u32,
    /// Wall-clock duration.
    pub duration_ms: u64,
    /// Free-form context (price source, error samples).
    pub metadata: serde_json::Value,
    /// When the run finished.
    pub created_at: DateTime<Utc>,
}

impl MonitoringLogEntry {
    /// Build a log entry from a batch summary.
    #[must_use]
    pub fn from_summary(
        check_type: CheckType,
        summary: &BatchSummary,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: EntryId::generate(),
            check_type,
            processed: summary.processed,
            triggered: summary.triggered,
            errors: summary.errors,
            duration_ms: summary.duration_ms,
            metadata,
            created_at: Utc::now(),
        }
    }
}

/// One observed price for a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceHistoryEntry {
    /// Entry ID.
    pub id: EntryId,
    /// Catalog product reference.
    pub product_id: String,
    /// Observed price (cents).
    pub price_cents: i64,
    /// Where the observation came from.
    pub source: PriceSourceKind,
    /// Observation time.
    pub recorded_at: DateTime<Utc>,
}

impl PriceHistoryEntry {
    /// Record a price observation.
    #[must_use]
    pub fn new(
        product_id: impl Into<String>,
        price_cents: i64,
        source: PriceSourceKind,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EntryId::generate(),
            product_id: product_id.into(),
            price_cents,
            source,
            recorded_at,
        }
    }
}
