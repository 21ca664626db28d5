//! Core types and utilities for the SoleFeed backend.
//!
//! This crate provides the domain types shared by the store and the service:
//!
//! - **Identifiers**: `UserId`, `AlertId`, `NotificationId`, `EntryId`
//! - **Usage**: `UsageRecord`, `UsageSnapshot`, quota period math
//! - **Alerts**: `PriceAlert`, `ProductSnapshot`, `AlertState`
//! - **Notifications**: `PriceNotification`, `PriceDrop`
//! - **Monitoring**: `MonitoringLogEntry`, `PriceHistoryEntry`, `BatchSummary`
//! - **Outfits**: `OutfitAnalysis` sanitizing and `ImagePayload` validation
//!
//! # Money
//!
//! All prices are stored as `i64` integer cents to avoid floating point drift.
//! `$110.00` is `11000`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod alert;
pub mod error;
pub mod ids;
pub mod monitoring;
pub mod notification;
pub mod outfit;
pub mod usage;

pub use alert::{AlertState, NewPriceAlert, PriceAlert, ProductSnapshot, MAX_PRICE_CENTS};
pub use error::{CoreError, Result};
pub use ids::{AlertId, EntryId, IdError, NotificationId, UserId};
pub use monitoring::{
    BatchSummary, CheckType, MonitoringLogEntry, PriceHistoryEntry, PriceSourceKind,
};
pub use notification::{PriceDrop, PriceNotification};
pub use outfit::{ImagePayload, OutfitAnalysis, MAX_IMAGE_BYTES};
pub use usage::{current_period_start, UsageRecord, UsageSnapshot, DEFAULT_MONTHLY_LIMIT};
