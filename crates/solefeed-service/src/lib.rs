//! SoleFeed HTTP API Service.
//!
//! This crate provides the backend service for SoleFeed, including:
//!
//! - The quota-guarded AI outfit rating endpoint
//! - Price alert management and the notification inbox
//! - The price monitoring batch and price-drop email delivery
//! - Admin monitoring read-outs
//!
//! # Authentication
//!
//! The service supports three authentication methods:
//!
//! 1. **HS256 JWT bearer tokens** - For end-user requests
//! 2. **Service API keys** - For scheduler and cron callers of the batch jobs
//! 3. **Admin API keys** - For the admin surface

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::unused_async)]

pub mod auth;
pub mod classifier;
pub mod config;
pub mod crypto;
pub mod delivery;
pub mod error;
pub mod handlers;
pub mod monitor;
pub mod pricing;
pub mod quota;
pub mod rate_limit;
pub mod routes;
pub mod scheduler;
pub mod state;

pub use classifier::{ClassifierError, HttpOutfitClassifier, OutfitClassifier};
pub use config::{ConfigError, ServiceConfig};
pub use delivery::{AlertDelivery, DeliveryError, EmailNotifier, Notifier};
pub use error::ApiError;
pub use monitor::PriceMonitor;
pub use pricing::{LivePriceSource, PriceSource, PriceSourceError, SimulatedPriceSource};
pub use quota::{QuotaError, QuotaGuard, Reservation};
pub use rate_limit::{LocalRateLimiter, RateLimiter, StoreRateLimiter};
pub use routes::create_router;
pub use state::AppState;
