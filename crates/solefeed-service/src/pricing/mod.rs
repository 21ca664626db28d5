//! Price sources for the monitor.
//!
//! One interface, two strategies: [`SimulatedPriceSource`] perturbs the last
//! known price for demos and staging; [`LivePriceSource`] asks the Product
//! Advertising API.

pub mod catalog;
pub mod live;
pub mod simulated;

pub use live::LivePriceSource;
pub use simulated::SimulatedPriceSource;

use async_trait::async_trait;

use solefeed_core::{PriceAlert, PriceSourceKind};

/// Errors while fetching a price.
#[derive(Debug, thiserror::Error)]
pub enum PriceSourceError {
    /// No catalog identifier could be derived from the alert.
    #[error("no catalog identifier for product {0}")]
    MissingIdentifier(String),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The product API returned an error status.
    #[error("product API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// The response could not be understood.
    #[error("invalid product API response: {0}")]
    InvalidResponse(String),
}

/// Produces a fresh price for a watched product.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Which strategy this is, for history rows and monitoring logs.
    fn kind(&self) -> PriceSourceKind;

    /// Current price in cents, or `None` if the source has no price right now.
    async fn quote(&self, alert: &PriceAlert) -> Result<Option<i64>, PriceSourceError>;
}
