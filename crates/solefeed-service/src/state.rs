//! Application state.

use std::sync::Arc;
use std::time::Duration;

use solefeed_core::PriceSourceKind;
use solefeed_store::Store;

use crate::classifier::{HttpOutfitClassifier, OutfitClassifier};
use crate::config::{ConfigError, RateLimitBackend, ServiceConfig};
use crate::delivery::{EmailNotifier, Notifier};
use crate::pricing::{LivePriceSource, PriceSource, SimulatedPriceSource};
use crate::rate_limit::{LocalRateLimiter, RateLimiter, StoreRateLimiter};

/// Window for the analyze rate limit.
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Outfit classifier (optional).
    pub classifier: Option<Arc<dyn OutfitClassifier>>,

    /// Price source used by the monitoring batch.
    pub price_source: Arc<dyn PriceSource>,

    /// Price-drop notifier (optional).
    pub notifier: Option<Arc<dyn Notifier>>,

    /// Rate limiter for the analyze endpoint.
    pub rate_limiter: Arc<dyn RateLimiter>,
}

impl AppState {
    /// Create application state, building every integration the config enables.
    ///
    /// # Errors
    ///
    /// Returns an error if the live price source is selected without
    /// credentials, or an HTTP client cannot be built.
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Result<Self, ConfigError> {
        let classifier = match &config.classifier_url {
            Some(url) => {
                tracing::info!(classifier_url = %url, "Outfit classifier enabled");
                let client = HttpOutfitClassifier::new(
                    url.clone(),
                    config.classifier_api_key.clone(),
                    Duration::from_secs(config.classifier_timeout_seconds),
                )
                .map_err(|e| integration("outfit classifier", &e))?;
                Some(Arc::new(client) as Arc<dyn OutfitClassifier>)
            }
            None => {
                tracing::warn!("Classifier not configured - outfit analysis will not be available");
                None
            }
        };

        let price_source: Arc<dyn PriceSource> = match config.price_source {
            PriceSourceKind::Simulated => {
                tracing::info!("Using simulated price source");
                Arc::new(SimulatedPriceSource::new())
            }
            PriceSourceKind::Live => {
                let paapi = config.paapi.clone().ok_or(ConfigError::Missing(
                    "PAAPI_ACCESS_KEY, PAAPI_SECRET_KEY and PAAPI_PARTNER_TAG",
                ))?;
                tracing::info!(
                    host = %paapi.host,
                    region = %paapi.region,
                    "Using live price source"
                );
                let source = LivePriceSource::new(
                    paapi,
                    Duration::from_secs(config.price_fetch_timeout_seconds),
                )
                .map_err(|e| integration("live price source", &e))?;
                Arc::new(source)
            }
        };

        let notifier = match &config.email {
            Some(email) => {
                tracing::info!(api_url = %email.api_url, "Email delivery enabled");
                let notifier = EmailNotifier::new(email.clone(), config.site_url.clone())
                    .map_err(|e| integration("email notifier", &e))?;
                Some(Arc::new(notifier) as Arc<dyn Notifier>)
            }
            None => {
                tracing::warn!("Email not configured - price alerts will not be delivered");
                None
            }
        };

        let per_minute = config.analyze_rate_limit_per_minute;
        let rate_limiter: Arc<dyn RateLimiter> = match config.rate_limit_backend {
            RateLimitBackend::Store => Arc::new(StoreRateLimiter::new(
                store.clone(),
                per_minute,
                RATE_LIMIT_WINDOW,
            )),
            RateLimitBackend::Local => {
                tracing::warn!("Using per-instance rate limiting");
                Arc::new(LocalRateLimiter::new(per_minute, RATE_LIMIT_WINDOW))
            }
        };

        Ok(Self {
            store,
            config,
            classifier,
            price_source,
            notifier,
            rate_limiter,
        })
    }

    /// Replace the outfit classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn OutfitClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Replace the price source.
    #[must_use]
    pub fn with_price_source(mut self, price_source: Arc<dyn PriceSource>) -> Self {
        self.price_source = price_source;
        self
    }

    /// Replace the notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Replace the analyze rate limiter.
    #[must_use]
    pub fn with_rate_limiter(mut self, rate_limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    /// Check if the classifier is configured.
    #[must_use]
    pub fn has_classifier(&self) -> bool {
        self.classifier.is_some()
    }

    /// Check if email delivery is configured.
    #[must_use]
    pub fn has_notifier(&self) -> bool {
        self.notifier.is_some()
    }
}

fn integration(name: &'static str, err: &dyn std::error::Error) -> ConfigError {
    ConfigError::Integration {
        name,
        reason: err.to_string(),
    }
}
