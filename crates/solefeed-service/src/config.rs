//! Service configuration.

use std::path::Path;

use serde::Deserialize;
use solefeed_core::PriceSourceKind;

/// Configuration errors. The service refuses to start on any of these.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required setting is absent.
    #[error("missing required configuration: {0}")]
    Missing(&'static str),

    /// A setting has a value the service does not understand.
    #[error("invalid value for {name}: {value}")]
    Invalid {
        /// Environment variable name.
        name: &'static str,
        /// The rejected value.
        value: String,
    },

    /// A configured integration could not be constructed.
    #[error("failed to initialise {name}: {reason}")]
    Integration {
        /// Integration name.
        name: &'static str,
        /// Underlying error.
        reason: String,
    },
}

/// Which storage backend to run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// PostgreSQL via `DATABASE_URL`.
    Postgres,
    /// Process-local maps. State is lost on restart.
    Memory,
}

/// Where request rate-limit counters live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitBackend {
    /// Fixed-window counters in the shared store.
    Store,
    /// Per-instance token buckets (best effort).
    Local,
}

/// Product Advertising API credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct PaapiConfig {
    /// Access key ID.
    pub access_key: String,
    /// Secret access key.
    pub secret_key: String,
    /// Associates partner tag.
    pub partner_tag: String,
    /// API host (default: `webservices.amazon.com`).
    #[serde(default = "default_paapi_host")]
    pub host: String,
    /// Signing region (default: `us-east-1`).
    #[serde(default = "default_paapi_region")]
    pub region: String,
}

/// Transactional email API settings.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    /// API base URL (default: `https://api.resend.com`).
    #[serde(default = "default_email_api_url")]
    pub api_url: String,
    /// Bearer API key.
    pub api_key: String,
    /// Sender address.
    #[serde(default = "default_email_from")]
    pub from: String,
}

fn default_paapi_host() -> String {
    "webservices.amazon.com".into()
}

fn default_paapi_region() -> String {
    "us-east-1".into()
}

fn default_email_api_url() -> String {
    "https://api.resend.com".into()
}

fn default_email_from() -> String {
    "SoleFeed <alerts@solefeed.app>".into()
}

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Storage backend (default: postgres).
    pub store_backend: StoreBackend,

    /// PostgreSQL connection string.
    pub database_url: Option<String>,

    /// Pool size (default: 10).
    pub database_max_connections: u32,

    /// HS256 secret used to verify user JWTs.
    pub jwt_secret: Option<String>,

    /// Expected JWT audience (default: "authenticated").
    pub auth_audience: String,

    /// API key for the batch job endpoints.
    pub service_api_key: Option<String>,

    /// API key for the admin endpoints.
    pub admin_api_key: Option<String>,

    /// Outfit classification endpoint.
    pub classifier_url: Option<String>,

    /// Bearer key sent to the classifier.
    pub classifier_api_key: Option<String>,

    /// Classifier request timeout (default: 30).
    pub classifier_timeout_seconds: u64,

    /// Price source used by the monitor (default: simulated).
    pub price_source: PriceSourceKind,

    /// Product API credentials, required for the live source.
    pub paapi: Option<PaapiConfig>,

    /// Per-alert price fetch timeout (default: 10).
    pub price_fetch_timeout_seconds: u64,

    /// Email API settings. Delivery is disabled without them.
    pub email: Option<EmailConfig>,

    /// Public site URL used for links in emails.
    pub site_url: String,

    /// Run the price check every N seconds in-process.
    pub price_check_interval_seconds: Option<u64>,

    /// Run alert delivery every N seconds in-process.
    pub alert_delivery_interval_seconds: Option<u64>,

    /// Analyze requests allowed per user per minute (default: 5).
    pub analyze_rate_limit_per_minute: u32,

    /// Rate limiter backend (default: store).
    pub rate_limit_backend: RateLimitBackend,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes. Must leave room for a 10 MB
    /// image after base64 expansion.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,
}

/// Default body limit: 10 MB of image, base64-encoded, plus JSON framing.
const DEFAULT_MAX_BODY_BYTES: usize = 15 * 1024 * 1024;

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if an enumerated setting has an
    /// unknown value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let store_backend = match env_or("STORE_BACKEND", "postgres").as_str() {
            "postgres" => StoreBackend::Postgres,
            "memory" => StoreBackend::Memory,
            other => {
                return Err(ConfigError::Invalid {
                    name: "STORE_BACKEND",
                    value: other.into(),
                })
            }
        };

        let source = env_or("PRICE_SOURCE", "simulated");
        let price_source = PriceSourceKind::parse(&source).ok_or(ConfigError::Invalid {
            name: "PRICE_SOURCE",
            value: source,
        })?;

        let rate_limit_backend = match env_or("RATE_LIMIT_BACKEND", "store").as_str() {
            "store" => RateLimitBackend::Store,
            "local" => RateLimitBackend::Local,
            other => {
                return Err(ConfigError::Invalid {
                    name: "RATE_LIMIT_BACKEND",
                    value: other.into(),
                })
            }
        };

        let defaults = Self::default();

        Ok(Self {
            listen_addr: env_or("LISTEN_ADDR", &defaults.listen_addr),
            store_backend,
            database_url: std::env::var("DATABASE_URL").ok(),
            database_max_connections: env_parse("DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            jwt_secret: std::env::var("JWT_SECRET").ok(),
            auth_audience: env_or("AUTH_AUDIENCE", &defaults.auth_audience),
            service_api_key: std::env::var("SERVICE_API_KEY").ok(),
            admin_api_key: std::env::var("ADMIN_API_KEY").ok(),
            classifier_url: std::env::var("CLASSIFIER_URL").ok(),
            classifier_api_key: std::env::var("CLASSIFIER_API_KEY").ok(),
            classifier_timeout_seconds: env_parse("CLASSIFIER_TIMEOUT_SECONDS")
                .unwrap_or(defaults.classifier_timeout_seconds),
            price_source,
            paapi: load_paapi_secrets(),
            price_fetch_timeout_seconds: env_parse("PRICE_FETCH_TIMEOUT_SECONDS")
                .unwrap_or(defaults.price_fetch_timeout_seconds),
            email: load_email_secrets(),
            site_url: env_or("SITE_URL", &defaults.site_url),
            price_check_interval_seconds: env_parse("PRICE_CHECK_INTERVAL_SECONDS"),
            alert_delivery_interval_seconds: env_parse("ALERT_DELIVERY_INTERVAL_SECONDS"),
            analyze_rate_limit_per_minute: env_parse("ANALYZE_RATE_LIMIT_PER_MINUTE")
                .unwrap_or(defaults.analyze_rate_limit_per_minute),
            rate_limit_backend,
            cors_origins: env_or("CORS_ORIGINS", "*")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            max_body_bytes: env_parse("MAX_BODY_BYTES").unwrap_or(defaults.max_body_bytes),
            request_timeout_seconds: env_parse("REQUEST_TIMEOUT_SECONDS")
                .unwrap_or(defaults.request_timeout_seconds),
        })
    }

    /// Check that every setting the selected features depend on is present.
    ///
    /// # Errors
    ///
    /// Returns the first missing or invalid setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store_backend == StoreBackend::Postgres && self.database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }
        if self.jwt_secret.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::Missing("JWT_SECRET"));
        }
        if self.price_source == PriceSourceKind::Live && self.paapi.is_none() {
            return Err(ConfigError::Missing(
                "PAAPI_ACCESS_KEY, PAAPI_SECRET_KEY and PAAPI_PARTNER_TAG",
            ));
        }
        if self.analyze_rate_limit_per_minute == 0 {
            return Err(ConfigError::Invalid {
                name: "ANALYZE_RATE_LIMIT_PER_MINUTE",
                value: "0".into(),
            });
        }
        for (name, interval) in [
            ("PRICE_CHECK_INTERVAL_SECONDS", self.price_check_interval_seconds),
            ("ALERT_DELIVERY_INTERVAL_SECONDS", self.alert_delivery_interval_seconds),
        ] {
            if interval == Some(0) {
                return Err(ConfigError::Invalid {
                    name,
                    value: "0".into(),
                });
            }
        }
        Ok(())
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

/// Load product API credentials from file or environment.
fn load_paapi_secrets() -> Option<PaapiConfig> {
    let secret_paths = [".secrets/paapi.json", "../.secrets/paapi.json"];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<PaapiConfig>(path) {
            tracing::info!(path = %path, "Loaded product API secrets from file");
            return Some(secrets);
        }
    }

    tracing::debug!("Product API secrets file not found, using environment variables");
    Some(PaapiConfig {
        access_key: std::env::var("PAAPI_ACCESS_KEY").ok()?,
        secret_key: std::env::var("PAAPI_SECRET_KEY").ok()?,
        partner_tag: std::env::var("PAAPI_PARTNER_TAG").ok()?,
        host: std::env::var("PAAPI_HOST").unwrap_or_else(|_| default_paapi_host()),
        region: std::env::var("PAAPI_REGION").unwrap_or_else(|_| default_paapi_region()),
    })
}

/// Load email API settings from file or environment.
fn load_email_secrets() -> Option<EmailConfig> {
    let secret_paths = [".secrets/email.json", "../.secrets/email.json"];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<EmailConfig>(path) {
            tracing::info!(path = %path, "Loaded email secrets from file");
            return Some(secrets);
        }
    }

    tracing::debug!("Email secrets file not found, using environment variables");
    Some(EmailConfig {
        api_url: std::env::var("EMAIL_API_URL").unwrap_or_else(|_| default_email_api_url()),
        api_key: std::env::var("EMAIL_API_KEY").ok()?,
        from: std::env::var("EMAIL_FROM").unwrap_or_else(|_| default_email_from()),
    })
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            store_backend: StoreBackend::Memory,
            database_url: None,
            database_max_connections: 10,
            jwt_secret: None,
            auth_audience: "authenticated".into(),
            service_api_key: None,
            admin_api_key: None,
            classifier_url: None,
            classifier_api_key: None,
            classifier_timeout_seconds: 30,
            price_source: PriceSourceKind::Simulated,
            paapi: None,
            price_fetch_timeout_seconds: 10,
            email: None,
            site_url: "http://localhost:3000".into(),
            price_check_interval_seconds: None,
            alert_delivery_interval_seconds: None,
            analyze_rate_limit_per_minute: 5,
            rate_limit_backend: RateLimitBackend::Store,
            cors_origins: vec!["*".into()],
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            request_timeout_seconds: 30,
        }
    }
}
