//! Common test utilities for solefeed integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum_test::TestServer;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;

use solefeed_core::{
    ImagePayload, OutfitAnalysis, PriceAlert, PriceNotification, PriceSourceKind, UserId,
};
use solefeed_service::auth::JwtClaims;
use solefeed_service::{
    create_router, AppState, ClassifierError, DeliveryError, Notifier, OutfitClassifier,
    PriceSource, PriceSourceError, ServiceConfig,
};
use solefeed_store::MemoryStore;

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const SERVICE_API_KEY: &str = "test-service-key";
pub const ADMIN_API_KEY: &str = "test-admin-key";

/// A tiny valid base64 image.
pub const IMAGE: &str = "aGVsbG8=";

// ============================================================================
// Fakes
// ============================================================================

/// How the fake classifier answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierMode {
    Ok,
    Fail,
    Busy,
}

/// Classifier returning a fixed analysis, or failing on demand.
pub struct FakeClassifier {
    mode: Mutex<ClassifierMode>,
    calls: Mutex<u32>,
}

impl FakeClassifier {
    fn new() -> Self {
        Self {
            mode: Mutex::new(ClassifierMode::Ok),
            calls: Mutex::new(0),
        }
    }

    pub fn set_mode(&self, mode: ClassifierMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl OutfitClassifier for FakeClassifier {
    async fn classify(&self, _image: &ImagePayload) -> Result<OutfitAnalysis, ClassifierError> {
        *self.calls.lock().unwrap() += 1;
        let mode = *self.mode.lock().unwrap();
        match mode {
            ClassifierMode::Ok => Ok(OutfitAnalysis {
                rating: 8.5,
                feedback: "<b>Sharp</b> look".into(),
                style_tags: vec!["streetwear".into()],
                dominant_colors: vec!["white".into()],
                detected_shoe: Some("Air Force 1".into()),
            }),
            ClassifierMode::Fail => Err(ClassifierError::Api {
                status: 500,
                message: "model crashed".into(),
            }),
            ClassifierMode::Busy => Err(ClassifierError::Busy("status 429".into())),
        }
    }
}

/// Price source answering from a per-product table. Unknown products fail.
#[derive(Default)]
pub struct ScriptedPriceSource {
    prices: Mutex<HashMap<String, Option<i64>>>,
    delay: Mutex<Duration>,
}

impl ScriptedPriceSource {
    /// Make every quote take `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn set_price(&self, product_id: &str, price: Option<i64>) {
        self.prices
            .lock()
            .unwrap()
            .insert(product_id.to_string(), price);
    }
}

#[async_trait]
impl PriceSource for ScriptedPriceSource {
    fn kind(&self) -> PriceSourceKind {
        PriceSourceKind::Simulated
    }

    async fn quote(&self, alert: &PriceAlert) -> Result<Option<i64>, PriceSourceError> {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.prices
            .lock()
            .unwrap()
            .get(&alert.product_id)
            .copied()
            .ok_or_else(|| PriceSourceError::MissingIdentifier(alert.product_id.clone()))
    }
}

/// Notifier recording every accepted message.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, PriceNotification)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_price_drop(
        &self,
        recipient: &str,
        notification: &PriceNotification,
    ) -> Result<(), DeliveryError> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), notification.clone()));
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Direct handle on the backing store.
    pub store: Arc<MemoryStore>,
    /// A test user ID for authenticated requests.
    pub test_user_id: UserId,
    /// The fake classifier, if one was installed.
    pub classifier: Arc<FakeClassifier>,
    /// The scripted price source.
    pub prices: Arc<ScriptedPriceSource>,
    /// The recording notifier.
    pub notifier: Arc<RecordingNotifier>,
}

/// Knobs for building a harness.
pub struct HarnessOptions {
    pub analyze_rate_limit_per_minute: u32,
    pub request_timeout_seconds: u64,
    pub with_classifier: bool,
    pub with_notifier: bool,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            analyze_rate_limit_per_minute: 100,
            request_timeout_seconds: 30,
            with_classifier: true,
            with_notifier: true,
        }
    }
}

impl TestHarness {
    /// Create a new test harness with a fresh in-memory store.
    pub fn new() -> Self {
        Self::with_options(HarnessOptions::default())
    }

    /// Create a harness with non-default options.
    pub fn with_options(options: HarnessOptions) -> Self {
        let store = Arc::new(MemoryStore::new());

        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            jwt_secret: Some(JWT_SECRET.into()),
            service_api_key: Some(SERVICE_API_KEY.into()),
            admin_api_key: Some(ADMIN_API_KEY.into()),
            analyze_rate_limit_per_minute: options.analyze_rate_limit_per_minute,
            request_timeout_seconds: options.request_timeout_seconds,
            cors_origins: vec!["*".into()],
            ..ServiceConfig::default()
        };

        let classifier = Arc::new(FakeClassifier::new());
        let prices = Arc::new(ScriptedPriceSource::default());
        let notifier = Arc::new(RecordingNotifier::default());

        let mut state = AppState::new(store.clone(), config)
            .expect("Failed to build app state")
            .with_price_source(prices.clone());
        if options.with_classifier {
            state = state.with_classifier(classifier.clone());
        }
        if options.with_notifier {
            state = state.with_notifier(notifier.clone());
        }

        let router: Router = create_router(state);
        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            test_user_id: UserId::generate(),
            classifier,
            prices,
            notifier,
        }
    }

    /// Get the authorization header for user authentication.
    pub fn user_auth_header(&self) -> String {
        bearer_for(self.test_user_id)
    }

    /// Get a different user's auth header (for testing isolation).
    pub fn other_user_auth_header() -> String {
        bearer_for(UserId::generate())
    }

    /// Create an alert for the test user and return its ID.
    pub async fn create_alert(&self, product_id: &str, current: i64, target: i64) -> String {
        let response = self
            .server
            .post("/v1/alerts")
            .add_header("authorization", self.user_auth_header())
            .json(&json!({
                "product_id": product_id,
                "product_name": "Air Force 1 '07",
                "brand": "Nike",
                "purchase_url": format!("https://www.amazon.com/dp/{product_id}"),
                "target_price_cents": target,
                "current_price_cents": current,
            }))
            .await;

        response.assert_status(axum::http::StatusCode::CREATED);
        let body: serde_json::Value = response.json();
        body["id"].as_str().expect("alert id").to_string()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Sign a user token the way the auth provider does.
pub fn bearer_for(user_id: UserId) -> String {
    let claims = JwtClaims {
        sub: user_id.to_string(),
        aud: Some(json!("authenticated")),
        exp: chrono::Utc::now().timestamp() + 3600,
        iat: Some(chrono::Utc::now().timestamp()),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("Failed to sign token");
    format!("Bearer {token}")
}
