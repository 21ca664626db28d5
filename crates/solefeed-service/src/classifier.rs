//! Outfit classification client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;

use solefeed_core::{ImagePayload, OutfitAnalysis};

use crate::error::ApiError;

/// Errors from the classification service.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    /// The service is rate limiting or overloaded.
    #[error("classifier busy: {0}")]
    Busy(String),

    /// HTTP request failed (including timeouts).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service returned an error status.
    #[error("classifier API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        message: String,
    },

    /// The response did not match the expected shape.
    #[error("invalid classifier response: {0}")]
    InvalidResponse(String),
}

impl From<ClassifierError> for ApiError {
    fn from(err: ClassifierError) -> Self {
        match err {
            ClassifierError::Busy(msg) => Self::ServiceBusy(msg),
            other => Self::ExternalService(other.to_string()),
        }
    }
}

/// Rates an outfit photo.
#[async_trait]
pub trait OutfitClassifier: Send + Sync {
    /// Classify a validated image. The result is unsanitized.
    async fn classify(&self, image: &ImagePayload) -> Result<OutfitAnalysis, ClassifierError>;
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    image: &'a str,
}

/// Classifier reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpOutfitClassifier {
    client: Client,
    url: String,
    api_key: Option<String>,
}

impl HttpOutfitClassifier {
    /// Create a client posting to `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ClassifierError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            api_key,
        })
    }
}

#[async_trait]
impl OutfitClassifier for HttpOutfitClassifier {
    async fn classify(&self, image: &ImagePayload) -> Result<OutfitAnalysis, ClassifierError> {
        let mut request = self.client.post(&self.url).json(&ClassifyRequest {
            image: image.as_base64(),
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
            return Err(ClassifierError::Busy(format!("status {}", status.as_u16())));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Api {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        response
            .json::<OutfitAnalysis>()
            .await
            .map_err(|e| ClassifierError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn image() -> ImagePayload {
        ImagePayload::from_base64("aGVsbG8=").unwrap()
    }

    async fn classifier(server: &MockServer) -> HttpOutfitClassifier {
        HttpOutfitClassifier::new(
            format!("{}/analyze", server.uri()),
            Some("classifier-key".into()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn parses_successful_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .and(header("authorization", "Bearer classifier-key"))
            .and(body_partial_json(serde_json::json!({ "image": "aGVsbG8=" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "rating": 8.5,
                "feedback": "Sharp",
                "style_tags": ["streetwear"],
                "dominant_colors": ["white"],
                "detected_shoe": "Air Force 1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let analysis = classifier(&server).await.classify(&image()).await.unwrap();
        assert!((analysis.rating - 8.5).abs() < f64::EPSILON);
        assert_eq!(analysis.detected_shoe.as_deref(), Some("Air Force 1"));
    }

    #[tokio::test]
    async fn rate_limit_is_busy() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let result = classifier(&server).await.classify(&image()).await;
        assert!(matches!(result, Err(ClassifierError::Busy(_))));
    }

    #[tokio::test]
    async fn server_error_is_generic_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let result = classifier(&server).await.classify(&image()).await;
        assert!(matches!(result, Err(ClassifierError::Api { status: 500, .. })));
    }

    #[tokio::test]
    async fn malformed_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let result = classifier(&server).await.classify(&image()).await;
        assert!(matches!(result, Err(ClassifierError::InvalidResponse(_))));
    }
}
