//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use solefeed_core::{CoreError, UsageSnapshot};
use solefeed_store::StoreError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Forbidden - valid credentials but insufficient permissions.
    #[error("forbidden")]
    Forbidden,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Conflict - resource already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The monthly AI allowance is used up.
    #[error("monthly analysis limit reached")]
    QuotaExceeded {
        /// Analyses allowed per month.
        monthly_limit: i32,
        /// Analyses left this month.
        remaining: i32,
    },

    /// Too many requests in the current window.
    #[error("too many requests, try again shortly")]
    RateLimited,

    /// An upstream service asked us to back off.
    #[error("service busy: {0}")]
    ServiceBusy(String),

    /// External service error.
    #[error("external service error: {0}")]
    ExternalService(String),

    /// A dependency (usually the store) is temporarily failing.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// A feature was called without the configuration it needs.
    #[error("not configured: {0}")]
    Configuration(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage: Option<UsageSnapshot>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut usage = None;
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::Forbidden => (StatusCode::FORBIDDEN, "forbidden", self.to_string(), None),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            Self::QuotaExceeded {
                monthly_limit,
                remaining,
            } => {
                usage = Some(UsageSnapshot {
                    monthly_limit: *monthly_limit,
                    remaining: *remaining,
                });
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    "quota_exceeded",
                    self.to_string(),
                    Some(serde_json::json!({
                        "monthly_limit": monthly_limit,
                        "remaining": remaining
                    })),
                )
            }
            Self::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                self.to_string(),
                None,
            ),
            Self::ServiceBusy(msg) => {
                tracing::warn!(error = %msg, "Upstream service busy");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "service_busy",
                    "The analysis service is busy, please retry".to_string(),
                    None,
                )
            }
            Self::ExternalService(msg) => {
                tracing::error!(error = %msg, "External service error");
                (
                    StatusCode::BAD_GATEWAY,
                    "external_service_error",
                    "An upstream service failed".to_string(),
                    None,
                )
            }
            Self::Unavailable(msg) => {
                tracing::error!(error = %msg, "Dependency unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "service_unavailable",
                    "The service is temporarily unavailable".to_string(),
                    None,
                )
            }
            Self::Configuration(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "configuration_error",
                msg.clone(),
                None,
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
            usage,
        };

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => {
                Self::NotFound(format!("{entity} not found: {id}"))
            }
            StoreError::Conflict(msg) => Self::Conflict(msg),
            StoreError::Database(msg) => Self::Unavailable(msg),
            StoreError::Serialization(msg) => Self::Internal(msg),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self::BadRequest(match err {
            CoreError::InvalidInput(msg) | CoreError::InvalidPrice(msg) => msg,
            CoreError::InvalidId(e) => e.to_string(),
        })
    }
}
