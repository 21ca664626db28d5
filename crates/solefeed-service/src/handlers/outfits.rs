//! Outfit rating handlers.
//!
//! `POST /v1/outfits/analyze` is the only endpoint that spends AI quota. The
//! order of checks matters: rate limit, then image validation, then the
//! quota reservation, so a rejected request never consumes an analysis.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use solefeed_core::{ImagePayload, OutfitAnalysis, UsageSnapshot};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::quota::QuotaGuard;
use crate::state::AppState;

/// Analyze request.
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    /// Base64 image, optionally as a `data:` URL.
    pub image: String,
}

/// Analyze response.
#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    /// Sanitized classifier output.
    pub analysis: OutfitAnalysis,
    /// Quota after this analysis.
    pub usage: UsageSnapshot,
}

/// Rate an outfit photo.
pub async fn analyze_outfit(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let key = format!("analyze:{}", auth.user_id);
    if !state.rate_limiter.check(&key).await? {
        tracing::info!(user_id = %auth.user_id, "Analyze rate limit hit");
        return Err(ApiError::RateLimited);
    }

    let image = ImagePayload::from_base64(&body.image)?;

    let classifier = state
        .classifier
        .as_ref()
        .ok_or_else(|| ApiError::Configuration("outfit analysis is not configured".into()))?;

    let guard = QuotaGuard::new(state.store.as_ref());
    let reservation = guard.check_and_reserve(auth.user_id, Utc::now()).await?;

    tracing::debug!(
        user_id = %auth.user_id,
        image_bytes = image.decoded_len(),
        "Calling outfit classifier"
    );

    let analysis = match classifier.classify(&image).await {
        Ok(analysis) => analysis,
        Err(e) => {
            guard.rollback_on_failure(&reservation).await;
            return Err(e.into());
        }
    };

    tracing::info!(
        user_id = %auth.user_id,
        remaining = reservation.remaining,
        "Outfit analyzed"
    );

    Ok(Json(AnalyzeResponse {
        analysis: analysis.sanitize(),
        usage: reservation.usage(),
    }))
}

/// Usage read-out.
#[derive(Debug, Serialize)]
pub struct UsageResponse {
    /// Analyses allowed per month.
    pub monthly_limit: i32,
    /// Analyses left this month.
    pub remaining: i32,
    /// Analyses used this month.
    pub used_this_month: i32,
    /// First instant of the current period.
    pub period_start: DateTime<Utc>,
}

/// Get the caller's monthly quota without spending any.
pub async fn get_usage(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<UsageResponse>, ApiError> {
    let now = Utc::now();
    let record = QuotaGuard::new(state.store.as_ref())
        .current(auth.user_id, now)
        .await?;

    Ok(Json(UsageResponse {
        monthly_limit: record.monthly_limit,
        remaining: record.remaining(now),
        used_this_month: record.used_this_month,
        period_start: record.period_start,
    }))
}
