//! Admin handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use solefeed_core::{MonitoringLogEntry, UserId};
use solefeed_store::MonitoringStore;

use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::handlers::clamp_limit;
use crate::handlers::outfits::UsageResponse;
use crate::quota::QuotaGuard;
use crate::state::AppState;

/// Monitoring log query parameters.
#[derive(Debug, Deserialize)]
pub struct MonitoringQuery {
    /// Maximum number of entries to return (default: 50, max: 200).
    pub limit: Option<usize>,
}

/// Monitoring log response.
#[derive(Debug, Serialize)]
pub struct MonitoringResponse {
    /// Batch summaries (newest first).
    pub entries: Vec<MonitoringLogEntry>,
}

/// List recent batch summaries.
pub async fn list_monitoring_logs(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Query(query): Query<MonitoringQuery>,
) -> Result<Json<MonitoringResponse>, ApiError> {
    let limit = clamp_limit(query.limit, 50, 200);
    let entries = state.store.list_monitoring_logs(limit).await?;
    Ok(Json(MonitoringResponse { entries }))
}

/// Set usage limit request.
#[derive(Debug, Deserialize)]
pub struct SetUsageLimitRequest {
    /// New monthly limit. Zero blocks the user.
    pub monthly_limit: i32,
}

/// Set a user's monthly analysis limit.
pub async fn set_usage_limit(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Path(user_id): Path<String>,
    Json(body): Json<SetUsageLimitRequest>,
) -> Result<Json<UsageResponse>, ApiError> {
    let user_id: UserId = user_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid user ID".into()))?;

    if body.monthly_limit < 0 {
        return Err(ApiError::BadRequest(
            "monthly_limit must not be negative".into(),
        ));
    }

    let now = Utc::now();
    let record = QuotaGuard::new(state.store.as_ref())
        .set_monthly_limit(user_id, body.monthly_limit, now)
        .await?;

    tracing::info!(
        admin_id = %auth.admin_id,
        user_id = %user_id,
        monthly_limit = body.monthly_limit,
        "Monthly limit updated"
    );

    Ok(Json(UsageResponse {
        monthly_limit: record.monthly_limit,
        remaining: record.remaining(now),
        used_this_month: record.used_this_month,
        period_start: record.period_start,
    }))
}
