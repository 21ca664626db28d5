//! Batch job handlers.
//!
//! Called by an external cron with the service API key. The in-process
//! scheduler runs the same batches directly.
//!
//! A batch runs on its own task: if the request times out or the caller
//! disconnects, the batch still finishes and writes its monitoring entry.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use solefeed_core::BatchSummary;

use crate::auth::ServiceAuth;
use crate::delivery::AlertDelivery;
use crate::error::ApiError;
use crate::monitor::PriceMonitor;
use crate::state::AppState;

/// Batch job response.
#[derive(Debug, Serialize)]
pub struct JobResponse {
    /// Items looked at.
    pub processed: u32,
    /// Alerts triggered or notifications sent.
    pub triggered: u32,
    /// Items that failed.
    pub errors: u32,
    /// Wall-clock duration.
    pub duration_ms: u64,
}

impl From<BatchSummary> for JobResponse {
    fn from(s: BatchSummary) -> Self {
        Self {
            processed: s.processed,
            triggered: s.triggered,
            errors: s.errors,
            duration_ms: s.duration_ms,
        }
    }
}

/// Run the price monitoring batch.
pub async fn check_prices(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
) -> Result<Json<JobResponse>, ApiError> {
    tracing::info!(service = %auth.service_name, "Price check requested");

    let state = Arc::clone(&state);
    let summary = detached(async move { run_price_check(&state).await }).await?;
    Ok(Json(summary.into()))
}

/// Run the notification delivery batch.
pub async fn send_price_alerts(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
) -> Result<Json<JobResponse>, ApiError> {
    tracing::info!(service = %auth.service_name, "Alert delivery requested");

    let state = Arc::clone(&state);
    let summary = detached(async move { run_alert_delivery(&state).await }).await?;
    Ok(Json(summary.into()))
}

/// Run `batch` on a spawned task and wait for it.
///
/// Dropping the returned future does not cancel the batch.
async fn detached<F>(batch: F) -> Result<BatchSummary, ApiError>
where
    F: Future<Output = Result<BatchSummary, ApiError>> + Send + 'static,
{
    tokio::spawn(batch)
        .await
        .map_err(|e| ApiError::Internal(format!("batch task failed: {e}")))?
}

/// One price monitoring batch over the state's store and price source.
pub async fn run_price_check(state: &AppState) -> Result<BatchSummary, ApiError> {
    let monitor = PriceMonitor::new(
        state.store.as_ref(),
        state.price_source.as_ref(),
        Duration::from_secs(state.config.price_fetch_timeout_seconds),
    );
    Ok(monitor.run().await?)
}

/// One delivery batch. Fails with a configuration error if email is not set up.
pub async fn run_alert_delivery(state: &AppState) -> Result<BatchSummary, ApiError> {
    let notifier = state
        .notifier
        .as_ref()
        .ok_or_else(|| ApiError::Configuration("email delivery is not configured".into()))?;

    let delivery = AlertDelivery::new(state.store.as_ref(), notifier.as_ref());
    Ok(delivery.run(Utc::now()).await?)
}
