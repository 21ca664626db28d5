//! In-process batch scheduler.
//!
//! When the interval settings are present, the price check and the alert
//! delivery run on fixed timers inside the service. A failed run is logged
//! and the loop carries on with the next tick.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use solefeed_core::BatchSummary;

use crate::error::ApiError;
use crate::handlers::jobs::{run_alert_delivery, run_price_check};
use crate::state::AppState;

/// Spawn the configured batch loops. Returns one handle per loop started.
#[must_use]
pub fn spawn(state: Arc<AppState>) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    if let Some(secs) = state.config.price_check_interval_seconds {
        tracing::info!(interval_seconds = secs, "Scheduling price checks");
        let state = state.clone();
        handles.push(tokio::spawn(async move {
            run_every(Duration::from_secs(secs), "price_check", || {
                run_price_check(&state)
            })
            .await;
        }));
    }

    if let Some(secs) = state.config.alert_delivery_interval_seconds {
        if state.has_notifier() {
            tracing::info!(interval_seconds = secs, "Scheduling alert delivery");
            let state = state.clone();
            handles.push(tokio::spawn(async move {
                run_every(Duration::from_secs(secs), "alert_delivery", || {
                    run_alert_delivery(&state)
                })
                .await;
            }));
        } else {
            tracing::warn!(
                "Alert delivery interval set but email is not configured; not scheduling"
            );
        }
    }

    handles
}

async fn run_every<F, Fut>(period: Duration, job: &'static str, mut run: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<BatchSummary, ApiError>>,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match run().await {
            Ok(summary) => {
                tracing::debug!(
                    job,
                    processed = summary.processed,
                    errors = summary.errors,
                    "Scheduled batch complete"
                );
            }
            Err(e) => {
                tracing::error!(job, error = %e, "Scheduled batch failed");
            }
        }
    }
}
