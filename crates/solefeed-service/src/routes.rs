//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post, put};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{admin, alerts, health, jobs, notifications, outfits, products};
use crate::state::AppState;

// ============================================================================
// Concurrency Limiting Constants
// ============================================================================

/// Maximum concurrent outfit analyses.
/// Each one holds a multi-megabyte image and waits on the classifier.
const ANALYZE_MAX_CONCURRENT_REQUESTS: usize = 20;

/// Maximum concurrent batch job runs.
const JOBS_MAX_CONCURRENT_REQUESTS: usize = 2;

/// Maximum concurrent requests for general API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Outfits (JWT auth)
/// - `POST /v1/outfits/analyze` - Rate an outfit photo (quota-guarded)
/// - `GET /v1/outfits/usage` - Monthly quota read-out
///
/// ## Alerts (JWT auth)
/// - `POST /v1/alerts` - Watch a product
/// - `GET /v1/alerts` - List alerts
/// - `DELETE /v1/alerts/:id` - Stop watching
/// - `POST /v1/alerts/:id/reset` - Re-watch a triggered alert
///
/// ## Notifications (JWT auth)
/// - `GET /v1/notifications` - Inbox
/// - `POST /v1/notifications/:id/read` - Mark read
///
/// ## Products (JWT auth)
/// - `GET /v1/products/:product_id/price-history` - Observed prices
///
/// ## Jobs (Service API Key auth)
/// - `POST /v1/jobs/check-prices` - Price monitoring batch
/// - `POST /v1/jobs/send-price-alerts` - Notification delivery batch
///
/// ## Admin (Admin API Key auth)
/// - `GET /v1/admin/monitoring` - Recent batch summaries
/// - `PUT /v1/admin/usage/:user_id` - Set a user's monthly limit
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let outfit_routes = Router::new()
        .route("/analyze", post(outfits::analyze_outfit))
        .layer(ConcurrencyLimitLayer::new(ANALYZE_MAX_CONCURRENT_REQUESTS))
        .route("/usage", get(outfits::get_usage));

    let job_routes = Router::new()
        .route("/check-prices", post(jobs::check_prices))
        .route("/send-price-alerts", post(jobs::send_price_alerts))
        .layer(ConcurrencyLimitLayer::new(JOBS_MAX_CONCURRENT_REQUESTS));

    let api_routes = Router::new()
        // Alerts
        .route("/alerts", post(alerts::create_alert).get(alerts::list_alerts))
        .route("/alerts/:id", delete(alerts::delete_alert))
        .route("/alerts/:id/reset", post(alerts::reset_alert))
        // Notifications
        .route("/notifications", get(notifications::list_notifications))
        .route(
            "/notifications/:id/read",
            post(notifications::mark_notification_read),
        )
        // Products
        .route(
            "/products/:product_id/price-history",
            get(products::get_price_history),
        )
        // Admin
        .route("/admin/monitoring", get(admin::list_monitoring_logs))
        .route("/admin/usage/:user_id", put(admin::set_usage_limit))
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS))
        // Outfit and job routes (with their own concurrency limits)
        .nest("/outfits", outfit_routes)
        .nest("/jobs", job_routes);

    Router::new()
        // Health (public, no limit)
        .route("/health", get(health::health))
        .nest("/v1", api_routes)
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
