//! Product price history handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use solefeed_core::PriceSourceKind;
use solefeed_store::MonitoringStore;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::handlers::clamp_limit;
use crate::state::AppState;

/// Price history query parameters.
#[derive(Debug, Deserialize)]
pub struct PriceHistoryQuery {
    /// Maximum number of points to return (default: 100, max: 500).
    pub limit: Option<usize>,
}

/// One observed price.
#[derive(Debug, Serialize)]
pub struct PricePoint {
    /// Price (cents).
    pub price_cents: i64,
    /// Which source produced it.
    pub source: PriceSourceKind,
    /// When it was observed.
    pub recorded_at: String,
}

/// Price history response.
#[derive(Debug, Serialize)]
pub struct PriceHistoryResponse {
    /// Catalog product reference.
    pub product_id: String,
    /// Observations (newest first).
    pub history: Vec<PricePoint>,
}

/// Get a product's observed prices.
pub async fn get_price_history(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Path(product_id): Path<String>,
    Query(query): Query<PriceHistoryQuery>,
) -> Result<Json<PriceHistoryResponse>, ApiError> {
    let limit = clamp_limit(query.limit, 100, 500);
    let entries = state.store.list_price_history(&product_id, limit).await?;

    Ok(Json(PriceHistoryResponse {
        history: entries
            .into_iter()
            .map(|e| PricePoint {
                price_cents: e.price_cents,
                source: e.source,
                recorded_at: e.recorded_at.to_rfc3339(),
            })
            .collect(),
        product_id,
    }))
}
