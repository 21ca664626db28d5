//! Price alert handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use solefeed_core::{AlertId, AlertState, NewPriceAlert, PriceAlert, ProductSnapshot};
use solefeed_store::{AlertStore, StoreError};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Create alert request.
#[derive(Debug, Deserialize)]
pub struct CreateAlertRequest {
    /// Catalog product reference (ASIN or store SKU).
    pub product_id: String,
    /// Product display name.
    pub product_name: String,
    /// Brand.
    #[serde(default)]
    pub brand: String,
    /// Product image.
    pub image_url: Option<String>,
    /// Where to buy.
    pub purchase_url: Option<String>,
    /// Notify at or below this price (cents).
    pub target_price_cents: i64,
    /// Price when the alert was set (cents).
    pub current_price_cents: i64,
}

/// Alert response.
#[derive(Debug, Serialize)]
pub struct AlertResponse {
    /// Alert ID.
    pub id: String,
    /// Catalog product reference.
    pub product_id: String,
    /// Product details.
    pub product: ProductSnapshot,
    /// Target price (cents).
    pub target_price_cents: i64,
    /// Last observed price (cents).
    pub current_price_cents: i64,
    /// Price when the alert was created (cents).
    pub original_price_cents: i64,
    /// `watching` or `triggered`.
    pub state: AlertState,
    /// When the target was reached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triggered_at: Option<String>,
    /// Last monitoring check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<String>,
    /// Creation timestamp.
    pub created_at: String,
}

impl From<&PriceAlert> for AlertResponse {
    fn from(alert: &PriceAlert) -> Self {
        Self {
            id: alert.id.to_string(),
            product_id: alert.product_id.clone(),
            product: alert.product.clone(),
            target_price_cents: alert.target_price_cents,
            current_price_cents: alert.current_price_cents,
            original_price_cents: alert.original_price_cents,
            state: alert.state(),
            triggered_at: alert.triggered_at.map(|t| t.to_rfc3339()),
            last_checked_at: alert.last_checked_at.map(|t| t.to_rfc3339()),
            created_at: alert.created_at.to_rfc3339(),
        }
    }
}

/// Watch a product.
pub async fn create_alert(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CreateAlertRequest>,
) -> Result<(StatusCode, Json<AlertResponse>), ApiError> {
    let alert = PriceAlert::create(
        auth.user_id,
        NewPriceAlert {
            product_id: body.product_id,
            product: ProductSnapshot {
                name: body.product_name,
                brand: body.brand,
                image_url: body.image_url,
                purchase_url: body.purchase_url,
            },
            target_price_cents: body.target_price_cents,
            current_price_cents: body.current_price_cents,
        },
        Utc::now(),
    )?;

    state.store.create_alert(&alert).await.map_err(|e| match e {
        StoreError::Conflict(_) => {
            ApiError::Conflict("An alert for this product already exists".into())
        }
        other => other.into(),
    })?;

    tracing::info!(
        user_id = %auth.user_id,
        alert_id = %alert.id,
        product_id = %alert.product_id,
        target = alert.target_price_cents,
        "Price alert created"
    );

    Ok((StatusCode::CREATED, Json(AlertResponse::from(&alert))))
}

/// List alerts response.
#[derive(Debug, Serialize)]
pub struct ListAlertsResponse {
    /// Alerts (newest first).
    pub alerts: Vec<AlertResponse>,
}

/// List the caller's alerts.
pub async fn list_alerts(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<ListAlertsResponse>, ApiError> {
    let alerts = state.store.list_alerts_by_user(&auth.user_id).await?;

    Ok(Json(ListAlertsResponse {
        alerts: alerts.iter().map(AlertResponse::from).collect(),
    }))
}

/// Stop watching a product.
pub async fn delete_alert(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_alert_id(&id)?;
    state.store.delete_alert(&auth.user_id, &id).await?;

    tracing::info!(user_id = %auth.user_id, alert_id = %id, "Price alert deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Reset alert request.
#[derive(Debug, Default, Deserialize)]
pub struct ResetAlertRequest {
    /// New target price (cents). Keeps the old target if absent.
    pub target_price_cents: Option<i64>,
}

/// Put a triggered alert back into the watching state.
pub async fn reset_alert(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
    body: Option<Json<ResetAlertRequest>>,
) -> Result<Json<AlertResponse>, ApiError> {
    let id = parse_alert_id(&id)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();

    let mut alert = state
        .store
        .get_alert(&id)
        .await?
        .filter(|a| a.user_id == auth.user_id)
        .ok_or_else(|| ApiError::NotFound("Alert not found".into()))?;

    alert.rewatch(body.target_price_cents, Utc::now())?;
    state.store.update_alert(&alert).await?;

    tracing::info!(
        user_id = %auth.user_id,
        alert_id = %alert.id,
        target = alert.target_price_cents,
        "Price alert reset"
    );

    Ok(Json(AlertResponse::from(&alert)))
}

fn parse_alert_id(raw: &str) -> Result<AlertId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest("Invalid alert ID".into()))
}
