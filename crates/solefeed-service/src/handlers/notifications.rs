//! Notification inbox handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use solefeed_core::{NotificationId, PriceNotification, ProductSnapshot};
use solefeed_store::NotificationStore;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::handlers::clamp_limit;
use crate::state::AppState;

/// Inbox query parameters.
#[derive(Debug, Deserialize)]
pub struct ListNotificationsQuery {
    /// Maximum number of notifications to return (default: 50, max: 100).
    pub limit: Option<usize>,
}

/// Notification response.
#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    /// Notification ID.
    pub id: String,
    /// Catalog product reference.
    pub product_id: String,
    /// Product details.
    pub product: ProductSnapshot,
    /// Price before the drop (cents).
    pub old_price_cents: i64,
    /// Price after the drop (cents).
    pub new_price_cents: i64,
    /// Savings (cents).
    pub saved_amount_cents: i64,
    /// Whole-number percentage saved.
    pub percent_off: i32,
    /// Read flag.
    pub read: bool,
    /// Whether an email went out.
    pub notification_sent: bool,
    /// Timestamp.
    pub created_at: String,
}

impl From<&PriceNotification> for NotificationResponse {
    fn from(n: &PriceNotification) -> Self {
        Self {
            id: n.id.to_string(),
            product_id: n.product_id.clone(),
            product: n.product.clone(),
            old_price_cents: n.old_price_cents,
            new_price_cents: n.new_price_cents,
            saved_amount_cents: n.saved_amount_cents,
            percent_off: n.percent_off,
            read: n.read,
            notification_sent: n.notification_sent,
            created_at: n.created_at.to_rfc3339(),
        }
    }
}

/// Inbox response.
#[derive(Debug, Serialize)]
pub struct ListNotificationsResponse {
    /// Notifications (newest first).
    pub notifications: Vec<NotificationResponse>,
    /// How many of them are unread.
    pub unread: usize,
}

/// List the caller's notifications.
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<ListNotificationsQuery>,
) -> Result<Json<ListNotificationsResponse>, ApiError> {
    let limit = clamp_limit(query.limit, 50, 100);
    let notifications = state
        .store
        .list_notifications_by_user(&auth.user_id, limit)
        .await?;

    Ok(Json(ListNotificationsResponse {
        unread: notifications.iter().filter(|n| !n.read).count(),
        notifications: notifications.iter().map(NotificationResponse::from).collect(),
    }))
}

/// Mark one notification as read.
pub async fn mark_notification_read(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: NotificationId = id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid notification ID".into()))?;

    state
        .store
        .mark_notification_read(&auth.user_id, &id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
