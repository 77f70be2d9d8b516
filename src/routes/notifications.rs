use axum::{
    extract::{Path, State},
    response::Response,
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use libris_core::{EntityKind, LibraryError, Notification, NotificationKind};

use crate::auth::{AdminUser, CurrentUser};
use crate::response::{created, ok, ApiError, ApiJson};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/notifications", get(inbox).post(send_notification))
        .route("/api/notifications/clear-read", post(clear_read))
        .route("/api/notifications/{id}", delete(delete_notification))
        .route("/api/notifications/{id}/read", post(mark_read))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationRequest {
    user_id: String,
    title: String,
    #[serde(default)]
    content: String,
}

fn owned_notification(
    state: &AppState,
    user: &CurrentUser,
    notification_id: &str,
) -> Result<Notification, ApiError> {
    let notification = state
        .library
        .notifications
        .get(notification_id)
        .ok_or_else(|| LibraryError::not_found(EntityKind::Notification, notification_id))?;
    user.ensure_user(&notification.user_id)?;
    Ok(notification)
}

/// GET /api/notifications - The caller's inbox.
async fn inbox(State(state): State<AppState>, user: CurrentUser) -> Response {
    let notifications = &state.library.notifications;
    ok(
        "OK",
        json!({
            "notifications": notifications.by_user(user.user_id()),
            "unreadCount": notifications.unread_count(user.user_id()),
        }),
    )
}

/// POST /api/notifications - Send a general notice to a user.
async fn send_notification(
    State(state): State<AppState>,
    _: AdminUser,
    ApiJson(req): ApiJson<NotificationRequest>,
) -> Result<Response, ApiError> {
    if state.library.accounts.get_user(&req.user_id).is_none() {
        return Err(LibraryError::not_found(EntityKind::User, &req.user_id).into());
    }
    let notification = state.library.notifications.create(
        &req.user_id,
        NotificationKind::General,
        &req.title,
        &req.content,
    )?;
    Ok(created(
        "Notification sent",
        json!({ "notification": notification }),
    ))
}

async fn mark_read(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(notification_id): Path<String>,
) -> Result<Response, ApiError> {
    owned_notification(&state, &user, &notification_id)?;
    let notification = state.library.notifications.mark_read(&notification_id)?;
    Ok(ok("OK", json!({ "notification": notification })))
}

async fn delete_notification(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(notification_id): Path<String>,
) -> Result<Response, ApiError> {
    owned_notification(&state, &user, &notification_id)?;
    state.library.notifications.delete(&notification_id)?;
    Ok(ok("Notification deleted", json!({})))
}

async fn clear_read(State(state): State<AppState>, user: CurrentUser) -> Result<Response, ApiError> {
    let removed = state.library.notifications.clear_read(user.user_id())?;
    Ok(ok("OK", json!({ "removed": removed })))
}
