use axum::{
    extract::{Path, State},
    response::Response,
    routing::{delete, get},
    Router,
};
use serde_json::json;

use libris_core::AdminRegistration;

use crate::auth::SuperadminUser;
use crate::response::{created, ok, ApiError, ApiJson};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/admins", get(list_admins).post(create_admin))
        .route("/api/admins/{id}", delete(delete_admin))
}

async fn list_admins(State(state): State<AppState>, _: SuperadminUser) -> Response {
    ok("OK", json!({ "admins": state.library.accounts.admins() }))
}

/// POST /api/admins - Register an admin account.
async fn create_admin(
    State(state): State<AppState>,
    _: SuperadminUser,
    ApiJson(registration): ApiJson<AdminRegistration>,
) -> Result<Response, ApiError> {
    let (user, admin) = state.library.accounts.register_admin(registration).await?;
    Ok(created(
        "Admin created",
        json!({ "user": user, "admin": admin }),
    ))
}

/// DELETE /api/admins/{id}
async fn delete_admin(
    State(state): State<AppState>,
    SuperadminUser(caller): SuperadminUser,
    Path(admin_id): Path<String>,
) -> Result<Response, ApiError> {
    let own = state
        .library
        .accounts
        .admins()
        .into_iter()
        .any(|a| a.admin_id == admin_id && a.user_id == caller.user_id());
    if own {
        return Err(ApiError::BadRequest(
            "Cannot delete your own admin account".to_string(),
        ));
    }

    state.library.accounts.delete_admin(&admin_id)?;
    Ok(ok("Admin deleted", json!({})))
}
