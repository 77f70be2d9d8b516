use axum::{
    extract::State,
    response::Response,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use libris_core::{EntityKind, LibraryError, ProfileUpdate, Registration};

use crate::auth::CurrentUser;
use crate::response::{created, ok, ApiError, ApiJson};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/password", post(change_password))
        .route("/api/auth/me", get(me).put(update_me))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordChange {
    old_password: String,
    new_password: String,
}

/// POST /api/auth/register - Create a reader account.
async fn register(
    State(state): State<AppState>,
    ApiJson(registration): ApiJson<Registration>,
) -> Result<Response, ApiError> {
    let (user, reader) = state.library.accounts.register_reader(registration).await?;
    Ok(created(
        "Registration successful",
        json!({ "user": user, "reader": reader }),
    ))
}

/// POST /api/auth/login
async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Response, ApiError> {
    let session = state
        .library
        .accounts
        .login(&req.username, &req.password)
        .await?;
    Ok(ok("Login successful", json!(session)))
}

/// POST /api/auth/password
async fn change_password(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(req): ApiJson<PasswordChange>,
) -> Result<Response, ApiError> {
    state
        .library
        .accounts
        .change_password(user.user_id(), &req.old_password, &req.new_password)
        .await?;
    Ok(ok("Password changed", json!({})))
}

/// GET /api/auth/me - The caller's profile, with the reader profile if any.
async fn me(State(state): State<AppState>, user: CurrentUser) -> Result<Response, ApiError> {
    let profile = state
        .library
        .accounts
        .get_user(user.user_id())
        .ok_or_else(|| LibraryError::not_found(EntityKind::User, user.user_id()))?;
    let reader = state.library.readers.by_user(user.user_id());
    Ok(ok("OK", json!({ "user": profile, "reader": reader })))
}

/// PUT /api/auth/me
async fn update_me(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(update): ApiJson<ProfileUpdate>,
) -> Result<Response, ApiError> {
    let profile = state.library.accounts.update_user(user.user_id(), update)?;
    Ok(ok("Profile updated", json!({ "user": profile })))
}
