use axum::{
    extract::{Path, State},
    response::Response,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use libris_core::{EntityKind, Fine, LibraryError};

use crate::auth::{AdminUser, CurrentUser};
use crate::response::{created, ok, ApiError, ApiJson};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/fines", get(list_fines).post(create_fine))
        .route("/api/fines/statistics", get(statistics))
        .route("/api/fines/{id}", get(get_fine))
        .route("/api/fines/{id}/pay", post(pay_fine))
        .route("/api/fines/{id}/waive", post(waive_fine))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FineRequest {
    reader_id: String,
    borrow_record_id: String,
    overdue_days: u32,
    #[serde(default)]
    reason: String,
}

fn owned_fine(state: &AppState, user: &CurrentUser, fine_id: &str) -> Result<Fine, ApiError> {
    let fine = state
        .library
        .fines
        .get(fine_id)
        .ok_or_else(|| LibraryError::not_found(EntityKind::Fine, fine_id))?;
    user.ensure_reader(state, &fine.reader_id)?;
    Ok(fine)
}

async fn list_fines(State(state): State<AppState>, _: AdminUser) -> Response {
    ok("OK", json!({ "fines": state.library.fines.all() }))
}

async fn statistics(State(state): State<AppState>, _: AdminUser) -> Response {
    ok(
        "OK",
        json!({ "statistics": state.library.fines.statistics() }),
    )
}

async fn get_fine(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(fine_id): Path<String>,
) -> Result<Response, ApiError> {
    let fine = owned_fine(&state, &user, &fine_id)?;
    Ok(ok("OK", json!({ "fine": fine })))
}

/// POST /api/fines - Issue a fine by hand.
async fn create_fine(
    State(state): State<AppState>,
    _: AdminUser,
    ApiJson(req): ApiJson<FineRequest>,
) -> Result<Response, ApiError> {
    let fine = state.library.fines.create_fine(
        &req.reader_id,
        &req.borrow_record_id,
        req.overdue_days,
        &req.reason,
    )?;
    Ok(created("Fine issued", json!({ "fine": fine })))
}

async fn pay_fine(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(fine_id): Path<String>,
) -> Result<Response, ApiError> {
    owned_fine(&state, &user, &fine_id)?;
    let fine = state.library.fines.pay_fine(&fine_id)?;
    Ok(ok("Fine paid", json!({ "fine": fine })))
}

async fn waive_fine(
    State(state): State<AppState>,
    _: AdminUser,
    Path(fine_id): Path<String>,
) -> Result<Response, ApiError> {
    let fine = state.library.fines.waive_fine(&fine_id)?;
    Ok(ok("Fine waived", json!({ "fine": fine })))
}
