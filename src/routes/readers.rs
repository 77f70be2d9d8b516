use axum::{
    extract::{Path, State},
    response::Response,
    routing::get,
    Router,
};
use serde_json::json;

use libris_core::{EntityKind, LibraryError, ReaderProfileUpdate};

use crate::auth::{AdminUser, CurrentUser};
use crate::response::{ok, ApiError, ApiJson};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/readers", get(list_readers))
        .route("/api/readers/{id}", get(get_reader).put(update_reader))
        .route("/api/readers/{id}/eligibility", get(eligibility))
        .route("/api/readers/{id}/borrows", get(reader_borrows))
        .route("/api/readers/{id}/reservations", get(reader_reservations))
        .route("/api/readers/{id}/fines", get(reader_fines))
        .route("/api/readers/{id}/reviews", get(reader_reviews))
}

async fn list_readers(State(state): State<AppState>, _: AdminUser) -> Response {
    ok("OK", json!({ "readers": state.library.readers.all() }))
}

async fn get_reader(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(reader_id): Path<String>,
) -> Result<Response, ApiError> {
    user.ensure_reader(&state, &reader_id)?;
    let details = state
        .library
        .readers
        .details(&reader_id)
        .ok_or_else(|| LibraryError::not_found(EntityKind::Reader, &reader_id))?;
    Ok(ok("OK", json!({ "reader": details })))
}

/// PUT /api/readers/{id} - Change borrow limit or membership level.
async fn update_reader(
    State(state): State<AppState>,
    _: AdminUser,
    Path(reader_id): Path<String>,
    ApiJson(update): ApiJson<ReaderProfileUpdate>,
) -> Result<Response, ApiError> {
    let reader = state.library.readers.update_profile(&reader_id, update)?;
    Ok(ok("Reader updated", json!({ "reader": reader })))
}

/// GET /api/readers/{id}/eligibility - Whether the reader may borrow now.
async fn eligibility(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(reader_id): Path<String>,
) -> Result<Response, ApiError> {
    user.ensure_reader(&state, &reader_id)?;
    state.library.borrowing.check_eligibility(&reader_id)?;
    Ok(ok("Reader may borrow", json!({ "eligible": true })))
}

async fn reader_borrows(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(reader_id): Path<String>,
) -> Result<Response, ApiError> {
    user.ensure_reader(&state, &reader_id)?;
    let records = state.library.borrowing.by_reader(&reader_id);
    Ok(ok("OK", json!({ "records": records })))
}

async fn reader_reservations(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(reader_id): Path<String>,
) -> Result<Response, ApiError> {
    user.ensure_reader(&state, &reader_id)?;
    let reservations = state.library.reservations.by_reader(&reader_id);
    Ok(ok("OK", json!({ "reservations": reservations })))
}

async fn reader_fines(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(reader_id): Path<String>,
) -> Result<Response, ApiError> {
    user.ensure_reader(&state, &reader_id)?;
    let fines = state.library.fines.by_reader(&reader_id);
    let unpaid: f64 = state
        .library
        .fines
        .unpaid_for_reader(&reader_id)
        .iter()
        .map(|f| f.amount)
        .sum();
    Ok(ok("OK", json!({ "fines": fines, "unpaidAmount": unpaid })))
}

async fn reader_reviews(
    State(state): State<AppState>,
    Path(reader_id): Path<String>,
) -> Response {
    let reviews = state.library.reviews.by_reader(&reader_id);
    ok("OK", json!({ "reviews": reviews }))
}
