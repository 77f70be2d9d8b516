use axum::{
    extract::{Path, State},
    response::Response,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use libris_core::{BorrowRecord, EntityKind, LibraryError};

use crate::auth::{AdminUser, CurrentUser};
use crate::response::{created, ok, ApiError, ApiJson};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/borrows", get(list_borrows).post(borrow))
        .route("/api/borrows/overdue", get(overdue))
        .route("/api/borrows/upcoming", get(upcoming_due))
        .route("/api/borrows/{id}", get(get_borrow))
        .route("/api/borrows/{id}/return", post(return_borrow))
        .route("/api/borrows/{id}/renew", post(renew))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BorrowRequest {
    reader_id: String,
    publication_id: String,
}

/// Load a loan the caller may act on.
fn owned_record(
    state: &AppState,
    user: &CurrentUser,
    record_id: &str,
) -> Result<BorrowRecord, ApiError> {
    let record = state
        .library
        .borrowing
        .get(record_id)
        .ok_or_else(|| LibraryError::not_found(EntityKind::BorrowRecord, record_id))?;
    user.ensure_reader(state, &record.reader_id)?;
    Ok(record)
}

async fn list_borrows(State(state): State<AppState>, _: AdminUser) -> Response {
    ok("OK", json!({ "records": state.library.borrowing.all() }))
}

/// GET /api/borrows/overdue - Active loans past their due date.
async fn overdue(State(state): State<AppState>, _: AdminUser) -> Response {
    ok("OK", json!({ "records": state.library.borrowing.overdue() }))
}

/// GET /api/borrows/upcoming - Active loans falling due within three days.
async fn upcoming_due(State(state): State<AppState>, _: AdminUser) -> Response {
    ok("OK", json!({ "records": state.library.borrowing.upcoming_due() }))
}

async fn get_borrow(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(record_id): Path<String>,
) -> Result<Response, ApiError> {
    let record = owned_record(&state, &user, &record_id)?;
    Ok(ok("OK", json!({ "record": record })))
}

/// POST /api/borrows - Lend a copy to a reader.
async fn borrow(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(req): ApiJson<BorrowRequest>,
) -> Result<Response, ApiError> {
    user.ensure_reader(&state, &req.reader_id)?;
    let record = state
        .library
        .borrowing
        .borrow(&req.reader_id, &req.publication_id)?;
    Ok(created(
        "Borrowed successfully",
        json!({ "record": record, "dueDate": record.due_date }),
    ))
}

/// POST /api/borrows/{id}/return - Close a loan, fining late returns.
async fn return_borrow(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(record_id): Path<String>,
) -> Result<Response, ApiError> {
    owned_record(&state, &user, &record_id)?;
    let (outcome, fine) = state.library.return_with_fine(&record_id)?;

    let message = if outcome.overdue_days > 0 {
        format!("Returned {} days late", outcome.overdue_days)
    } else {
        "Returned successfully".to_string()
    };
    Ok(ok(
        message,
        json!({
            "record": outcome.record,
            "overdueDays": outcome.overdue_days,
            "fine": fine,
        }),
    ))
}

async fn renew(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(record_id): Path<String>,
) -> Result<Response, ApiError> {
    owned_record(&state, &user, &record_id)?;
    let due_date = state.library.borrowing.renew(&record_id)?;
    Ok(ok("Renewed successfully", json!({ "dueDate": due_date })))
}
