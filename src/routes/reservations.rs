use axum::{
    extract::{Path, State},
    response::Response,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use libris_core::{EntityKind, LibraryError, Reservation};

use crate::auth::{AdminUser, CurrentUser};
use crate::response::{created, ok, ApiError, ApiJson};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/reservations", get(list_reservations).post(reserve))
        .route(
            "/api/reservations/{id}",
            get(get_reservation).delete(cancel_reservation),
        )
        .route("/api/publications/{id}/reservations", get(queue))
        .route("/api/publications/{id}/notify-next", post(notify_next))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReserveRequest {
    reader_id: String,
    publication_id: String,
}

fn owned_reservation(
    state: &AppState,
    user: &CurrentUser,
    reservation_id: &str,
) -> Result<Reservation, ApiError> {
    let reservation = state
        .library
        .reservations
        .get(reservation_id)
        .ok_or_else(|| LibraryError::not_found(EntityKind::Reservation, reservation_id))?;
    user.ensure_reader(state, &reservation.reader_id)?;
    Ok(reservation)
}

async fn list_reservations(State(state): State<AppState>, _: AdminUser) -> Response {
    ok(
        "OK",
        json!({ "reservations": state.library.reservations.all() }),
    )
}

async fn get_reservation(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(reservation_id): Path<String>,
) -> Result<Response, ApiError> {
    let reservation = owned_reservation(&state, &user, &reservation_id)?;
    Ok(ok("OK", json!({ "reservation": reservation })))
}

/// POST /api/reservations - Join the queue for a publication.
async fn reserve(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(req): ApiJson<ReserveRequest>,
) -> Result<Response, ApiError> {
    user.ensure_reader(&state, &req.reader_id)?;
    let reservation = state
        .library
        .reservations
        .reserve(&req.reader_id, &req.publication_id)?;
    Ok(created(
        "Reserved successfully",
        json!({ "reservation": reservation }),
    ))
}

async fn cancel_reservation(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(reservation_id): Path<String>,
) -> Result<Response, ApiError> {
    owned_reservation(&state, &user, &reservation_id)?;
    state.library.reservations.cancel(&reservation_id)?;
    Ok(ok("Reservation cancelled", json!({})))
}

/// GET /api/publications/{id}/reservations - Pending queue in priority order.
async fn queue(
    State(state): State<AppState>,
    _: AdminUser,
    Path(publication_id): Path<String>,
) -> Response {
    let queue = state.library.reservations.queue(&publication_id);
    ok("OK", json!({ "reservations": queue }))
}

/// POST /api/publications/{id}/notify-next - Mark the head of the queue
/// ready and notify its reader.
async fn notify_next(
    State(state): State<AppState>,
    _: AdminUser,
    Path(publication_id): Path<String>,
) -> Result<Response, ApiError> {
    let next = state.library.notify_next_reserver(&publication_id)?;
    let message = if next.is_some() {
        "Next reader notified"
    } else {
        "No pending reservations"
    };
    Ok(ok(message, json!({ "reservation": next })))
}
