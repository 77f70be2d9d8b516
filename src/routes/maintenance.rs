use axum::{extract::State, response::Response, routing::post, Router};
use serde_json::json;

use crate::auth::AdminUser;
use crate::maintenance::Maintainer;
use crate::response::{ok, ApiError};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/maintenance/run", post(run_maintenance))
}

/// POST /api/maintenance/run - One housekeeping pass now, outside the
/// background schedule.
async fn run_maintenance(
    State(state): State<AppState>,
    _: AdminUser,
) -> Result<Response, ApiError> {
    let report = Maintainer::new(state.library.clone()).run_once()?;
    Ok(ok("Maintenance completed", json!({ "report": report })))
}
