pub mod accounts;
pub mod admins;
pub mod borrows;
pub mod categories;
pub mod fines;
pub mod health;
pub mod maintenance;
pub mod notifications;
pub mod publications;
pub mod readers;
pub mod reservations;
pub mod reviews;

use axum::Router;

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(accounts::routes())
        .merge(admins::routes())
        .merge(publications::routes())
        .merge(categories::routes())
        .merge(readers::routes())
        .merge(borrows::routes())
        .merge(reservations::routes())
        .merge(fines::routes())
        .merge(reviews::routes())
        .merge(notifications::routes())
        .merge(maintenance::routes())
        .with_state(state)
}
