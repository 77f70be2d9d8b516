use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::{get, post},
    Router,
};
use serde_json::json;

use libris_core::{EntityKind, LibraryError, NewPublication, PublicationQuery, PublicationUpdate};

use crate::auth::AdminUser;
use crate::response::{created, ok, ApiError, ApiJson};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/publications",
            get(search_publications).post(create_publication),
        )
        .route(
            "/api/publications/{id}",
            get(get_publication)
                .put(update_publication)
                .delete(delete_publication),
        )
        .route("/api/publications/{id}/withdraw", post(withdraw_publication))
        .route("/api/publications/{id}/reviews", get(publication_reviews))
}

/// GET /api/publications - Catalog search; no filters lists everything.
async fn search_publications(
    State(state): State<AppState>,
    Query(query): Query<PublicationQuery>,
) -> Response {
    let publications = state.library.publications.search(&query);
    ok("OK", json!({ "publications": publications }))
}

async fn get_publication(
    State(state): State<AppState>,
    Path(publication_id): Path<String>,
) -> Result<Response, ApiError> {
    let publication = state
        .library
        .publications
        .get(&publication_id)
        .ok_or_else(|| LibraryError::not_found(EntityKind::Publication, &publication_id))?;
    Ok(ok("OK", json!({ "publication": publication })))
}

async fn create_publication(
    State(state): State<AppState>,
    _: AdminUser,
    ApiJson(input): ApiJson<NewPublication>,
) -> Result<Response, ApiError> {
    let publication = state.library.publications.create(input)?;
    Ok(created(
        "Publication created",
        json!({ "publication": publication }),
    ))
}

async fn update_publication(
    State(state): State<AppState>,
    _: AdminUser,
    Path(publication_id): Path<String>,
    ApiJson(update): ApiJson<PublicationUpdate>,
) -> Result<Response, ApiError> {
    let publication = state
        .library
        .publications
        .update_details(&publication_id, update)?;
    Ok(ok(
        "Publication updated",
        json!({ "publication": publication }),
    ))
}

/// POST /api/publications/{id}/withdraw - Take a publication out of circulation.
async fn withdraw_publication(
    State(state): State<AppState>,
    _: AdminUser,
    Path(publication_id): Path<String>,
) -> Result<Response, ApiError> {
    let publication = state.library.publications.withdraw(&publication_id)?;
    Ok(ok(
        "Publication withdrawn",
        json!({ "publication": publication }),
    ))
}

async fn delete_publication(
    State(state): State<AppState>,
    _: AdminUser,
    Path(publication_id): Path<String>,
) -> Result<Response, ApiError> {
    state.library.publications.delete(&publication_id)?;
    Ok(ok("Publication deleted", json!({})))
}

async fn publication_reviews(
    State(state): State<AppState>,
    Path(publication_id): Path<String>,
) -> Response {
    let reviews = state.library.reviews.by_publication(&publication_id);
    ok("OK", json!({ "reviews": reviews }))
}
