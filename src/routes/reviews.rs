use axum::{
    extract::{Path, State},
    response::Response,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use libris_core::{EntityKind, LibraryError, Review};

use crate::auth::CurrentUser;
use crate::response::{created, ok, ApiError, ApiJson};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/reviews", post(create_review))
        .route(
            "/api/reviews/{id}",
            get(get_review).put(update_review).delete(delete_review),
        )
        .route("/api/reviews/{id}/like", post(like_review))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewRequest {
    reader_id: String,
    publication_id: String,
    rating: u8,
    #[serde(default)]
    comment: String,
}

#[derive(Debug, Deserialize)]
struct ReviewEdit {
    rating: u8,
    #[serde(default)]
    comment: String,
}

fn owned_review(
    state: &AppState,
    user: &CurrentUser,
    review_id: &str,
) -> Result<Review, ApiError> {
    let review = state
        .library
        .reviews
        .get(review_id)
        .ok_or_else(|| LibraryError::not_found(EntityKind::Review, review_id))?;
    user.ensure_reader(state, &review.reader_id)?;
    Ok(review)
}

async fn get_review(
    State(state): State<AppState>,
    Path(review_id): Path<String>,
) -> Result<Response, ApiError> {
    let review = state
        .library
        .reviews
        .get(&review_id)
        .ok_or_else(|| LibraryError::not_found(EntityKind::Review, &review_id))?;
    Ok(ok("OK", json!({ "review": review })))
}

/// POST /api/reviews - Rate a publication, once per reader.
async fn create_review(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(req): ApiJson<ReviewRequest>,
) -> Result<Response, ApiError> {
    user.ensure_reader(&state, &req.reader_id)?;
    let review = state.library.reviews.create(
        &req.reader_id,
        &req.publication_id,
        req.rating,
        &req.comment,
    )?;
    Ok(created("Review posted", json!({ "review": review })))
}

async fn update_review(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(review_id): Path<String>,
    ApiJson(edit): ApiJson<ReviewEdit>,
) -> Result<Response, ApiError> {
    owned_review(&state, &user, &review_id)?;
    let review = state
        .library
        .reviews
        .update(&review_id, edit.rating, &edit.comment)?;
    Ok(ok("Review updated", json!({ "review": review })))
}

async fn delete_review(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(review_id): Path<String>,
) -> Result<Response, ApiError> {
    owned_review(&state, &user, &review_id)?;
    state.library.reviews.delete(&review_id)?;
    Ok(ok("Review deleted", json!({})))
}

async fn like_review(
    State(state): State<AppState>,
    _: CurrentUser,
    Path(review_id): Path<String>,
) -> Result<Response, ApiError> {
    let review = state.library.reviews.like(&review_id)?;
    Ok(ok("OK", json!({ "likes": review.likes })))
}
