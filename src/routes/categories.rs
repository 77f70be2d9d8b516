use axum::{
    extract::{Path, State},
    response::Response,
    routing::get,
    Router,
};
use serde_json::json;

use libris_core::{CategoryUpdate, EntityKind, LibraryError, NewCategory};

use crate::auth::AdminUser;
use crate::response::{created, ok, ApiError, ApiJson};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/categories", get(list_categories).post(create_category))
        .route("/api/categories/tree", get(category_tree))
        .route(
            "/api/categories/{id}",
            get(get_category)
                .put(update_category)
                .delete(delete_category),
        )
        .route("/api/categories/{id}/publications", get(category_publications))
}

async fn list_categories(State(state): State<AppState>) -> Response {
    ok("OK", json!({ "categories": state.library.categories.all() }))
}

async fn category_tree(State(state): State<AppState>) -> Response {
    ok("OK", json!({ "tree": state.library.categories.tree() }))
}

/// GET /api/categories/{id} - A category with its path from the root and its
/// direct subcategories.
async fn get_category(
    State(state): State<AppState>,
    Path(category_id): Path<String>,
) -> Result<Response, ApiError> {
    let categories = &state.library.categories;
    let category = categories
        .get(&category_id)
        .ok_or_else(|| LibraryError::not_found(EntityKind::Category, &category_id))?;
    Ok(ok(
        "OK",
        json!({
            "category": category,
            "path": categories.path(&category_id),
            "children": categories.children(&category_id),
        }),
    ))
}

/// Publications filed under a category or any of its subcategories.
async fn category_publications(
    State(state): State<AppState>,
    Path(category_id): Path<String>,
) -> Result<Response, ApiError> {
    if state.library.categories.get(&category_id).is_none() {
        return Err(LibraryError::not_found(EntityKind::Category, &category_id).into());
    }
    let publications = state.library.publications.by_category(&category_id);
    Ok(ok("OK", json!({ "publications": publications })))
}

async fn create_category(
    State(state): State<AppState>,
    _: AdminUser,
    ApiJson(input): ApiJson<NewCategory>,
) -> Result<Response, ApiError> {
    let category = state.library.categories.create(input)?;
    Ok(created("Category created", json!({ "category": category })))
}

async fn update_category(
    State(state): State<AppState>,
    _: AdminUser,
    Path(category_id): Path<String>,
    ApiJson(update): ApiJson<CategoryUpdate>,
) -> Result<Response, ApiError> {
    let category = state.library.categories.update(&category_id, update)?;
    Ok(ok("Category updated", json!({ "category": category })))
}

async fn delete_category(
    State(state): State<AppState>,
    _: AdminUser,
    Path(category_id): Path<String>,
) -> Result<Response, ApiError> {
    state.library.categories.delete(&category_id)?;
    Ok(ok("Category deleted", json!({})))
}
