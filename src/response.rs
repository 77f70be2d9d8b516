//! The `{ "success": bool, "message": string, ... }` envelope every endpoint
//! answers with, and the mapping from library errors to HTTP statuses.

use axum::{
    extract::{rejection::JsonRejection, FromRequest},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{Map, Value};
use thiserror::Error;

use libris_core::{ErrorKind, LibraryError};

/// Successful envelope with the fields of `extra` merged in. `extra` should
/// be a JSON object; anything else is dropped.
pub fn success(status: StatusCode, message: impl Into<String>, extra: Value) -> Response {
    let mut body = Map::new();
    body.insert("success".to_string(), Value::Bool(true));
    body.insert("message".to_string(), Value::String(message.into()));
    if let Value::Object(fields) = extra {
        body.extend(fields);
    }
    (status, Json(Value::Object(body))).into_response()
}

pub fn ok(message: impl Into<String>, extra: Value) -> Response {
    success(StatusCode::OK, message, extra)
}

pub fn created(message: impl Into<String>, extra: Value) -> Response {
    success(StatusCode::CREATED, message, extra)
}

/// A request that could not be served.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Library(#[from] LibraryError),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Insufficient permissions")]
    Forbidden,

    #[error("{0}")]
    BadRequest(String),

    /// A request body axum could not extract, with the status axum chose.
    #[error("{1}")]
    Rejected(StatusCode, String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Library(e) => match e.kind() {
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::InvalidState | ErrorKind::AlreadyDone => StatusCode::CONFLICT,
                ErrorKind::LimitExceeded | ErrorKind::Unavailable => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Rejected(status, _) => *status,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Rejected(rejection.status(), rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Request failed: {}", self);
            "Internal server error".to_string()
        } else {
            tracing::debug!("Request rejected ({}): {}", status, self);
            self.to_string()
        };

        let body = serde_json::json!({ "success": false, "message": message });
        (status, Json(body)).into_response()
    }
}

/// `Json` whose rejections use the same envelope as every other error.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[cfg(test)]
mod tests {
    use super::*;
    use libris_core::{EntityKind, Ineligibility, StorageError};

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                LibraryError::not_found(EntityKind::Reader, "reader-1"),
                StatusCode::NOT_FOUND,
            ),
            (
                LibraryError::InvalidState("busy".to_string()),
                StatusCode::CONFLICT,
            ),
            (
                LibraryError::AlreadyReturned("rec-1".to_string()),
                StatusCode::CONFLICT,
            ),
            (
                LibraryError::NotEligible(Ineligibility::BorrowLimitReached(7, 7)),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                LibraryError::RenewalLimitReached(2),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                LibraryError::Unavailable("pub-1".to_string()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (LibraryError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (
                LibraryError::Storage(StorageError::Database("disk".to_string())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status(), status);
        }
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_storage_errors_are_internal() {
        let error = ApiError::from(LibraryError::Storage(StorageError::Database(
            "secret path".to_string(),
        )));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
