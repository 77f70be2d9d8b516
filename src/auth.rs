//! Bearer-token extractors and ownership checks.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use libris_core::{Claims, Role};

use crate::response::ApiError;
use crate::state::AppState;

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Claims);

impl CurrentUser {
    pub fn user_id(&self) -> &str {
        &self.0.user_id
    }

    pub fn is_admin(&self) -> bool {
        self.0.role.satisfies(Role::Admin)
    }

    pub fn require(&self, role: Role) -> Result<(), ApiError> {
        if self.0.role.satisfies(role) {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }

    /// Admins may act on any reader; everyone else only on their own
    /// reader profile.
    pub fn ensure_reader(&self, state: &AppState, reader_id: &str) -> Result<(), ApiError> {
        if self.is_admin() {
            return Ok(());
        }
        match state.library.readers.by_user(self.user_id()) {
            Some(reader) if reader.reader_id == reader_id => Ok(()),
            _ => Err(ApiError::Forbidden),
        }
    }

    pub fn ensure_user(&self, user_id: &str) -> Result<(), ApiError> {
        if self.is_admin() || self.user_id() == user_id {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(ApiError::Unauthorized)?;
        state
            .library
            .accounts
            .authenticate(token)
            .map(CurrentUser)
            .ok_or(ApiError::Unauthorized)
    }
}

/// An authenticated caller holding at least the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub CurrentUser);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        user.require(Role::Admin)?;
        Ok(AdminUser(user))
    }
}

/// An authenticated superadmin.
#[derive(Debug, Clone)]
pub struct SuperadminUser(pub CurrentUser);

impl FromRequestParts<AppState> for SuperadminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        user.require(Role::Superadmin)?;
        Ok(SuperadminUser(user))
    }
}
