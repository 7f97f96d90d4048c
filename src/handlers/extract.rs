//! Request extractors shared by the file handlers.

use crate::{
    errors::AppError,
    models::{
        file::{has_parent_segment, normalize_path},
        user::User,
    },
    services::drive_service::DriveService,
};
use axum::{
    extract::{FromRequestParts, Path},
    http::request::Parts,
};
use std::convert::Infallible;

/// Normalized virtual path of the request. The bare `/` route has no
/// captures and resolves to the root.
#[derive(Debug)]
pub struct DrivePath(pub String);

impl<S> FromRequestParts<S> for DrivePath
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if parts.uri.path() == "/" {
            return Ok(Self("/".into()));
        }
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
        Ok(Self(checked_path(&raw)?))
    }
}

/// Normalize `raw`, rejecting parent-directory segments.
pub fn checked_path(raw: &str) -> Result<String, AppError> {
    if has_parent_segment(raw) {
        return Err(AppError::bad_request(format!("invalid path `{raw}`")));
    }
    Ok(normalize_path(raw))
}

/// The calling identity; guests when no session is present.
#[derive(Debug)]
pub struct CurrentUser(pub User);

impl FromRequestParts<DriveService> for CurrentUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &DriveService,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self(state.identity.resolve(&parts.headers)))
    }
}
