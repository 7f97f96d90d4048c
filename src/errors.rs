use crate::services::{
    drive_service::DriveError,
    object_store::StoreError, path_index::IndexError, range::RangeError, upload::UploadError,
};
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for request errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    /// Object size reported alongside a 416.
    pub range_size: Option<u64>,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            range_size: None,
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, msg)
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, msg)
    }

    /// 416, optionally advertising the full object size.
    pub fn range_not_satisfiable(size: Option<u64>) -> Self {
        Self {
            range_size: size,
            ..Self::new(StatusCode::RANGE_NOT_SATISFIABLE, "range not satisfiable")
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        let mut response = (self.status, body).into_response();
        if let Some(size) = self.range_size {
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", size)) {
                response.headers_mut().insert(header::CONTENT_RANGE, value);
            }
        }
        response
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<IndexError> for AppError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::NotFound(_) => AppError::not_found(err.to_string()),
            IndexError::Conflict(_) => AppError::conflict(err.to_string()),
            IndexError::Sqlx(_) => AppError::internal(err.to_string()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => AppError::not_found(err.to_string()),
            StoreError::RangeNotSatisfiable { size } => AppError::range_not_satisfiable(Some(size)),
            StoreError::InvalidKey(_) => AppError::bad_request(err.to_string()),
            StoreError::Io(_) => AppError::internal(err.to_string()),
        }
    }
}

impl From<RangeError> for AppError {
    fn from(err: RangeError) -> Self {
        AppError {
            message: err.to_string(),
            ..AppError::range_not_satisfiable(None)
        }
    }
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::Multipart(inner) => AppError::new(inner.status(), inner.body_text()),
            other => AppError::bad_request(other.to_string()),
        }
    }
}

impl From<DriveError> for AppError {
    fn from(err: DriveError) -> Self {
        match err {
            DriveError::Index(inner) => inner.into(),
            DriveError::Store(inner) => inner.into(),
            DriveError::Upload(inner) => inner.into(),
            DriveError::Unauthorized => AppError::unauthorized(err.to_string()),
            DriveError::Forbidden(_) => AppError::forbidden(err.to_string()),
            DriveError::BadRequest(_) => AppError::bad_request(err.to_string()),
            DriveError::NothingFound(_) => AppError::not_found(err.to_string()),
        }
    }
}
