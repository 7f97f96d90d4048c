//! Defines routes for the virtual file system.
//!
//! ## Structure
//! - **Health**
//!   - `GET /healthz`, `GET /readyz`
//!
//! - **File tree** (`/` and `/{*path}`)
//!   - `GET`/`HEAD` — single file, zip archive (`?dl=`) or JSON listing
//!   - `POST`       — upload a new file into the directory
//!   - `PATCH`      — replace, rename or move a single file
//!   - `MOVE`       — relocate a subtree to the `Destination` header
//!   - `DELETE`     — remove a subtree or selected children
//!
//! The health endpoints are registered first, so a stored file cannot shadow them.

use crate::{
    handlers::{
        file_handlers::{delete_files, get_files, other_methods, patch_files, post_files},
        health_handlers::{healthz, readyz},
    },
    services::drive_service::DriveService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{MethodRouter, get},
};

/// Build the router. Request bodies are capped at `max_upload_bytes`.
pub fn routes(max_upload_bytes: usize) -> Router<DriveService> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/", file_routes())
        .route("/{*path}", file_routes())
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

fn file_routes() -> MethodRouter<DriveService> {
    get(get_files)
        .post(post_files)
        .patch(patch_files)
        .delete(delete_files)
        .fallback(other_methods)
}
