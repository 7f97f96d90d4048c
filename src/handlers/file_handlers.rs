//! HTTP handlers for the virtual file system.
//! Streams file and archive bodies to avoid buffering in memory and
//! delegates ordering and failure policy to `DriveService`.

use crate::{
    errors::AppError,
    handlers::extract::{CurrentUser, DrivePath, checked_path},
    models::{
        file::FileRecord,
        listing::Listing,
        user::User,
    },
    services::{
        access::has_access,
        archive::{archive_name, select_entries, stream_archive},
        batch::{BatchOutcome, BatchReport},
        directory::aggregate,
        drive_service::DriveService,
        range::{ByteRange, content_range},
        upload::parse_upload,
    },
};
use axum::{
    Json,
    body::{Body, Bytes},
    extract::{Multipart, Query, State, multipart::MultipartRejection},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::warn;

/// Custom verb used to relocate files.
pub const MOVE_METHOD: &str = "MOVE";

const DESTINATION: HeaderName = HeaderName::from_static("destination");

/// Query params accepted by GET.
#[derive(Debug, Default, Deserialize)]
pub struct DownloadQuery {
    pub dl: Option<String>,
}

/// What the `dl` query value asks for.
#[derive(Debug, PartialEq, Eq)]
pub enum Download {
    No,
    All,
    Names(Vec<String>),
}

impl Download {
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") | Some("0") | Some("false") => Download::No,
            Some("1") | Some("true") => Download::All,
            Some(list) => Download::Names(
                list.split(',')
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
        }
    }

    pub fn requested(&self) -> bool {
        !matches!(self, Download::No)
    }

    pub fn names(&self) -> Option<&[String]> {
        match self {
            Download::Names(names) => Some(names),
            _ => None,
        }
    }
}

/// GET/HEAD `/{*path}` — single file, archive or directory listing.
pub async fn get_files(
    State(service): State<DriveService>,
    method: Method,
    DrivePath(path): DrivePath,
    CurrentUser(user): CurrentUser,
    Query(query): Query<DownloadQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let download = Download::parse(query.dl.as_deref());
    let files = service.find_files(&path).await?;

    if files.is_empty() {
        if download.requested() {
            return Err(AppError::not_found(format!("nothing found at `{path}`")));
        }
        if path != "/" {
            return Ok((StatusCode::FOUND, [(header::LOCATION, "/")]).into_response());
        }
    }

    if files.len() == 1 && files[0].path == path {
        return serve_file(&service, &user, &files[0], &method, &headers, download.requested())
            .await;
    }

    if download.requested() {
        let entries = select_entries(&path, &files, &user, download.names());
        if entries.is_empty() {
            return Err(AppError::not_found(format!("nothing to download at `{path}`")));
        }

        let mut response = if method == Method::HEAD {
            Response::new(Body::empty())
        } else {
            let stream = stream_archive(service.store.clone(), entries);
            Response::new(Body::from_stream(stream))
        };
        let resp_headers = response.headers_mut();
        resp_headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/zip"),
        );
        resp_headers.insert(
            header::CONTENT_DISPOSITION,
            attachment(&archive_name(&path)),
        );
        return Ok(response);
    }

    let listing = Listing {
        parts: path
            .split('/')
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect(),
        files: aggregate(&path, &files, &user),
        path,
    };
    Ok(Json(listing).into_response())
}

async fn serve_file(
    service: &DriveService,
    user: &User,
    file: &FileRecord,
    method: &Method,
    headers: &HeaderMap,
    download: bool,
) -> Result<Response, AppError> {
    if !has_access(user, file) {
        return Err(AppError::forbidden(format!("access to `{}` denied", file.path)));
    }

    let raw_range = match headers.get(header::RANGE) {
        None => None,
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| AppError::range_not_satisfiable(None))?,
        ),
    };
    let range = ByteRange::parse(raw_range)?;
    let size = file.size.max(0) as u64;
    let interval = range.resolve(size)?;

    let body = if *method == Method::HEAD {
        Body::empty()
    } else {
        let reader = service.open_file(user, file, interval).await?;
        Body::from_stream(ReaderStream::new(reader))
    };

    let mut response = Response::new(body);
    let resp_headers = response.headers_mut();
    resp_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&file.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    resp_headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if let Ok(value) = HeaderValue::from_str(&http_date(file)) {
        resp_headers.insert(header::LAST_MODIFIED, value);
    }
    if download {
        resp_headers.insert(header::CONTENT_DISPOSITION, attachment(file.name()));
    }

    let length = match interval {
        Some((start, end)) => {
            if let Ok(value) = HeaderValue::from_str(&content_range(start, end, size)) {
                resp_headers.insert(header::CONTENT_RANGE, value);
            }
            *response.status_mut() = StatusCode::PARTIAL_CONTENT;
            end - start + 1
        }
        None => size,
    };
    response
        .headers_mut()
        .insert(header::CONTENT_LENGTH, HeaderValue::from(length));

    Ok(response)
}

/// POST `/{*path}` — upload a new file into the directory `path`.
pub async fn post_files(
    State(service): State<DriveService>,
    DrivePath(path): DrivePath,
    CurrentUser(user): CurrentUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<StatusCode, AppError> {
    require_session(&user)?;
    let mut multipart =
        multipart.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
    let upload = parse_upload(&mut multipart).await?;
    service.create_file(&user, &path, upload).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PATCH `/{*path}` — replace, rename or move the file at `path`.
pub async fn patch_files(
    State(service): State<DriveService>,
    DrivePath(path): DrivePath,
    CurrentUser(user): CurrentUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<StatusCode, AppError> {
    require_session(&user)?;
    let mut multipart =
        multipart.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
    let upload = parse_upload(&mut multipart).await?;
    service.update_file(&user, &path, upload).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// MOVE `/{*path}` — relocate the subtree to the `Destination` header.
pub async fn move_files(
    State(service): State<DriveService>,
    DrivePath(path): DrivePath,
    CurrentUser(user): CurrentUser,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    require_session(&user)?;
    let destination = destination_path(&headers)?;
    if destination == path {
        return Err(AppError::bad_request("destination must differ from source"));
    }
    let names = parse_names(&body)?;
    let report = service
        .move_files(&user, &path, &destination, names.as_deref())
        .await?;
    batch_response(report)
}

/// DELETE `/{*path}` — remove the subtree, or the listed children.
pub async fn delete_files(
    State(service): State<DriveService>,
    DrivePath(path): DrivePath,
    CurrentUser(user): CurrentUser,
    body: Bytes,
) -> Result<Response, AppError> {
    require_session(&user)?;
    let names = parse_names(&body)?;
    let report = service.delete_files(&user, &path, names.as_deref()).await?;
    batch_response(report)
}

/// Fallback for verbs without a dedicated route; only MOVE is served.
pub async fn other_methods(
    State(service): State<DriveService>,
    method: Method,
    path: DrivePath,
    user: CurrentUser,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    if method.as_str() != MOVE_METHOD {
        return Err(AppError::new(
            StatusCode::METHOD_NOT_ALLOWED,
            format!("method {method} not allowed"),
        ));
    }
    move_files(State(service), path, user, headers, body).await
}

fn require_session(user: &User) -> Result<(), AppError> {
    if user.is_guest() {
        return Err(AppError::unauthorized("authentication required"));
    }
    Ok(())
}

/// Target path from the `Destination` header, which may be a bare path or
/// an absolute URL.
fn destination_path(headers: &HeaderMap) -> Result<String, AppError> {
    let mut values = headers.get_all(DESTINATION).iter();
    let raw = values
        .next()
        .ok_or_else(|| AppError::bad_request("missing Destination header"))?;
    if values.next().is_some() {
        return Err(AppError::bad_request("duplicate Destination header"));
    }
    let raw = raw
        .to_str()
        .map_err(|_| AppError::bad_request("invalid Destination header"))?;
    let uri: Uri = raw
        .parse()
        .map_err(|_| AppError::bad_request("invalid Destination header"))?;
    // Either an absolute URL or an absolute path; never relative to the source.
    if (uri.scheme().is_none() && !raw.starts_with('/')) || !uri.path().starts_with('/') {
        return Err(AppError::bad_request(
            "Destination must be an absolute path or URL",
        ));
    }
    let decoded = percent_decode_str(uri.path())
        .decode_utf8()
        .map_err(|_| AppError::bad_request("invalid Destination header"))?;
    checked_path(&decoded)
}

/// Optional JSON array of top-level names. An empty body selects everything.
fn parse_names(body: &[u8]) -> Result<Option<Vec<String>>, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice::<Vec<String>>(body)
        .map(Some)
        .map_err(|err| AppError::bad_request(format!("invalid name list: {err}")))
}

fn batch_response(report: BatchReport) -> Result<Response, AppError> {
    match report.outcome() {
        BatchOutcome::Done => Ok(StatusCode::NO_CONTENT.into_response()),
        BatchOutcome::Partial(warnings) => {
            warn!(warnings = report.warnings.len(), "batch finished with warnings");
            Ok((StatusCode::PARTIAL_CONTENT, warnings).into_response())
        }
        BatchOutcome::Failed(errors) => Err(AppError::internal(errors)),
    }
}

fn attachment(name: &str) -> HeaderValue {
    let name = name.replace(['"', '\\'], "_");
    HeaderValue::from_str(&format!("attachment; filename=\"{name}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

fn http_date(file: &FileRecord) -> String {
    file.modified_at()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}
