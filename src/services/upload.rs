//! Upload protocol parser.
//!
//! An upload body is `multipart/form-data` with two parts: a `json` part
//! holding [`UploadMeta`], followed by the binary payload whose declared
//! filename supplies the base name of the stored file.

use crate::models::{
    file::{DEFAULT_CONTENT_TYPE, is_valid_name},
    upload::UploadMeta,
};
use axum::extract::multipart::{Field, Multipart, MultipartError};
use futures::TryStreamExt;
use std::{io, pin::Pin};
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;

const META_FIELD: &str = "json";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("json field not found")]
    MissingMeta,
    #[error("invalid json field: {0}")]
    InvalidMeta(#[from] serde_json::Error),
    #[error("not enough files")]
    MissingPayload,
    #[error("payload has no usable filename")]
    MissingFileName,
    #[error("malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),
}

/// The decoded body. The payload borrows the multipart stream and is read
/// lazily; dropping it releases the underlying part.
pub struct Upload<'a> {
    pub meta: UploadMeta,
    pub payload: Option<Payload<'a>>,
}

pub struct Payload<'a> {
    pub file_name: String,
    /// The part's own content type, else the metadata's, else the default.
    pub content_type: String,
    field: Field<'a>,
}

impl<'a> Payload<'a> {
    /// Consume the part as a byte reader.
    pub fn into_reader(self) -> impl AsyncRead + Send + Unpin + 'a {
        let stream: Pin<Box<_>> = Box::pin(self.field.map_err(io::Error::other));
        StreamReader::new(stream)
    }
}

/// Read the metadata part and position the stream at the payload part.
pub async fn parse_upload(multipart: &mut Multipart) -> Result<Upload<'_>, UploadError> {
    let meta_field = multipart
        .next_field()
        .await?
        .ok_or(UploadError::MissingMeta)?;
    if meta_field.name() != Some(META_FIELD) {
        return Err(UploadError::MissingMeta);
    }
    let meta: UploadMeta = serde_json::from_slice(&meta_field.bytes().await?)?;

    let payload = match multipart.next_field().await? {
        None => None,
        Some(field) => {
            let file_name = field
                .file_name()
                .map(str::to_string)
                .filter(|name| is_valid_name(name))
                .ok_or(UploadError::MissingFileName)?;
            let content_type = field
                .content_type()
                .filter(|ct| !ct.is_empty())
                .or(meta.content_type.as_deref().filter(|ct| !ct.is_empty()))
                .unwrap_or(DEFAULT_CONTENT_TYPE)
                .to_string();
            Some(Payload {
                file_name,
                content_type,
                field,
            })
        }
    };

    Ok(Upload { meta, payload })
}

impl<'a> Upload<'a> {
    /// The payload, failing when the body only carried metadata.
    pub fn require_payload(self) -> Result<(UploadMeta, Payload<'a>), UploadError> {
        match self.payload {
            Some(payload) => Ok((self.meta, payload)),
            None => Err(UploadError::MissingPayload),
        }
    }
}
