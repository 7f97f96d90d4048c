//! Archive streamer: a zip of a subtree written straight into the response.
//!
//! Entries are selected up front (access guard plus optional name filter)
//! so that an empty selection can still be reported as 404. The archive
//! itself is produced by a background task writing into a bounded duplex
//! pipe; closing the response drops the read half and aborts the writer,
//! and a failed writer turns into an error at the end of the byte stream.

use crate::{
    models::{
        file::{FileRecord, relative_to, top_level_name},
        user::User,
    },
    services::{
        access::has_access,
        object_store::{ObjectStore, StoreError},
    },
};
use async_zip::{Compression, ZipDateTime, ZipEntryBuilder, base::write::ZipFileWriter};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt, future, stream};
use std::{io, sync::Arc};
use thiserror::Error;
use tokio::io::DuplexStream;
use tokio_util::{
    compat::{TokioAsyncReadCompatExt, TokioAsyncWriteCompatExt},
    io::ReaderStream,
};
use tracing::{debug, error, warn};

/// Archive name used at the root of the drive.
pub const PRODUCT_NAME: &str = "drive";

/// Trailing comment identifying the generator.
pub const ARCHIVE_COMMENT: &str = "Generated by drive";

const ARCHIVE_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Zip(#[from] async_zip::error::ZipError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// One file to be written into the archive.
#[derive(Clone, Debug, PartialEq)]
pub struct ArchiveEntry {
    /// Name inside the archive, relative to the requested directory.
    pub name: String,
    pub key: String,
    pub modified: DateTime<Utc>,
    pub comment: String,
}

/// Pick the records that go into an archive of `prefix`.
///
/// With `names`, only records whose first segment below `prefix` is listed
/// are kept. Records `user` may not access are skipped.
pub fn select_entries(
    prefix: &str,
    files: &[FileRecord],
    user: &User,
    names: Option<&[String]>,
) -> Vec<ArchiveEntry> {
    files
        .iter()
        .filter(|file| has_access(user, file))
        .filter_map(|file| {
            let relative = relative_to(&file.path, prefix)?;
            let name = if relative.is_empty() {
                file.name()
            } else {
                relative
            };
            if let Some(names) = names {
                let top = top_level_name(&file.path, prefix)?;
                if !names.iter().any(|n| n == top) {
                    return None;
                }
            }
            Some(ArchiveEntry {
                name: name.to_string(),
                key: file.object_key().to_string(),
                modified: file.modified_at(),
                comment: file.description.clone(),
            })
        })
        .collect()
}

/// File name offered for an archive of `path`.
pub fn archive_name(path: &str) -> String {
    let dir = path.trim_end_matches('/');
    match dir.rsplit_once('/') {
        Some((_, name)) if !name.is_empty() => format!("{name}.zip"),
        _ => format!("{PRODUCT_NAME}.zip"),
    }
}

/// Start writing the archive in the background and return its bytes as a
/// stream. A failure in the writer ends the stream with an error, so the
/// transfer is aborted instead of ending with a truncated archive.
pub fn stream_archive(
    store: Arc<dyn ObjectStore>,
    entries: Vec<ArchiveEntry>,
) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
    let (writer, reader) = tokio::io::duplex(ARCHIVE_BUFFER_SIZE);
    let task = tokio::spawn(async move {
        let result = write_archive(store.as_ref(), writer, &entries).await;
        match &result {
            Ok(written) => debug!(entries = written, "archive complete"),
            Err(err) => error!("archive aborted: {}", err),
        }
        result
    });

    let outcome = stream::once(async move {
        match task.await {
            Ok(Ok(_)) => None,
            Ok(Err(err)) => Some(Err(io::Error::other(err))),
            Err(err) => Some(Err(io::Error::other(err))),
        }
    })
    .filter_map(future::ready);

    ReaderStream::new(reader).chain(outcome)
}

/// Write every entry into `sink`. Records whose object is gone are not
/// available yet and are left out. Returns the number of entries written.
async fn write_archive(
    store: &dyn ObjectStore,
    sink: DuplexStream,
    entries: &[ArchiveEntry],
) -> Result<usize, ArchiveError> {
    let mut zip = ZipFileWriter::new(sink.compat_write());
    let mut written = 0;

    for entry in entries {
        let reader = match store.get_object(&entry.key, None, None).await {
            Ok(reader) => reader,
            Err(StoreError::NotFound(key)) => {
                warn!(key = %key, "skipping archive entry without object");
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        let builder = ZipEntryBuilder::new(entry.name.clone().into(), Compression::Deflate)
            .last_modification_date(ZipDateTime::from_chrono(&entry.modified))
            .comment(entry.comment.clone().into());
        let mut entry_writer = zip.write_entry_stream(builder).await?;
        futures::io::copy(reader.compat(), &mut entry_writer).await?;
        entry_writer.close().await?;
        written += 1;
    }

    zip.comment(ARCHIVE_COMMENT.to_string());
    zip.close().await?;
    Ok(written)
}
