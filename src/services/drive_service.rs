//! Request-independent core of the drive.
//!
//! Composes the path index and the object store. Neither backend shares a
//! transaction with the other, so every mutation is ordered to prefer an
//! invisible orphan object over a record pointing at a missing object:
//! objects are written before their records, records are deleted before
//! their objects, and record renames are rolled back when the object move
//! fails.

use crate::{
    models::{
        file::{
            FileRecord, FileUpdate, NewFile, has_parent_segment, is_under, is_valid_name,
            join_path, normalize_path, relative_to, top_level_name,
        },
        user::User,
    },
    services::{
        access::has_access,
        batch::{BatchOp, BatchReport},
        identity::HeaderIdentity,
        object_store::{ObjectReader, ObjectStore, StoreError},
        path_index::{IndexError, PathIndex},
        upload::{Upload, UploadError},
    },
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum DriveError {
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("authentication required")]
    Unauthorized,
    #[error("access to `{0}` denied")]
    Forbidden(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("nothing found at `{0}`")]
    NothingFound(String),
}

pub type DriveResult<T> = Result<T, DriveError>;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct DriveService {
    pub index: Arc<dyn PathIndex>,
    pub store: Arc<dyn ObjectStore>,
    pub identity: Arc<HeaderIdentity>,
}

impl DriveService {
    pub fn new(
        index: Arc<dyn PathIndex>,
        store: Arc<dyn ObjectStore>,
        identity: HeaderIdentity,
    ) -> Self {
        Self {
            index,
            store,
            identity: Arc::new(identity),
        }
    }

    /// Every record at or below `path`.
    pub async fn find_files(&self, path: &str) -> DriveResult<Vec<FileRecord>> {
        Ok(self.index.find_files(path).await?)
    }

    /// Open the payload of `file`, limited to the inclusive `interval`.
    pub async fn open_file(
        &self,
        user: &User,
        file: &FileRecord,
        interval: Option<(u64, u64)>,
    ) -> DriveResult<ObjectReader> {
        if !has_access(user, file) {
            return Err(DriveError::Forbidden(file.path.clone()));
        }
        let (start, end) = match interval {
            Some((start, end)) => (Some(start), Some(end)),
            None => (None, None),
        };
        Ok(self.store.get_object(file.object_key(), start, end).await?)
    }

    /// Store a new file inside `dir`.
    pub async fn create_file(
        &self,
        user: &User,
        dir: &str,
        upload: Upload<'_>,
    ) -> DriveResult<FileRecord> {
        require_user(user)?;
        let (meta, payload) = upload.require_payload()?;
        let path = join_path(dir, &payload.file_name);

        match self.index.get_file(&path).await {
            Ok(_) => return Err(IndexError::Conflict(path).into()),
            Err(IndexError::NotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }
        self.index.upsert_user(user).await?;

        let content_type = payload.content_type.clone();
        let mut reader = payload.into_reader();
        let written = self
            .store
            .put_object(&path, meta.size, &mut reader, &content_type)
            .await?;
        drop(reader);

        let new_file = NewFile {
            path: path.clone(),
            size: written as i64,
            content_type,
            description: meta.description,
            private: meta.private.unwrap_or(false),
            owner_id: user.id.clone(),
        };
        if let Err(err) = self.index.create_file(new_file).await {
            // A conflict means a concurrent upload owns the object now.
            if !matches!(err, IndexError::Conflict(_)) {
                self.discard_object(&path).await;
            }
            return Err(err.into());
        }

        info!(path = %path, size = written, owner = %user.id, "file created");
        Ok(self.index.get_file(&path).await?)
    }

    /// Replace, rename or move the file at `path`.
    ///
    /// The target directory comes from the metadata `Dir` field and the name
    /// from `Name`, the payload filename or the current name, in that order.
    pub async fn update_file(
        &self,
        user: &User,
        path: &str,
        upload: Upload<'_>,
    ) -> DriveResult<FileRecord> {
        require_user(user)?;
        let existing = self.index.get_file(path).await?;
        if !has_access(user, &existing) {
            return Err(DriveError::Forbidden(path.to_string()));
        }

        let Upload { meta, payload } = upload;
        if let Some(dir) = meta.dir.as_deref().filter(|d| has_parent_segment(d)) {
            return Err(DriveError::BadRequest(format!("invalid directory `{dir}`")));
        }
        let dir = meta
            .dir
            .as_deref()
            .map(normalize_path)
            .unwrap_or_else(|| existing.dir().to_string());
        let name = meta
            .name
            .clone()
            .or_else(|| payload.as_ref().map(|p| p.file_name.clone()))
            .unwrap_or_else(|| existing.name().to_string());
        if !is_valid_name(&name) {
            return Err(DriveError::BadRequest(format!("invalid file name `{name}`")));
        }
        let new_path = join_path(&dir, &name);
        let renamed = new_path != path;

        if renamed {
            match self.index.get_file(&new_path).await {
                Ok(_) => return Err(IndexError::Conflict(new_path).into()),
                Err(IndexError::NotFound(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }

        let mut update = FileUpdate {
            new_path: new_path.clone(),
            size: None,
            content_type: meta.content_type.clone().unwrap_or_default(),
            description: meta.description.clone(),
            private: meta.private,
        };

        match payload {
            Some(payload) => {
                let content_type = payload.content_type.clone();
                let mut reader = payload.into_reader();
                let written = self
                    .store
                    .put_object(&new_path, meta.size, &mut reader, &content_type)
                    .await?;
                drop(reader);

                update.size = Some(written as i64);
                update.content_type = content_type;
                if let Err(err) = self.index.update_file(path, update).await {
                    if renamed {
                        self.discard_object(&new_path).await;
                    }
                    return Err(err.into());
                }
                if renamed {
                    self.discard_object(path).await;
                }
            }
            None => {
                self.index.update_file(path, update).await?;
                if renamed {
                    if let Err(err) = self.store.move_object(path, &new_path).await {
                        self.restore_record(&new_path, &existing).await;
                        return Err(err.into());
                    }
                }
            }
        }

        info!(from = path, to = %new_path, "file updated");
        Ok(self.index.get_file(&new_path).await?)
    }

    /// Relocate everything under `source` to `destination`.
    ///
    /// `names` restricts the batch to the listed top-level children of
    /// `source`; unselected and inaccessible records become warnings.
    pub async fn move_files(
        &self,
        user: &User,
        source: &str,
        destination: &str,
        names: Option<&[String]>,
    ) -> DriveResult<BatchReport> {
        require_user(user)?;
        if source == destination {
            return Err(DriveError::BadRequest(
                "destination must differ from source".into(),
            ));
        }
        if source == "/" || is_under(destination, source) {
            return Err(DriveError::BadRequest(format!(
                "cannot move `{source}` into itself"
            )));
        }

        let files = self.index.find_files(source).await?;
        if files.is_empty() {
            return Err(DriveError::NothingFound(source.to_string()));
        }

        let mut report = BatchReport::default();
        for file in files {
            if !self.admit(user, &file, source, names, &mut report) {
                continue;
            }
            let relative = relative_to(&file.path, source).unwrap_or_default();
            let new_path = join_path(destination, relative);

            let update = FileUpdate {
                new_path: new_path.clone(),
                description: file.description.clone(),
                ..Default::default()
            };
            if let Err(err) = self.index.update_file(&file.path, update).await {
                report.fail(BatchOp::UpdateRecord, &file.path, err);
                continue;
            }
            if let Err(err) = self.store.move_object(file.object_key(), &new_path).await {
                report.fail(BatchOp::MoveObject, &file.path, err);
                self.restore_record(&new_path, &file).await;
                continue;
            }
            report.processed += 1;
        }

        info!(
            source,
            destination,
            moved = report.processed,
            warnings = report.warnings.len(),
            errors = report.errors.len(),
            "move finished"
        );
        Ok(report)
    }

    /// Remove everything under `path`, with the same selection rules as
    /// [`DriveService::move_files`].
    pub async fn delete_files(
        &self,
        user: &User,
        path: &str,
        names: Option<&[String]>,
    ) -> DriveResult<BatchReport> {
        require_user(user)?;
        let files = self.index.find_files(path).await?;
        if files.is_empty() {
            return Err(DriveError::NothingFound(path.to_string()));
        }

        let mut report = BatchReport::default();
        for file in files {
            if !self.admit(user, &file, path, names, &mut report) {
                continue;
            }
            if let Err(err) = self.index.delete_file(&file.path).await {
                report.fail(BatchOp::DeleteRecord, &file.path, err);
                continue;
            }
            if let Err(err) = self.store.delete_object(file.object_key()).await {
                report.fail(BatchOp::DeleteObject, &file.path, err);
                continue;
            }
            report.processed += 1;
        }

        info!(
            path,
            deleted = report.processed,
            warnings = report.warnings.len(),
            errors = report.errors.len(),
            "delete finished"
        );
        Ok(report)
    }

    /// Name filter and access check shared by batch operations.
    fn admit(
        &self,
        user: &User,
        file: &FileRecord,
        prefix: &str,
        names: Option<&[String]>,
        report: &mut BatchReport,
    ) -> bool {
        if let Some(names) = names {
            let top = top_level_name(&file.path, prefix).unwrap_or_default();
            if !names.iter().any(|n| n == top) {
                report.warn(BatchOp::Filter, &file.path, "not selected");
                return false;
            }
        }
        if !has_access(user, file) {
            warn!(path = %file.path, user = %user.id, "batch skipped inaccessible file");
            report.warn(BatchOp::Access, &file.path, "access denied");
            return false;
        }
        true
    }

    /// Best-effort removal of an object no record points at.
    async fn discard_object(&self, key: &str) {
        if let Err(err) = self.store.delete_object(key).await {
            warn!(key, "failed to remove orphan object: {}", err);
        }
    }

    /// Put a renamed record back at its original path.
    async fn restore_record(&self, current_path: &str, original: &FileRecord) {
        let rollback = FileUpdate {
            new_path: original.path.clone(),
            size: Some(original.size),
            content_type: original.content_type.clone(),
            description: original.description.clone(),
            private: Some(original.private),
        };
        if let Err(err) = self.index.update_file(current_path, rollback).await {
            warn!(
                path = current_path,
                original = %original.path,
                "failed to roll back record after object move failure: {}",
                err
            );
        }
    }
}

fn require_user(user: &User) -> DriveResult<()> {
    if user.is_guest() {
        return Err(DriveError::Unauthorized);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        memory::{MemoryObjectStore, MemoryPathIndex},
        upload::{
            parse_upload,
            tests::{multipart, multipart_body},
        },
    };
    use axum::extract::Multipart;

    struct Fixture {
        index: Arc<MemoryPathIndex>,
        store: Arc<MemoryObjectStore>,
        service: DriveService,
    }

    fn fixture() -> Fixture {
        let index = Arc::new(MemoryPathIndex::default());
        let store = Arc::new(MemoryObjectStore::default());
        let service = DriveService::new(
            index.clone(),
            store.clone(),
            HeaderIdentity::new("x-user", "x-name", Vec::new()),
        );
        Fixture {
            index,
            store,
            service,
        }
    }

    async fn body(meta: &str, payload: Option<(&str, Option<&str>, &[u8])>) -> Multipart {
        multipart(multipart_body("json", Some(meta), payload)).await
    }

    fn alice() -> User {
        User::new("alice", "Alice")
    }

    async fn seed(f: &Fixture, dir: &str, name: &str, data: &[u8]) {
        let mut mp = body(r#"{"Description": "seed"}"#, Some((name, None, data))).await;
        let upload = parse_upload(&mut mp).await.unwrap();
        f.service.create_file(&alice(), dir, upload).await.unwrap();
    }

    #[tokio::test]
    async fn create_records_owner_and_size() {
        let f = fixture();
        seed(&f, "/d", "a.txt", b"abc").await;

        let record = f.index.get_file("/d/a.txt").await.unwrap();
        assert_eq!(record.size, 3);
        assert_eq!(record.owner_id, "alice");
        assert_eq!(record.username.as_deref(), Some("Alice"));
        assert_eq!(record.description, "seed");
        assert_eq!(f.store.get("/d/a.txt").as_deref(), Some(&b"abc"[..]));
    }

    #[tokio::test]
    async fn create_discards_object_when_record_fails() {
        let f = fixture();
        f.index.fail_on("/d/a.txt");

        let mut mp = body("{}", Some(("a.txt", None, &b"abc"[..]))).await;
        let upload = parse_upload(&mut mp).await.unwrap();
        let err = f.service.create_file(&alice(), "/d", upload).await.unwrap_err();

        assert!(matches!(err, DriveError::Index(IndexError::Sqlx(_))));
        assert!(f.store.get("/d/a.txt").is_none());
        assert!(f.index.paths().is_empty());
    }

    #[tokio::test]
    async fn guests_cannot_create() {
        let f = fixture();
        let mut mp = body("{}", Some(("a.txt", None, &b"abc"[..]))).await;
        let upload = parse_upload(&mut mp).await.unwrap();
        let err = f
            .service
            .create_file(&User::guest(), "/d", upload)
            .await
            .unwrap_err();
        assert!(matches!(err, DriveError::Unauthorized));
        assert!(f.store.get("/d/a.txt").is_none());
    }

    #[tokio::test]
    async fn rename_restores_record_when_object_move_fails() {
        let f = fixture();
        seed(&f, "/d", "a.txt", b"abc").await;
        f.store.fail_on("/d/a.txt");

        let mut mp = body(
            r#"{"Name": "b.txt", "Dir": "/e", "ContentType": "text/csv"}"#,
            None,
        )
        .await;
        let upload = parse_upload(&mut mp).await.unwrap();
        let err = f
            .service
            .update_file(&alice(), "/d/a.txt", upload)
            .await
            .unwrap_err();

        assert!(matches!(err, DriveError::Store(StoreError::Io(_))));
        assert_eq!(f.index.paths(), vec!["/d/a.txt"]);
        let record = f.index.get_file("/d/a.txt").await.unwrap();
        assert_eq!(record.description, "seed");
        assert_eq!(record.content_type, "application/octet-stream");
        assert_eq!(record.size, 3);
    }

    #[tokio::test]
    async fn update_rejects_dot_names_and_parent_dirs() {
        let f = fixture();
        seed(&f, "/d", "a.txt", b"abc").await;

        for meta in [
            r#"{"Name": "."}"#,
            r#"{"Name": ".."}"#,
            r#"{"Dir": "/d/../.."}"#,
        ] {
            let mut mp = body(meta, None).await;
            let upload = parse_upload(&mut mp).await.unwrap();
            let err = f
                .service
                .update_file(&alice(), "/d/a.txt", upload)
                .await
                .unwrap_err();
            assert!(matches!(err, DriveError::BadRequest(_)), "{meta}");
        }
        assert_eq!(f.index.paths(), vec!["/d/a.txt"]);
    }

    #[tokio::test]
    async fn empty_replacement_records_zero_size() {
        let f = fixture();
        seed(&f, "/d", "a.txt", b"abc").await;

        let mut mp = body("{}", Some(("a.txt", None, &b""[..]))).await;
        let upload = parse_upload(&mut mp).await.unwrap();
        let record = f
            .service
            .update_file(&alice(), "/d/a.txt", upload)
            .await
            .unwrap();

        assert_eq!(record.size, 0);
        assert_eq!(f.store.get("/d/a.txt").as_deref(), Some(&b""[..]));
    }

    #[tokio::test]
    async fn rename_into_taken_path_conflicts() {
        let f = fixture();
        seed(&f, "/d", "a.txt", b"a").await;
        seed(&f, "/d", "b.txt", b"b").await;

        let mut mp = body(r#"{"Name": "b.txt"}"#, None).await;
        let upload = parse_upload(&mut mp).await.unwrap();
        let err = f
            .service
            .update_file(&alice(), "/d/a.txt", upload)
            .await
            .unwrap_err();

        assert!(matches!(err, DriveError::Index(IndexError::Conflict(_))));
        assert_eq!(f.store.get("/d/b.txt").as_deref(), Some(&b"b"[..]));
    }

    #[tokio::test]
    async fn replacement_under_new_name_drops_old_object() {
        let f = fixture();
        seed(&f, "/d", "a.txt", b"old").await;

        let mut mp = body("{}", Some(("c.txt", Some("text/plain"), &b"new!"[..]))).await;
        let upload = parse_upload(&mut mp).await.unwrap();
        let record = f
            .service
            .update_file(&alice(), "/d/a.txt", upload)
            .await
            .unwrap();

        assert_eq!(record.path, "/d/c.txt");
        assert_eq!(record.size, 4);
        assert_eq!(record.content_type, "text/plain");
        assert!(f.store.get("/d/a.txt").is_none());
        assert_eq!(f.store.get("/d/c.txt").as_deref(), Some(&b"new!"[..]));
    }

    #[tokio::test]
    async fn delete_keeps_object_when_record_delete_fails() {
        let f = fixture();
        seed(&f, "/d", "a.txt", b"a").await;
        seed(&f, "/d", "b.txt", b"b").await;
        f.index.fail_on("/d/a.txt");

        let report = f.service.delete_files(&alice(), "/d", None).await.unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].op, BatchOp::DeleteRecord);
        assert_eq!(f.store.get("/d/a.txt").as_deref(), Some(&b"a"[..]));
        assert!(f.store.get("/d/b.txt").is_none());
    }

    #[tokio::test]
    async fn move_rejects_self_nesting() {
        let f = fixture();
        seed(&f, "/d", "a.txt", b"a").await;

        for destination in ["/d", "/d/inner"] {
            let err = f
                .service
                .move_files(&alice(), "/d", destination, None)
                .await
                .unwrap_err();
            assert!(matches!(err, DriveError::BadRequest(_)), "{destination}");
        }
        let err = f
            .service
            .move_files(&alice(), "/nothing", "/else", None)
            .await
            .unwrap_err();
        assert!(matches!(err, DriveError::NothingFound(_)));
    }

    #[tokio::test]
    async fn move_single_file_path() {
        let f = fixture();
        seed(&f, "/d", "a.txt", b"a").await;

        let report = f
            .service
            .move_files(&alice(), "/d/a.txt", "/e/a.txt", None)
            .await
            .unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(f.index.paths(), vec!["/e/a.txt"]);
        assert_eq!(f.store.get("/e/a.txt").as_deref(), Some(&b"a"[..]));
    }
}
