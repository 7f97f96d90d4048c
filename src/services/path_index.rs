//! Path index: the metadata store mapping virtual paths to file records.
//!
//! Handlers only see the [`PathIndex`] capability; `SqlitePathIndex` is the
//! production backend.

use crate::models::{
    file::{FileRecord, FileUpdate, NewFile},
    user::User,
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("file `{0}` not found")]
    NotFound(String),
    #[error("file `{0}` already exists")]
    Conflict(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type IndexResult<T> = Result<T, IndexError>;

#[async_trait]
pub trait PathIndex: Send + Sync {
    /// Every record whose path equals `prefix` or is nested under it.
    async fn find_files(&self, prefix: &str) -> IndexResult<Vec<FileRecord>>;

    async fn get_file(&self, path: &str) -> IndexResult<FileRecord>;

    /// Insert a record. Fails with `Conflict` when the path is taken.
    async fn create_file(&self, file: NewFile) -> IndexResult<i64>;

    /// Apply `update` to the record at `old_path`.
    async fn update_file(&self, old_path: &str, update: FileUpdate) -> IndexResult<i64>;

    async fn delete_file(&self, path: &str) -> IndexResult<i64>;

    /// Remember the display name of an uploading identity.
    async fn upsert_user(&self, user: &User) -> IndexResult<()>;

    /// Cheap connectivity check for the readiness endpoint.
    async fn ping(&self) -> IndexResult<()>;
}

const SELECT_FILES: &str = "SELECT f.id, f.path, f.size, f.content_type, f.description, f.private,
        f.owner_id, u.name AS username, f.created_at, f.updated_at
 FROM files f LEFT JOIN users u ON u.id = f.owner_id";

/// SQLite-backed path index.
#[derive(Clone)]
pub struct SqlitePathIndex {
    db: Arc<SqlitePool>,
}

impl SqlitePathIndex {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PathIndex for SqlitePathIndex {
    async fn find_files(&self, prefix: &str) -> IndexResult<Vec<FileRecord>> {
        if prefix == "/" {
            let rows = sqlx::query_as::<_, FileRecord>(&format!("{SELECT_FILES} ORDER BY f.path"))
                .fetch_all(&*self.db)
                .await?;
            return Ok(rows);
        }

        let pattern = format!("{}/%", escape_like(prefix));
        let rows = sqlx::query_as::<_, FileRecord>(&format!(
            "{SELECT_FILES} WHERE f.path = ? OR f.path LIKE ? ESCAPE '\\' ORDER BY f.path"
        ))
        .bind(prefix)
        .bind(pattern)
        .fetch_all(&*self.db)
        .await?;
        Ok(rows)
    }

    async fn get_file(&self, path: &str) -> IndexResult<FileRecord> {
        sqlx::query_as::<_, FileRecord>(&format!("{SELECT_FILES} WHERE f.path = ?"))
            .bind(path)
            .fetch_one(&*self.db)
            .await
            .map_err(|err| match err {
                sqlx::Error::RowNotFound => IndexError::NotFound(path.to_string()),
                other => IndexError::Sqlx(other),
            })
    }

    async fn create_file(&self, file: NewFile) -> IndexResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO files (path, size, content_type, description, private, owner_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(&file.path)
        .bind(file.size)
        .bind(&file.content_type)
        .bind(&file.description)
        .bind(file.private)
        .bind(&file.owner_id)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                IndexError::Conflict(file.path.clone())
            } else {
                IndexError::Sqlx(err)
            }
        })
    }

    async fn update_file(&self, old_path: &str, update: FileUpdate) -> IndexResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "UPDATE files SET
                path = ?,
                size = COALESCE(?, size),
                content_type = CASE WHEN ? = '' THEN content_type ELSE ? END,
                description = ?,
                private = COALESCE(?, private),
                updated_at = ?
             WHERE path = ?
             RETURNING id",
        )
        .bind(&update.new_path)
        .bind(update.size)
        .bind(&update.content_type)
        .bind(&update.content_type)
        .bind(&update.description)
        .bind(update.private)
        .bind(Utc::now())
        .bind(old_path)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => IndexError::NotFound(old_path.to_string()),
            other if is_unique_violation(&other) => IndexError::Conflict(update.new_path.clone()),
            other => IndexError::Sqlx(other),
        })
    }

    async fn delete_file(&self, path: &str) -> IndexResult<i64> {
        sqlx::query_scalar::<_, i64>("DELETE FROM files WHERE path = ? RETURNING id")
            .bind(path)
            .fetch_one(&*self.db)
            .await
            .map_err(|err| match err {
                sqlx::Error::RowNotFound => IndexError::NotFound(path.to_string()),
                other => IndexError::Sqlx(other),
            })
    }

    async fn upsert_user(&self, user: &User) -> IndexResult<()> {
        sqlx::query(
            "INSERT INTO users (id, name) VALUES (?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
        )
        .bind(&user.id)
        .bind(&user.name)
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    async fn ping(&self) -> IndexResult<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        Ok(())
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

/// Escape `LIKE` wildcards so a prefix is matched literally.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
