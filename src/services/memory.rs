//! In-memory path index and object store used by the test suites.

use crate::{
    models::{
        file::{FileRecord, FileUpdate, NewFile, is_under},
        user::User,
    },
    services::{
        object_store::{ObjectReader, ObjectSource, ObjectStore, StoreError, StoreResult, resolve_bounds},
        path_index::{IndexError, IndexResult, PathIndex},
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    io,
    sync::Mutex,
};
use tokio::io::AsyncReadExt;

#[derive(Default)]
pub struct MemoryPathIndex {
    files: Mutex<BTreeMap<String, FileRecord>>,
    users: Mutex<HashMap<String, String>>,
    next_id: Mutex<i64>,
    /// Paths whose mutations fail with a backend error.
    pub failing: Mutex<HashSet<String>>,
}

impl MemoryPathIndex {
    pub fn fail_on(&self, path: &str) {
        self.failing.lock().unwrap().insert(path.to_string());
    }

    fn check(&self, path: &str) -> IndexResult<()> {
        if self.failing.lock().unwrap().contains(path) {
            return Err(IndexError::Sqlx(sqlx::Error::Protocol(format!(
                "injected failure for {path}"
            ))));
        }
        Ok(())
    }

    fn with_username(&self, mut record: FileRecord) -> FileRecord {
        record.username = self.users.lock().unwrap().get(&record.owner_id).cloned();
        record
    }

    pub fn paths(&self) -> Vec<String> {
        self.files.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl PathIndex for MemoryPathIndex {
    async fn find_files(&self, prefix: &str) -> IndexResult<Vec<FileRecord>> {
        let files = self.files.lock().unwrap().clone();
        Ok(files
            .into_values()
            .filter(|f| is_under(&f.path, prefix))
            .map(|f| self.with_username(f))
            .collect())
    }

    async fn get_file(&self, path: &str) -> IndexResult<FileRecord> {
        let record = self.files.lock().unwrap().get(path).cloned();
        record
            .map(|f| self.with_username(f))
            .ok_or_else(|| IndexError::NotFound(path.to_string()))
    }

    async fn create_file(&self, file: NewFile) -> IndexResult<i64> {
        self.check(&file.path)?;
        let mut files = self.files.lock().unwrap();
        if files.contains_key(&file.path) {
            return Err(IndexError::Conflict(file.path));
        }
        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        files.insert(
            file.path.clone(),
            FileRecord {
                id: *next_id,
                path: file.path,
                size: file.size,
                content_type: file.content_type,
                description: file.description,
                private: file.private,
                owner_id: file.owner_id,
                username: None,
                created_at: Utc::now(),
                updated_at: None,
            },
        );
        Ok(*next_id)
    }

    async fn update_file(&self, old_path: &str, update: FileUpdate) -> IndexResult<i64> {
        self.check(old_path)?;
        let mut files = self.files.lock().unwrap();
        if update.new_path != old_path && files.contains_key(&update.new_path) {
            return Err(IndexError::Conflict(update.new_path));
        }
        let mut record = files
            .remove(old_path)
            .ok_or_else(|| IndexError::NotFound(old_path.to_string()))?;
        record.path = update.new_path;
        if let Some(size) = update.size {
            record.size = size;
        }
        if !update.content_type.is_empty() {
            record.content_type = update.content_type;
        }
        record.description = update.description;
        if let Some(private) = update.private {
            record.private = private;
        }
        record.updated_at = Some(Utc::now());
        let id = record.id;
        files.insert(record.path.clone(), record);
        Ok(id)
    }

    async fn delete_file(&self, path: &str) -> IndexResult<i64> {
        self.check(path)?;
        self.files
            .lock()
            .unwrap()
            .remove(path)
            .map(|f| f.id)
            .ok_or_else(|| IndexError::NotFound(path.to_string()))
    }

    async fn upsert_user(&self, user: &User) -> IndexResult<()> {
        self.users
            .lock()
            .unwrap()
            .insert(user.id.clone(), user.name.clone());
        Ok(())
    }

    async fn ping(&self) -> IndexResult<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Bytes>>,
    /// Keys whose reads and mutations fail with an I/O error.
    pub failing: Mutex<HashSet<String>>,
}

impl MemoryObjectStore {
    pub fn fail_on(&self, key: &str) {
        self.failing.lock().unwrap().insert(key.to_string());
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn insert(&self, key: &str, data: impl Into<Bytes>) {
        self.objects.lock().unwrap().insert(key.to_string(), data.into());
    }

    fn check(&self, key: &str) -> StoreResult<()> {
        if self.failing.lock().unwrap().contains(key) {
            return Err(StoreError::Io(io::Error::other(format!(
                "injected failure for {key}"
            ))));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(
        &self,
        key: &str,
        _size: u64,
        reader: ObjectSource<'_>,
        _content_type: &str,
    ) -> StoreResult<u64> {
        self.check(key)?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        let written = data.len() as u64;
        self.insert(key, data);
        Ok(written)
    }

    async fn get_object(
        &self,
        key: &str,
        start: Option<u64>,
        end: Option<u64>,
    ) -> StoreResult<ObjectReader> {
        self.check(key)?;
        let data = self
            .get(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        let slice = match resolve_bounds(start, end, data.len() as u64)? {
            None => data,
            Some((first, last)) => data.slice(first as usize..=last as usize),
        };
        Ok(Box::new(io::Cursor::new(slice)))
    }

    async fn delete_object(&self, key: &str) -> StoreResult<()> {
        self.check(key)?;
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn move_object(&self, old_key: &str, new_key: &str) -> StoreResult<()> {
        self.check(old_key)?;
        let mut objects = self.objects.lock().unwrap();
        let data = objects
            .remove(old_key)
            .ok_or_else(|| StoreError::NotFound(old_key.to_string()))?;
        objects.insert(new_key.to_string(), data);
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
