//! Object store: binary payloads addressed by key.
//!
//! `DiskObjectStore` keeps payloads on local disk sharded beneath
//! `base_path/{shard}/{shard}/{key}`, where the shards are the first two
//! bytes of the key's MD5 digest.

use async_trait::async_trait;
use std::{
    io::{self, ErrorKind, SeekFrom},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error("requested range not satisfiable for object of {size} bytes")]
    RangeNotSatisfiable { size: u64 },
    #[error("invalid object key `{0}`")]
    InvalidKey(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Readable payload stream handed out by [`ObjectStore::get_object`].
pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

/// Upload source consumed by [`ObjectStore::put_object`].
pub type ObjectSource<'a> = &'a mut (dyn AsyncRead + Send + Unpin);

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store the bytes read from `reader` under `key`, replacing any
    /// previous object. Returns the number of bytes written.
    async fn put_object(
        &self,
        key: &str,
        size: u64,
        reader: ObjectSource<'_>,
        content_type: &str,
    ) -> StoreResult<u64>;

    /// Open `key` for reading. With `start` and/or `end` set, exactly the
    /// inclusive interval is returned.
    async fn get_object(
        &self,
        key: &str,
        start: Option<u64>,
        end: Option<u64>,
    ) -> StoreResult<ObjectReader>;

    async fn delete_object(&self, key: &str) -> StoreResult<()>;

    async fn move_object(&self, old_key: &str, new_key: &str) -> StoreResult<()>;

    /// Cheap write/read check for the readiness endpoint.
    async fn ping(&self) -> StoreResult<()>;
}

/// Resolve optional inclusive bounds against an object of `size` bytes.
///
/// `start` alone reads to the end, `end` alone reads the last `end` bytes.
pub fn resolve_bounds(
    start: Option<u64>,
    end: Option<u64>,
    size: u64,
) -> StoreResult<Option<(u64, u64)>> {
    let (first, last) = match (start, end) {
        (None, None) => return Ok(None),
        (Some(first), Some(last)) => (first, last),
        (Some(first), None) => (first, size.saturating_sub(1)),
        (None, Some(suffix)) => {
            if suffix == 0 {
                return Err(StoreError::RangeNotSatisfiable { size });
            }
            (size.saturating_sub(suffix), size.saturating_sub(1))
        }
    };
    if size == 0 || first > last || last >= size {
        return Err(StoreError::RangeNotSatisfiable { size });
    }
    Ok(Some((first, last)))
}

const MAX_OBJECT_KEY_LEN: usize = 1024;

/// Local-disk object store.
#[derive(Clone)]
pub struct DiskObjectStore {
    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,
}

impl DiskObjectStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Keys are absolute virtual paths; reject anything that could escape
    /// the base directory.
    fn ensure_key_safe(key: &str) -> StoreResult<()> {
        let invalid = key.len() <= 1
            || key.len() > MAX_OBJECT_KEY_LEN
            || !key.starts_with('/')
            || key.split('/').any(|segment| segment == "..")
            || key
                .bytes()
                .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0');
        if invalid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(())
    }

    /// Two-level shard identifiers: the first two bytes of MD5(key) in hex.
    fn object_shards(key: &str) -> (String, String) {
        let digest = md5::compute(key);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(key);
        let mut path = self.base_path.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key.trim_start_matches('/'));
        path
    }

    async fn open(&self, key: &str) -> StoreResult<File> {
        File::open(self.object_path(key)).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StoreError::NotFound(key.to_string())
            } else {
                StoreError::Io(err)
            }
        })
    }

    /// Remove empty directories from `start` up to (not including) the base.
    async fn prune_empty_dirs(&self, start: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(&self.base_path) && current != self.base_path {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStore for DiskObjectStore {
    async fn put_object(
        &self,
        key: &str,
        size: u64,
        reader: ObjectSource<'_>,
        content_type: &str,
    ) -> StoreResult<u64> {
        Self::ensure_key_safe(key)?;
        let file_path = self.object_path(key);
        let parent = file_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| StoreError::InvalidKey(key.to_string()))?;
        fs::create_dir_all(&parent).await?;

        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let written = match copy_and_sync(reader, &mut file).await {
            Ok(written) => written,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
        };
        drop(file);

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }

        if written != size {
            debug!(key, declared = size, written, "declared size differs from payload");
        }
        debug!(key, written, content_type, "stored object {}", file_path.display());
        Ok(written)
    }

    async fn get_object(
        &self,
        key: &str,
        start: Option<u64>,
        end: Option<u64>,
    ) -> StoreResult<ObjectReader> {
        Self::ensure_key_safe(key)?;
        let mut file = self.open(key).await?;
        let size = file.metadata().await?.len();

        match resolve_bounds(start, end, size)? {
            None => Ok(Box::new(file)),
            Some((first, last)) => {
                file.seek(SeekFrom::Start(first)).await?;
                Ok(Box::new(file.take(last - first + 1)))
            }
        }
    }

    async fn delete_object(&self, key: &str) -> StoreResult<()> {
        Self::ensure_key_safe(key)?;
        let file_path = self.object_path(key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(StoreError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent).await;
        }
        Ok(())
    }

    async fn move_object(&self, old_key: &str, new_key: &str) -> StoreResult<()> {
        Self::ensure_key_safe(old_key)?;
        Self::ensure_key_safe(new_key)?;
        let from = self.object_path(old_key);
        let to = self.object_path(new_key);
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).await?;
        }

        fs::rename(&from, &to).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StoreError::NotFound(old_key.to_string())
            } else {
                StoreError::Io(err)
            }
        })?;

        if let Some(parent) = from.parent() {
            self.prune_empty_dirs(parent).await;
        }
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        fs::create_dir_all(&self.base_path).await?;
        let marker = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&marker, b"readyz").await?;
        let bytes = fs::read(&marker).await;
        let _ = fs::remove_file(&marker).await;
        if bytes? != b"readyz" {
            return Err(StoreError::Io(io::Error::other("file content mismatch")));
        }
        Ok(())
    }
}

/// Stream `reader` into `file` with a bounded buffer, then flush and fsync.
async fn copy_and_sync(reader: ObjectSource<'_>, file: &mut File) -> io::Result<u64> {
    let written = tokio::io::copy(reader, file).await?;
    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}
