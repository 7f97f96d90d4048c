//! Represents a file record held by the path index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Content type used whenever an upload does not declare one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Label shown for records whose owner no longer exists.
pub const UNKNOWN_OWNER: &str = "Unknown";

/// A single stored file.
///
/// The record only carries metadata; the bytes live in the object store
/// under a key equal to `path`.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct FileRecord {
    /// Internal row id.
    pub id: i64,

    /// Absolute, slash-separated virtual path. Unique across the index.
    pub path: String,

    /// Size in bytes, taken from the last completed write.
    pub size: i64,

    /// MIME type.
    pub content_type: String,

    /// Free-text description supplied by the uploader.
    pub description: String,

    /// Whether only the owner (and administrators) may see the file.
    pub private: bool,

    /// Identity of the uploading user.
    pub owner_id: String,

    /// Display name of the owner, absent when the user was deleted.
    pub username: Option<String>,

    /// When the record was created.
    pub created_at: DateTime<Utc>,

    /// When the record was last updated. `None` means never.
    pub updated_at: Option<DateTime<Utc>>,
}

impl FileRecord {
    /// Key of the payload in the object store.
    pub fn object_key(&self) -> &str {
        &self.path
    }

    /// Last segment of the path.
    pub fn name(&self) -> &str {
        base_name(&self.path)
    }

    /// Directory containing this file.
    pub fn dir(&self) -> &str {
        parent_dir(&self.path)
    }

    /// Owner label used in listings.
    pub fn owner_label(&self) -> &str {
        self.username.as_deref().unwrap_or(UNKNOWN_OWNER)
    }

    /// Most recent modification, falling back to the creation time.
    pub fn modified_at(&self) -> DateTime<Utc> {
        self.updated_at.unwrap_or(self.created_at)
    }
}

/// Values required to insert a new record.
#[derive(Clone, Debug)]
pub struct NewFile {
    pub path: String,
    pub size: i64,
    pub content_type: String,
    pub description: String,
    pub private: bool,
    pub owner_id: String,
}

/// Changes applied to an existing record.
///
/// `size: None` and an empty `content_type` leave the stored values untouched.
#[derive(Clone, Debug, Default)]
pub struct FileUpdate {
    pub new_path: String,
    pub size: Option<i64>,
    pub content_type: String,
    pub description: String,
    pub private: Option<bool>,
}

/// Normalize a request path: leading slash, no trailing slash, no empty
/// or `.` segments. The root is `/`.
pub fn normalize_path(raw: &str) -> String {
    let segments: Vec<&str> = raw
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    format!("/{}", segments.join("/"))
}

/// Whether `name` is usable as a single path segment.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/')
}

/// Whether `path` has a parent-directory segment.
pub fn has_parent_segment(path: &str) -> bool {
    path.split('/').any(|segment| segment == "..")
}

/// Join a directory and a file name.
pub fn join_path(dir: &str, name: &str) -> String {
    normalize_path(&format!("{}/{}", dir, name))
}

/// Last path segment, or `/` for the root.
pub fn base_name(path: &str) -> &str {
    match path.trim_end_matches('/').rsplit_once('/') {
        Some((_, name)) if !name.is_empty() => name,
        _ => "/",
    }
}

/// Parent directory of a normalized path. The parent of a top-level entry
/// (and of the root) is `/`.
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

/// Path of `path` relative to `prefix`, without a leading slash.
///
/// Returns `None` when `path` is neither equal to nor nested under `prefix`.
pub fn relative_to<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix == "/" {
        return Some(path.trim_start_matches('/'));
    }
    if path == prefix {
        return Some("");
    }
    path.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('/'))
}

/// Name of the entry directly below `prefix` that contains `path`: the
/// first relative segment, or the base name when `path` is `prefix` itself.
pub fn top_level_name<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let relative = relative_to(path, prefix)?;
    if relative.is_empty() {
        return Some(base_name(path));
    }
    relative.split('/').next()
}

/// Whether `path` equals `prefix` or is nested under it as a directory.
pub fn is_under(path: &str, prefix: &str) -> bool {
    relative_to(path, prefix).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_redundant_slashes() {
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("a//b/"), "/a/b");
        assert_eq!(normalize_path("/a/./b"), "/a/b");
    }

    #[test]
    fn parent_and_base_name() {
        assert_eq!(parent_dir("/a/b/c.txt"), "/a/b");
        assert_eq!(parent_dir("/c.txt"), "/");
        assert_eq!(parent_dir("/"), "/");
        assert_eq!(base_name("/a/b/c.txt"), "c.txt");
        assert_eq!(base_name("/"), "/");
    }

    #[test]
    fn relative_paths_respect_segment_boundaries() {
        assert_eq!(relative_to("/a/b/c", "/a"), Some("b/c"));
        assert_eq!(relative_to("/a", "/a"), Some(""));
        assert_eq!(relative_to("/ab/c", "/a"), None);
        assert_eq!(relative_to("/x/y", "/"), Some("x/y"));
        assert!(is_under("/a/b", "/a"));
        assert!(!is_under("/abc", "/a"));
    }

    #[test]
    fn dot_segments_are_not_names() {
        assert!(is_valid_name("a.txt"));
        assert!(is_valid_name("..hidden"));
        for name in ["", ".", "..", "a/b"] {
            assert!(!is_valid_name(name), "{name:?}");
        }
        assert!(has_parent_segment("/a/../b"));
        assert!(!has_parent_segment("/a/..b"));
    }

    #[test]
    fn top_level_names() {
        assert_eq!(top_level_name("/a/b/c.txt", "/a"), Some("b"));
        assert_eq!(top_level_name("/a/b.txt", "/a"), Some("b.txt"));
        assert_eq!(top_level_name("/a/b.txt", "/a/b.txt"), Some("b.txt"));
        assert_eq!(top_level_name("/z/b.txt", "/a"), None);
    }
}
