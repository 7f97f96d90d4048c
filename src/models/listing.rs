//! Virtual directory listing returned for non-download GET requests.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One entry of a listing: either a stored file or a synthetic directory
/// aggregated from every file nested below it.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct DirEntry {
    pub name: String,
    /// Directory the entry is listed in.
    pub dir: String,
    pub is_dir: bool,
    /// File size, or the sum of all descendant sizes for directories.
    pub size: i64,
    /// Modification time, or the latest descendant modification.
    pub date: DateTime<Utc>,
    /// Owner label; comma-joined distinct owners for directories.
    pub owner: String,
    pub description: String,
    pub private: bool,
    pub is_owner: bool,
}

/// A rendered directory page.
#[derive(Serialize, Debug)]
pub struct Listing {
    pub path: String,
    pub parts: Vec<String>,
    pub files: Vec<DirEntry>,
}
