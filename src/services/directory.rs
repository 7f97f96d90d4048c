//! Directory aggregator: folds flat file records into one level of a
//! virtual directory tree.

use crate::{
    models::{
        file::{FileRecord, parent_dir, relative_to},
        listing::DirEntry,
        user::User,
    },
    services::access::{has_access, is_owner},
};

/// Build the entries shown when listing `prefix`.
///
/// Files directly inside `prefix` become leaf entries. Deeper files are
/// merged into one synthetic directory per first segment below `prefix`:
/// sizes are summed, the date widens to the latest descendant, owner labels
/// are unioned and `is_owner` is OR-ed. Entries keep first-seen order.
/// Records the user may not access are skipped.
pub fn aggregate(prefix: &str, files: &[FileRecord], user: &User) -> Vec<DirEntry> {
    let mut entries: Vec<DirEntry> = Vec::new();

    for file in files.iter().filter(|f| has_access(user, f)) {
        let Some(relative) = relative_to(&file.path, prefix) else {
            continue;
        };

        if relative.is_empty() || parent_dir(&file.path) == prefix {
            entries.push(DirEntry {
                name: file.name().to_string(),
                dir: file.dir().to_string(),
                is_dir: false,
                size: file.size,
                date: file.modified_at(),
                owner: file.owner_label().to_string(),
                description: file.description.clone(),
                private: file.private,
                is_owner: is_owner(user, file),
            });
            continue;
        }

        let name = relative.split('/').next().unwrap_or(relative);
        match entries.iter_mut().find(|e| e.is_dir && e.name == name) {
            Some(entry) => merge(entry, file, user),
            None => entries.push(DirEntry {
                name: name.to_string(),
                dir: prefix.to_string(),
                is_dir: true,
                size: file.size,
                date: file.modified_at(),
                owner: file.owner_label().to_string(),
                description: String::new(),
                private: false,
                is_owner: is_owner(user, file),
            }),
        }
    }

    entries
}

fn merge(entry: &mut DirEntry, file: &FileRecord, user: &User) {
    entry.size += file.size;
    let date = file.modified_at();
    if entry.date < date {
        entry.date = date;
    }
    let owner = file.owner_label();
    if !entry.owner.split(", ").any(|o| o == owner) {
        entry.owner.push_str(", ");
        entry.owner.push_str(owner);
    }
    entry.is_owner |= is_owner(user, file);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn record(path: &str, size: i64, owner: &str, minutes: i64) -> FileRecord {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        FileRecord {
            id: 0,
            path: path.into(),
            size,
            content_type: "text/plain".into(),
            description: format!("about {path}"),
            private: false,
            owner_id: owner.into(),
            username: Some(owner.to_uppercase()),
            created_at: base,
            updated_at: Some(base + Duration::minutes(minutes)),
        }
    }

    #[test]
    fn nested_files_fold_into_one_directory() {
        let files = vec![record("/a/x.txt", 10, "alice", 1), record("/a/y.txt", 20, "bob", 5)];
        let entries = aggregate("/", &files, &User::new("alice", "Alice"));

        assert_eq!(entries.len(), 1);
        let dir = &entries[0];
        assert!(dir.is_dir);
        assert_eq!(dir.name, "a");
        assert_eq!(dir.size, 30);
        assert_eq!(dir.date, files[1].modified_at());
        assert_eq!(dir.owner, "ALICE, BOB");
        assert!(dir.is_owner);
    }

    #[test]
    fn direct_children_are_leaves_and_order_is_first_seen() {
        let files = vec![
            record("/docs/z/deep/file.bin", 5, "alice", 3),
            record("/docs/readme.md", 7, "bob", 2),
            record("/docs/z/other.bin", 1, "alice", 1),
        ];
        let entries = aggregate("/docs", &files, &User::new("carol", "Carol"));

        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["z", "readme.md"]);
        assert_eq!(entries[0].size, 6);
        assert_eq!(entries[0].owner, "ALICE");
        assert!(!entries[0].is_owner);

        let leaf = &entries[1];
        assert!(!leaf.is_dir);
        assert_eq!(leaf.dir, "/docs");
        assert_eq!(leaf.description, "about /docs/readme.md");
        assert_eq!(leaf.owner, "BOB");
    }

    #[test]
    fn inaccessible_files_are_skipped() {
        let mut hidden = record("/a/secret.txt", 100, "alice", 9);
        hidden.private = true;
        let files = vec![record("/a/x.txt", 10, "alice", 1), hidden];

        let entries = aggregate("/", &files, &User::guest());
        assert_eq!(entries[0].size, 10);

        let entries = aggregate("/", &files, &User::admin("root", "Root"));
        assert_eq!(entries[0].size, 110);
        assert!(entries[0].is_owner);
    }

    #[test]
    fn missing_owner_is_unknown() {
        let mut orphan = record("/x.txt", 1, "ghost", 0);
        orphan.username = None;
        let entries = aggregate("/", &[orphan], &User::guest());
        assert_eq!(entries[0].owner, "Unknown");
    }
}
