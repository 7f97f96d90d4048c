//! Access guard: who may see or modify a file record.

use crate::models::{file::FileRecord, user::User};

/// True if the file is public, owned by `user`, or `user` is an administrator.
///
/// Guests never own anything, so they only see public files.
pub fn has_access(user: &User, file: &FileRecord) -> bool {
    !file.private || is_owner(user, file)
}

/// True if `user` owns the file or is an administrator.
pub fn is_owner(user: &User, file: &FileRecord) -> bool {
    user.is_admin || (!user.is_guest() && user.id == file.owner_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn file(owner: &str, private: bool) -> FileRecord {
        FileRecord {
            id: 1,
            path: "/f.txt".into(),
            size: 1,
            content_type: "text/plain".into(),
            description: String::new(),
            private,
            owner_id: owner.into(),
            username: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn public_files_are_visible_to_everyone() {
        assert!(has_access(&User::guest(), &file("alice", false)));
        assert!(has_access(&User::new("bob", "Bob"), &file("alice", false)));
    }

    #[test]
    fn private_files_need_owner_or_admin() {
        let private = file("alice", true);
        assert!(has_access(&User::new("alice", "Alice"), &private));
        assert!(has_access(&User::admin("root", "Root"), &private));
        assert!(!has_access(&User::new("bob", "Bob"), &private));
        assert!(!has_access(&User::guest(), &private));
    }

    #[test]
    fn guest_never_owns_guest_records() {
        assert!(!is_owner(&User::guest(), &file("guest", true)));
    }
}
