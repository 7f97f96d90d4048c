//! Request identity, as asserted by an authenticating reverse proxy.

use crate::models::user::User;
use axum::http::HeaderMap;
use std::collections::HashSet;

/// Resolves the calling user from trusted proxy headers.
#[derive(Clone, Debug)]
pub struct HeaderIdentity {
    user_header: String,
    name_header: String,
    admins: HashSet<String>,
}

impl HeaderIdentity {
    pub fn new(
        user_header: impl Into<String>,
        name_header: impl Into<String>,
        admins: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            user_header: user_header.into().to_ascii_lowercase(),
            name_header: name_header.into().to_ascii_lowercase(),
            admins: admins.into_iter().collect(),
        }
    }

    /// The user named by the request headers, or the guest identity.
    pub fn resolve(&self, headers: &HeaderMap) -> User {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let Some(id) = header(&self.user_header) else {
            return User::guest();
        };
        let name = header(&self.name_header).unwrap_or(id);
        if self.admins.contains(id) {
            User::admin(id, name)
        } else {
            User::new(id, name)
        }
    }
}
