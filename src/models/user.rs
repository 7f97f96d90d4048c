//! Represents the identity attached to a request.

use serde::Serialize;

/// Identity used for requests without a session.
pub const GUEST_ID: &str = "guest";

/// The user on whose behalf a request runs.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub is_admin: bool,
}

impl User {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_admin: false,
        }
    }

    pub fn admin(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            is_admin: true,
            ..Self::new(id, name)
        }
    }

    /// Anonymous identity.
    pub fn guest() -> Self {
        Self::new(GUEST_ID, GUEST_ID)
    }

    pub fn is_guest(&self) -> bool {
        self.id == GUEST_ID
    }
}
