//! Registered wallet users

use super::transaction::UserId;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A registered user
///
/// Identity (`id`, `handle`) is fixed at registration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: UserId,

    /// Unique handle (email or username), stored as registered
    pub handle: String,

    /// Argon2 PHC string; `None` for users created without a password
    #[serde(skip_serializing)]
    pub credential_hash: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl User {
    /// Normalized form of a handle used for uniqueness and lookup
    pub fn normalize_handle(handle: &str) -> String {
        handle.trim().to_lowercase()
    }
}
