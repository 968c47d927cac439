//! User registration and lookup
//!
//! Handles are unique and case-insensitive. Passwords are stored as Argon2id
//! PHC strings; the plaintext never leaves [`UserDirectory::register`].

use crate::types::{User, UserId, WalletError};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

/// Registry of wallet users
#[derive(Debug, Default)]
pub struct UserDirectory {
    users: DashMap<UserId, User>,
    /// Normalized handle -> user id
    handles: DashMap<String, UserId>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new user
    ///
    /// `password` is optional so that the replay tool can open accounts for
    /// handles it has never seen; such users can't pass
    /// [`UserDirectory::verify_credentials`].
    ///
    /// # Errors
    ///
    /// * `Validation` - empty handle or empty password
    /// * `DuplicateUser` - the handle is taken (case-insensitively)
    pub fn register(&self, handle: &str, password: Option<&str>) -> Result<User, WalletError> {
        let handle = handle.trim();
        if handle.is_empty() {
            return Err(WalletError::validation("handle must not be empty"));
        }

        let credential_hash = match password {
            Some(password) => Some(hash_password(password)?),
            None => None,
        };

        match self.handles.entry(User::normalize_handle(handle)) {
            Entry::Occupied(_) => Err(WalletError::duplicate_user(handle)),
            Entry::Vacant(vacant) => {
                let user = User {
                    id: Uuid::new_v4(),
                    handle: handle.to_string(),
                    credential_hash,
                    created_at: Utc::now(),
                };
                self.users.insert(user.id, user.clone());
                vacant.insert(user.id);
                tracing::info!(user_id = %user.id, handle = %user.handle, "user registered");
                Ok(user)
            }
        }
    }

    /// Return the user for `handle`, registering it without a password if new
    pub fn ensure(&self, handle: &str) -> Result<User, WalletError> {
        if let Some(user) = self.find_by_handle(handle) {
            return Ok(user);
        }
        match self.register(handle, None) {
            Err(WalletError::DuplicateUser { .. }) => self
                .find_by_handle(handle)
                .ok_or_else(|| WalletError::user_not_found(handle)),
            other => other,
        }
    }

    /// Case-insensitive handle lookup
    pub fn find_by_handle(&self, handle: &str) -> Option<User> {
        let id = *self.handles.get(&User::normalize_handle(handle))?;
        self.get(id)
    }

    pub fn get(&self, id: UserId) -> Option<User> {
        self.users.get(&id).map(|user| user.clone())
    }

    /// Check a handle/password pair
    ///
    /// Unknown handles and wrong passwords produce the same error.
    pub fn verify_credentials(&self, handle: &str, password: &str) -> Result<User, WalletError> {
        let user = self
            .find_by_handle(handle)
            .ok_or(WalletError::InvalidCredentials)?;
        let stored = user
            .credential_hash
            .as_deref()
            .ok_or(WalletError::InvalidCredentials)?;
        let parsed = PasswordHash::new(stored)
            .map_err(|e| WalletError::persistence(format!("corrupt credential hash: {}", e)))?;

        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| WalletError::InvalidCredentials)?;
        Ok(user)
    }

    /// Number of registered users
    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

fn hash_password(password: &str) -> Result<String, WalletError> {
    if password.is_empty() {
        return Err(WalletError::validation("password must not be empty"));
    }
    // uuid v4 draws from the OS RNG, which is all a salt needs
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())
        .map_err(|e| WalletError::persistence(format!("salt generation failed: {}", e)))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| WalletError::persistence(format!("password hashing failed: {}", e)))
}
