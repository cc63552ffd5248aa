//! User directory.
//!
//! Keeps profile data for known users. It is independent of the registry:
//! a user can be known here without being connected to the broker.

use crate::error::UserError;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Regex for valid email addresses.
pub static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}$").expect("Invalid regex")
});

/// A chat user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique user identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Contact email.
    pub email: String,
}

impl User {
    /// Create a new user.
    pub fn new(id: impl Into<String>, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: email.into(),
        }
    }

    /// Check that name, email and id are present and the email is well-formed.
    pub fn validate(&self) -> Result<(), UserError> {
        if self.name.is_empty() {
            return Err(UserError::InvalidUser("empty name".into()));
        }
        if self.email.is_empty() {
            return Err(UserError::InvalidUser("empty email".into()));
        }
        if !is_valid_email(&self.email) {
            return Err(UserError::InvalidUser(format!(
                "invalid email: {}",
                self.email
            )));
        }
        if self.id.is_empty() {
            return Err(UserError::InvalidUser("empty id".into()));
        }
        Ok(())
    }
}

/// Check an email address against [`EMAIL_REGEX`].
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(email)
}

/// Thread-safe store of users keyed by id.
#[derive(Debug, Default)]
pub struct UserManager {
    users: RwLock<HashMap<String, User>>,
    cancel: Option<CancellationToken>,
}

impl UserManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a manager that refuses additions once `cancel` fires.
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            cancel: Some(cancel),
        }
    }

    /// Validate and store a user, replacing any user with the same id.
    pub fn add_user(&self, user: User) -> Result<(), UserError> {
        if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            return Err(UserError::Cancelled);
        }
        user.validate()?;

        self.users.write().insert(user.id.clone(), user);
        Ok(())
    }

    /// Remove a user.
    pub fn remove_user(&self, id: &str) -> Result<User, UserError> {
        self.users
            .write()
            .remove(id)
            .ok_or_else(|| UserError::NotFound(id.to_string()))
    }

    /// Get a user by id.
    pub fn get_user(&self, id: &str) -> Result<User, UserError> {
        self.users
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| UserError::NotFound(id.to_string()))
    }

    /// Number of stored users.
    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    /// True when no users are stored.
    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }
}
