//! Transcript identity keys

use crate::{Error, Result};

/// Prefix for keys derived from a numeric user id
///
/// `-` never appears in a handle, so numeric keys cannot collide with them.
const NUMERIC_PREFIX: &str = "id-";

/// Stable, filesystem-safe identity of one user's transcript
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserKey(String);

impl UserKey {
    /// Derive a key from the sender's handle, falling back to the numeric id
    ///
    /// Handles are case-insensitive on Telegram, so they are lowercased to keep
    /// one transcript per user across renames in case only.
    ///
    /// # Errors
    ///
    /// Returns error if the handle contains characters outside `[A-Za-z0-9_]`
    pub fn from_sender(handle: Option<&str>, user_id: i64) -> Result<Self> {
        match handle.map(str::trim).filter(|h| !h.is_empty()) {
            Some(handle) => Self::from_handle(handle),
            None => Ok(Self::from_id(user_id)),
        }
    }

    /// Key for a user identified only by numeric id
    #[must_use]
    pub fn from_id(user_id: i64) -> Self {
        Self(format!("{NUMERIC_PREFIX}{user_id}"))
    }

    /// Key for a user with a platform handle
    ///
    /// # Errors
    ///
    /// Returns error if the handle is empty or not filesystem-safe
    pub fn from_handle(handle: &str) -> Result<Self> {
        if handle.is_empty() {
            return Err(Error::InvalidUserKey("empty handle".to_string()));
        }

        if !handle
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(Error::InvalidUserKey(format!(
                "handle {handle:?} contains unsupported characters"
            )));
        }

        Ok(Self(handle.to_ascii_lowercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
