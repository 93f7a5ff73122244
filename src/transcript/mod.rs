//! Durable per-user conversation transcripts
//!
//! A transcript is an append-only sequence of [`Turn`]s, one JSON record per
//! line, owned exclusively by [`TranscriptStore`].

mod key;
mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use key::UserKey;
pub use store::TranscriptStore;

/// Speaker of a turn
///
/// Serialized with the backend's own role names so records can be replayed
/// into a request without translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One role-tagged utterance in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    /// Create a user turn
    #[must_use]
    pub fn user(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp,
        }
    }

    /// Create a model turn
    #[must_use]
    pub fn model(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: Role::Model,
            content: content.into(),
            timestamp,
        }
    }
}
