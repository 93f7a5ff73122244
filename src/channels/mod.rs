//! Chat transport adapters
//!
//! A transport delivers classified inbound messages, fetches media payloads
//! on request, and sends back one reply per inbound message.

pub mod telegram;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use telegram::TelegramChannel;

use crate::Result;
use crate::transcript::UserKey;

/// Who sent a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    /// Numeric platform user id
    pub user_id: i64,
    /// Public handle, if the user has one
    pub username: Option<String>,
}

impl Sender {
    /// Transcript identity for this sender
    ///
    /// # Errors
    ///
    /// Returns error if the handle is not filesystem-safe
    pub fn user_key(&self) -> Result<UserKey> {
        UserKey::from_sender(self.username.as_deref(), self.user_id)
    }

    /// Handle or numeric id, for logs
    #[must_use]
    pub fn display(&self) -> String {
        self.username
            .clone()
            .unwrap_or_else(|| self.user_id.to_string())
    }
}

/// Classified content of an inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    /// Plain text
    Text(String),
    /// Photo; `file_id` refers to the largest available size
    Photo { file_id: String },
    /// Generic file upload
    Document {
        file_id: String,
        file_name: Option<String>,
        /// MIME type declared by the transport
        mime_type: Option<String>,
    },
}

impl MessageKind {
    /// Short label for logs
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Photo { .. } => "photo",
            Self::Document { .. } => "document",
        }
    }
}

/// A message received from a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Conversation the reply goes to
    pub chat_id: i64,
    /// Platform message id, used to thread the reply
    pub message_id: i64,
    pub sender: Sender,
    /// Original send time reported by the platform
    pub sent_at: DateTime<Utc>,
    pub kind: MessageKind,
}

/// Chat platform collaborator
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport name for logging
    fn name(&self) -> &'static str;

    /// Fetch the binary payload of a media message
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be located or downloaded
    async fn download(&self, file_id: &str) -> Result<Vec<u8>>;

    /// Send the reply to an inbound message
    ///
    /// # Errors
    ///
    /// Returns error if the platform rejects the message
    async fn reply(&self, to: &InboundMessage, text: &str) -> Result<()>;
}
