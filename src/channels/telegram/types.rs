//! Telegram Bot API request/response types

use serde::{Deserialize, Serialize};

/// Public Bot API server; `/bot<token>/` and `/file/bot<token>/` hang off it
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Envelope around every Bot API response
#[derive(Debug, Deserialize)]
pub(crate) struct TelegramResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

/// A single update from getUpdates
#[derive(Debug, Deserialize)]
pub(crate) struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

/// Incoming message payload
#[derive(Debug, Deserialize)]
pub(crate) struct Message {
    pub message_id: i64,
    /// Unix time the message was sent
    pub date: i64,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
    pub photo: Option<Vec<PhotoSize>>,
    pub document: Option<Document>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub username: Option<String>,
}

/// One resolution of a photo; Telegram lists them smallest first
#[derive(Debug, Deserialize)]
pub(crate) struct PhotoSize {
    pub file_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Document {
    pub file_id: String,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
}

/// Telegram getUpdates request
#[derive(Debug, Serialize)]
pub(crate) struct GetUpdatesRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    /// Long-poll timeout in seconds
    pub timeout: u64,
    pub allowed_updates: Vec<String>,
}

/// Telegram sendMessage request
#[derive(Debug, Serialize)]
pub(crate) struct SendMessageRequest<'a> {
    pub chat_id: i64,
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<i64>,
}

/// Telegram getFile request
#[derive(Debug, Serialize)]
pub(crate) struct GetFileRequest<'a> {
    pub file_id: &'a str,
}

/// File metadata from Telegram getFile response
#[derive(Debug, Deserialize)]
pub(crate) struct TelegramFile {
    pub file_path: Option<String>,
}
