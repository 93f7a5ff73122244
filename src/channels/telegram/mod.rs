//! Telegram channel adapter
//!
//! Long-polls the Bot API for messages and replies through `sendMessage`

mod api;
pub mod chunking;
pub mod dedup;
pub mod polling;
pub mod retry;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::SecretString;

use super::{InboundMessage, Transport};
use crate::Result;

pub use dedup::UpdateDedup;
pub use retry::RetryPolicy;
pub use types::DEFAULT_API_URL;

/// Default long-poll timeout for getUpdates
const DEFAULT_LONG_POLL_SECS: u64 = 30;

/// Telegram channel adapter
#[derive(Clone)]
pub struct TelegramChannel {
    token: SecretString,
    /// Bot API server root, without the `/bot<token>` path
    api_url: String,
    client: Client,
    retry: RetryPolicy,
    long_poll_timeout: Duration,
}

impl TelegramChannel {
    /// Create a new Telegram channel adapter
    #[must_use]
    pub fn new(token: SecretString) -> Self {
        Self {
            token,
            api_url: DEFAULT_API_URL.to_string(),
            client: Client::new(),
            retry: RetryPolicy::default(),
            long_poll_timeout: Duration::from_secs(DEFAULT_LONG_POLL_SECS),
        }
    }

    /// Point at a different Bot API server, such as a self-hosted one
    #[must_use]
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the retry policy for outbound replies
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl Transport for TelegramChannel {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        self.download_file(file_id).await
    }

    async fn reply(&self, to: &InboundMessage, text: &str) -> Result<()> {
        let chunks = chunking::chunk_text(text, chunking::DEFAULT_LIMIT);

        // Only the first chunk threads onto the user's message
        for (i, chunk) in chunks.iter().enumerate() {
            let reply_to = (i == 0).then_some(to.message_id);
            self.send_message(to.chat_id, chunk, reply_to).await?;
        }

        Ok(())
    }
}
