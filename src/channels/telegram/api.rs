//! Raw Telegram Bot API calls

use secrecy::ExposeSecret;

use super::retry::{delay_for_attempt, is_recoverable, parse_retry_after};
use super::types::{
    GetFileRequest, GetUpdatesRequest, SendMessageRequest, TelegramFile, TelegramResponse, Update,
};
use crate::{Error, Result};

impl super::TelegramChannel {
    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_url, self.token.expose_secret())
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{file_path}", self.api_url, self.token.expose_secret())
    }

    /// Send a plain-text message, retrying transient failures
    ///
    /// # Errors
    ///
    /// Returns error if the request fails after all retries, or immediately on
    /// a non-recoverable API error
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i64>,
    ) -> Result<()> {
        let url = self.method_url("sendMessage");
        let request = SendMessageRequest {
            chat_id,
            text,
            reply_to_message_id: reply_to,
        };

        let mut attempt = 0;
        loop {
            let (status, body) = match self.client.post(&url).json(&request).send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(chat_id, "Telegram message sent");
                    return Ok(());
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    (Some(status), response.text().await.unwrap_or_default())
                }
                Err(e) => (None, e.without_url().to_string()),
            };

            let retryable = status.is_none_or(is_recoverable);
            if !retryable || attempt >= self.retry.max_retries {
                return Err(Error::Transport(format!(
                    "Telegram sendMessage failed ({}): {body}",
                    status.map_or_else(|| "network".to_string(), |s| s.to_string())
                )));
            }

            let delay = delay_for_attempt(&self.retry, attempt, parse_retry_after(&body));
            tracing::warn!(chat_id, attempt, ?status, ?delay, "retrying Telegram sendMessage");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Download a file by `file_id`
    ///
    /// Calls `getFile` to resolve the file path, then fetches the bytes from
    /// the file endpoint.
    ///
    /// # Errors
    ///
    /// Returns error if the lookup or download fails
    pub async fn download_file(&self, file_id: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .post(self.method_url("getFile"))
            .json(&GetFileRequest { file_id })
            .send()
            .await
            .map_err(|e| transport_error("Telegram getFile error", e))?;

        let parsed: TelegramResponse<TelegramFile> = response
            .json()
            .await
            .map_err(|e| transport_error("Telegram getFile parse error", e))?;

        let file_path = parsed
            .result
            .and_then(|f| f.file_path)
            .ok_or_else(|| {
                Error::Transport(format!(
                    "Telegram getFile returned no file_path: {}",
                    parsed.description.unwrap_or_default()
                ))
            })?;

        let response = self
            .client
            .get(self.file_url(&file_path))
            .send()
            .await
            .map_err(|e| transport_error("Telegram file download error", e))?;

        if !response.status().is_success() {
            return Err(Error::Transport(format!(
                "Telegram file download error: {}",
                response.status()
            )));
        }

        let data = response
            .bytes()
            .await
            .map_err(|e| transport_error("Telegram file download read error", e))?;

        tracing::debug!(file_path, bytes = data.len(), "downloaded Telegram file");
        Ok(data.to_vec())
    }

    /// Delete any webhook so `getUpdates` can be used
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails
    pub async fn delete_webhook(&self) -> Result<()> {
        let response = self
            .client
            .post(self.method_url("deleteWebhook"))
            .send()
            .await
            .map_err(|e| transport_error("Telegram deleteWebhook error", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transport(format!(
                "Telegram deleteWebhook error: {status} - {body}"
            )));
        }

        Ok(())
    }

    /// Long-poll for new message updates
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or Telegram reports an error
    pub(crate) async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>> {
        let request = GetUpdatesRequest {
            offset,
            timeout: self.long_poll_timeout.as_secs(),
            allowed_updates: vec!["message".to_string()],
        };

        let response = self
            .client
            .post(self.method_url("getUpdates"))
            .timeout(self.long_poll_timeout + std::time::Duration::from_secs(10))
            .json(&request)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;

        let parsed: TelegramResponse<Vec<Update>> =
            response.json().await.map_err(reqwest::Error::without_url)?;
        if !parsed.ok {
            return Err(Error::Transport(format!(
                "Telegram getUpdates error: {}",
                parsed.description.unwrap_or_default()
            )));
        }

        Ok(parsed.result.unwrap_or_default())
    }
}

/// Request URLs embed the bot token, so errors are stripped of them
fn transport_error(context: &str, e: reqwest::Error) -> Error {
    Error::Transport(format!("{context}: {}", e.without_url()))
}
