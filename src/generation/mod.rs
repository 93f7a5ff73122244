//! Generation client for the generative-text backend
//!
//! The backend produces a finite stream of text fragments per request.
//! [`GenerationClient`] drains that stream under a timeout and exposes only the
//! final, trimmed reply to the rest of the system.

mod gemini;
mod sse;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::context::ConversationContext;
use crate::transcript::Turn;
use crate::{Error, Result};

pub use gemini::{DEFAULT_BASE_URL, GeminiBackend};

/// Lazy, finite, non-restartable sequence of reply fragments
pub type FragmentStream = BoxStream<'static, Result<String>>;

/// Content-safety blocking threshold applied to every harm category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SafetyThreshold {
    #[default]
    BlockNone,
    BlockOnlyHigh,
    BlockMediumAndAbove,
    BlockLowAndAbove,
}

impl std::str::FromStr for SafetyThreshold {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BLOCK_NONE" => Ok(Self::BlockNone),
            "BLOCK_ONLY_HIGH" => Ok(Self::BlockOnlyHigh),
            "BLOCK_MEDIUM_AND_ABOVE" => Ok(Self::BlockMediumAndAbove),
            "BLOCK_LOW_AND_ABOVE" => Ok(Self::BlockLowAndAbove),
            other => Err(Error::Config(format!("unknown safety threshold: {other}"))),
        }
    }
}

/// Sampling and output parameters sent with every request
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub safety_threshold: SafetyThreshold,
    /// Requested output format
    pub response_mime_type: String,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 1.7,
            safety_threshold: SafetyThreshold::BlockNone,
            response_mime_type: "text/plain".to_string(),
        }
    }
}

/// Inline binary payload for a non-text turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl Attachment {
    #[must_use]
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
        }
    }
}

/// What the backend is asked to respond to
#[derive(Debug, Clone, Copy)]
pub enum GenerationInput<'a> {
    /// Full role-tagged history plus the inbound turn
    Conversation(&'a [Turn]),
    /// A single attachment judged against the persona alone
    Attachment(&'a Attachment),
}

/// One outbound call to the backend
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub system_instruction: &'a str,
    pub params: &'a GenerationParams,
    pub input: GenerationInput<'a>,
}

/// Generative backend producing a streamed reply
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Start a streamed generation
    ///
    /// Performs a single round trip; fragments arrive until the backend
    /// signals end-of-stream.
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be sent or the backend rejects it
    async fn stream(&self, request: GenerationRequest<'_>) -> Result<FragmentStream>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Wraps the backend call and accumulates the streamed reply
#[derive(Clone)]
pub struct GenerationClient {
    backend: Arc<dyn GenerationBackend>,
    system_instruction: String,
    params: GenerationParams,
    timeout: Duration,
}

impl std::fmt::Debug for GenerationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationClient")
            .field("backend", &self.backend.name())
            .field("params", &self.params)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl GenerationClient {
    /// Create a generation client
    #[must_use]
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        system_instruction: impl Into<String>,
        params: GenerationParams,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            system_instruction: system_instruction.into(),
            params,
            timeout,
        }
    }

    /// Generate a reply
    ///
    /// Without an attachment the whole context is sent. With one, the backend
    /// sees only the persona instruction and the attachment; prior history is
    /// deliberately left out of media turns.
    ///
    /// No retries happen here. The whole round trip, including draining the
    /// stream, is bounded by the configured timeout; on expiry the in-flight
    /// request is dropped.
    ///
    /// # Errors
    ///
    /// Returns error on network or backend failure, a malformed stream, a
    /// timeout, or an empty reply
    pub async fn generate(
        &self,
        context: &ConversationContext,
        attachment: Option<&Attachment>,
    ) -> Result<String> {
        let input = match attachment {
            Some(attachment) => {
                tracing::debug!(
                    mime_type = %attachment.mime_type,
                    bytes = attachment.data.len(),
                    skipped_history = context.history().len(),
                    "generating from attachment only"
                );
                GenerationInput::Attachment(attachment)
            }
            None => GenerationInput::Conversation(context.turns()),
        };

        let request = GenerationRequest {
            system_instruction: &self.system_instruction,
            params: &self.params,
            input,
        };

        let text = tokio::time::timeout(self.timeout, self.collect(request))
            .await
            .map_err(|_| Error::Timeout(self.timeout))??;

        let reply = text.trim();
        if reply.is_empty() {
            return Err(Error::Generation(format!(
                "{} returned an empty reply",
                self.backend.name()
            )));
        }

        Ok(reply.to_string())
    }

    /// Drain the fragment stream into one string
    async fn collect(&self, request: GenerationRequest<'_>) -> Result<String> {
        let mut stream = self.backend.stream(request).await?;
        let mut text = String::new();
        let mut fragments = 0usize;

        while let Some(fragment) = stream.next().await {
            text.push_str(&fragment?);
            fragments += 1;
        }

        tracing::debug!(
            backend = self.backend.name(),
            fragments,
            chars = text.len(),
            "generation stream finished"
        );
        Ok(text)
    }
}
