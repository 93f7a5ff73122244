//! Per-message control flow
//!
//! One inbound message becomes one exchange: derive the transcript key,
//! ingest media, build the context, generate, then append the user and model
//! turns together. Any failure leaves the transcript untouched and yields a
//! fallback reply, so every message gets exactly one answer.

use std::sync::Arc;

use chrono::Utc;

use crate::Error;
use crate::channels::{InboundMessage, MessageKind, Transport};
use crate::context::ContextBuilder;
use crate::generation::{Attachment, GenerationClient};
use crate::media::{self, MediaStore};
use crate::transcript::{TranscriptStore, Turn};

/// Why an exchange produced a fallback instead of a reply
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// Sender has no usable transcript key
    #[error("cannot identify sender: {0}")]
    Identity(#[source] Error),

    /// Media could not be downloaded or saved
    #[error("media ingest failed: {0}")]
    Transport(#[source] Error),

    /// Backend, stream, or timeout failure
    #[error("generation failed: {0}")]
    Generation(#[source] Error),

    /// Transcript could not be read or written
    #[error("transcript i/o failed: {0}")]
    Persist(#[source] Error),
}

/// Result of handling one inbound message
#[derive(Debug)]
pub enum Outcome {
    /// Both turns were appended
    Persisted { reply: String },
    /// Nothing was appended; `reply` is the fallback text
    Failed { error: ExchangeError, reply: String },
}

impl Outcome {
    /// Text to send back to the user
    #[must_use]
    pub fn reply(&self) -> &str {
        match self {
            Self::Persisted { reply } | Self::Failed { reply, .. } => reply,
        }
    }

    #[must_use]
    pub const fn is_persisted(&self) -> bool {
        matches!(self, Self::Persisted { .. })
    }
}

/// Apologies sent when an exchange fails, per message kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fallbacks {
    pub text: String,
    pub image: String,
    pub document: String,
}

impl Default for Fallbacks {
    fn default() -> Self {
        Self {
            text: "Sorry, kichu vul holo... ami abar chesta korbo.".to_string(),
            image: "Oops... Chobi ta dekhte giye kichu vul holo.".to_string(),
            document: "Oops... File ta dekhte giye kichu vul holo.".to_string(),
        }
    }
}

impl Fallbacks {
    #[must_use]
    pub fn for_kind(&self, kind: &MessageKind) -> &str {
        match kind {
            MessageKind::Text(_) => &self.text,
            MessageKind::Photo { .. } => &self.image,
            MessageKind::Document { .. } => &self.document,
        }
    }
}

/// Drives exchanges between a transport, the transcript and the backend
pub struct Orchestrator {
    store: TranscriptStore,
    context: ContextBuilder,
    generation: GenerationClient,
    media: MediaStore,
    transport: Arc<dyn Transport>,
    fallbacks: Fallbacks,
}

impl Orchestrator {
    /// Create an orchestrator
    ///
    /// The context builder reads from the same store the orchestrator
    /// appends to.
    #[must_use]
    pub fn new(
        store: TranscriptStore,
        generation: GenerationClient,
        media: MediaStore,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            context: ContextBuilder::new(store.clone()),
            store,
            generation,
            media,
            transport,
            fallbacks: Fallbacks::default(),
        }
    }

    /// Replace the fallback messages
    #[must_use]
    pub fn with_fallbacks(mut self, fallbacks: Fallbacks) -> Self {
        self.fallbacks = fallbacks;
        self
    }

    /// Handle a message end to end and send the reply
    ///
    /// Returns `None` when the message was ignored. A failed send is logged;
    /// it never changes what was persisted.
    pub async fn handle(&self, msg: &InboundMessage) -> Option<Outcome> {
        let outcome = self.respond(msg).await?;

        if let Err(e) = self.transport.reply(msg, outcome.reply()).await {
            tracing::error!(
                transport = self.transport.name(),
                chat_id = msg.chat_id,
                error = %e,
                "failed to send reply"
            );
        }

        Some(outcome)
    }

    /// Run one exchange without sending anything back
    ///
    /// Text that is empty after trimming is ignored and yields `None`. Every
    /// other message yields exactly one outcome.
    pub async fn respond(&self, msg: &InboundMessage) -> Option<Outcome> {
        if let MessageKind::Text(text) = &msg.kind
            && text.trim().is_empty()
        {
            tracing::debug!(from = %msg.sender.display(), "ignoring empty message");
            return None;
        }

        let outcome = match self.exchange(msg).await {
            Ok(reply) => Outcome::Persisted { reply },
            Err(error) => {
                tracing::warn!(
                    from = %msg.sender.display(),
                    kind = msg.kind.label(),
                    error = %error,
                    "exchange failed; replying with fallback"
                );
                Outcome::Failed {
                    reply: self.fallbacks.for_kind(&msg.kind).to_string(),
                    error,
                }
            }
        };

        Some(outcome)
    }

    async fn exchange(&self, msg: &InboundMessage) -> Result<String, ExchangeError> {
        let key = msg.sender.user_key().map_err(ExchangeError::Identity)?;

        // Held until both turns are on disk
        let _guard = self.store.lock(&key).await;

        let (content, attachment) = self.ingest(msg).await?;

        tracing::info!(user = %key, kind = msg.kind.label(), "message received");

        let context = self
            .context
            .build(&key, &content, msg.sent_at)
            .await
            .map_err(ExchangeError::Persist)?;

        let reply = self
            .generation
            .generate(&context, attachment.as_ref())
            .await
            .map_err(ExchangeError::Generation)?;

        // Transcript timestamps never go backwards
        let asked_at = context.current().timestamp;
        let replied_at = Utc::now().max(asked_at);
        let turns = [
            Turn::user(content, asked_at),
            Turn::model(reply.clone(), replied_at),
        ];
        self.store
            .append_all(&key, &turns)
            .await
            .map_err(ExchangeError::Persist)?;

        tracing::info!(user = %key, chars = reply.len(), "exchange persisted");
        Ok(reply)
    }

    /// Turn the inbound payload into transcript content plus an optional
    /// attachment for the backend
    async fn ingest(
        &self,
        msg: &InboundMessage,
    ) -> Result<(String, Option<Attachment>), ExchangeError> {
        let user_id = msg.sender.user_id;

        match &msg.kind {
            MessageKind::Text(text) => Ok((text.trim().to_string(), None)),
            MessageKind::Photo { file_id } => {
                let filename = media::photo_filename(user_id, msg.message_id);
                let data = self.fetch(file_id, &filename).await?;

                Ok((
                    format!("[User sent image: {filename}]"),
                    Some(Attachment::new(data, media::PHOTO_MIME)),
                ))
            }
            MessageKind::Document {
                file_id,
                file_name,
                mime_type,
            } => {
                let filename =
                    media::document_filename(user_id, msg.message_id, file_name.as_deref());
                let data = self.fetch(file_id, &filename).await?;
                let mime = media::document_mime(file_name.as_deref(), mime_type.as_deref());

                Ok((
                    format!("[User sent file: {filename}]"),
                    Some(Attachment::new(data, mime)),
                ))
            }
        }
    }

    /// Download a media payload and keep a copy on disk
    async fn fetch(&self, file_id: &str, filename: &str) -> Result<Vec<u8>, ExchangeError> {
        let data = self
            .transport
            .download(file_id)
            .await
            .map_err(ExchangeError::Transport)?;

        self.media
            .save(filename, &data)
            .await
            .map_err(ExchangeError::Transport)?;

        Ok(data)
    }
}
