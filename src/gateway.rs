//! Gateway - the main relay service
//!
//! Wires the transcript store, media store, Gemini backend and Telegram
//! channel together, then handles inbound messages one at a time.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::channels::{InboundMessage, TelegramChannel, Transport};
use crate::generation::{GeminiBackend, GenerationClient};
use crate::media::MediaStore;
use crate::orchestrator::Orchestrator;
use crate::transcript::TranscriptStore;
use crate::{Config, Result};

/// Inbound messages buffered between the poller and the orchestrator
const QUEUE_CAPACITY: usize = 100;

/// Default pause after a failed poll
const DEFAULT_POLL_RETRY: Duration = Duration::from_secs(3);

/// The relay gateway
pub struct Gateway {
    config: Config,
    poll_retry: Duration,
}

impl Gateway {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self {
            config,
            poll_retry: DEFAULT_POLL_RETRY,
        }
    }

    /// Override the pause after a failed poll
    #[must_use]
    pub fn with_poll_retry(mut self, interval: Duration) -> Self {
        self.poll_retry = interval;
        self
    }

    /// Build the orchestrator for a transport
    ///
    /// # Errors
    ///
    /// Returns error if the data directories cannot be created
    pub fn orchestrator(&self, transport: Arc<dyn Transport>) -> Result<Orchestrator> {
        let config = &self.config;

        let store = TranscriptStore::open(config.history_dir())?;
        let media = MediaStore::open(config.media_dir())?;

        let backend = GeminiBackend::new(config.google_api_key.clone(), config.model.clone())
            .with_base_url(config.gemini_base_url.clone());
        let generation = GenerationClient::new(
            Arc::new(backend),
            config.system_prompt.clone(),
            config.generation.clone(),
            config.generation_timeout,
        );

        Ok(Orchestrator::new(store, generation, media, transport)
            .with_fallbacks(config.fallbacks.clone()))
    }

    /// Run until the poller stops or Ctrl-C is received
    ///
    /// # Errors
    ///
    /// Returns error if startup fails
    pub async fn run(self) -> Result<()> {
        tracing::info!(
            model = %self.config.model,
            data_dir = %self.config.data_dir.display(),
            "starting relay"
        );

        let telegram = TelegramChannel::new(self.config.telegram_token.clone())
            .with_api_url(self.config.telegram_api_url.clone())
            .with_retry(self.config.telegram_retry.clone());
        let orchestrator = self.orchestrator(Arc::new(telegram.clone()))?;

        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let poller = telegram.start_polling(tx, self.poll_retry);

        tokio::select! {
            () = process_messages(&orchestrator, rx) => {
                tracing::warn!("message queue closed");
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "failed to listen for shutdown signal");
                }
                tracing::info!("shutdown requested");
            }
        }

        poller.abort();
        tracing::info!("relay stopped");
        Ok(())
    }
}

/// Handle queued messages sequentially until the sender side closes
pub async fn process_messages(
    orchestrator: &Orchestrator,
    mut rx: mpsc::Receiver<InboundMessage>,
) {
    tracing::info!("message handler started");

    while let Some(msg) = rx.recv().await {
        orchestrator.handle(&msg).await;
    }
}
