//! Telegram polling mode: getUpdates loop and message conversion

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::dedup::UpdateDedup;
use super::types::Update;
use crate::channels::{InboundMessage, MessageKind, Sender};

impl super::TelegramChannel {
    /// Spawn a background task that polls Telegram's getUpdates API
    ///
    /// Received messages are forwarded into `tx` in arrival order. The task
    /// sleeps `interval` after a failed poll and exits once the receiver is
    /// dropped. Any existing webhook is deleted first to avoid conflicts.
    pub fn start_polling(
        &self,
        tx: mpsc::Sender<InboundMessage>,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let channel = self.clone();
        tokio::spawn(async move {
            channel.polling_loop(tx, interval).await;
        })
    }

    async fn polling_loop(&self, tx: mpsc::Sender<InboundMessage>, interval: Duration) {
        if let Err(e) = self.delete_webhook().await {
            tracing::warn!(error = %e, "failed to delete Telegram webhook before polling");
        }

        let mut offset: Option<i64> = None;
        let mut dedup = UpdateDedup::default();

        tracing::info!("Telegram polling started");

        while !tx.is_closed() {
            let updates = match self.get_updates(offset).await {
                Ok(updates) => updates,
                Err(e) => {
                    tracing::warn!(error = %e, "Telegram getUpdates error");
                    tokio::time::sleep(interval).await;
                    continue;
                }
            };

            for update in &updates {
                // Advance offset past this update
                offset = Some(update.update_id + 1);

                if dedup.is_duplicate(update.update_id) {
                    tracing::debug!(update_id = update.update_id, "skipping duplicate update");
                    continue;
                }

                let Some(msg) = update_to_inbound(update) else {
                    continue;
                };

                tracing::debug!(
                    from = %msg.sender.display(),
                    kind = msg.kind.label(),
                    "received Telegram message"
                );

                if tx.send(msg).await.is_err() {
                    tracing::info!("message queue closed; stopping Telegram polling");
                    return;
                }
            }
        }
    }
}

/// Convert a polling update into an `InboundMessage`
///
/// Updates without a message, without a sender, from bots, or with nothing
/// the relay understands are dropped. Text wins over a photo, and a photo
/// wins over a document.
pub(crate) fn update_to_inbound(update: &Update) -> Option<InboundMessage> {
    let msg = update.message.as_ref()?;
    let from = msg.from.as_ref()?;

    // Skip bot messages
    if from.is_bot {
        return None;
    }

    let kind = if let Some(text) = &msg.text {
        MessageKind::Text(text.clone())
    } else if let Some(largest) = msg.photo.as_ref().and_then(|sizes| sizes.last()) {
        MessageKind::Photo {
            file_id: largest.file_id.clone(),
        }
    } else if let Some(doc) = &msg.document {
        MessageKind::Document {
            file_id: doc.file_id.clone(),
            file_name: doc.file_name.clone(),
            mime_type: doc.mime_type.clone(),
        }
    } else {
        return None;
    };

    let sent_at = DateTime::from_timestamp(msg.date, 0).unwrap_or_else(|| {
        tracing::warn!(date = msg.date, "invalid Telegram message date; using now");
        Utc::now()
    });

    Some(InboundMessage {
        chat_id: msg.chat.id,
        message_id: msg.message_id,
        sender: Sender {
            user_id: from.id,
            username: from.username.clone(),
        },
        sent_at,
        kind,
    })
}
