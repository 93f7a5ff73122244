//! Context builder for assembling conversation context

use chrono::{DateTime, Utc};

use crate::Result;
use crate::transcript::{Role, TranscriptStore, Turn, UserKey};

/// Ordered turns sent to the backend for one request
///
/// Holds the full stored history followed by the new inbound user turn. The
/// inbound turn is always last and always has [`Role::User`]. Its timestamp
/// is never earlier than the last stored turn's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationContext {
    turns: Vec<Turn>,
}

impl ConversationContext {
    /// Assemble a context from stored history and a new inbound turn
    #[must_use]
    pub fn new(history: Vec<Turn>, content: impl Into<String>, sent_at: DateTime<Utc>) -> Self {
        let mut turns = history;
        // The platform clock can lag the one that stamped the last reply
        let sent_at = turns.last().map_or(sent_at, |last| last.timestamp.max(sent_at));
        turns.push(Turn::user(content, sent_at));
        Self { turns }
    }

    /// All turns, oldest first
    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Stored history preceding the inbound turn
    #[must_use]
    pub fn history(&self) -> &[Turn] {
        &self.turns[..self.turns.len() - 1]
    }

    /// The inbound turn
    #[must_use]
    pub fn current(&self) -> &Turn {
        let last = &self.turns[self.turns.len() - 1];
        debug_assert_eq!(last.role, Role::User);
        last
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Always false; a context holds at least the inbound turn
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }
}

/// Builds conversation context from a user's transcript
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    store: TranscriptStore,
}

impl ContextBuilder {
    /// Create a new context builder over a transcript store
    #[must_use]
    pub const fn new(store: TranscriptStore) -> Self {
        Self { store }
    }

    /// Build the context for a new inbound message
    ///
    /// History is returned exactly as stored: no reordering, deduplication or
    /// truncation. Nothing is persisted.
    ///
    /// # Errors
    ///
    /// Returns error if the transcript exists but cannot be read
    pub async fn build(
        &self,
        key: &UserKey,
        content: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<ConversationContext> {
        let history = self.store.read(key).await?;
        tracing::debug!(user = %key, history = history.len(), "built conversation context");

        Ok(ConversationContext::new(history, content, sent_at))
    }
}
