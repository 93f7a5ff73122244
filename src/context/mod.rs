//! Context assembly for generation requests
//!
//! Combines the stored transcript with the not-yet-persisted inbound turn.

mod builder;

pub use builder::{ContextBuilder, ConversationContext};
