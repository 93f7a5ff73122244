//! Alita relay - Telegram gateway for a Gemini-backed conversational persona
//!
//! This library provides the core functionality of the relay:
//! - Durable, append-only per-user transcripts
//! - Context assembly from a transcript plus the inbound turn
//! - Streamed generation against the Gemini API
//! - The per-message exchange that ties them together
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │        Telegram (long polling, replies)      │
//! └──────────────────────┬───────────────────────┘
//!                        │ InboundMessage
//! ┌──────────────────────▼───────────────────────┐
//! │                 Orchestrator                 │
//! │  Media Store │ Context Builder │ Generation  │
//! └──────────────────────┬───────────────────────┘
//!                        │ append user + model turn
//! ┌──────────────────────▼───────────────────────┐
//! │     Transcript Store (chat_history/*.jsonl)  │
//! └──────────────────────────────────────────────┘
//! ```

pub mod channels;
pub mod config;
pub mod context;
pub mod error;
pub mod gateway;
pub mod generation;
pub mod media;
pub mod orchestrator;
pub mod transcript;

pub use config::Config;
pub use context::{ContextBuilder, ConversationContext};
pub use error::{Error, Result};
pub use gateway::Gateway;
pub use generation::{GenerationBackend, GenerationClient};
pub use orchestrator::{ExchangeError, Fallbacks, Orchestrator, Outcome};
pub use transcript::{Role, TranscriptStore, Turn, UserKey};
