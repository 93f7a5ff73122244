//! Shared test utilities

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use alita_relay::channels::{InboundMessage, MessageKind, Sender, Transport};
use alita_relay::generation::{
    FragmentStream, GenerationBackend, GenerationInput, GenerationParams, GenerationRequest,
};
use alita_relay::media::MediaStore;
use alita_relay::{Error, GenerationClient, Orchestrator, Result, Role, TranscriptStore};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::StreamExt;
use futures::stream;
use tokio::sync::Mutex;

/// What the backend was asked, flattened for assertions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seen {
    Conversation(Vec<(Role, String)>),
    Attachment { mime_type: String, bytes: usize },
}

/// One scripted backend response
pub enum Script {
    /// Stream these fragments, then end
    Reply(Vec<&'static str>),
    /// Stream these fragments, then fail mid-stream
    Broken(Vec<&'static str>),
    /// Refuse the request outright
    Reject,
    /// Wait before streaming
    Slow(Duration, &'static str),
}

/// Backend that replays scripted responses in order
pub struct ScriptedBackend {
    scripts: Mutex<VecDeque<Script>>,
    pub seen: Mutex<Vec<Seen>>,
}

impl ScriptedBackend {
    pub fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub async fn seen(&self) -> Vec<Seen> {
        self.seen.lock().await.clone()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn stream(&self, request: GenerationRequest<'_>) -> Result<FragmentStream> {
        let seen = match request.input {
            GenerationInput::Conversation(turns) => Seen::Conversation(
                turns
                    .iter()
                    .map(|t| (t.role, t.content.clone()))
                    .collect(),
            ),
            GenerationInput::Attachment(a) => Seen::Attachment {
                mime_type: a.mime_type.clone(),
                bytes: a.data.len(),
            },
        };
        self.seen.lock().await.push(seen);

        let script = self
            .scripts
            .lock()
            .await
            .pop_front()
            .unwrap_or(Script::Reject);

        match script {
            Script::Reply(fragments) => Ok(stream::iter(
                fragments.into_iter().map(|f| Ok(f.to_string())),
            )
            .boxed()),
            Script::Broken(fragments) => {
                let items = fragments
                    .into_iter()
                    .map(|f| Ok(f.to_string()))
                    .chain(std::iter::once(Err(Error::Generation(
                        "connection reset".to_string(),
                    ))));
                Ok(stream::iter(items).boxed())
            }
            Script::Reject => Err(Error::Generation("503 Service Unavailable".to_string())),
            Script::Slow(delay, reply) => {
                tokio::time::sleep(delay).await;
                Ok(stream::iter([Ok(reply.to_string())]).boxed())
            }
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Mock transport that records replies and serves one media payload
#[derive(Default)]
pub struct MockTransport {
    pub payload: Option<Vec<u8>>,
    pub replies: Mutex<Vec<(i64, String)>>,
}

impl MockTransport {
    pub fn with_payload(payload: &[u8]) -> Self {
        Self {
            payload: Some(payload.to_vec()),
            ..Self::default()
        }
    }

    pub async fn replies(&self) -> Vec<(i64, String)> {
        self.replies.lock().await.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn download(&self, _file_id: &str) -> Result<Vec<u8>> {
        self.payload
            .clone()
            .ok_or_else(|| Error::Transport("network unreachable".to_string()))
    }

    async fn reply(&self, to: &InboundMessage, text: &str) -> Result<()> {
        self.replies
            .lock()
            .await
            .push((to.message_id, text.to_string()));
        Ok(())
    }
}

/// A wired orchestrator over a temporary data directory
pub struct TestRelay {
    pub dir: tempfile::TempDir,
    pub store: TranscriptStore,
    pub backend: Arc<ScriptedBackend>,
    pub transport: Arc<MockTransport>,
    pub orchestrator: Orchestrator,
}

impl TestRelay {
    pub fn new(scripts: Vec<Script>, transport: MockTransport) -> Self {
        Self::with_timeout(scripts, transport, Duration::from_secs(5))
    }

    pub fn with_timeout(scripts: Vec<Script>, transport: MockTransport, timeout: Duration) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let store = TranscriptStore::open(dir.path().join("chat_history"))
            .expect("failed to open transcript store");
        let media =
            MediaStore::open(dir.path().join("media_files")).expect("failed to open media store");

        let backend = ScriptedBackend::new(scripts);
        let transport = Arc::new(transport);
        let generation = GenerationClient::new(
            backend.clone(),
            "You are Alita.",
            GenerationParams::default(),
            timeout,
        );
        let orchestrator = Orchestrator::new(store.clone(), generation, media, transport.clone());

        Self {
            dir,
            store,
            backend,
            transport,
            orchestrator,
        }
    }
}

/// Fixed send time used by test messages
pub fn sent_at(offset_secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + offset_secs, 0).unwrap()
}

/// Build an inbound message from `alice`
pub fn message(message_id: i64, kind: MessageKind) -> InboundMessage {
    InboundMessage {
        chat_id: 100,
        message_id,
        sender: Sender {
            user_id: 42,
            username: Some("alice".to_string()),
        },
        sent_at: sent_at(message_id),
        kind,
    }
}

pub fn text(message_id: i64, body: &str) -> InboundMessage {
    message(message_id, MessageKind::Text(body.to_string()))
}

pub fn photo(message_id: i64) -> InboundMessage {
    message(
        message_id,
        MessageKind::Photo {
            file_id: "photo-file".to_string(),
        },
    )
}
