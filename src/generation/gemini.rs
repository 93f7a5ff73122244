//! Google Gemini streaming backend

use async_trait::async_trait;
use base64::Engine;
use futures::StreamExt;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{
    FragmentStream, GenerationBackend, GenerationInput, GenerationParams, GenerationRequest,
    SafetyThreshold, sse,
};
use crate::transcript::Turn;
use crate::{Error, Result};

/// Public Gemini API endpoint
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Harm categories the safety threshold is applied to
const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Gemini `streamGenerateContent` backend
#[derive(Debug, Clone)]
pub struct GeminiBackend {
    client: Client,
    base_url: String,
    api_key: SecretString,
    model: String,
}

impl GeminiBackend {
    /// Create a backend for `model` against the public endpoint
    #[must_use]
    pub fn new(api_key: SecretString, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            model: model.into(),
        }
    }

    /// Override the API base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        )
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    async fn stream(&self, request: GenerationRequest<'_>) -> Result<FragmentStream> {
        let body = build_request(&request);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Generation(format!("Gemini request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Generation(format!(
                "Gemini API error: {status} - {}",
                api_error_message(&body).unwrap_or(body)
            )));
        }

        tracing::debug!(model = %self.model, "Gemini stream opened");

        let fragments = sse::data_events(response.bytes_stream())
            .map(|event| event.and_then(|data| parse_chunk(&data)));
        Ok(fragments.boxed())
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

/// Build the wire request for either input shape
fn build_request(request: &GenerationRequest<'_>) -> GenerateContentRequest {
    let (contents, system_instruction) = match request.input {
        GenerationInput::Conversation(turns) => (
            turns.iter().map(Content::from_turn).collect(),
            Some(Content {
                role: None,
                parts: vec![Part::text(request.system_instruction)],
            }),
        ),
        GenerationInput::Attachment(attachment) => (
            vec![Content {
                role: Some("user".to_string()),
                parts: vec![
                    Part::text(request.system_instruction),
                    Part::InlineData {
                        inline_data: Blob {
                            mime_type: attachment.mime_type.clone(),
                            data: base64::engine::general_purpose::STANDARD
                                .encode(&attachment.data),
                        },
                    },
                ],
            }],
            None,
        ),
    };

    GenerateContentRequest {
        contents,
        system_instruction,
        generation_config: GenerationConfig::from(request.params),
        safety_settings: HARM_CATEGORIES
            .iter()
            .map(|&category| SafetySetting {
                category,
                threshold: request.params.safety_threshold,
            })
            .collect(),
    }
}

/// Extract the text carried by one streamed chunk
fn parse_chunk(data: &str) -> Result<String> {
    let chunk: GenerateContentResponse = serde_json::from_str(data)
        .map_err(|e| Error::Generation(format!("malformed Gemini stream chunk: {e}")))?;

    if let Some(error) = chunk.error {
        return Err(Error::Generation(format!(
            "Gemini stream error: {}",
            error.message
        )));
    }

    if let Some(reason) = chunk.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(Error::Generation(format!("Gemini blocked the prompt: {reason}")));
    }

    let text = chunk
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<String>()
        })
        .unwrap_or_default();

    Ok(text)
}

/// Pull the human-readable message out of an error body, if it has one
fn api_error_message(body: &str) -> Option<String> {
    serde_json::from_str::<GenerateContentResponse>(body)
        .ok()?
        .error
        .map(|e| e.message)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

impl Content {
    fn from_turn(turn: &Turn) -> Self {
        Self {
            role: Some(turn.role.as_str().to_string()),
            parts: vec![Part::text(&turn.content)],
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: Blob,
    },
}

impl Part {
    fn text(text: &str) -> Self {
        Self::Text {
            text: text.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Blob {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    response_mime_type: String,
}

impl From<&GenerationParams> for GenerationConfig {
    fn from(params: &GenerationParams) -> Self {
        Self {
            temperature: params.temperature,
            response_mime_type: params.response_mime_type.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: SafetyThreshold,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}
