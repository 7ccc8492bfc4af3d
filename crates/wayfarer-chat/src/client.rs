//! Generative-service client.
//!
//! [`GenerativeClient`] is the seam between the chat session and the remote
//! model. [`GeminiClient`] implements it against the Gemini
//! `generateContent` REST endpoint.
//!
//! The API key is wrapped in [`secrecy::SecretString`] and is never logged
//! or included in `Debug` output.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use wayfarer_core::config::{GeminiConfig, GenerationSettings};
use wayfarer_core::error::WayfarerError;

use crate::error::ChatError;

// =============================================================================
// Request model
// =============================================================================

/// Speaker of a conversational turn as seen by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Model,
}

impl TurnRole {
    fn as_wire(self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Model => "model",
        }
    }
}

/// One entry of the accumulated conversational context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Model,
            text: text.into(),
        }
    }
}

/// Sampling and length controls for a single request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub max_output_tokens: u32,
    pub stop_sequences: Vec<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        (&GenerationSettings::default()).into()
    }
}

impl From<&GenerationSettings> for GenerationConfig {
    fn from(settings: &GenerationSettings) -> Self {
        Self {
            temperature: settings.temperature,
            top_p: settings.top_p,
            top_k: settings.top_k,
            max_output_tokens: settings.max_output_tokens,
            stop_sequences: settings.stop_sequences.clone(),
        }
    }
}

// =============================================================================
// Trait
// =============================================================================

/// A remote model that continues a conversation.
pub trait GenerativeClient: Send + Sync {
    /// Generate the next model turn for `turns`, whose last entry is the
    /// user's prompt. Returns the raw response text.
    fn generate(
        &self,
        turns: &[Turn],
        config: &GenerationConfig,
    ) -> impl Future<Output = Result<String, ChatError>> + Send;
}

impl<T: GenerativeClient> GenerativeClient for Arc<T> {
    fn generate(
        &self,
        turns: &[Turn],
        config: &GenerationConfig,
    ) -> impl Future<Output = Result<String, ChatError>> + Send {
        (**self).generate(turns, config)
    }
}

// =============================================================================
// Gemini wire format
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<WireContent<'a>>,
    generation_config: WireGenerationConfig<'a>,
}

#[derive(Debug, Serialize)]
struct WireContent<'a> {
    role: &'static str,
    parts: Vec<WirePart<'a>>,
}

#[derive(Debug, Serialize)]
struct WirePart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop_sequences: &'a [String],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
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

fn build_request<'a>(turns: &'a [Turn], config: &'a GenerationConfig) -> GenerateContentRequest<'a> {
    GenerateContentRequest {
        contents: turns
            .iter()
            .map(|turn| WireContent {
                role: turn.role.as_wire(),
                parts: vec![WirePart { text: &turn.text }],
            })
            .collect(),
        generation_config: WireGenerationConfig {
            temperature: config.temperature,
            top_p: config.top_p,
            top_k: config.top_k,
            max_output_tokens: config.max_output_tokens,
            stop_sequences: &config.stop_sequences,
        },
    }
}

/// Join the text parts of the first candidate.
fn extract_text(response: GenerateContentResponse) -> Result<String, ChatError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ChatError::Service(format!("prompt blocked: {}", reason)));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ChatError::MalformedResponse("no candidates returned".to_string()))?;

    let text: String = candidate
        .content
        .map(|c| c.parts)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|part| part.text)
        .collect();

    if text.is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".to_string());
        return Err(ChatError::MalformedResponse(format!(
            "candidate has no text (finish reason: {})",
            reason
        )));
    }
    Ok(text)
}

fn map_status(status: u16, body: String) -> ChatError {
    match status {
        401 | 403 => ChatError::Authentication,
        429 => ChatError::RateLimited,
        _ => ChatError::Service(format!("HTTP {}: {}", status, body)),
    }
}

// =============================================================================
// GeminiClient
// =============================================================================

/// Gemini `generateContent` client.
///
/// Does not derive `Debug`; the manual impl omits the API key.
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
}

impl GeminiClient {
    /// Create a client. `timeout` of `None` leaves requests unbounded.
    pub fn new(
        api_key: SecretString,
        model: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, ChatError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ChatError::Request(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    /// Build a client from configuration. Fails when no API key is available.
    pub fn from_config(config: &GeminiConfig) -> Result<Self, WayfarerError> {
        let api_key = SecretString::from(config.resolve_api_key()?);
        let timeout = (config.request_timeout_secs > 0)
            .then(|| Duration::from_secs(config.request_timeout_secs));
        Self::new(api_key, &config.model, &config.base_url, timeout)
            .map_err(|e| WayfarerError::Config(e.to_string()))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl GenerativeClient for GeminiClient {
    async fn generate(
        &self,
        turns: &[Turn],
        config: &GenerationConfig,
    ) -> Result<String, ChatError> {
        let body = build_request(turns, config);
        debug!(model = %self.model, turns = turns.len(), "Sending generateContent request");

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(map_status(status.as_u16(), error_body));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ChatError::MalformedResponse(e.to_string()))?;

        extract_text(parsed)
    }
}
