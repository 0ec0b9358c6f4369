// Claude API streaming client using reqwest-eventsource.
//
// Sends a message to the Anthropic Messages API with `stream: true`, folds
// the Server-Sent Events into a single completion, and exposes the result as
// a `CommentaryGenerator` that degrades to a placeholder on any failure.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest_eventsource::{Event, RequestBuilderExt};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::commentary::{CommentaryGenerator, CommentaryRequest, ANALYSIS_UNAVAILABLE};
use super::prompt;
use crate::config::Config;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

// ---------------------------------------------------------------------------
// Errors and results
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("API key not configured")]
    NotConfigured,

    #[error("API returned status {0}")]
    Status(u16),

    #[error("network error: {0}")]
    Transport(String),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("stream ended without any content")]
    Empty,
}

/// A finished streamed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

// ---------------------------------------------------------------------------
// ClaudeClient
// ---------------------------------------------------------------------------

/// Low-level Claude API streaming client.
pub struct ClaudeClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    endpoint: String,
}

impl ClaudeClient {
    pub fn new(api_key: String, model: String, max_tokens: u32) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            model,
            max_tokens,
            endpoint: ANTHROPIC_API_URL.to_string(),
        }
    }

    /// Point the client at a different Messages endpoint (tests, proxies).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Stream one message and return the concatenated text.
    pub async fn complete(&self, system: &str, user_content: &str) -> Result<Completion, LlmError> {
        if self.api_key.is_empty() {
            return Err(LlmError::NotConfigured);
        }

        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "stream": true,
            "system": system,
            "messages": [{ "role": "user", "content": user_content }]
        });

        let request = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body);

        let mut es = request
            .eventsource()
            .map_err(|e| LlmError::Stream(format!("failed to create event source: {e}")))?;

        let mut completion = Completion {
            text: String::new(),
            input_tokens: 0,
            output_tokens: 0,
        };

        while let Some(event) = es.next().await {
            match event {
                Ok(Event::Open) => debug!("SSE connection opened"),
                Ok(Event::Message(msg)) => match msg.event.as_str() {
                    "message_start" => {
                        if let Some(n) = parse_input_tokens(&msg.data) {
                            completion.input_tokens = n;
                        }
                    }
                    "content_block_delta" => {
                        if let Some(text) = parse_delta_text(&msg.data) {
                            completion.text.push_str(&text);
                        }
                    }
                    "message_delta" => {
                        if let Some(n) = parse_output_tokens(&msg.data) {
                            completion.output_tokens = n;
                        }
                    }
                    "message_stop" => {
                        es.close();
                        return finish(completion);
                    }
                    other => debug!(event_type = other, "ignoring SSE event"),
                },
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(err) => {
                    es.close();
                    return Err(classify_error(&err));
                }
            }
        }

        finish(completion)
    }
}

fn finish(completion: Completion) -> Result<Completion, LlmError> {
    if completion.text.trim().is_empty() {
        Err(LlmError::Empty)
    } else {
        debug!(
            input_tokens = completion.input_tokens,
            output_tokens = completion.output_tokens,
            "completion finished"
        );
        Ok(completion)
    }
}

// ---------------------------------------------------------------------------
// LlmClient wrapper
// ---------------------------------------------------------------------------

/// Either an active Claude client or disabled (no API key).
pub enum LlmClient {
    Active(ClaudeClient),
    Disabled,
}

impl LlmClient {
    /// `Active` if credentials carry a non-empty API key, otherwise `Disabled`.
    pub fn from_config(config: &Config) -> Self {
        match &config.credentials.anthropic_api_key {
            Some(key) if !key.is_empty() => LlmClient::Active(ClaudeClient::new(
                key.clone(),
                config.app.llm.model.clone(),
                config.app.llm.max_tokens,
            )),
            _ => {
                info!("No Anthropic API key configured; commentary disabled");
                LlmClient::Disabled
            }
        }
    }
}

#[async_trait]
impl CommentaryGenerator for LlmClient {
    async fn generate(&self, request: &CommentaryRequest) -> String {
        let client = match self {
            LlmClient::Active(client) => client,
            LlmClient::Disabled => return ANALYSIS_UNAVAILABLE.to_string(),
        };
        let user = prompt::commentary_prompt(request);
        match client.complete(&prompt::system_prompt(), &user).await {
            Ok(completion) => completion.text.trim().to_string(),
            Err(e) => {
                warn!(pick = request.pick_number, "commentary failed: {e}");
                ANALYSIS_UNAVAILABLE.to_string()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SSE JSON parsing helpers
// ---------------------------------------------------------------------------

/// Extract `input_tokens` from a `message_start` event's JSON.
///
/// Expected shape: `{ "type": "message_start", "message": { "usage": { "input_tokens": N } } }`
pub(crate) fn parse_input_tokens(data: &str) -> Option<u32> {
    let v: Value = serde_json::from_str(data).ok()?;
    v.get("message")?
        .get("usage")?
        .get("input_tokens")?
        .as_u64()
        .map(|n| n as u32)
}

/// Extract `delta.text` from a `content_block_delta` event's JSON.
pub(crate) fn parse_delta_text(data: &str) -> Option<String> {
    let v: Value = serde_json::from_str(data).ok()?;
    v.get("delta")?
        .get("text")?
        .as_str()
        .map(|s| s.to_string())
}

/// Extract `usage.output_tokens` from a `message_delta` event's JSON.
pub(crate) fn parse_output_tokens(data: &str) -> Option<u32> {
    let v: Value = serde_json::from_str(data).ok()?;
    v.get("usage")?
        .get("output_tokens")?
        .as_u64()
        .map(|n| n as u32)
}

fn classify_error(err: &reqwest_eventsource::Error) -> LlmError {
    match err {
        reqwest_eventsource::Error::InvalidStatusCode(status, _) => LlmError::Status(status.as_u16()),
        reqwest_eventsource::Error::Transport(e) => LlmError::Transport(e.to_string()),
        other => LlmError::Stream(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
