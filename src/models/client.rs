//! Chat-completions client
//!
//! Speaks the OpenAI `POST /chat/completions` dialect, which OpenAI,
//! Ollama (`/v1`), and most hosted gateways accept.

use crate::errors::ModelError;
use crate::models::LanguageModel;
use crate::types::{Role, Turn};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Prefix for summary turns sent as system messages
const SUMMARY_PREFIX: &str = "Summary of the earlier conversation:\n";

/// Chat client settings
#[derive(Debug, Clone)]
pub struct ChatClientConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_output_tokens: Option<u32>,
    pub request_timeout: Duration,
}

impl Default for ChatClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            temperature: 0.1,
            max_output_tokens: Some(4_096),
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// OpenAI-compatible chat client
#[derive(Debug, Clone)]
pub struct ChatClient {
    client: Client,
    config: ChatClientConfig,
}

impl ChatClient {
    /// Create a chat client
    pub fn new(config: ChatClientConfig) -> Result<Self, ModelError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ModelError::Api(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Get current model name
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Get base URL
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn build_request<'a>(&'a self, turns: &'a [Turn]) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.config.model,
            messages: to_wire_messages(turns),
            temperature: self.config.temperature,
            max_tokens: self.config.max_output_tokens,
        }
    }

    fn map_send_error(&self, err: reqwest::Error) -> ModelError {
        if err.is_timeout() {
            ModelError::Timeout {
                duration_ms: self.config.request_timeout.as_millis() as u64,
            }
        } else {
            ModelError::Api(format!("Failed to send request: {}", err))
        }
    }
}

#[async_trait]
impl LanguageModel for ChatClient {
    async fn complete(&self, turns: &[Turn]) -> Result<Turn, ModelError> {
        let request = self.build_request(turns);
        debug!(model = %self.config.model, messages = request.messages.len(), "sending chat request");

        let mut builder = self.client.post(self.endpoint()).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(classify_status(status, retry_after, error_text));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Api(format!("Failed to parse response: {}", e)))?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ModelError::Api("Response contained no message content".to_string()))?;

        Ok(Turn::assistant(content))
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Map a non-success HTTP status to a model error
fn classify_status(status: StatusCode, retry_after: Option<u64>, body: String) -> ModelError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ModelError::RateLimited {
            retry_after_secs: retry_after,
        },
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ModelError::Timeout {
            duration_ms: 0,
        },
        s if s.is_client_error() => ModelError::InvalidRequest(format!("HTTP {}: {}", s, body)),
        s => ModelError::Api(format!("HTTP {}: {}", s, body)),
    }
}

/// Convert turns to chat messages; summary turns become labelled system messages
fn to_wire_messages(turns: &[Turn]) -> Vec<WireMessage<'_>> {
    turns
        .iter()
        .map(|turn| {
            let mut content = match turn.role() {
                Role::Summary => format!("{}{}", SUMMARY_PREFIX, turn.content()),
                _ => turn.content().to_string(),
            };
            if let Some(payload) = turn.payload() {
                content.push_str(&format!("\n\n[metadata] {}", payload));
            }
            WireMessage {
                role: turn.role().wire_role(),
                content,
            }
        })
        .collect()
}

/// Chat completion request
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: String,
}

/// Chat completion response
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}
