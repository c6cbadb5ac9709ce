//! Language model client
//!
//! Client for an OpenRouter-compatible chat completions endpoint. Supports
//! text-only conversations and multimodal image+text analysis requests.
//! Each call is a single attempt with a generous timeout; any failure is
//! terminal for that call.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::{AppError, AppResult};

/// Sampling options for a single completion call
#[derive(Debug, Clone, Copy)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

/// Content of a prompt message: plain text, or text with one inline image
#[derive(Debug, Clone)]
pub enum MessageContent {
    Text(String),
    ImageWithText {
        text: String,
        /// Raw base64 image bytes, embedded as a JPEG data URI on the wire
        image_base64: String,
    },
}

/// A single role-tagged message of a composed model request
#[derive(Debug, Clone)]
pub struct PromptMessage {
    pub role: &'static str,
    pub content: MessageContent,
}

impl PromptMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: "assistant",
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user_with_image(text: impl Into<String>, image_base64: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: MessageContent::ImageWithText {
                text: text.into(),
                image_base64: image_base64.into(),
            },
        }
    }
}

/// A fully composed model request
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<PromptMessage>,
    pub options: CompletionOptions,
}

impl CompletionRequest {
    /// Whether any message carries an inline image
    pub fn has_image(&self) -> bool {
        self.messages
            .iter()
            .any(|m| matches!(m.content, MessageContent::ImageWithText { .. }))
    }
}

/// Seam for invoking a remote language model
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Execute a composed request and return the generated text
    async fn complete(&self, request: CompletionRequest) -> AppResult<String>;
}

/// Client for an OpenRouter-compatible chat completions API
#[derive(Clone)]
pub struct LlmClient {
    base_url: String,
    api_key: String,
    chat_model: String,
    vision_model: String,
    http_client: Client,
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: ApiContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Parts(Vec<ApiPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrlPart },
}

#[derive(Debug, Serialize)]
struct ImageUrlPart {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    content: String,
}

/// Build the data URI for an inline base64 JPEG image
fn image_data_uri(image_base64: &str) -> String {
    format!("data:image/jpeg;base64,{}", image_base64)
}

impl From<PromptMessage> for ApiMessage {
    fn from(m: PromptMessage) -> Self {
        let content = match m.content {
            MessageContent::Text(text) => ApiContent::Text(text),
            MessageContent::ImageWithText { text, image_base64 } => ApiContent::Parts(vec![
                ApiPart::Text { text },
                ApiPart::ImageUrl {
                    image_url: ImageUrlPart {
                        url: image_data_uri(&image_base64),
                    },
                },
            ]),
        };
        ApiMessage {
            role: m.role,
            content,
        }
    }
}

impl LlmClient {
    /// Create a new language model client from configuration
    pub fn new(config: &LlmConfig) -> AppResult<Self> {
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            chat_model: config.chat_model.clone(),
            vision_model: config.vision_model.clone(),
            http_client,
        })
    }

    /// Pick the model for a request: vision model when an image is attached
    fn select_model<'a>(&'a self, request: &CompletionRequest) -> &'a str {
        if request.has_image() {
            &self.vision_model
        } else {
            &self.chat_model
        }
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn complete(&self, request: CompletionRequest) -> AppResult<String> {
        let model = self.select_model(&request).to_string();
        let payload = ApiRequest {
            model: &model,
            messages: request.messages.into_iter().map(ApiMessage::from).collect(),
            temperature: request.options.temperature,
            max_tokens: request.options.max_tokens,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::LlmError(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::LlmError(format!(
                "API returned {}: {}",
                status, body
            )));
        }

        let result: ApiResponse = response
            .json()
            .await
            .map_err(|e| AppError::LlmError(format!("Failed to parse response: {}", e)))?;

        let choice = result
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::LlmError("Empty response from model".to_string()))?;

        Ok(choice.message.content)
    }
}
