//! HTTP client for OpenAI-compatible chat completions.

use reqwest::Client;
use tracing::{debug, warn};

use crate::api_types::{
    ApiError, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, StreamOptions,
    ToolCall, ToolDefinition, Usage,
};
use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::stream::{sse_event_stream, EventStream};

/// Longest title [`LlmClient::generate_title`] returns.
pub const MAX_TITLE_CHARS: usize = 80;

const TITLE_PROMPT: &str = "Write a short title (at most six words) for a conversation that \
starts with the user's message below. Reply with the title only, without quotes or punctuation at the end.";

/// A chat request before defaults are applied.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    /// Model override; must already be resolved against the allowlist.
    pub model: Option<String>,
    pub tools: Vec<ToolDefinition>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

/// Result of a non-streaming completion.
#[derive(Debug, Clone)]
pub struct Completion {
    pub model: String,
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<String>,
    pub usage: Option<Usage>,
}

/// Client for an OpenAI-compatible chat completions API.
#[derive(Debug, Clone)]
pub struct LlmClient {
    client: Client,
    config: LlmConfig,
}

impl LlmClient {
    /// Create a new client with the given configuration.
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        if config.api_key.is_empty() {
            return Err(LlmError::Configuration("API key is required".to_string()));
        }

        let client = Client::builder()
            .build()
            .map_err(|e| LlmError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Create a new client from environment variables.
    pub fn from_env() -> Result<Self, LlmError> {
        Self::new(LlmConfig::from_env()?)
    }

    /// Get the configuration.
    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    fn build_request(&self, request: ChatRequest, stream: bool) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: request.model.unwrap_or_else(|| self.config.model.clone()),
            messages: request.messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            tools: request.tools,
            stream,
            stream_options: stream.then_some(StreamOptions { include_usage: true }),
        }
    }

    async fn send(&self, body: &ChatCompletionRequest) -> Result<reqwest::Response, LlmError> {
        let url = format!("{}/chat/completions", self.config.api_url.trim_end_matches('/'));

        debug!(
            model = %body.model,
            messages = body.messages.len(),
            tools = body.tools.len(),
            stream = body.stream,
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();

            let message = serde_json::from_str::<ApiError>(&error_text)
                .map(|api_error| api_error.error.message)
                .unwrap_or(error_text);

            warn!(status = status.as_u16(), "Model API error: {}", message);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }

    /// Start a streamed completion.
    ///
    /// Errors before the first byte (bad status, connect failure) are
    /// returned directly; later failures arrive as stream items.
    pub async fn stream_chat(&self, request: ChatRequest) -> Result<EventStream, LlmError> {
        let body = self.build_request(request, true);
        let response = self.send(&body).await?;
        Ok(sse_event_stream(response))
    }

    /// Run a non-streaming completion.
    pub async fn complete(&self, request: ChatRequest) -> Result<Completion, LlmError> {
        let body = self.build_request(request, false);
        let response = self.send(&body).await?;

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.without_url().to_string()))?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Parse("response has no choices".to_string()))?;

        Ok(Completion {
            model: if completion.model.is_empty() {
                body.model
            } else {
                completion.model
            },
            content: choice.message.content.unwrap_or_default(),
            tool_calls: choice.message.tool_calls,
            finish_reason: choice.finish_reason,
            usage: completion.usage,
        })
    }

    /// Ask the model for a short conversation title.
    pub async fn generate_title(&self, first_message: &str) -> Result<String, LlmError> {
        let completion = self
            .complete(ChatRequest::new(vec![
                ChatMessage::system(TITLE_PROMPT),
                ChatMessage::user(first_message),
            ]))
            .await?;

        let title: String = completion
            .content
            .trim()
            .trim_matches(|c| c == '"' || c == '\'')
            .trim_end_matches('.')
            .chars()
            .take(MAX_TITLE_CHARS)
            .collect();

        if title.trim().is_empty() {
            return Err(LlmError::Parse("empty title".to_string()));
        }
        Ok(title.trim().to_string())
    }
}
