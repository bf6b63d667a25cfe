//! Configuration for the model API client.

use std::env;

use crate::error::LlmError;

/// Default OpenAI-compatible API base URL.
pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1";

/// Default model.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Configuration for [`LlmClient`](crate::LlmClient).
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// API base URL; `/chat/completions` is appended.
    pub api_url: String,

    /// API key for authentication.
    pub api_key: String,

    /// Model used when a request does not pick one.
    pub model: String,

    /// Maximum tokens for response.
    pub max_tokens: Option<u32>,

    /// Temperature for generation (0.0 - 2.0).
    pub temperature: Option<f32>,

    /// Extra models a request may select. The default model is always allowed.
    pub allowed_models: Vec<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: Some(4096),
            temperature: Some(0.7),
            allowed_models: Vec::new(),
        }
    }
}

impl LlmConfig {
    /// Create configuration from environment variables.
    ///
    /// Required environment variables:
    /// - `LLM_API_KEY` - API key for authentication
    ///
    /// Optional environment variables:
    /// - `LLM_API_URL` - API base URL (default: https://api.openai.com/v1)
    /// - `LLM_MODEL` - Default model (default: gpt-4o-mini)
    /// - `LLM_MAX_TOKENS` - Max tokens (default: 4096)
    /// - `LLM_TEMPERATURE` - Temperature (default: 0.7)
    /// - `LLM_ALLOWED_MODELS` - Comma-separated models clients may select
    pub fn from_env() -> Result<Self, LlmError> {
        let api_key = env::var("LLM_API_KEY")
            .map_err(|_| LlmError::Configuration("LLM_API_KEY not set".to_string()))?;

        let api_url = env::var("LLM_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());

        let model = env::var("LLM_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let max_tokens = env::var("LLM_MAX_TOKENS")
            .ok()
            .and_then(|v| v.parse().ok())
            .or(Some(4096));

        let temperature = env::var("LLM_TEMPERATURE")
            .ok()
            .and_then(|v| v.parse().ok())
            .or(Some(0.7));

        let allowed_models = env::var("LLM_ALLOWED_MODELS")
            .map(|v| parse_model_list(&v))
            .unwrap_or_default();

        Ok(Self {
            api_url,
            api_key,
            model,
            max_tokens,
            temperature,
            allowed_models,
        })
    }

    /// Create a new config builder.
    pub fn builder() -> LlmConfigBuilder {
        LlmConfigBuilder::default()
    }

    /// Pick the model for a request: the requested one if allowed, else the default.
    pub fn resolve_model(&self, requested: Option<&str>) -> Result<String, LlmError> {
        match requested.map(str::trim).filter(|m| !m.is_empty()) {
            None => Ok(self.model.clone()),
            Some(model) if model == self.model || self.allowed_models.iter().any(|m| m == model) => {
                Ok(model.to_string())
            }
            Some(model) => Err(LlmError::ModelNotAllowed(model.to_string())),
        }
    }
}

fn parse_model_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
}

/// Builder for LlmConfig.
#[derive(Debug, Default)]
pub struct LlmConfigBuilder {
    config: LlmConfig,
}

impl LlmConfigBuilder {
    /// Set the API key.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    /// Set the API URL.
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_url = url.into();
        self
    }

    /// Set the default model.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    /// Set the max tokens.
    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.config.max_tokens = Some(tokens);
        self
    }

    /// Set the temperature.
    pub fn temperature(mut self, temp: f32) -> Self {
        self.config.temperature = Some(temp);
        self
    }

    /// Allow an additional model.
    pub fn allow_model(mut self, model: impl Into<String>) -> Self {
        self.config.allowed_models.push(model.into());
        self
    }

    /// Build the configuration.
    pub fn build(self) -> LlmConfig {
        self.config
    }
}
