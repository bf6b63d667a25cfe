//! Error types for model API calls.

use thiserror::Error;

/// Errors that can occur when talking to the model API.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Requested model is not in the allowlist.
    #[error("Model not allowed: {0}")]
    ModelNotAllowed(String),

    /// Transport failure (connect, timeout, body read).
    #[error("Network error: {0}")]
    Network(String),

    /// The API answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The API answered with something we could not decode.
    #[error("Failed to parse response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Network(err.without_url().to_string())
    }
}
