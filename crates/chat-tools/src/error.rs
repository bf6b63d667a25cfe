//! Errors raised while running a tool.

use thiserror::Error;

/// Errors raised inside a tool handler.
///
/// Handlers turn these into error cards before returning, so they never
/// reach the chat turn.
#[derive(Debug, Error)]
pub enum ToolError {
    /// No tool registered under this name.
    #[error("Tool not found: {0}")]
    NotFound(String),

    /// The model left out a required argument.
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    /// An argument had the wrong type or an unusable value.
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// Tool needs an API key that was not configured.
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    /// The request to the provider failed or timed out.
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The provider body was not the JSON we expected.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// The upstream API answered with an error.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Database write failed.
    #[error("Database error: {0}")]
    Database(#[from] database::DatabaseError),

    /// Anything else that stopped the handler.
    #[error("{0}")]
    ExecutionFailed(String),
}
