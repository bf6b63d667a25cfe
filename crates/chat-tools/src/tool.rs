//! Tool trait definition and types.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ToolError;

/// Who a tool call runs on behalf of.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Authenticated user, if any. Anonymous chats get `None`.
    pub user_id: Option<String>,
}

impl ToolContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
        }
    }
}

/// Arguments passed to a tool for execution.
#[derive(Debug, Clone, Default)]
pub struct ToolArgs {
    /// Parameters as key-value pairs, decoded from the model's JSON arguments.
    pub params: HashMap<String, Value>,
    pub context: ToolContext,
}

impl ToolArgs {
    /// Create new tool arguments with the given parameters.
    pub fn new(params: HashMap<String, Value>) -> Self {
        Self {
            params,
            context: ToolContext::default(),
        }
    }

    /// Create tool arguments that run on behalf of a caller.
    pub fn with_context(params: HashMap<String, Value>, context: ToolContext) -> Self {
        Self { params, context }
    }

    /// Get a string parameter, returning an error if missing, blank or not a string.
    pub fn get_string(&self, key: &str) -> Result<String, ToolError> {
        let value = self
            .params
            .get(key)
            .ok_or_else(|| ToolError::MissingParameter(key.to_string()))?
            .as_str()
            .ok_or_else(|| ToolError::InvalidParameter {
                name: key.to_string(),
                reason: "expected string".to_string(),
            })?
            .trim();

        if value.is_empty() {
            return Err(ToolError::MissingParameter(key.to_string()));
        }
        Ok(value.to_string())
    }

    /// Get an optional string parameter.
    pub fn get_string_opt(&self, key: &str) -> Option<String> {
        self.params
            .get(key)?
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
    }

    /// The authenticated user, or an error when the call is anonymous.
    pub fn require_user(&self) -> Result<&str, ToolError> {
        self.context.user_id.as_deref().ok_or_else(|| {
            ToolError::ExecutionFailed("Sign in to use this tool".to_string())
        })
    }
}

/// Output from a tool execution.
///
/// `card` is the fixed JSON shape the UI renders; it is also what the
/// model sees as the tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub card: Value,
    pub success: bool,
}

impl ToolOutput {
    /// Create a successful output from a card.
    pub fn success(card: impl Serialize) -> Self {
        Self {
            card: to_value(card),
            success: true,
        }
    }

    /// Create a failed output. The card still carries fallback values.
    pub fn failure(card: impl Serialize) -> Self {
        Self {
            card: to_value(card),
            success: false,
        }
    }

    /// The `error` field of the card, if set.
    pub fn error(&self) -> Option<&str> {
        self.card.get("error").and_then(Value::as_str)
    }

    /// Serialized card, as sent back to the model.
    pub fn content(&self) -> String {
        self.card.to_string()
    }
}

fn to_value(card: impl Serialize) -> Value {
    serde_json::to_value(card).unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }))
}

/// Trait for tools the model can call during a chat turn.
///
/// Implementations never fail: any error becomes a card with its `error`
/// field set so the UI can still render something.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The tool's unique name (used for dispatch).
    fn name(&self) -> &str;

    /// Human-readable description of what the tool does.
    fn description(&self) -> &str;

    /// JSON schema of the tool's parameters.
    fn parameters(&self) -> Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, args: ToolArgs) -> ToolOutput;
}
