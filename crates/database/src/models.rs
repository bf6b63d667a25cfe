//! Database models.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::FromRow;

/// A conversation owned by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Conversation {
    /// UUID v4.
    pub id: String,
    /// Owning user (auth provider subject).
    pub user_id: String,
    /// Display title.
    pub title: String,
    /// Creation timestamp (RFC 3339, UTC).
    pub created_at: String,
    /// Last activity timestamp.
    pub updated_at: String,
}

/// Author role of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
            MessageRole::Tool => "tool",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            "system" => Some(MessageRole::System),
            "tool" => Some(MessageRole::Tool),
            _ => None,
        }
    }
}

/// Lifecycle of a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Pending,
    Streaming,
    Completed,
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "pending",
            MessageStatus::Streaming => "streaming",
            MessageStatus::Completed => "completed",
            MessageStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(MessageStatus::Pending),
            "streaming" => Some(MessageStatus::Streaming),
            "completed" => Some(MessageStatus::Completed),
            "failed" => Some(MessageStatus::Failed),
            _ => None,
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    /// One of `user`, `assistant`, `system`, `tool`.
    pub role: String,
    pub content: String,
    /// Model that produced an assistant message.
    pub model: Option<String>,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
    /// Wall-clock generation time in milliseconds.
    pub response_time_ms: Option<i64>,
    /// One of `pending`, `streaming`, `completed`, `failed`.
    pub status: String,
    /// Tool results, thinking trace and other free-form data.
    pub metadata: Json<Value>,
    pub created_at: String,
}

/// Fields for inserting a message.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: String,
    pub role: MessageRole,
    pub content: String,
    pub model: Option<String>,
    pub usage: Option<TokenUsage>,
    pub response_time_ms: Option<i64>,
    pub status: MessageStatus,
    pub metadata: Value,
}

impl NewMessage {
    /// A completed message with no model information.
    pub fn new(conversation_id: impl Into<String>, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            role,
            content: content.into(),
            model: None,
            usage: None,
            response_time_ms: None,
            status: MessageStatus::Completed,
            metadata: Value::Object(Default::default()),
        }
    }
}

/// Token counts reported by the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
}

/// Per-user personalisation used when building the system prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct UserPreference {
    pub user_id: String,
    /// What the assistant should call the user.
    pub display_name: Option<String>,
    pub occupation: Option<String>,
    /// Traits the assistant should exhibit (e.g. "witty", "concise").
    pub traits: Json<Vec<String>>,
    /// Free-text context about the user.
    pub additional_context: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields accepted by a preference upsert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreferenceUpdate {
    pub display_name: Option<String>,
    pub occupation: Option<String>,
    #[serde(default)]
    pub traits: Vec<String>,
    pub additional_context: Option<String>,
}

/// Kind of fact the assistant chose to remember.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    Fact,
    Preference,
    Context,
    Instruction,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Fact => "fact",
            MemoryType::Preference => "preference",
            MemoryType::Context => "context",
            MemoryType::Instruction => "instruction",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fact" => Some(MemoryType::Fact),
            "preference" => Some(MemoryType::Preference),
            "context" => Some(MemoryType::Context),
            "instruction" => Some(MemoryType::Instruction),
            _ => None,
        }
    }
}

/// A key/value fact remembered about a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UserMemory {
    pub id: String,
    pub user_id: String,
    pub key: String,
    pub value: String,
    pub memory_type: String,
    /// False once the memory has been forgotten.
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Where an attachment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentSource {
    /// Uploaded by the user.
    Upload,
    /// Produced by the image generation tool.
    Generated,
}

impl AttachmentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttachmentSource::Upload => "upload",
            AttachmentSource::Generated => "generated",
        }
    }
}

/// An image or document attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct MessageAttachment {
    pub id: String,
    /// Set once the attachment is sent with a message.
    pub message_id: Option<String>,
    pub user_id: String,
    pub file_name: String,
    /// MIME type.
    pub file_type: String,
    /// Size in bytes.
    pub file_size: i64,
    /// Public URL.
    pub url: String,
    /// Key inside the object store, if stored by us.
    #[serde(skip_serializing)]
    pub storage_path: Option<String>,
    pub source: String,
    pub created_at: String,
}

impl MessageAttachment {
    /// Whether the attachment is an image.
    pub fn is_image(&self) -> bool {
        self.file_type.starts_with("image/")
    }
}

/// Fields for inserting an attachment.
#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub message_id: Option<String>,
    pub user_id: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub url: String,
    pub storage_path: Option<String>,
    pub source: AttachmentSource,
}
