//! OpenAI-compatible chat completions client.
//!
//! Provides a streaming and non-streaming [`LlmClient`], the wire types for
//! multimodal messages and tool calls, and system-prompt assembly from
//! personas, user preferences and memories.
//!
//! # Example
//!
//! ```rust,ignore
//! use futures_util::StreamExt;
//! use llm_client::{ChatMessage, ChatRequest, LlmClient, StreamEvent};
//!
//! let client = LlmClient::from_env()?;
//! let mut stream = client
//!     .stream_chat(ChatRequest::new(vec![ChatMessage::user("Hello!")]))
//!     .await?;
//! while let Some(event) = stream.next().await {
//!     if let StreamEvent::TextDelta(text) = event? {
//!         print!("{}", text);
//!     }
//! }
//! ```

mod api_types;
mod client;
mod config;
mod error;
pub mod prompt;
mod stream;

pub use api_types::{
    ChatMessage, ContentPart, FunctionCall, ImageUrl, MessageContent, ToolCall, ToolDefinition,
    Usage,
};
pub use client::{ChatRequest, Completion, LlmClient, MAX_TITLE_CHARS};
pub use config::{LlmConfig, LlmConfigBuilder};
pub use error::LlmError;
pub use prompt::{build_system_prompt, hash_prompt, Persona};
pub use stream::{EventStream, StreamEvent, ToolCallAccumulator};
