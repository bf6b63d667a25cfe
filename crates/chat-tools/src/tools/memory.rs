//! Tool that lets the model remember facts about the user.

use async_trait::async_trait;
use database::{memory, Database, MemoryType};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::ToolError;
use crate::tool::{Tool, ToolArgs, ToolOutput};

/// Name the chat turn matches on to invalidate cached prompts.
pub const SAVE_MEMORY_TOOL: &str = "save_memory";

/// Card rendered after a memory write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryCard {
    pub key: String,
    pub value: String,
    pub memory_type: String,
    pub saved: bool,
    pub error: Option<String>,
}

/// Persist a key/value memory for the signed-in user.
///
/// Saving an existing key overwrites it.
pub struct SaveMemory {
    db: Database,
}

impl SaveMemory {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    async fn save(&self, args: &ToolArgs) -> Result<MemoryCard, ToolError> {
        let user_id = args.require_user()?;
        let key = args.get_string("key")?;
        let value = args.get_string("value")?;
        let memory_type = match args.get_string_opt("memory_type") {
            Some(raw) => MemoryType::parse(&raw).ok_or_else(|| ToolError::InvalidParameter {
                name: "memory_type".to_string(),
                reason: format!("unknown memory type '{}'", raw),
            })?,
            None => MemoryType::Fact,
        };

        let saved = memory::upsert_memory(self.db.pool(), user_id, &key, &value, memory_type).await?;
        info!(user_id, key = %saved.key, "Model saved a memory");

        Ok(MemoryCard {
            key: saved.key,
            value: saved.value,
            memory_type: saved.memory_type,
            saved: true,
            error: None,
        })
    }
}

#[async_trait]
impl Tool for SaveMemory {
    fn name(&self) -> &str {
        SAVE_MEMORY_TOOL
    }

    fn description(&self) -> &str {
        "Remember a durable fact, preference or instruction about the user for \
         future conversations. Use a short snake_case key."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "key": {
                    "type": "string",
                    "description": "Short identifier, e.g. \"favorite_language\""
                },
                "value": {
                    "type": "string",
                    "description": "What to remember"
                },
                "memory_type": {
                    "type": "string",
                    "enum": ["fact", "preference", "context", "instruction"]
                }
            },
            "required": ["key", "value"]
        })
    }

    async fn execute(&self, args: ToolArgs) -> ToolOutput {
        match self.save(&args).await {
            Ok(card) => ToolOutput::success(card),
            Err(e) => {
                warn!("save_memory failed: {}", e);
                ToolOutput::failure(MemoryCard {
                    key: args.get_string_opt("key").unwrap_or_default(),
                    value: args.get_string_opt("value").unwrap_or_default(),
                    memory_type: args
                        .get_string_opt("memory_type")
                        .unwrap_or_else(|| MemoryType::Fact.as_str().to_string()),
                    saved: false,
                    error: Some(e.to_string()),
                })
            }
        }
    }
}
