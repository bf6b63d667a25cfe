//! Tool registry and tool-call handlers for the chat server.
//!
//! The model can call these tools mid-response. Each tool returns a *card*:
//! a fixed JSON shape the UI renders. Tools never fail outright; a failed
//! call still yields a card with its `error` field set and neutral fallback
//! values, so the conversation can carry on.
//!
//! # Built-in Tools
//!
//! - [`Weather`] - Current conditions via AccuWeather.
//! - [`StockQuote`] - Latest quote via Alpha Vantage.
//! - [`ImageGeneration`] - Images via an OpenAI-compatible images API.
//! - [`SaveMemory`] - Persist a fact about the signed-in user.
//!
//! # Example
//!
//! ```rust,ignore
//! use chat_tools::{default_registry, ToolContext, ToolsConfig};
//!
//! let registry = default_registry(&ToolsConfig::from_env(), db.clone());
//! let output = registry
//!     .execute_json("get_weather", r#"{"location": "Lisbon"}"#, ToolContext::anonymous())
//!     .await;
//! println!("{}", output.card);
//! ```

mod config;
mod error;
mod registry;
mod tool;
pub mod tools;

pub use config::{ToolsConfig, ToolsConfigBuilder};
pub use error::ToolError;
pub use registry::{ToolRegistry, ToolSpec};
pub use tool::{Tool, ToolArgs, ToolContext, ToolOutput};
pub use tools::{ImageGeneration, SaveMemory, StockQuote, Weather, IMAGE_TOOL, SAVE_MEMORY_TOOL};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

use database::Database;

/// Create a registry with all built-in tools registered.
pub fn default_registry(config: &ToolsConfig, db: Database) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(Weather::new(config));
    registry.register(StockQuote::new(config));
    registry.register(ImageGeneration::new(config));
    registry.register(SaveMemory::new(db));

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_registry() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let registry = default_registry(&ToolsConfig::default(), db);

        assert_eq!(
            registry.list_tools(),
            vec!["generate_image", "get_stock_quote", "get_weather", "save_memory"]
        );
        assert!(registry
            .specs()
            .iter()
            .all(|spec| spec.parameters["type"] == "object"));
    }
}
