//! Tool registry for managing and executing tools.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::ToolError;
use crate::tool::{Tool, ToolArgs, ToolContext, ToolOutput};

/// A tool as advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Registry for managing tools.
///
/// The registry holds a collection of tools and dispatches execution
/// requests to the appropriate tool by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool.
    ///
    /// If a tool with the same name already exists, it will be replaced.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        let name = tool.name().to_string();
        info!("Registering tool: {}", name);
        self.tools.insert(name, Arc::new(tool));
    }

    /// Get a sorted list of registered tool names.
    pub fn list_tools(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Check if a tool is registered.
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Tool definitions for the model, sorted by name.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self
            .tools
            .values()
            .map(|t| ToolSpec {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters(),
            })
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// Execute a tool by name. Unknown tools yield an error card.
    pub async fn execute(
        &self,
        name: &str,
        params: HashMap<String, Value>,
        context: ToolContext,
    ) -> ToolOutput {
        let Some(tool) = self.tools.get(name) else {
            let error = ToolError::NotFound(name.to_string());
            return ToolOutput::failure(json!({ "error": error.to_string() }));
        };

        debug!("Executing tool '{}' with {} params", name, params.len());

        let result = tool.execute(ToolArgs::with_context(params, context)).await;

        debug!(
            "Tool '{}' completed: success={}, error={:?}",
            name,
            result.success,
            result.error()
        );

        result
    }

    /// Execute a tool with the model's JSON arguments string.
    ///
    /// Empty arguments are treated as `{}`; malformed JSON yields an error card.
    pub async fn execute_json(
        &self,
        name: &str,
        args_json: &str,
        context: ToolContext,
    ) -> ToolOutput {
        let args_json = if args_json.trim().is_empty() {
            "{}"
        } else {
            args_json
        };

        match serde_json::from_str::<HashMap<String, Value>>(args_json) {
            Ok(params) => self.execute(name, params, context).await,
            Err(e) => ToolOutput::failure(json!({
                "error": format!("Invalid arguments for {}: {}", name, e)
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes back the input"
        }

        fn parameters(&self) -> Value {
            json!({
                "type": "object",
                "properties": { "message": { "type": "string" } },
                "required": ["message"]
            })
        }

        async fn execute(&self, args: ToolArgs) -> ToolOutput {
            match args.get_string("message") {
                Ok(message) => ToolOutput::success(json!({ "message": message, "error": null })),
                Err(e) => ToolOutput::failure(json!({ "message": "", "error": e.to_string() })),
            }
        }
    }

    #[tokio::test]
    async fn test_registry_basic() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);

        assert!(registry.has_tool("echo"));
        assert!(!registry.has_tool("nonexistent"));
        assert_eq!(registry.list_tools(), vec!["echo"]);
        assert_eq!(registry.specs()[0].name, "echo");
    }

    #[tokio::test]
    async fn test_registry_execute_json() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);

        let result = registry
            .execute_json("echo", r#"{"message": "world"}"#, ToolContext::anonymous())
            .await;
        assert!(result.success);
        assert_eq!(result.card["message"], "world");

        let result = registry
            .execute_json("echo", "{not json", ToolContext::anonymous())
            .await;
        assert!(!result.success);
        assert!(result.error().unwrap().contains("Invalid arguments"));
    }

    #[tokio::test]
    async fn test_registry_not_found_is_error_card() {
        let registry = ToolRegistry::new();
        let result = registry
            .execute("nonexistent", HashMap::new(), ToolContext::anonymous())
            .await;
        assert!(!result.success);
        assert_eq!(result.error(), Some("Tool not found: nonexistent"));
    }
}
