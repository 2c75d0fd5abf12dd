//! MCP tool wrapper: adapts a remote MCP tool to the `Tool` trait.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::client::McpClient;
use super::types::McpToolDef;
use crate::error::{RelayError, Result};
use crate::tools::{Tool, ToolContext};

/// Wraps a single MCP tool. The tool keeps its server-side name, so it
/// replaces a built-in tool of the same name when registered.
pub struct McpToolWrapper {
    name: String,
    description: String,
    input_schema: Value,
    client: Arc<McpClient>,
}

impl McpToolWrapper {
    pub fn new(def: McpToolDef, client: Arc<McpClient>) -> Self {
        Self {
            description: def
                .description
                .unwrap_or_else(|| format!("{} (from {})", def.name, client.server_name())),
            name: def.name,
            input_schema: def.input_schema,
            client,
        }
    }
}

#[async_trait]
impl Tool for McpToolWrapper {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        self.input_schema.clone()
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<String> {
        let result = self.client.call_tool(&self.name, args).await?;
        let text = result.text();

        if result.is_error {
            return Err(RelayError::Mcp(if text.is_empty() {
                "MCP tool returned error".to_string()
            } else {
                text
            }));
        }
        Ok(if text.is_empty() {
            "(no output)".to_string()
        } else {
            text
        })
    }
}
