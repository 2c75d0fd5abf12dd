//! Tool registry for ChatRelay
//!
//! This module provides the `ToolRegistry` struct for managing and executing
//! tools. Lookup is exact and case-sensitive; definitions are listed in
//! registration order so the model sees a stable tool list.

use std::collections::HashMap;
use std::time::Instant;

use serde_json::Value;
use tracing::{error, info};

use crate::error::{RelayError, Result};
use crate::providers::ToolDefinition;

use super::{Tool, ToolContext};

/// A registry that holds and manages tools.
///
/// # Example
///
/// ```rust
/// use chatrelay::tools::{MultiplyTool, ToolRegistry};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let mut registry = ToolRegistry::new();
/// registry.register(Box::new(MultiplyTool));
///
/// assert!(registry.has("multiply"));
///
/// let result = registry.execute("multiply", json!({"first_int": 6, "second_int": 7})).await;
/// assert_eq!(result.unwrap(), "42");
/// # });
/// ```
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a new tool in the registry.
    ///
    /// If a tool with the same name already exists, it is replaced and keeps
    /// its original position in the listing.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            info!(tool = %name, "Replacing tool");
        } else {
            info!(tool = %name, "Registering tool");
            self.order.push(name.clone());
        }
        self.tools.insert(name, tool);
    }

    /// Get a tool by exact name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Execute a tool by name with default context.
    pub async fn execute(&self, name: &str, args: Value) -> Result<String> {
        self.execute_with_context(name, args, &ToolContext::default())
            .await
    }

    /// Execute a tool by name with a specific context.
    ///
    /// # Errors
    /// `RelayError::UnknownTool` when nothing is registered under `name`.
    /// A tool's own failure is not an error here: it is logged and returned
    /// as `Error: ...` text for the model to read.
    pub async fn execute_with_context(
        &self,
        name: &str,
        args: Value,
        ctx: &ToolContext,
    ) -> Result<String> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| RelayError::UnknownTool(name.to_string()))?;

        let start = Instant::now();

        match tool.execute(args, ctx).await {
            Ok(output) => {
                info!(
                    tool = name,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Tool executed successfully"
                );
                Ok(output)
            }
            Err(e) => {
                error!(
                    tool = name,
                    error = %e,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Tool execution failed"
                );
                Ok(format!("Error: {}", e))
            }
        }
    }

    /// Get all tool definitions for use with model backends.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| t.definition())
            .collect()
    }

    /// Names of all registered tools, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
