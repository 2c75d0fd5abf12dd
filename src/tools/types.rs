//! Tool types for ChatRelay
//!
//! This module defines the `Tool` trait every callable tool implements and
//! the `ToolContext` passed to each invocation.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::providers::ToolDefinition;

/// Trait that all tools must implement.
///
/// Tools are named functions the model may request mid-conversation: pure
/// helpers like `multiply`, or fetchers that reach out to the network.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use serde_json::Value;
/// use chatrelay::tools::{Tool, ToolContext};
/// use chatrelay::error::Result;
///
/// struct Shout;
///
/// #[async_trait]
/// impl Tool for Shout {
///     fn name(&self) -> &str { "shout" }
///     fn description(&self) -> &str { "Uppercase a text" }
///     fn parameters(&self) -> Value {
///         serde_json::json!({
///             "type": "object",
///             "properties": {"text": {"type": "string"}},
///             "required": ["text"]
///         })
///     }
///     async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<String> {
///         Ok(args["text"].as_str().unwrap_or_default().to_uppercase())
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model uses to request the tool. Unique within a registry.
    fn name(&self) -> &str;

    /// Description sent to the model.
    fn description(&self) -> &str;

    /// JSON schema of the accepted arguments.
    fn parameters(&self) -> Value;

    /// Execute the tool.
    ///
    /// An `Err` is turned into a textual result by the registry, so a
    /// failing tool never aborts the dispatch cycle.
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String>;

    /// The definition handed to model backends.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.parameters())
    }
}

/// Context provided to tools during execution.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// The channel name (e.g., "telegram")
    pub channel: Option<String>,
    /// The chat the request came from
    pub chat_id: Option<String>,
}

impl ToolContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the channel and chat ID.
    ///
    /// # Example
    /// ```
    /// use chatrelay::tools::ToolContext;
    ///
    /// let ctx = ToolContext::new().with_channel("telegram", "123456");
    /// assert_eq!(ctx.channel.as_deref(), Some("telegram"));
    /// assert_eq!(ctx.chat_id.as_deref(), Some("123456"));
    /// ```
    pub fn with_channel(mut self, channel: &str, chat_id: &str) -> Self {
        self.channel = Some(channel.to_string());
        self.chat_id = Some(chat_id.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Constant;

    #[async_trait]
    impl Tool for Constant {
        fn name(&self) -> &str {
            "constant"
        }

        fn description(&self) -> &str {
            "Always 42"
        }

        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }

        async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<String> {
            Ok("42".into())
        }
    }

    #[test]
    fn test_definition_from_tool() {
        let def = Constant.definition();
        assert_eq!(def.name, "constant");
        assert_eq!(def.description, "Always 42");
        assert_eq!(def.parameters["type"], "object");
    }

    #[tokio::test]
    async fn test_execute() {
        let out = Constant.execute(json!({}), &ToolContext::new()).await.unwrap();
        assert_eq!(out, "42");
    }

    #[test]
    fn test_context_default_is_empty() {
        let ctx = ToolContext::default();
        assert!(ctx.channel.is_none());
        assert!(ctx.chat_id.is_none());
    }
}
