//! Provider types for ChatRelay
//!
//! This module defines the `LLMProvider` trait every model backend
//! implements, together with request options and response types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::session::{ToolCall, Turn};

/// Definition of a tool bound to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The name of the tool (must be unique)
    pub name: String,
    /// Human-readable description of what the tool does
    pub description: String,
    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Create a new tool definition.
    ///
    /// # Example
    /// ```
    /// use chatrelay::providers::ToolDefinition;
    /// use serde_json::json;
    ///
    /// let tool = ToolDefinition::new(
    ///     "multiply",
    ///     "Tool for multiply two integers together.",
    ///     json!({
    ///         "type": "object",
    ///         "properties": {
    ///             "first_int": { "type": "integer" },
    ///             "second_int": { "type": "integer" }
    ///         },
    ///         "required": ["first_int", "second_int"]
    ///     }),
    /// );
    /// assert_eq!(tool.name, "multiply");
    /// ```
    pub fn new(name: &str, description: &str, parameters: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

/// Trait for model backends (Ollama, Gemini, OpenAI).
///
/// The provider translates ChatRelay turns into the backend's wire format.
/// Tools are passed with every call; an empty list means tools are unbound.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Send a chat request and return the model's reply.
    async fn chat(
        &self,
        turns: Vec<Turn>,
        tools: Vec<ToolDefinition>,
        options: ChatOptions,
    ) -> Result<LLMResponse>;

    /// Token count of `text` as this backend measures it.
    ///
    /// Defaults to one token per four characters, rounded up.
    fn count_tokens(&self, text: &str) -> usize {
        estimate_tokens(text)
    }

    /// The model identifier this provider calls.
    fn default_model(&self) -> &str;

    /// The provider name (e.g., "ollama", "gemini").
    fn name(&self) -> &str;
}

/// Character-based token estimate.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Options for chat requests.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// Maximum number of tokens to generate
    pub max_tokens: Option<u32>,
    /// Temperature for sampling (0.0 = deterministic)
    pub temperature: Option<f32>,
}

impl ChatOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Response from a chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    /// Text content of the response
    pub content: String,
    /// Tool calls requested by the model
    pub tool_calls: Vec<ToolCall>,
    /// Token usage, when the backend reports it
    pub usage: Option<Usage>,
}

impl LLMResponse {
    /// Create a plain text response.
    ///
    /// # Example
    /// ```
    /// use chatrelay::providers::LLMResponse;
    ///
    /// let response = LLMResponse::text("NO_ANSWER");
    /// assert!(!response.has_tool_calls());
    /// ```
    pub fn text(content: &str) -> Self {
        Self {
            content: content.to_string(),
            tool_calls: vec![],
            usage: None,
        }
    }

    /// Create a response that requests tool calls.
    pub fn with_tools(content: &str, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: content.to_string(),
            tool_calls,
            usage: None,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// The assistant turn recording this response.
    pub fn to_turn(&self) -> Turn {
        if self.has_tool_calls() {
            Turn::assistant_with_tools(&self.content, self.tool_calls.clone())
        } else {
            Turn::assistant(&self.content)
        }
    }
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}
