//! OpenAI Provider Implementation
//!
//! Implements the `LLMProvider` trait for the Chat Completions API and any
//! OpenAI-compatible server (llama.cpp, vLLM, LM Studio...). Requests are
//! sent with temperature 0.0.
//!
//! # Example
//!
//! ```rust,ignore
//! use chatrelay::providers::{openai::OpenAIProvider, ChatOptions, LLMProvider};
//! use chatrelay::session::Turn;
//!
//! async fn example() {
//!     let provider = OpenAIProvider::new("sk-xxx", None, None);
//!     let response = provider
//!         .chat(vec![Turn::human("Hello!")], vec![], ChatOptions::default())
//!         .await
//!         .unwrap();
//!     println!("OpenAI: {}", response.content);
//! }
//! ```

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::Result;
use crate::session::{ContentPart, Role, ToolCall, Turn, TurnContent};

use super::{send_json, ChatOptions, LLMProvider, LLMResponse, ToolDefinition, Usage};

/// The OpenAI API endpoint URL.
const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// The default OpenAI model to use.
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Placeholder key for local OpenAI-compatible servers.
pub const NO_API_KEY: &str = "not-needed";

// ============================================================================
// OpenAI API Request Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: &'static str,
    /// String, or an array of typed parts for multimodal turns
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCallRequest>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenAIToolCallRequest {
    id: String,
    r#type: &'static str,
    function: OpenAIFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct OpenAITool {
    r#type: &'static str,
    function: ToolDefinition,
}

// ============================================================================
// OpenAI API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAIToolCallResponse>>,
}

#[derive(Debug, Deserialize)]
struct OpenAIToolCallResponse {
    id: String,
    function: OpenAIFunctionCall,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

// ============================================================================
// OpenAI Provider
// ============================================================================

/// OpenAI (or compatible) model backend.
pub struct OpenAIProvider {
    api_key: String,
    api_base: String,
    model: String,
    client: Client,
}

impl OpenAIProvider {
    /// Create a provider.
    ///
    /// A missing key becomes `not-needed` so keyless local servers work; a
    /// missing base URL means the public OpenAI endpoint.
    ///
    /// # Example
    /// ```
    /// use chatrelay::providers::openai::OpenAIProvider;
    /// use chatrelay::providers::LLMProvider;
    ///
    /// let provider = OpenAIProvider::new("", Some("http://localhost:8080/v1/"), None);
    /// assert_eq!(provider.name(), "openai");
    /// ```
    pub fn new(api_key: &str, api_base: Option<&str>, model: Option<&str>) -> Self {
        Self::with_client(api_key, api_base, model, Client::new())
    }

    /// Create a provider with a custom HTTP client.
    pub fn with_client(
        api_key: &str,
        api_base: Option<&str>,
        model: Option<&str>,
        client: Client,
    ) -> Self {
        let api_key = if api_key.trim().is_empty() {
            NO_API_KEY
        } else {
            api_key
        };
        Self {
            api_key: api_key.to_string(),
            api_base: api_base
                .unwrap_or(OPENAI_API_URL)
                .trim_end_matches('/')
                .to_string(),
            model: model.unwrap_or(DEFAULT_MODEL).to_string(),
            client,
        }
    }
}

// ============================================================================
// Conversion Functions
// ============================================================================

fn convert_content(content: &TurnContent) -> Value {
    match content {
        TurnContent::Text(text) => Value::String(text.clone()),
        TurnContent::Parts(parts) => Value::Array(
            parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => json!({"type": "text", "text": text}),
                    ContentPart::Image { data_url } => {
                        json!({"type": "image_url", "image_url": {"url": data_url}})
                    }
                })
                .collect(),
        ),
    }
}

/// Convert turns to OpenAI messages.
fn convert_turns(turns: Vec<Turn>) -> Vec<OpenAIMessage> {
    turns
        .into_iter()
        .map(|turn| {
            let role = match turn.role {
                Role::System => "system",
                Role::Human => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            };

            let tool_calls = turn.tool_calls.map(|tcs| {
                tcs.into_iter()
                    .map(|tc| OpenAIToolCallRequest {
                        id: tc.id,
                        r#type: "function",
                        function: OpenAIFunctionCall {
                            name: tc.name,
                            arguments: tc.arguments,
                        },
                    })
                    .collect::<Vec<_>>()
            });

            let empty = matches!(&turn.content, TurnContent::Text(t) if t.is_empty());
            OpenAIMessage {
                role,
                content: if empty && tool_calls.is_some() {
                    None
                } else {
                    Some(convert_content(&turn.content))
                },
                tool_calls,
                tool_call_id: turn.tool_call_id,
            }
        })
        .collect()
}

fn convert_tools(tools: Vec<ToolDefinition>) -> Vec<OpenAITool> {
    tools
        .into_iter()
        .map(|function| OpenAITool {
            r#type: "function",
            function,
        })
        .collect()
}

fn convert_response(response: OpenAIResponse) -> LLMResponse {
    let (content, tool_calls) = match response.choices.into_iter().next() {
        Some(c) => {
            let tool_calls: Vec<ToolCall> = c
                .message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|tc| ToolCall::new(&tc.id, &tc.function.name, &tc.function.arguments))
                .collect();
            (c.message.content.unwrap_or_default(), tool_calls)
        }
        None => (String::new(), Vec::new()),
    };

    let mut llm_response = LLMResponse::with_tools(&content, tool_calls);
    if let Some(usage) = response.usage {
        llm_response =
            llm_response.with_usage(Usage::new(usage.prompt_tokens, usage.completion_tokens));
    }
    llm_response
}

// ============================================================================
// LLMProvider Implementation
// ============================================================================

#[async_trait]
impl LLMProvider for OpenAIProvider {
    async fn chat(
        &self,
        turns: Vec<Turn>,
        tools: Vec<ToolDefinition>,
        options: ChatOptions,
    ) -> Result<LLMResponse> {
        let request = OpenAIRequest {
            model: self.model.clone(),
            messages: convert_turns(turns),
            tools: (!tools.is_empty()).then(|| convert_tools(tools)),
            max_tokens: options.max_tokens,
            temperature: options.temperature.unwrap_or(0.0),
        };

        debug!(model = %self.model, "OpenAI request");

        let builder = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&request);
        let response: OpenAIResponse = send_json(builder, "OpenAI").await?;

        Ok(convert_response(response))
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    fn name(&self) -> &str {
        "openai"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_defaults() {
        let provider = OpenAIProvider::new("sk-test", None, None);
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.default_model(), DEFAULT_MODEL);
        assert_eq!(provider.api_base, OPENAI_API_URL);
        assert_eq!(provider.api_key, "sk-test");
    }

    #[test]
    fn test_keyless_base_url_uses_placeholder_key() {
        let provider =
            OpenAIProvider::new("", Some("http://localhost:8080/v1/"), Some("local-model"));
        assert_eq!(provider.api_key, NO_API_KEY);
        assert_eq!(provider.api_base, "http://localhost:8080/v1");
        assert_eq!(provider.default_model(), "local-model");
    }

    #[test]
    fn test_convert_turns_roles() {
        let converted = convert_turns(vec![
            Turn::system("You are Kiro"),
            Turn::assistant("ok!"),
            Turn::human("@lolo: hi"),
        ]);
        let roles: Vec<&str> = converted.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec!["system", "assistant", "user"]);
        assert_eq!(converted[2].content, Some(json!("@lolo: hi")));
    }

    #[test]
    fn test_convert_multimodal_turn() {
        let converted = convert_turns(vec![Turn::human_with_image("what is it?", "QUJD")]);
        let content = converted[0].content.as_ref().unwrap();
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[1]["type"], "image_url");
        assert_eq!(
            content[1]["image_url"]["url"],
            "data:image/jpeg;base64,QUJD"
        );
    }

    #[test]
    fn test_convert_tool_round_trip_turns() {
        let call = ToolCall::new("call_1", "multiply", r#"{"first_int":2,"second_int":3}"#);
        let converted = convert_turns(vec![
            Turn::assistant_with_tools("", vec![call]),
            Turn::tool_result("call_1", "6"),
        ]);

        assert!(converted[0].content.is_none());
        let calls = converted[0].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.name, "multiply");
        assert_eq!(converted[1].role, "tool");
        assert_eq!(converted[1].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_request_serialization() {
        let request = OpenAIRequest {
            model: "gpt-4o-mini".into(),
            messages: convert_turns(vec![Turn::human("Hello")]),
            tools: Some(convert_tools(vec![ToolDefinition::new(
                "author",
                "who made you",
                json!({"type": "object", "properties": {}}),
            )])),
            max_tokens: None,
            temperature: 0.0,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains(r#""temperature":0.0"#));
        assert!(json.contains(r#""type":"function""#));
        assert!(!json.contains("max_tokens"));
    }

    #[test]
    fn test_convert_response_with_tool_calls() {
        let response: OpenAIResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "author", "arguments": "{}"}
                    }]
                }
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5}
        }))
        .unwrap();

        let converted = convert_response(response);
        assert_eq!(converted.content, "");
        assert_eq!(converted.tool_calls[0].name, "author");
        assert_eq!(converted.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn test_convert_response_empty_choices() {
        let converted = convert_response(OpenAIResponse {
            choices: vec![],
            usage: None,
        });
        assert_eq!(converted.content, "");
        assert!(!converted.has_tool_calls());
    }
}
