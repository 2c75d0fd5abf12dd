//! Ollama provider (native `/api/chat`, non-streaming).
//!
//! Images travel as raw base64 strings in the message's `images` field and
//! tool calls carry their arguments as JSON objects rather than strings.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::Result;
use crate::session::{Role, ToolCall, Turn};

use super::{send_json, ChatOptions, LLMProvider, LLMResponse, ToolDefinition, Usage};

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OllamaToolCall>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaToolCall {
    function: OllamaFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
}

pub struct OllamaProvider {
    model: String,
    base_url: String,
    client: Client,
}

impl OllamaProvider {
    pub fn new(model: &str, base_url: &str) -> Self {
        Self {
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }
}

fn convert_turns(turns: &[Turn]) -> Vec<OllamaMessage> {
    turns
        .iter()
        .map(|turn| OllamaMessage {
            role: match turn.role {
                Role::System => "system",
                Role::Human => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            }
            .to_string(),
            content: turn.text(),
            images: turn.images().into_iter().map(str::to_string).collect(),
            tool_calls: turn
                .tool_calls
                .iter()
                .flatten()
                .map(|call| OllamaToolCall {
                    function: OllamaFunction {
                        name: call.name.clone(),
                        arguments: serde_json::from_str(&call.arguments)
                            .unwrap_or_else(|_| json!({})),
                    },
                })
                .collect(),
        })
        .collect()
}

fn convert_tools(tools: &[ToolDefinition]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| json!({ "type": "function", "function": tool }))
        .collect()
}

fn convert_response(response: OllamaResponse) -> LLMResponse {
    let tool_calls = response
        .message
        .tool_calls
        .into_iter()
        .enumerate()
        .map(|(i, call)| {
            let args = if call.function.arguments.is_null() {
                "{}".to_string()
            } else {
                call.function.arguments.to_string()
            };
            ToolCall::new(&format!("call_{}", i), &call.function.name, &args)
        })
        .collect();

    let mut llm_response = LLMResponse::with_tools(&response.message.content, tool_calls);
    if let (Some(prompt), Some(completion)) = (response.prompt_eval_count, response.eval_count) {
        llm_response = llm_response.with_usage(Usage::new(prompt, completion));
    }
    llm_response
}

#[async_trait]
impl LLMProvider for OllamaProvider {
    async fn chat(
        &self,
        turns: Vec<Turn>,
        tools: Vec<ToolDefinition>,
        options: ChatOptions,
    ) -> Result<LLMResponse> {
        let mut model_options = serde_json::Map::new();
        if let Some(temperature) = options.temperature {
            model_options.insert("temperature".into(), json!(temperature));
        }
        if let Some(max_tokens) = options.max_tokens {
            model_options.insert("num_predict".into(), json!(max_tokens));
        }

        let request = OllamaRequest {
            model: self.model.clone(),
            messages: convert_turns(&turns),
            stream: false,
            tools: convert_tools(&tools),
            options: (!model_options.is_empty()).then_some(Value::Object(model_options)),
        };

        debug!(model = %self.model, "Ollama request");

        let builder = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request);
        let response: OllamaResponse = send_json(builder, "Ollama").await?;
        Ok(convert_response(response))
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    fn name(&self) -> &str {
        "ollama"
    }
}
