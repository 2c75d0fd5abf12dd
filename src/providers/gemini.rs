//! Google Gemini provider (`generateContent` REST API).
//!
//! System turns become `systemInstruction`, assistant turns use the
//! `model` role and tool results are sent back as `functionResponse`
//! parts. Every harm category is set to `BLOCK_NONE`.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Map, Value};
use tracing::{debug, trace};

use crate::error::{RelayError, Result};
use crate::session::{ContentPart, Role, ToolCall, Turn, TurnContent};

use super::{send_json, ChatOptions, LLMProvider, LLMResponse, ToolDefinition, Usage};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com";

const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Gemini has no call ids; ids are `{name}#{index}` and the name is
/// recovered from the id when the result is sent back.
const CALL_ID_SEPARATOR: char = '#';

pub struct GeminiProvider {
    api_key: String,
    model: String,
    base_url: String,
    client: Client,
}

impl GeminiProvider {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self::with_base_url(api_key, model, GEMINI_API_URL)
    }

    pub fn with_base_url(api_key: &str, model: &str, base_url: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }
}

fn safety_settings() -> Value {
    Value::Array(
        HARM_CATEGORIES
            .iter()
            .map(|category| json!({"category": category, "threshold": "BLOCK_NONE"}))
            .collect(),
    )
}

/// Convert JSON Schema types (lowercase) to Gemini types (uppercase).
fn convert_schema_types(schema: &Value) -> Value {
    match schema {
        Value::Object(obj) => {
            let mut result = Map::new();
            for (key, value) in obj {
                let converted = match (key.as_str(), value) {
                    ("type", Value::String(t)) => Value::String(t.to_uppercase()),
                    ("properties", Value::Object(props)) => Value::Object(
                        props
                            .iter()
                            .map(|(k, v)| (k.clone(), convert_schema_types(v)))
                            .collect(),
                    ),
                    ("items", v) => convert_schema_types(v),
                    _ => value.clone(),
                };
                result.insert(key.clone(), converted);
            }
            Value::Object(result)
        }
        Value::Array(items) => Value::Array(items.iter().map(convert_schema_types).collect()),
        _ => schema.clone(),
    }
}

fn to_gemini_tools(tools: &[ToolDefinition]) -> Value {
    let declarations: Vec<Value> = tools
        .iter()
        .map(|t| {
            json!({
                "name": t.name,
                "description": t.description,
                "parameters": convert_schema_types(&t.parameters),
            })
        })
        .collect();
    json!([{ "functionDeclarations": declarations }])
}

fn content_parts(content: &TurnContent) -> Vec<Value> {
    match content {
        TurnContent::Text(text) => vec![json!({ "text": text })],
        TurnContent::Parts(parts) => parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => json!({ "text": text }),
                ContentPart::Image { data_url } => {
                    let (mime, data) = split_data_url(data_url);
                    json!({ "inlineData": { "mimeType": mime, "data": data } })
                }
            })
            .collect(),
    }
}

/// Split `data:<mime>;base64,<data>` into its mime type and payload.
fn split_data_url(data_url: &str) -> (&str, &str) {
    data_url
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(','))
        .map(|(header, data)| (header.trim_end_matches(";base64"), data))
        .unwrap_or(("image/jpeg", data_url))
}

/// Build the request body: (systemInstruction text, contents).
fn to_gemini_contents(turns: &[Turn]) -> (Option<String>, Vec<Value>) {
    let mut system = Vec::new();
    let mut contents = Vec::new();

    for turn in turns {
        match turn.role {
            Role::System => system.push(turn.text()),
            Role::Human => contents.push(json!({
                "role": "user",
                "parts": content_parts(&turn.content),
            })),
            Role::Assistant => {
                let mut parts = Vec::new();
                let text = turn.text();
                if !text.is_empty() || !turn.has_tool_calls() {
                    parts.push(json!({ "text": text }));
                }
                for call in turn.tool_calls.iter().flatten() {
                    let args: Value =
                        serde_json::from_str(&call.arguments).unwrap_or_else(|_| json!({}));
                    parts.push(json!({ "functionCall": { "name": call.name, "args": args } }));
                }
                contents.push(json!({ "role": "model", "parts": parts }));
            }
            Role::Tool => {
                let id = turn.tool_call_id.as_deref().unwrap_or_default();
                let name = id.split(CALL_ID_SEPARATOR).next().unwrap_or(id);
                let text = turn.text();
                let response: Value = serde_json::from_str::<Value>(&text)
                    .ok()
                    .filter(Value::is_object)
                    .unwrap_or_else(|| json!({ "result": text }));
                contents.push(json!({
                    "role": "user",
                    "parts": [{ "functionResponse": { "name": name, "response": response } }],
                }));
            }
        }
    }

    let system = (!system.is_empty()).then(|| system.join("\n"));
    (system, contents)
}

fn parse_response(resp: &Value) -> Result<LLMResponse> {
    let candidate = &resp["candidates"][0];
    if candidate.is_null() {
        let reason = resp["promptFeedback"]["blockReason"]
            .as_str()
            .unwrap_or("no candidates");
        return Err(RelayError::Provider(format!(
            "Gemini returned no candidates: {}",
            reason
        )));
    }

    let parts = candidate["content"]["parts"]
        .as_array()
        .cloned()
        .unwrap_or_default();

    let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();
    let tool_calls: Vec<ToolCall> = parts
        .iter()
        .filter_map(|p| p.get("functionCall"))
        .enumerate()
        .map(|(i, fc)| {
            let name = fc["name"].as_str().unwrap_or_default();
            let args = if fc["args"].is_null() {
                "{}".to_string()
            } else {
                fc["args"].to_string()
            };
            ToolCall::new(&format!("{}{}{}", name, CALL_ID_SEPARATOR, i), name, &args)
        })
        .collect();

    let mut response = LLMResponse::with_tools(&text, tool_calls);
    if let (Some(prompt), Some(completion)) = (
        resp["usageMetadata"]["promptTokenCount"].as_u64(),
        resp["usageMetadata"]["candidatesTokenCount"].as_u64(),
    ) {
        response = response.with_usage(Usage::new(prompt as u32, completion as u32));
    }
    Ok(response)
}

#[async_trait]
impl LLMProvider for GeminiProvider {
    async fn chat(
        &self,
        turns: Vec<Turn>,
        tools: Vec<ToolDefinition>,
        options: ChatOptions,
    ) -> Result<LLMResponse> {
        let (system, contents) = to_gemini_contents(&turns);

        let mut body = json!({
            "contents": contents,
            "safetySettings": safety_settings(),
        });
        if let Some(system) = system {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }
        if !tools.is_empty() {
            body["tools"] = to_gemini_tools(&tools);
        }
        let mut generation = Map::new();
        if let Some(max_tokens) = options.max_tokens {
            generation.insert("maxOutputTokens".into(), max_tokens.into());
        }
        if let Some(temperature) = options.temperature {
            generation.insert("temperature".into(), json!(temperature));
        }
        if !generation.is_empty() {
            body["generationConfig"] = Value::Object(generation);
        }

        debug!(model = %self.model, contents = turns.len(), tools = tools.len(), "Gemini request");

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let builder = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body);
        let resp: Value = send_json(builder, "Gemini").await?;
        trace!(response = %resp, "Gemini raw response");

        parse_response(&resp)
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    fn name(&self) -> &str {
        "gemini"
    }
}
