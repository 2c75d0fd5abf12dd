//! Configuration type definitions for ChatRelay
//!
//! All types implement serde traits for JSON serialization and have the
//! defaults of the deployed bot, so an empty config file plus the required
//! Telegram variables is a working setup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Main configuration struct for ChatRelay
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Model backend credentials, checked in priority order at startup
    pub backends: BackendsConfig,
    /// Bot identity, persona and chat-level switches
    pub bot: BotConfig,
    /// Dispatch engine behaviour
    pub dispatch: DispatchConfig,
    /// Token bucket gating outbound model calls
    pub rate_limiter: RateLimiterConfig,
    /// Stable Diffusion image backend
    pub image: ImageConfig,
    /// Web content and media download settings
    pub fetch: FetchConfig,
    /// MCP server definitions, keyed by server name
    pub mcp: McpConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

// ============================================================================
// Backends
// ============================================================================

/// Default Gemini model.
pub const DEFAULT_GOOGLE_MODEL: &str = "gemini-2.0-flash";

/// Default Ollama server.
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Credentials for the three supported model backends.
///
/// Only one backend is ever constructed; see
/// [`crate::providers::select_backend`] for the priority order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendsConfig {
    /// Local Ollama model name (highest priority)
    pub ollama_model: Option<String>,
    /// Ollama server base URL
    pub ollama_base_url: String,
    /// Google Generative AI key
    pub google_api_key: Option<String>,
    /// Gemini model name
    pub google_api_model: String,
    /// OpenAI (or compatible) key
    pub openai_api_key: Option<String>,
    /// OpenAI model name
    pub openai_api_model: Option<String>,
    /// OpenAI-compatible base URL
    pub openai_api_base_url: Option<String>,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            ollama_model: None,
            ollama_base_url: DEFAULT_OLLAMA_BASE_URL.to_string(),
            google_api_key: None,
            google_api_model: DEFAULT_GOOGLE_MODEL.to_string(),
            openai_api_key: None,
            openai_api_model: None,
            openai_api_base_url: None,
        }
    }
}

impl BackendsConfig {
    /// Whether at least one backend has enough data to be constructed.
    pub fn any_configured(&self) -> bool {
        self.ollama_model.is_some()
            || self.google_api_key.is_some()
            || self.openai_api_key.is_some()
            || self.openai_api_base_url.is_some()
    }
}

// ============================================================================
// Bot
// ============================================================================

/// Bot identity and chat-level switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Display name, matched case-insensitively in messages
    pub name: String,
    /// Handle without the leading `@`
    pub username: String,
    /// Telegram bot token from BotFather
    pub token: String,
    /// Full replacement for the generated instructions
    pub instructions: Option<String>,
    /// Replacement for the default character description
    pub instructions_character: Option<String>,
    /// Appended to the instructions on a new line
    pub instructions_extra: Option<String>,
    /// Language the bot answers in unless asked otherwise
    pub preferred_language: String,
    /// Teach the model to answer `NO_ANSWER`
    pub add_no_answer: bool,
    /// Chats allowed to talk to the bot (empty = all)
    pub allowed_chat_ids: Vec<String>,
    /// Answer un-addressed questions in groups ("open" mode)
    pub group_assistant: bool,
    /// Send photos to the model
    pub multimodal: bool,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            username: String::new(),
            token: String::new(),
            instructions: None,
            instructions_character: None,
            instructions_extra: None,
            preferred_language: "Spanish".to_string(),
            add_no_answer: false,
            allowed_chat_ids: Vec::new(),
            group_assistant: false,
            multimodal: false,
        }
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// How fallback and error texts are produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackStrategy {
    /// Model-generated feedback sentences, `NO_ANSWER` stays silent
    #[default]
    Feedback,
    /// Static glyphs and texts, `NO_ANSWER` answers with a random glyph
    Glyph,
}

impl std::str::FromStr for FallbackStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "feedback" => Ok(FallbackStrategy::Feedback),
            "glyph" => Ok(FallbackStrategy::Glyph),
            other => Err(format!("unknown fallback strategy '{}'", other)),
        }
    }
}

/// Dispatch engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Token budget for each conversation's stored history
    pub context_max_tokens: usize,
    /// Bind tools to the model instead of using pseudo-commands for web content
    pub use_tools: bool,
    /// Idle poll interval of the dispatch loop
    pub idle_poll_ms: u64,
    /// Inbound queue capacity
    pub queue_capacity: usize,
    /// Fallback text strategy
    pub fallback: FallbackStrategy,
    /// Classify plain text messages for prompt injection
    pub prompt_guardian: bool,
    /// Keep the typing indicator up for a human-like duration
    pub simulate_typing: bool,
    /// Words per minute used by typing simulation
    pub typing_wpm: f64,
    /// Upper bound of simulated typing in seconds
    pub typing_max_secs: f64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            context_max_tokens: 4096,
            use_tools: false,
            idle_poll_ms: 100,
            queue_capacity: 100,
            fallback: FallbackStrategy::Feedback,
            prompt_guardian: false,
            simulate_typing: false,
            typing_wpm: 50.0,
            typing_max_secs: 10.0,
        }
    }
}

// ============================================================================
// Rate limiter
// ============================================================================

/// Token bucket settings for outbound model calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// Refill rate
    pub requests_per_second: f64,
    /// How often a waiting caller re-checks the bucket
    pub check_every_secs: f64,
    /// Bucket capacity
    pub max_bucket_size: f64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 0.25,
            check_every_secs: 0.1,
            max_bucket_size: 10.0,
        }
    }
}

// ============================================================================
// Image generation
// ============================================================================

/// Default txt2img parameters (SDXL Turbo).
pub fn default_sdapi_params() -> serde_json::Map<String, serde_json::Value> {
    let mut params = serde_json::Map::new();
    params.insert("steps".into(), 1.into());
    params.insert("cfg_scale".into(), 1.into());
    params.insert("width".into(), 512.into());
    params.insert("height".into(), 512.into());
    params.insert("timestep_spacing".into(), "trailing".into());
    params
}

/// Stable Diffusion WebUI settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// WebUI base URL; image generation is disabled when unset
    pub sdapi_url: Option<String>,
    /// Extra txt2img parameters
    pub params: serde_json::Map<String, serde_json::Value>,
    /// Optional negative prompt
    pub negative_prompt: Option<String>,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            sdapi_url: None,
            params: default_sdapi_params(),
            negative_prompt: None,
        }
    }
}

// ============================================================================
// Fetch
// ============================================================================

/// Web content and media download settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-request timeout
    pub request_timeout_secs: u64,
    /// Maximum characters of extracted page text
    pub max_chars: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 10,
            max_chars: 50_000,
        }
    }
}

// ============================================================================
// MCP
// ============================================================================

/// MCP transport kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum McpTransport {
    /// Child process speaking newline-delimited JSON-RPC
    #[default]
    Stdio,
    /// JSON-RPC over HTTP POST
    StreamableHttp,
}

/// One MCP server entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct McpServerConfig {
    pub transport: McpTransport,
    /// Executable for stdio servers
    pub command: Option<String>,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    /// Endpoint for streamable HTTP servers
    pub url: Option<String>,
    pub headers: HashMap<String, String>,
    /// Request timeout
    pub timeout_secs: Option<u64>,
}

/// MCP configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct McpConfig {
    pub servers: HashMap<String, McpServerConfig>,
}

// ============================================================================
// Logging
// ============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-line output
    Pretty,
    /// Compact single-line output with component tags
    #[default]
    Component,
    /// JSON lines for log aggregators
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "component" => Ok(LogFormat::Component),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Append logs to this file instead of stderr
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Component,
            level: "info".to_string(),
            file: None,
        }
    }
}
