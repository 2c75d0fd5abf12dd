//! Configuration management for ChatRelay
//!
//! Configuration is loaded from `~/.chatrelay/config.json` (if present) and
//! then overridden by the environment. The environment variable names are
//! the ones the bot has always been deployed with (`TELEGRAM_BOT_TOKEN`,
//! `CONTEXT_MAX_TOKENS`, ...), so an `.env` file alone is a complete setup.

mod types;
pub mod validate;

pub use types::*;

use crate::error::{RelayError, Result};
use std::path::{Path, PathBuf};
use tracing::warn;

impl Config {
    /// Returns the ChatRelay configuration directory path (~/.chatrelay)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".chatrelay")
    }

    /// Returns the path to the config file (~/.chatrelay/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path with environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    ///
    /// A missing file is not an error; the defaults are used instead.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = Self::read_file(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Read the JSON file only, without environment overrides.
    pub fn read_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path)?;
        let raw: serde_json::Value = serde_json::from_str(&content)?;
        for diagnostic in validate::unknown_fields(&raw) {
            warn!(path = %path.display(), "{}", diagnostic);
        }
        Ok(serde_json::from_value(raw)?)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Empty values count as unset. Malformed numbers and booleans in
    /// numeric fields are errors; a malformed `WEBUI_SD_API_PARAMS` only
    /// warns and keeps the current parameters.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        // Backends
        if let Some(val) = get("OLLAMA_MODEL") {
            self.backends.ollama_model = Some(val);
        }
        if let Some(val) = get("OLLAMA_BASE_URL") {
            self.backends.ollama_base_url = val;
        }
        if let Some(val) = get("GOOGLE_API_KEY") {
            self.backends.google_api_key = Some(val);
        }
        if let Some(val) = get("GOOGLE_API_MODEL") {
            self.backends.google_api_model = val;
        }
        if let Some(val) = get("OPENAI_API_KEY") {
            self.backends.openai_api_key = Some(val);
        }
        if let Some(val) = get("OPENAI_API_MODEL") {
            self.backends.openai_api_model = Some(val);
        }
        if let Some(val) = get("OPENAI_API_BASE_URL") {
            self.backends.openai_api_base_url = Some(val);
        }

        // Bot identity
        if let Some(val) = get("TELEGRAM_BOT_NAME") {
            self.bot.name = val;
        }
        if let Some(val) = get("TELEGRAM_BOT_USERNAME") {
            self.bot.username = val.trim_start_matches('@').to_string();
        }
        if let Some(val) = get("TELEGRAM_BOT_TOKEN") {
            self.bot.token = val;
        }
        if let Some(val) = get("TELEGRAM_BOT_INSTRUCTIONS") {
            self.bot.instructions = Some(val);
        }
        if let Some(val) = get("TELEGRAM_BOT_INSTRUCTIONS_CHARACTER") {
            self.bot.instructions_character = Some(val);
        }
        if let Some(val) = get("TELEGRAM_BOT_INSTRUCTIONS_EXTRA") {
            self.bot.instructions_extra = Some(val);
        }
        if let Some(val) = get("PREFERRED_LANGUAGE") {
            self.bot.preferred_language = val;
        }
        if let Some(val) = get("ADD_NO_ANSWER") {
            self.bot.add_no_answer = parse_bool(&val);
        }
        if let Some(val) = get("TELEGRAM_ALLOWED_CHATS") {
            self.bot.allowed_chat_ids = parse_list(&val);
        }
        if let Some(val) = get("ENABLE_GROUP_ASSISTANT") {
            self.bot.group_assistant = parse_bool(&val);
        }
        if let Some(val) = get("ENABLE_MULTIMODAL") {
            self.bot.multimodal = parse_bool(&val);
        }

        // Dispatch
        if let Some(val) = get("CONTEXT_MAX_TOKENS") {
            self.dispatch.context_max_tokens = parse_number("CONTEXT_MAX_TOKENS", &val)?;
        }
        if let Some(val) = get("USE_TOOLS") {
            self.dispatch.use_tools = parse_bool(&val);
        }
        if let Some(val) = get("FALLBACK_STRATEGY") {
            self.dispatch.fallback = val.parse().map_err(RelayError::Config)?;
        }
        if let Some(val) = get("ENABLE_PROMPT_GUARDIAN") {
            self.dispatch.prompt_guardian = parse_bool(&val);
        }
        if let Some(val) = get("SIMULATE_TYPING") {
            self.dispatch.simulate_typing = parse_bool(&val);
        }
        if let Some(val) = get("SIMULATE_TYPING_WPM") {
            self.dispatch.typing_wpm = parse_number("SIMULATE_TYPING_WPM", &val)?;
        }
        if let Some(val) = get("SIMULATE_TYPING_MAX_TIME") {
            self.dispatch.typing_max_secs = parse_number("SIMULATE_TYPING_MAX_TIME", &val)?;
        }

        // Rate limiter
        if let Some(val) = get("RATE_LIMITER_REQUESTS_PER_SECOND") {
            self.rate_limiter.requests_per_second =
                parse_number("RATE_LIMITER_REQUESTS_PER_SECOND", &val)?;
        }
        if let Some(val) = get("RATE_LIMITER_CHECK_EVERY_N_SECONDS") {
            self.rate_limiter.check_every_secs =
                parse_number("RATE_LIMITER_CHECK_EVERY_N_SECONDS", &val)?;
        }
        if let Some(val) = get("RATE_LIMITER_MAX_BUCKET_SIZE") {
            self.rate_limiter.max_bucket_size = parse_number("RATE_LIMITER_MAX_BUCKET_SIZE", &val)?;
        }

        // Image generation
        if let Some(val) = get("WEBUI_SD_API_URL") {
            self.image.sdapi_url = Some(val);
        }
        if let Some(val) = get("WEBUI_SD_API_PARAMS") {
            match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(&val) {
                Ok(params) => self.image.params = params,
                Err(e) => warn!(
                    error = %e,
                    "Could not load WEBUI_SD_API_PARAMS. Defaults for SDXL Turbo model will be used."
                ),
            }
        }
        if let Some(val) = get("WEBUI_SD_API_NEGATIVE_PROMPT") {
            self.image.negative_prompt = Some(val);
        }

        // Fetch
        if let Some(val) = get("WEB_CONTENT_REQUEST_TIMEOUT_SECONDS") {
            self.fetch.request_timeout_secs =
                parse_number("WEB_CONTENT_REQUEST_TIMEOUT_SECONDS", &val)?;
        }

        // MCP
        if let Some(val) = get("MCP_SERVERS_CONFIG") {
            self.mcp.servers = serde_json::from_str(&val).map_err(|e| {
                RelayError::Config(format!("MCP_SERVERS_CONFIG contains invalid JSON: {}", e))
            })?;
        }

        // Logging
        if let Some(val) = get("LOG_LEVEL") {
            self.logging.level = val.to_ascii_lowercase();
        }
        if let Some(val) = get("LOG_FORMAT") {
            self.logging.format = val.parse().map_err(RelayError::Config)?;
        }

        Ok(())
    }
}

/// `true`, `1` and `t` (any case) are true; everything else is false.
pub fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "t")
}

/// Comma separated list with blanks dropped.
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| RelayError::Config(format!("Environment variable {} must be a number", name)))
}
