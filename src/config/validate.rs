//! Configuration validation.
//!
//! Two passes: unknown-field detection on the raw JSON file (with "did you
//! mean" suggestions) and semantic checks on the merged [`Config`].

use serde_json::Value;
use std::collections::HashSet;

use super::{Config, McpTransport};
use crate::error::{RelayError, Result};

/// Known top-level config field names.
const KNOWN_TOP_LEVEL: &[&str] = &[
    "backends",
    "bot",
    "dispatch",
    "rate_limiter",
    "image",
    "fetch",
    "mcp",
    "logging",
];

/// A validation diagnostic.
#[derive(Debug)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub path: String,
    pub message: String,
}

#[derive(Debug, PartialEq)]
pub enum DiagnosticLevel {
    Warn,
    Error,
}

impl Diagnostic {
    fn error(path: &str, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Error,
            path: path.to_string(),
            message: message.into(),
        }
    }

    fn warn(path: &str, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Warn,
            path: path.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.level {
            DiagnosticLevel::Warn => "[WARN]",
            DiagnosticLevel::Error => "[ERROR]",
        };
        if self.path.is_empty() {
            write!(f, "{} {}", prefix, self.message)
        } else {
            write!(f, "{} {}: {}", prefix, self.path, self.message)
        }
    }
}

/// Simple Levenshtein distance for "did you mean?" suggestions.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.iter().enumerate() {
        let mut row = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            row[j + 1] = (prev[j + 1] + 1).min(row[j] + 1).min(prev[j] + cost);
        }
        prev = row;
    }
    prev[b.len()]
}

/// Suggest the closest known field name (if distance <= 3).
pub fn suggest_field(unknown: &str, known: &[&str]) -> Option<String> {
    known
        .iter()
        .map(|k| (k, levenshtein(unknown, k)))
        .filter(|(_, d)| *d <= 3)
        .min_by_key(|(_, d)| *d)
        .map(|(k, _)| format!("did you mean '{}'?", k))
}

/// Report top-level keys of a raw config file that no section consumes.
pub fn unknown_fields(raw: &Value) -> Vec<Diagnostic> {
    let Some(obj) = raw.as_object() else {
        return vec![Diagnostic::error("", "Config must be a JSON object")];
    };

    let known: HashSet<&str> = KNOWN_TOP_LEVEL.iter().copied().collect();
    obj.keys()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| {
            let message = match suggest_field(key, KNOWN_TOP_LEVEL) {
                Some(suggestion) => format!("Unknown field '{}', {}", key, suggestion),
                None => format!("Unknown field '{}'", key),
            };
            Diagnostic::warn(key, message)
        })
        .collect()
}

/// Semantic checks on a fully merged configuration.
pub fn validate(config: &Config) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    for (path, value, env) in [
        ("bot.name", &config.bot.name, "TELEGRAM_BOT_NAME"),
        ("bot.username", &config.bot.username, "TELEGRAM_BOT_USERNAME"),
        ("bot.token", &config.bot.token, "TELEGRAM_BOT_TOKEN"),
    ] {
        if value.trim().is_empty() {
            diagnostics.push(Diagnostic::error(
                path,
                format!("Environment variable {} is required", env),
            ));
        }
    }

    if !config.backends.any_configured() {
        diagnostics.push(Diagnostic::error(
            "backends",
            "No LLM backend data found (set OLLAMA_MODEL, GOOGLE_API_KEY, OPENAI_API_KEY or OPENAI_API_BASE_URL)",
        ));
    }

    if config.dispatch.context_max_tokens == 0 {
        diagnostics.push(Diagnostic::error(
            "dispatch.context_max_tokens",
            "Token budget must be greater than zero",
        ));
    }

    let limiter = &config.rate_limiter;
    if limiter.requests_per_second <= 0.0 || limiter.check_every_secs <= 0.0 {
        diagnostics.push(Diagnostic::error(
            "rate_limiter",
            "Rate and check interval must be positive",
        ));
    }
    if limiter.max_bucket_size < 1.0 {
        diagnostics.push(Diagnostic::error(
            "rate_limiter.max_bucket_size",
            "Bucket must hold at least one request",
        ));
    }

    if config.image.sdapi_url.is_none() {
        diagnostics.push(Diagnostic::warn(
            "image.sdapi_url",
            "WEBUI_SD_API_URL not set. Image generation disabled.",
        ));
    }

    if config.bot.allowed_chat_ids.is_empty() {
        diagnostics.push(Diagnostic::warn(
            "bot.allowed_chat_ids",
            "Empty, any chat can talk to the bot",
        ));
    }

    let mut names: Vec<&String> = config.mcp.servers.keys().collect();
    names.sort();
    for name in names {
        let server = &config.mcp.servers[name];
        let path = format!("mcp.servers.{}", name);
        match server.transport {
            McpTransport::Stdio if server.command.is_none() => diagnostics.push(
                Diagnostic::error(&path, format!("Server '{}' missing 'command' for stdio transport", name)),
            ),
            McpTransport::StreamableHttp if server.url.is_none() => {
                diagnostics.push(Diagnostic::error(
                    &path,
                    format!("Server '{}' missing 'url' for streamable_http transport", name),
                ))
            }
            _ => {}
        }
    }

    diagnostics
}

/// Fail with every error-level diagnostic joined into one message.
pub fn ensure_valid(config: &Config) -> Result<()> {
    let errors: Vec<String> = validate(config)
        .into_iter()
        .filter(|d| d.level == DiagnosticLevel::Error)
        .map(|d| d.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(RelayError::Config(errors.join("; ")))
    }
}
