//! `chatrelay check`: validate configuration without starting anything.

use anyhow::{bail, Result};

use chatrelay::config::validate::{self, DiagnosticLevel};
use chatrelay::config::Config;
use chatrelay::providers::BackendKind;

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

/// Summary lines describing what `run` would start.
pub(crate) fn describe(config: &Config) -> Vec<String> {
    let backend = BackendKind::resolve(config)
        .map(|kind| kind.to_string())
        .unwrap_or_else(|| "none".to_string());
    let mcp = config.mcp.servers.len();
    vec![
        format!("Bot:              {} (@{})", config.bot.name, config.bot.username),
        format!("Backend:          {}", backend),
        format!("Token budget:     {}", config.dispatch.context_max_tokens),
        format!("Language:         {}", config.bot.preferred_language),
        format!(
            "Fallback:         {}",
            format!("{:?}", config.dispatch.fallback).to_lowercase()
        ),
        format!("Tools:            {}", on_off(config.dispatch.use_tools)),
        format!("MCP servers:      {}", mcp),
        format!("Image generation: {}", on_off(config.image.sdapi_url.is_some())),
        format!("Multimodal:       {}", on_off(config.bot.multimodal)),
        format!("Group assistant:  {}", on_off(config.bot.group_assistant)),
        format!("Prompt guardian:  {}", on_off(config.dispatch.prompt_guardian)),
        format!("Allowed chats:    {}", config.bot.allowed_chat_ids.len()),
    ]
}

pub(crate) fn cmd_check(config: &Config) -> Result<()> {
    println!("Config file: {}", Config::path().display());
    println!();

    let diagnostics = validate::validate(config);
    for diagnostic in &diagnostics {
        println!("{}", diagnostic);
    }

    for line in describe(config) {
        println!("{}", line);
    }

    let errors = diagnostics
        .iter()
        .filter(|d| d.level == DiagnosticLevel::Error)
        .count();
    let warnings = diagnostics.len() - errors;
    println!();
    if errors > 0 {
        bail!("Found {} error(s), {} warning(s)", errors, warnings);
    }
    if warnings == 0 {
        println!("Configuration looks good!");
    } else {
        println!("Configuration usable with {} warning(s)", warnings);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_defaults() {
        let lines = describe(&Config::default());
        assert!(lines.iter().any(|l| l.starts_with("Backend:") && l.ends_with("none")));
        assert!(lines.iter().any(|l| l.starts_with("Tools:") && l.ends_with("off")));
    }

    #[test]
    fn test_describe_selected_backend() {
        let mut config = Config::default();
        config.backends.google_api_key = Some("key".into());
        let lines = describe(&config);
        assert!(lines.iter().any(|l| l.ends_with("gemini")));
    }

    #[test]
    fn test_check_fails_on_missing_bot_settings() {
        assert!(cmd_check(&Config::default()).is_err());
    }
}
