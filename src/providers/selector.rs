//! Backend selection: first configured backend wins.

use tracing::info;

use crate::config::Config;
use crate::error::{RelayError, Result};

use super::{
    GeminiProvider, LLMProvider, OllamaProvider, OpenAIProvider, RateLimitedProvider, TokenBucket,
};

/// The backend variant a configuration resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Ollama,
    Gemini,
    OpenAI,
}

impl BackendKind {
    /// Resolve the variant in priority order: Ollama model, Google key,
    /// then OpenAI key or base URL.
    pub fn resolve(config: &Config) -> Option<Self> {
        let backends = &config.backends;
        if backends.ollama_model.is_some() {
            Some(BackendKind::Ollama)
        } else if backends.google_api_key.is_some() {
            Some(BackendKind::Gemini)
        } else if backends.openai_api_key.is_some() || backends.openai_api_base_url.is_some() {
            Some(BackendKind::OpenAI)
        } else {
            None
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Ollama => write!(f, "ollama"),
            BackendKind::Gemini => write!(f, "gemini"),
            BackendKind::OpenAI => write!(f, "openai"),
        }
    }
}

/// Construct the single model backend, wrapped in the rate limiter.
///
/// # Errors
/// `RelayError::Config("No LLM backend data found")` when nothing is configured.
pub fn select_backend(config: &Config) -> Result<Box<dyn LLMProvider>> {
    let backends = &config.backends;
    let kind = BackendKind::resolve(config)
        .ok_or_else(|| RelayError::Config("No LLM backend data found".to_string()))?;

    let inner: Box<dyn LLMProvider> = match kind {
        BackendKind::Ollama => Box::new(OllamaProvider::new(
            backends.ollama_model.as_deref().unwrap_or_default(),
            &backends.ollama_base_url,
        )),
        BackendKind::Gemini => Box::new(GeminiProvider::new(
            backends.google_api_key.as_deref().unwrap_or_default(),
            &backends.google_api_model,
        )),
        BackendKind::OpenAI => Box::new(OpenAIProvider::new(
            backends.openai_api_key.as_deref().unwrap_or_default(),
            backends.openai_api_base_url.as_deref(),
            backends.openai_api_model.as_deref(),
        )),
    };

    info!(backend = %kind, model = inner.default_model(), "Model backend selected");
    Ok(Box::new(RateLimitedProvider::new(
        inner,
        TokenBucket::from_config(&config.rate_limiter),
    )))
}
