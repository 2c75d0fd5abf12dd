//! Providers module - model backends
//!
//! Exactly one backend is constructed at startup by [`select_backend`]
//! (Ollama, then Gemini, then OpenAI) and wrapped in a
//! [`RateLimitedProvider`]. Everything above this module talks to it
//! through the [`LLMProvider`] trait.
//!
//! # Example
//!
//! ```rust,ignore
//! use chatrelay::config::Config;
//! use chatrelay::providers::{select_backend, ChatOptions, LLMProvider};
//! use chatrelay::session::Turn;
//!
//! async fn example(config: &Config) {
//!     let provider = select_backend(config).unwrap();
//!     let response = provider
//!         .chat(vec![Turn::human("Hello!")], vec![], ChatOptions::new())
//!         .await
//!         .unwrap();
//!     println!("{}: {}", provider.name(), response.content);
//! }
//! ```

pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod rate_limit;
mod selector;
mod types;

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::{ProviderError, RelayError, Result};

pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAIProvider;
pub use rate_limit::{RateLimitedProvider, TokenBucket};
pub use selector::{select_backend, BackendKind};
pub use types::{estimate_tokens, ChatOptions, LLMProvider, LLMResponse, ToolDefinition, Usage};

/// Parse an HTTP status code and response body into a structured [`ProviderError`].
pub fn parse_provider_error(status: u16, body: &str) -> ProviderError {
    match status {
        401 | 403 => ProviderError::Auth(body.to_string()),
        404 => ProviderError::ModelNotFound(body.to_string()),
        429 => ProviderError::RateLimit(body.to_string()),
        400 => ProviderError::InvalidRequest(body.to_string()),
        408 => ProviderError::Timeout(body.to_string()),
        500..=599 => ProviderError::ServerError(body.to_string()),
        _ => ProviderError::Unknown(format!("HTTP {}: {}", status, body)),
    }
}

/// Send a JSON request and decode a JSON response.
///
/// Non-2xx statuses become [`RelayError::ProviderTyped`]; transport
/// timeouts become [`ProviderError::Timeout`].
pub(crate) async fn send_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
    provider: &str,
) -> Result<T> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            RelayError::from(ProviderError::Timeout(format!("{}: {}", provider, e)))
        } else {
            RelayError::Provider(format!("{} request failed: {}", provider, e))
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(provider, status = status.as_u16(), "Model backend returned an error");
        return Err(parse_provider_error(status.as_u16(), &body).into());
    }

    response
        .json::<T>()
        .await
        .map_err(|e| RelayError::Provider(format!("Failed to parse {} response: {}", provider, e)))
}
