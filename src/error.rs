//! Error types for ChatRelay
//!
//! This module defines all error types used throughout the relay.
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.

use std::fmt;
use thiserror::Error;

// ============================================================================
// Provider Error Classification
// ============================================================================

/// Structured classification of model backend failures.
///
/// Produced by [`crate::providers::parse_provider_error`] from an HTTP status
/// and response body so callers never need to match on message strings.
#[derive(Debug)]
pub enum ProviderError {
    /// 401/403 - Invalid API key or authentication failure
    Auth(String),
    /// 429 - Rate limit or quota exceeded
    RateLimit(String),
    /// 500/502/503/504 - Server-side errors
    ServerError(String),
    /// 400 - Bad request, invalid JSON, malformed parameters
    InvalidRequest(String),
    /// 404 - Model not found or endpoint not available
    ModelNotFound(String),
    /// Connection or read timeout
    Timeout(String),
    /// Catch-all for unrecognized errors
    Unknown(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Auth(msg) => write!(f, "Authentication error: {}", msg),
            ProviderError::RateLimit(msg) => write!(f, "Rate limit error: {}", msg),
            ProviderError::ServerError(msg) => write!(f, "Server error: {}", msg),
            ProviderError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ProviderError::ModelNotFound(msg) => write!(f, "Model not found: {}", msg),
            ProviderError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            ProviderError::Unknown(msg) => write!(f, "Unknown provider error: {}", msg),
        }
    }
}

impl ProviderError {
    /// Returns `true` if this error is transient.
    ///
    /// Retryable errors: RateLimit, ServerError, Timeout.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimit(_) | ProviderError::ServerError(_) | ProviderError::Timeout(_)
        )
    }

    /// Returns the HTTP status code associated with this error, if applicable.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProviderError::Auth(_) => Some(401),
            ProviderError::RateLimit(_) => Some(429),
            ProviderError::ServerError(_) => Some(500),
            ProviderError::InvalidRequest(_) => Some(400),
            ProviderError::ModelNotFound(_) => Some(404),
            ProviderError::Timeout(_) => None,
            ProviderError::Unknown(_) => None,
        }
    }
}

impl From<ProviderError> for RelayError {
    fn from(err: ProviderError) -> Self {
        RelayError::ProviderTyped(err)
    }
}

// ============================================================================
// Primary Error Type
// ============================================================================

/// The primary error type for ChatRelay operations.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Configuration-related errors (missing required fields, no backend, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Untyped model backend failures (bad payloads, unexpected shapes)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Classified model backend failure
    #[error("Provider error: {0}")]
    ProviderTyped(ProviderError),

    /// Chat platform errors (send failures, API lookups, etc.)
    #[error("Channel error: {0}")]
    Channel(String),

    /// Tool execution errors. Converted to text before reaching the model.
    #[error("Tool error: {0}")]
    Tool(String),

    /// The model requested a tool that is not registered
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// The model emitted a tool call whose arguments are not a JSON object
    #[error("Malformed tool call: {0}")]
    MalformedToolCall(String),

    /// Conversation store errors
    #[error("Session error: {0}")]
    Session(String),

    /// MCP server errors (spawn, handshake, JSON-RPC failures)
    #[error("MCP error: {0}")]
    Mcp(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Message bus channel closed unexpectedly
    #[error("Bus error: channel closed")]
    BusClosed,

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),
}

/// A specialized Result type for ChatRelay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
