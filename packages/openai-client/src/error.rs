//! Error types for OpenAI client.
//!
//! Errors are classified at the HTTP boundary so callers can decide
//! whether a request is worth repeating without inspecting message text.

use thiserror::Error;

/// Result type for OpenAI client operations.
pub type Result<T> = std::result::Result<T, OpenAIError>;

/// OpenAI client errors.
#[derive(Debug, Error)]
pub enum OpenAIError {
    /// Configuration error (missing API key, invalid settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection failed before a response arrived
    #[error("Network error: {0}")]
    Network(String),

    /// Request timed out
    #[error("Request timed out")]
    Timeout,

    /// 429 from the API
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// 5xx / 529 from the API
    #[error("Provider overloaded (HTTP {status}): {message}")]
    Overloaded { status: u16, message: String },

    /// Any other non-2xx response (bad request, auth, content policy)
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Parse error (invalid JSON, unexpected response format)
    #[error("Parse error: {0}")]
    Parse(String),
}

impl OpenAIError {
    /// Build an error from a non-success HTTP status and body.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            429 => OpenAIError::RateLimited(body),
            500..=599 => OpenAIError::Overloaded {
                status,
                message: body,
            },
            _ => OpenAIError::Api {
                status,
                message: body,
            },
        }
    }

    /// Returns true if repeating the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            OpenAIError::Network(_)
                | OpenAIError::Timeout
                | OpenAIError::RateLimited(_)
                | OpenAIError::Overloaded { .. }
        )
    }
}

impl From<reqwest::Error> for OpenAIError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            OpenAIError::Timeout
        } else if err.is_decode() {
            OpenAIError::Parse(err.to_string())
        } else {
            OpenAIError::Network(err.to_string())
        }
    }
}
