use std::fmt;

use thiserror::Error;

/// Last failure observed before retries ran out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LastFailure {
    /// HTTP status of the last retryable response
    Status(u16),
    /// Transport-level error (connect, timeout, ...)
    Transport(String),
}

impl fmt::Display for LastFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LastFailure::Status(code) => write!(f, "HTTP status {}", code),
            LastFailure::Transport(message) => write!(f, "{}", message),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request cancelled")]
    Cancelled,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: LastFailure },

    #[error("Unexpected status: {0}")]
    Status(u16),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    #[error("Rate limiter wait cancelled")]
    Cancelled,
}
