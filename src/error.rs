//! Error types for stream normalization.
//!
//! Most failures inside this layer are recovered locally (a malformed frame
//! is skipped, a malformed tool argument degrades to `{}`). What remains is
//! either a hard failure of the caller's input ([`StreamError`]) or a
//! request-level failure reported next to the partial output as an
//! [`ErrorInfo`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stream normalization error type.
#[derive(Error, Debug)]
pub enum StreamError {
    /// A payload could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The server-sent event framing was invalid.
    #[error("SSE error: {0}")]
    Sse(String),

    /// The underlying transport failed or the provider reported an error.
    #[error("Transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// HTTP-like status code, when one is known.
        status: Option<u16>,
    },

    /// The stream closed before the family's terminal event.
    #[error("Stream ended before the response completed")]
    Incomplete,

    /// The requested provider family is not known.
    #[error("Unsupported model family: {0}")]
    UnsupportedFamily(String),

    /// Reading a capture from disk failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;

/// Structured failure surfaced alongside partially assembled content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Human-readable failure reason.
    pub message: String,
    /// Status code reported by the provider or transport.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Diagnostic trace, when one is available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorInfo {
    /// Create an error with only a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            stack: None,
        }
    }

    /// Attach a status code.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// The failure reported when a stream closes before its terminal event.
    #[must_use]
    pub fn incomplete_stream() -> Self {
        Self::new(StreamError::Incomplete.to_string())
    }
}

impl From<&StreamError> for ErrorInfo {
    fn from(err: &StreamError) -> Self {
        let status = match err {
            StreamError::Transport { status, .. } => *status,
            _ => None,
        };
        Self {
            message: err.to_string(),
            status,
            stack: Some(format!("{err:?}")),
        }
    }
}
