//! Error types shared by the outbound clients and startup code.
//!
//! Every variant ends up as a chat message or a toast in the view-model;
//! nothing here is allowed to crash the page.

use thiserror::Error;

/// Transport-level failure: the request never produced an HTTP status.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HttpError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("HTTP error: {0}")]
    Other(String),
}

/// Failures talking to the agent backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    /// No stored session, or the backend answered 401.
    #[error("Session missing or expired")]
    Unauthenticated,

    #[error("Agent backend unreachable: {0}")]
    Network(#[from] HttpError),

    #[error("Agent backend returned {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Unexpected agent response: {0}")]
    Decode(String),
}

/// Failures reading or writing the task store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Task store requires a signed-in session")]
    Unauthenticated,

    #[error("Task store unreachable: {0}")]
    Network(#[from] HttpError),

    #[error("Task store rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} has an invalid value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must be set when TODO_CHAT_STORE=rest")]
    Missing(&'static str),
}

impl ConfigError {
    pub fn invalid(key: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Pull a human-readable reason out of an error body.
/// Bodies may be absent or non-JSON; fall back to the raw text.
pub(crate) fn error_detail(body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        for key in ["detail", "message", "error"] {
            if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
                return text.to_string();
            }
        }
    }
    let text = String::from_utf8_lossy(body).trim().to_string();
    if text.is_empty() {
        "no details".to_string()
    } else {
        text
    }
}
