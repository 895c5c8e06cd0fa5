//! Shared Error Types
//!
//! This module defines the single error type used across the client core and the
//! remote backend implementation.
//!
//! # Error Categories
//!
//! - `Auth` - Remote auth service rejections (bad credentials, duplicate sign-up,
//!   expired reset token). The message is the one the service reported.
//! - `Remote` - Row select/insert rejected by the data API
//! - `Network` - The backend could not be reached
//! - `Subscription` - Push feed could not be opened or was lost
//! - `Timeout` - A bounded operation ran out of time
//! - `NotAuthenticated` - The operation needs a session and none exists
//! - `Validation` - A required form field is missing
//! - `SerializationError` - JSON encoding/decoding failures
//! - `Io` - Local file access (the persisted session)
//! - `Config` - Invalid configuration
//!
//! # Usage
//!
//! ```rust
//! use talk::shared::error::TalkError;
//!
//! let error = TalkError::validation("name", "Room name is required");
//! assert!(error.to_string().contains("name"));
//! ```
use std::time::Duration;

use thiserror::Error;

use crate::shared::config::ConfigError;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, TalkError>;

/// Errors surfaced by the client core and the remote backend
#[derive(Debug, Error)]
pub enum TalkError {
    /// Remote auth error, displayed verbatim
    #[error("{message}")]
    Auth {
        /// Message reported by the auth service
        message: String,
    },

    /// Remote data error
    #[error("Remote error ({status}): {message}")]
    Remote {
        /// HTTP status returned by the data API
        status: u16,
        /// Message reported by the data API
        message: String,
    },

    /// Transport-level failure
    #[error("Network error: {message}")]
    Network {
        /// Human-readable error message
        message: String,
    },

    /// Push-feed subscription failure
    #[error("Subscription error: {message}")]
    Subscription {
        /// Human-readable error message
        message: String,
    },

    /// A bounded operation did not finish in time
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Operation that timed out
        operation: &'static str,
        /// The bound that was exceeded
        after: Duration,
    },

    /// No authenticated session
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Required field missing
    #[error("Validation error in field '{field}': {message}")]
    Validation {
        /// The field that failed validation
        field: String,
        /// Human-readable error message
        message: String,
    },

    /// JSON serialization or deserialization error
    #[error("Serialization error: {message}")]
    SerializationError {
        /// Human-readable error message
        message: String,
    },

    /// Local file access failure
    #[error("I/O error on {path}: {message}")]
    Io {
        /// File or directory involved
        path: String,
        /// Human-readable error message
        message: String,
    },

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl TalkError {
    /// Create a new auth error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a new remote data error
    pub fn remote(status: u16, message: impl Into<String>) -> Self {
        Self::Remote {
            status,
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a new subscription error
    pub fn subscription(message: impl Into<String>) -> Self {
        Self::Subscription {
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout(operation: &'static str, after: Duration) -> Self {
        Self::Timeout { operation, after }
    }

    /// Create a new validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Create a new I/O error for `path`
    pub fn io(path: &std::path::Path, err: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for TalkError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(format!("JSON error: {}", err))
    }
}

impl From<reqwest::Error> for TalkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::serialization(format!("Failed to parse response: {}", err))
        } else {
            Self::network(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TalkError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::subscription(err.to_string())
    }
}

/// Pull the human-readable message out of an error body returned by the backend.
///
/// The auth service answers with `msg`, `error_description` or `error`; the data API
/// with `message`. Falls back to the raw body, then to the status text.
pub fn remote_error_message(body: &str, status: reqwest::StatusCode) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["msg", "message", "error_description", "error"] {
            if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
                if !text.is_empty() {
                    return text.to_string();
                }
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        status.to_string()
    } else {
        trimmed.to_string()
    }
}
