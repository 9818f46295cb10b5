//! Client Error Types
//!
//! Every fallible operation of the messaging client returns
//! `Result<T, ClientError>`. Store mutations never fail; only network,
//! transport and configuration boundaries produce errors.

use thiserror::Error;

use crate::shared::config::ConfigError;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Request never produced an HTTP response
    #[error("Network error: {message}")]
    Network { message: String },

    /// Backend rejected the bearer credential (HTTP 401)
    #[error("Session expired or unauthorized")]
    Unauthorized,

    /// Backend answered with a non-success status
    #[error("Request failed with status {status}: {message}")]
    Http { status: u16, message: String },

    /// Backend answered 2xx with `success: false`
    #[error("Request rejected: {message}")]
    Rejected { message: String },

    /// Response body did not match the expected shape
    #[error("Failed to parse response: {message}")]
    Decode { message: String },

    /// Push connection failure
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Local input rejected before any request was made
    #[error("Validation error in field '{field}': {message}")]
    Validation { field: String, message: String },

    /// No bearer credential is available
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Local file persistence failure
    #[error("Storage error: {message}")]
    Storage { message: String },
}

impl ClientError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Map an HTTP status and body to an error, with friendlier text for
    /// the statuses the backend commonly returns.
    pub fn from_status(status: u16, body: &str) -> Self {
        if status == 401 {
            return Self::Unauthorized;
        }
        let message = match status {
            403 => "You do not have access to this resource".to_string(),
            404 => "Resource not found".to_string(),
            422 => format!("Invalid request: {}", body),
            429 => "Too many requests, try again later".to_string(),
            _ if body.is_empty() => format!("HTTP {}", status),
            _ => body.to_string(),
        };
        Self::Http { status, message }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Http { status: 404, .. })
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::decode(err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status(status.as_u16(), "")
        } else {
            Self::network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::decode(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::transport(err.to_string())
    }
}
