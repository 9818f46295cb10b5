//! Shared Error Types
//!
//! Push payloads are decoded in `shared` so both the channel client and
//! tests see the same failure. The only thing that can go wrong there is a
//! payload whose shape does not match its event name.
use thiserror::Error;

/// Errors raised while decoding wire payloads
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SharedError {
    /// An event's `data` did not match the payload of its name
    #[error("Malformed '{event}' payload: {message}")]
    MalformedPayload {
        /// Wire name of the event
        event: String,
        /// Decoder message
        message: String,
    },
}

impl SharedError {
    pub fn malformed(event: impl Into<String>, err: &serde_json::Error) -> Self {
        Self::MalformedPayload {
            event: event.into(),
            message: err.to_string(),
        }
    }

    /// Wire name of the event that failed to decode
    pub fn event(&self) -> &str {
        match self {
            Self::MalformedPayload { event, .. } => event,
        }
    }
}
