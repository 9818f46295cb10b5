//! Shared Module
//!
//! This module contains types and data structures that cross the wire
//! between the messaging core and its collaborators: REST payloads, push
//! events and configuration.
//!
//! # Overview
//!
//! Nothing in here performs I/O except configuration file loading. All
//! types are designed for serialization and transmission over HTTP or the
//! push channel.

/// Real-time push events
pub mod event;

/// Shared error types
pub mod error;

/// Application configuration
pub mod config;

/// Messaging types: conversations, messages, reactions, presence, search
pub mod messaging;

/// Re-export commonly used types for convenience
pub use config::{AppConfig, AppConfigBuilder, ConfigError};
pub use error::SharedError;
pub use event::PushEvent;
