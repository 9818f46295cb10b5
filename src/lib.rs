//! DayDeskr Messaging - Main Library
//!
//! DayDeskr messaging is the client-side core of the DayDeskr chat
//! feature: it talks to the REST backend, keeps a push channel open for
//! live events and maintains a local view of conversations that a host
//! application renders.
//!
//! # Overview
//!
//! This library provides:
//! - Conversation and message loading with pagination
//! - Real-time delivery over a Pusher-protocol WebSocket
//! - Unread counts, read and delivery receipts
//! - Presence and typing indicators
//! - Reactions, replies and workspace discussions
//! - Message search with history and highlighting
//!
//! # Module Structure
//!
//! - **`shared`** - Wire types, push events and configuration
//!   - Message, conversation, reaction, presence and search types
//!   - Push event decoding
//!   - `AppConfig` (TOML and builder)
//!
//! - **`client`** - Client components
//!   - REST client and push channel
//!   - Message store and synchronizer
//!   - Presence, reactions, replies, search and notifications
//!
//! # Usage
//!
//! ```rust,no_run
//! use daydeskr::client::{Config, MessagingContext};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let context = MessagingContext::init(Config::from_env()?);
//! context.start().await?;
//! context.sync().select_conversation(42).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! All components are `Send + Sync`. The store is shared as
//! `Arc<RwLock<MessageStore>>` and announces changes on a
//! `broadcast::Sender`.
//!
//! # Error Handling
//!
//! - `ClientError` for everything the client does
//! - `ConfigError` for configuration loading
//! - `SharedError` for wire payload decoding

/// Shared types and data structures
pub mod shared;

/// Messaging client
pub mod client;
