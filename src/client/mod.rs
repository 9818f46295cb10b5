//! Messaging Client Module
//!
//! Client side of DayDeskr messaging: REST access to the backend, the
//! push channel, the local message store and the features built on top.
//!
//! # Architecture
//!
//! - **`api`** - REST client and the `MessagingApi` seam
//! - **`channel`** - Pusher-protocol push channel client
//! - **`store`** - Conversations, messages and unread counts
//! - **`sync`** - Keeps the store in step with REST and push events
//! - **`presence`** - Online status and typing indicators
//! - **`reactions`** - Emoji reactions with optimistic toggles
//! - **`replies`** - Reply context and reply chains
//! - **`search`** - Message search, history and highlighting
//! - **`context`** - Wires one session together, plus notifications
//! - **`main`** - `daydeskr-tail` binary
//!
//! # Module Structure
//!
//! ```text
//! client/
//! ├── mod.rs       - Module exports and documentation
//! ├── main.rs      - daydeskr-tail entry point
//! ├── config.rs    - Client configuration and credentials
//! ├── error.rs     - Client error type
//! ├── api.rs       - REST client
//! ├── channel.rs   - Push channel
//! ├── store.rs     - Message store
//! ├── sync.rs      - Conversation synchronizer
//! ├── presence.rs  - Presence and typing
//! ├── reactions.rs - Reactions
//! ├── replies.rs   - Replies
//! ├── search.rs    - Search
//! └── context.rs   - Session wiring and notifications
//! ```

pub mod api;
pub mod channel;
pub mod config;
pub mod context;
pub mod error;
pub mod presence;
pub mod reactions;
pub mod replies;
pub mod search;
pub mod store;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ApiClient, MessagingApi};
pub use channel::{ChannelClient, ChannelEvent, ConnectionState, PusherTransport};
pub use config::Config;
pub use context::{MessagingContext, NotificationState, Notifications};
pub use error::ClientError;
pub use presence::PresenceTracker;
pub use reactions::ReactionTracker;
pub use replies::Replies;
pub use search::MessageSearch;
pub use store::{MessageStore, SharedStore, StoreEvent};
pub use sync::{LoadOutcome, Synchronizer};
