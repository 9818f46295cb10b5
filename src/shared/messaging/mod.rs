//! Messaging Module
//!
//! This module contains all the data structures for the messaging system:
//!
//! - `Conversation` - A conversation between users
//! - `Message` - A message in a conversation
//! - `Reaction` / `ReactionSummary` - Emoji reactions on messages
//! - `UserPresence` - Ephemeral online/typing state
//! - `SearchFilters` / `SearchResponse` - Message search
//!
//! # Usage
//!
//! ```rust
//! use daydeskr::shared::messaging::{Conversation, Message, MessageType};
//! ```

pub mod conversation;
pub mod message;
pub mod presence;
pub mod reaction;
pub mod search;

/// Backend-assigned conversation identifier
pub type ConversationId = i64;
/// Backend-assigned message identifier
pub type MessageId = i64;
/// Backend-assigned user identifier
pub type UserId = i64;
/// Workspace listing identifier
pub type WorkspaceId = i64;

// Re-export all types
pub use conversation::{
    Conversation, ConversationKind, ConversationReadStatus, CreateConversationRequest,
    ParticipantReadState, WorkspaceRef,
};
pub use message::{
    AttachmentUpload, DeliveryStatus, MarkMultipleReadRequest, Message, MessageAttachment,
    MessagePage, MessageSender, MessageType, PageMeta, ReadAck, ReadReceipt, ReceiptStatus,
    SendMessageRequest,
};
pub use presence::{
    PresenceListResponse, PresencePatch, PresenceStatus, PresenceStatusRequest, TypingRequest,
    UserPresence,
};
pub use reaction::{
    Reaction, ReactionListResponse, ReactionRequest, ReactionSummary, ToggleAction,
    ToggleReactionResponse, UserRef,
};
pub use search::{SearchContext, SearchFilters, SearchParams, SearchResponse, SearchResult};
