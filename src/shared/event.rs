//! Real-time Event System
//!
//! Application events delivered over the push channel. The transport hands
//! us `(channel, event name, JSON data)`; [`PushEvent::decode`] turns that
//! into a typed event.
//!
//! # Channels
//!
//! - `private-conversation.{id}` - message events of one conversation
//! - `presence-users` - online/offline/typing events of all users
//!
//! # Usage
//!
//! ```rust
//! use daydeskr::shared::event::{conversation_channel, PushEvent};
//!
//! let data = serde_json::json!({ "user_id": 4 });
//! let event = PushEvent::decode("user-online", data).unwrap();
//! assert_eq!(event, PushEvent::UserOnline { user_id: 4 });
//! assert_eq!(conversation_channel(7), "private-conversation.7");
//! ```

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::shared::error::SharedError;
use crate::shared::messaging::{
    Conversation, ConversationId, Message, MessageId, PresencePatch, Reaction, UserId,
};

/// Name of the shared presence channel
pub const PRESENCE_CHANNEL: &str = "presence-users";

const CONVERSATION_CHANNEL_PREFIX: &str = "private-conversation.";

/// Channel carrying the message events of `conversation_id`
pub fn conversation_channel(conversation_id: ConversationId) -> String {
    format!("{}{}", CONVERSATION_CHANNEL_PREFIX, conversation_id)
}

/// Inverse of [`conversation_channel`]
pub fn conversation_id_from_channel(channel: &str) -> Option<ConversationId> {
    channel
        .strip_prefix(CONVERSATION_CHANNEL_PREFIX)
        .and_then(|id| id.parse().ok())
}

/// Event names as they appear on the wire
pub mod names {
    pub const MESSAGE_SENT: &str = "message.sent";
    pub const MESSAGE_READ: &str = "message.read";
    pub const MESSAGE_DELIVERED: &str = "message.delivered";
    pub const CONVERSATION_CREATED: &str = "conversation.created";
    pub const REACTION_ADDED: &str = "reaction.added";
    pub const REACTION_REMOVED: &str = "reaction.removed";
    pub const USER_ONLINE: &str = "user-online";
    pub const USER_OFFLINE: &str = "user-offline";
    pub const USER_TYPING: &str = "user-typing";
    pub const PRESENCE_UPDATE: &str = "presence-update";
}

#[derive(Debug, Deserialize)]
struct MessageSentPayload {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct MessageReadPayload {
    message_id: MessageId,
    #[serde(default)]
    read_by: Option<UserId>,
    read_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct MessageDeliveredPayload {
    message_id: MessageId,
    delivered_to: UserId,
    delivered_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ConversationCreatedPayload {
    conversation: Conversation,
}

#[derive(Debug, Deserialize)]
struct ReactionAddedPayload {
    message_id: MessageId,
    reaction: Reaction,
}

#[derive(Debug, Deserialize)]
struct ReactionRemovedPayload {
    message_id: MessageId,
    user_id: UserId,
    emoji: String,
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    user_id: UserId,
}

#[derive(Debug, Deserialize)]
struct TypingPayload {
    user_id: UserId,
    is_typing: bool,
    #[serde(default)]
    conversation_id: Option<ConversationId>,
}

#[derive(Debug, Deserialize)]
struct PresenceUpdatePayload {
    user_id: UserId,
    #[serde(default)]
    presence: PresencePatch,
}

/// Application event received from the push channel
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    MessageSent {
        message: Box<Message>,
    },
    MessageRead {
        message_id: MessageId,
        read_by: Option<UserId>,
        read_at: DateTime<Utc>,
    },
    MessageDelivered {
        message_id: MessageId,
        delivered_to: UserId,
        delivered_at: DateTime<Utc>,
    },
    ConversationCreated {
        conversation: Box<Conversation>,
    },
    ReactionAdded {
        message_id: MessageId,
        reaction: Reaction,
    },
    ReactionRemoved {
        message_id: MessageId,
        user_id: UserId,
        emoji: String,
    },
    UserOnline {
        user_id: UserId,
    },
    UserOffline {
        user_id: UserId,
    },
    UserTyping {
        user_id: UserId,
        is_typing: bool,
        conversation_id: Option<ConversationId>,
    },
    PresenceUpdate {
        user_id: UserId,
        presence: PresencePatch,
    },
    /// Event name we do not handle; kept for logging
    Unknown {
        name: String,
    },
}

fn payload<T: serde::de::DeserializeOwned>(name: &str, data: serde_json::Value) -> Result<T, SharedError> {
    serde_json::from_value(data).map_err(|e| SharedError::malformed(name, &e))
}

impl PushEvent {
    /// Decode an application event from its wire name and JSON data
    pub fn decode(name: &str, data: serde_json::Value) -> Result<Self, SharedError> {
        let event = match name {
            names::MESSAGE_SENT => {
                let p: MessageSentPayload = payload(name, data)?;
                PushEvent::MessageSent {
                    message: Box::new(p.message),
                }
            }
            names::MESSAGE_READ => {
                let p: MessageReadPayload = payload(name, data)?;
                PushEvent::MessageRead {
                    message_id: p.message_id,
                    read_by: p.read_by,
                    read_at: p.read_at,
                }
            }
            names::MESSAGE_DELIVERED => {
                let p: MessageDeliveredPayload = payload(name, data)?;
                PushEvent::MessageDelivered {
                    message_id: p.message_id,
                    delivered_to: p.delivered_to,
                    delivered_at: p.delivered_at,
                }
            }
            names::CONVERSATION_CREATED => {
                let p: ConversationCreatedPayload = payload(name, data)?;
                PushEvent::ConversationCreated {
                    conversation: Box::new(p.conversation),
                }
            }
            names::REACTION_ADDED => {
                let p: ReactionAddedPayload = payload(name, data)?;
                PushEvent::ReactionAdded {
                    message_id: p.message_id,
                    reaction: p.reaction,
                }
            }
            names::REACTION_REMOVED => {
                let p: ReactionRemovedPayload = payload(name, data)?;
                PushEvent::ReactionRemoved {
                    message_id: p.message_id,
                    user_id: p.user_id,
                    emoji: p.emoji,
                }
            }
            names::USER_ONLINE => {
                let p: UserPayload = payload(name, data)?;
                PushEvent::UserOnline { user_id: p.user_id }
            }
            names::USER_OFFLINE => {
                let p: UserPayload = payload(name, data)?;
                PushEvent::UserOffline { user_id: p.user_id }
            }
            names::USER_TYPING => {
                let p: TypingPayload = payload(name, data)?;
                PushEvent::UserTyping {
                    user_id: p.user_id,
                    is_typing: p.is_typing,
                    conversation_id: p.conversation_id,
                }
            }
            names::PRESENCE_UPDATE => {
                let p: PresenceUpdatePayload = payload(name, data)?;
                PushEvent::PresenceUpdate {
                    user_id: p.user_id,
                    presence: p.presence,
                }
            }
            other => PushEvent::Unknown {
                name: other.to_string(),
            },
        };
        Ok(event)
    }

    /// Wire name of this event
    pub fn name(&self) -> &str {
        match self {
            PushEvent::MessageSent { .. } => names::MESSAGE_SENT,
            PushEvent::MessageRead { .. } => names::MESSAGE_READ,
            PushEvent::MessageDelivered { .. } => names::MESSAGE_DELIVERED,
            PushEvent::ConversationCreated { .. } => names::CONVERSATION_CREATED,
            PushEvent::ReactionAdded { .. } => names::REACTION_ADDED,
            PushEvent::ReactionRemoved { .. } => names::REACTION_REMOVED,
            PushEvent::UserOnline { .. } => names::USER_ONLINE,
            PushEvent::UserOffline { .. } => names::USER_OFFLINE,
            PushEvent::UserTyping { .. } => names::USER_TYPING,
            PushEvent::PresenceUpdate { .. } => names::PRESENCE_UPDATE,
            PushEvent::Unknown { name } => name.as_str(),
        }
    }

    /// Whether the presence tracker consumes this event
    pub fn is_presence(&self) -> bool {
        matches!(
            self,
            PushEvent::UserOnline { .. }
                | PushEvent::UserOffline { .. }
                | PushEvent::UserTyping { .. }
                | PushEvent::PresenceUpdate { .. }
        )
    }
}
