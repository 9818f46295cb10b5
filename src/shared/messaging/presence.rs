//! User presence records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ConversationId, UserId};

/// Online status of a user
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Online,
    Away,
    #[default]
    Offline,
}

impl PresenceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PresenceStatus::Online => "online",
            PresenceStatus::Away => "away",
            PresenceStatus::Offline => "offline",
        }
    }
}

/// Transient presence state of one user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserPresence {
    pub user_id: UserId,
    #[serde(default)]
    pub status: PresenceStatus,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub is_typing: bool,
    #[serde(default)]
    pub typing_in_conversation: Option<ConversationId>,
}

impl UserPresence {
    /// Fresh record for a user we have not heard about yet
    pub fn offline(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            status: PresenceStatus::Offline,
            last_seen: now,
            is_typing: false,
            typing_in_conversation: None,
        }
    }

    /// Apply a partial update from a `presence-update` event
    pub fn apply(&mut self, patch: &PresencePatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(last_seen) = patch.last_seen {
            self.last_seen = last_seen;
        }
        if let Some(is_typing) = patch.is_typing {
            self.is_typing = is_typing;
            if !is_typing {
                self.typing_in_conversation = None;
            }
        }
        if patch.typing_in_conversation.is_some() {
            self.typing_in_conversation = patch.typing_in_conversation;
        }
    }
}

/// Partial presence record carried by `presence-update`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresencePatch {
    #[serde(default)]
    pub status: Option<PresenceStatus>,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_typing: Option<bool>,
    #[serde(default)]
    pub typing_in_conversation: Option<ConversationId>,
}

/// Envelope of `GET /api/user-presence`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceListResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub presence: Vec<UserPresence>,
}

/// Body of `POST /api/user-presence/typing`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypingRequest {
    pub conversation_id: ConversationId,
    pub is_typing: bool,
}

/// Body of `PATCH /api/user-presence`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceStatusRequest {
    pub status: PresenceStatus,
}
