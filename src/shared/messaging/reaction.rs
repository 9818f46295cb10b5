//! Message reactions
//!
//! A reaction is a `(message, user, emoji)` triple; the client mostly works
//! with per-emoji summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MessageId, UserId};

/// User reference embedded in reaction payloads
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRef {
    pub id: UserId,
    pub name: String,
}

/// A single reaction as stored by the backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reaction {
    pub id: i64,
    pub message_id: MessageId,
    pub user_id: UserId,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub user: Option<UserRef>,
}

/// Aggregated reactions for one emoji on one message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReactionSummary {
    pub emoji: String,
    pub count: u32,
    #[serde(default)]
    pub users: Vec<UserRef>,
    /// Whether the current user is among `users`
    #[serde(default)]
    pub user_reacted: bool,
}

impl ReactionSummary {
    pub fn new(emoji: impl Into<String>) -> Self {
        Self {
            emoji: emoji.into(),
            count: 0,
            users: Vec::new(),
            user_reacted: false,
        }
    }

    /// Add `user`; returns false if they already reacted with this emoji.
    pub fn add_user(&mut self, user: UserRef, is_current: bool) -> bool {
        if self.users.iter().any(|u| u.id == user.id) {
            return false;
        }
        self.users.push(user);
        self.count = self.users.len() as u32;
        if is_current {
            self.user_reacted = true;
        }
        true
    }

    /// Remove `user_id`; returns false if they had not reacted.
    pub fn remove_user(&mut self, user_id: UserId, is_current: bool) -> bool {
        let before = self.users.len();
        self.users.retain(|u| u.id != user_id);
        let removed = self.users.len() != before;
        self.count = self.users.len() as u32;
        if is_current {
            self.user_reacted = false;
        }
        removed
    }
}

/// Whether a toggle added or removed the reaction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToggleAction {
    Added,
    Removed,
}

/// Response of `PATCH /api/messages/{id}/reactions/toggle`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleReactionResponse {
    #[serde(default = "default_true")]
    pub success: bool,
    pub action: ToggleAction,
    #[serde(default)]
    pub reaction: Option<Reaction>,
}

/// Envelope of `GET /api/messages/{id}/reactions`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionListResponse {
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(default)]
    pub reactions: Vec<ReactionSummary>,
}

/// Body of reaction create/toggle requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionRequest {
    pub emoji: String,
}

fn default_true() -> bool {
    true
}
