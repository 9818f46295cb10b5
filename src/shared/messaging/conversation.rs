//! Conversation Data Structure
//!
//! Represents a conversation between two or more users, optionally linked
//! to a workspace listing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::message::Message;
use super::{ConversationId, MessageId, UserId, WorkspaceId};

/// Direct (two participants) or group conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    #[default]
    Direct,
    Group,
}

/// Workspace a conversation was started from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkspaceRef {
    pub id: WorkspaceId,
    pub name: String,
    #[serde(rename = "type")]
    pub workspace_type: String,
}

/// Represents a conversation between users
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    /// Server-assigned conversation ID
    pub id: ConversationId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: ConversationKind,
    /// Participant user IDs, in join order
    #[serde(default)]
    pub participants: Vec<UserId>,
    #[serde(default)]
    pub created_by: Option<UserId>,
    /// Creation time of the newest message seen
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub latest_message: Option<Box<Message>>,
    #[serde(default)]
    pub workspace_id: Option<WorkspaceId>,
    #[serde(default)]
    pub workspace: Option<WorkspaceRef>,
}

impl Conversation {
    /// Create a conversation record (fixtures and local construction)
    pub fn new(
        id: ConversationId,
        kind: ConversationKind,
        participants: Vec<UserId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let mut conversation = Self {
            id,
            title: None,
            kind,
            participants,
            created_by: None,
            last_message_at: None,
            created_at,
            updated_at: None,
            latest_message: None,
            workspace_id: None,
            workspace: None,
        };
        conversation.normalize_participants();
        conversation
    }

    /// Drop duplicate participant IDs, keeping first occurrence order
    pub fn normalize_participants(&mut self) {
        let mut seen = std::collections::HashSet::with_capacity(self.participants.len());
        self.participants.retain(|id| seen.insert(*id));
    }

    /// Check if user is a participant
    pub fn has_participant(&self, user_id: UserId) -> bool {
        self.participants.contains(&user_id)
    }

    /// Get the other participant (for direct messages)
    pub fn other_participant(&self, current_user_id: UserId) -> Option<UserId> {
        self.participants
            .iter()
            .find(|&&id| id != current_user_id)
            .copied()
    }

    /// Timestamp used for recency ordering in conversation lists
    pub fn activity_at(&self) -> DateTime<Utc> {
        self.last_message_at.unwrap_or(self.created_at)
    }

    /// Advance `last_message_at` / `latest_message` if `message` is newer.
    ///
    /// Returns true when the conversation changed. Older messages never
    /// move the timestamp backwards.
    pub fn observe_message(&mut self, message: &Message) -> bool {
        let newer = match self.last_message_at {
            Some(current) => message.created_at > current,
            None => true,
        };
        let same_latest = self
            .latest_message
            .as_ref()
            .map(|m| m.id == message.id)
            .unwrap_or(false);

        if newer {
            self.last_message_at = Some(message.created_at);
            self.latest_message = Some(Box::new(message.clone()));
            true
        } else if same_latest {
            // Edits of the newest message refresh the preview only.
            self.latest_message = Some(Box::new(message.clone()));
            true
        } else {
            false
        }
    }
}

/// Request to create a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateConversationRequest {
    pub participants: Vec<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub kind: ConversationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<WorkspaceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<WorkspaceRef>,
}

/// Read position of one participant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantReadState {
    pub user_id: UserId,
    #[serde(default)]
    pub last_read_message_id: Option<MessageId>,
    #[serde(default)]
    pub last_read_at: Option<DateTime<Utc>>,
}

/// Server-side read status of a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationReadStatus {
    pub conversation_id: ConversationId,
    pub unread_count: u32,
    #[serde(default)]
    pub last_read_message_id: Option<MessageId>,
    #[serde(default)]
    pub participants: Vec<ParticipantReadState>,
}
