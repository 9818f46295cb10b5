//! Chat Message Data Structure
//!
//! Represents a message in a conversation, as served by the REST backend
//! and broadcast over the push channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::reaction::Reaction;
use super::{ConversationId, MessageId, UserId};

/// Type of message content
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Plain text message
    #[default]
    Text,
    /// Image message (content or attachment references the image)
    Image,
    /// File attachment
    File,
    /// System message (e.g., "User joined")
    System,
}

impl MessageType {
    /// Wire name, as used in query strings
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::File => "file",
            MessageType::System => "system",
        }
    }
}

/// Minimal sender profile embedded in messages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageSender {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// File attached to a message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageAttachment {
    pub id: i64,
    pub message_id: MessageId,
    pub file_name: String,
    pub file_path: String,
    pub file_size: u64,
    pub file_type: String,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
}

/// Attachment reference sent along with a new message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachmentUpload {
    pub file_name: String,
    pub file_path: String,
    pub mime_type: String,
    pub file_size: u64,
}

/// Delivery / read status of a receipt
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    Delivered,
    Read,
}

/// Per-recipient delivery receipt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadReceipt {
    #[serde(default)]
    pub id: Option<i64>,
    pub message_id: MessageId,
    pub user_id: UserId,
    pub status: ReceiptStatus,
    #[serde(default)]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
}

/// Represents a chat message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Backend-assigned message ID
    pub id: MessageId,
    /// Conversation this message belongs to
    pub conversation_id: ConversationId,
    /// User who sent the message
    pub sender_id: UserId,
    /// Message content (text, or a reference to an attachment)
    pub content: String,
    /// Type of message
    #[serde(rename = "type", default)]
    pub message_type: MessageType,
    /// Opaque per-type metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// When the current user read the message
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_edited: bool,
    #[serde(default)]
    pub edited_at: Option<DateTime<Utc>>,
    /// Message this one replies to
    #[serde(default)]
    pub reply_to_id: Option<MessageId>,
    #[serde(default)]
    pub is_encrypted: bool,
    #[serde(default)]
    pub encryption_key_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sender: Option<MessageSender>,
    #[serde(default)]
    pub attachments: Vec<MessageAttachment>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    #[serde(default)]
    pub read_receipts: Vec<ReadReceipt>,
}

impl Message {
    /// Create a new text message (used by fixtures and local system notices)
    pub fn new_text(
        id: MessageId,
        conversation_id: ConversationId,
        sender_id: UserId,
        content: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            conversation_id,
            sender_id,
            content: content.into(),
            message_type: MessageType::Text,
            metadata: None,
            read_at: None,
            is_edited: false,
            edited_at: None,
            reply_to_id: None,
            is_encrypted: false,
            encryption_key_id: None,
            created_at,
            updated_at: None,
            sender: None,
            attachments: Vec::new(),
            reactions: Vec::new(),
            read_receipts: Vec::new(),
        }
    }

    /// Whether this message counts towards `user_id`'s unread total
    pub fn is_unread_for(&self, user_id: UserId) -> bool {
        self.read_at.is_none() && self.sender_id != user_id
    }

    pub fn is_reply(&self) -> bool {
        self.reply_to_id.is_some()
    }

    /// Display name of the sender, if the backend embedded one
    pub fn sender_name(&self) -> &str {
        self.sender
            .as_ref()
            .map(|s| s.name.as_str())
            .unwrap_or("Unknown User")
    }

    /// Get a preview of the message (first N characters)
    pub fn preview(&self, max_len: usize) -> String {
        if self.content.chars().count() <= max_len {
            self.content.clone()
        } else {
            let mut preview: String = self.content.chars().take(max_len.saturating_sub(3)).collect();
            preview.push_str("...");
            preview
        }
    }

    /// Record a delivery receipt for `user_id`; content is never touched.
    pub fn record_delivery(&mut self, user_id: UserId, delivered_at: DateTime<Utc>) {
        match self.read_receipts.iter_mut().find(|r| r.user_id == user_id) {
            Some(receipt) => {
                receipt.delivered_at = Some(delivered_at);
            }
            None => self.read_receipts.push(ReadReceipt {
                id: None,
                message_id: self.id,
                user_id,
                status: ReceiptStatus::Delivered,
                delivered_at: Some(delivered_at),
                read_at: None,
            }),
        }
    }
}

/// Request to send a message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub conversation_id: ConversationId,
    pub content: String,
    #[serde(rename = "type", default)]
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<AttachmentUpload>,
}

/// Pagination metadata of a message page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageMeta {
    pub current_page: u32,
    pub last_page: u32,
    pub total: u64,
}

/// One page of `GET /api/conversations/{id}/messages`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePage {
    pub data: Vec<Message>,
    pub meta: PageMeta,
}

impl MessagePage {
    pub fn has_more(&self) -> bool {
        self.meta.current_page < self.meta.last_page
    }
}

/// Request body for `POST /api/messages/mark-multiple-read`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkMultipleReadRequest {
    pub message_ids: Vec<MessageId>,
}

/// Acknowledgement of `PATCH /api/messages/{id}/read`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadAck {
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
}

/// Aggregated delivery status of one message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryStatus {
    pub message_id: MessageId,
    pub delivered_count: u32,
    pub read_count: u32,
    pub total_recipients: u32,
    #[serde(default)]
    pub receipts: Vec<ReadReceipt>,
}
