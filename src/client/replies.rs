//! Message replies
//!
//! Replies point at their parent through `reply_to_id`. Chains are walked
//! with a visited set, so a malformed cycle ends the walk instead of
//! looping, and new replies are refused once a chain reaches the
//! configured depth.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::client::error::ClientError;
use crate::client::sync::Synchronizer;
use crate::shared::messaging::{AttachmentUpload, ConversationId, Message, MessageId};

/// Default length of reply previews
pub const REPLY_PREVIEW_LEN: usize = 50;

/// The message currently being replied to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyContext {
    pub message_id: MessageId,
    pub content: String,
    pub sender_name: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&Message> for ReplyContext {
    fn from(message: &Message) -> Self {
        Self {
            message_id: message.id,
            content: message.content.clone(),
            sender_name: message.sender_name().to_string(),
            timestamp: message.created_at,
        }
    }
}

pub struct Replies {
    sync: Arc<Synchronizer>,
    replying_to: RwLock<Option<ReplyContext>>,
    depth_limit: usize,
}

impl Replies {
    pub fn new(sync: Arc<Synchronizer>, depth_limit: usize) -> Self {
        Self {
            sync,
            replying_to: RwLock::new(None),
            depth_limit,
        }
    }

    pub async fn set_reply_context(&self, message: &Message) {
        *self.replying_to.write().await = Some(ReplyContext::from(message));
    }

    pub async fn clear_reply_context(&self) {
        *self.replying_to.write().await = None;
    }

    pub async fn replying_to(&self) -> Option<ReplyContext> {
        self.replying_to.read().await.clone()
    }

    /// Send `content` as a reply to the current reply context, then clear
    /// the context.
    pub async fn send_reply(
        &self,
        conversation_id: ConversationId,
        content: impl Into<String>,
        attachments: Vec<AttachmentUpload>,
    ) -> Result<Message, ClientError> {
        let context = self
            .replying_to()
            .await
            .ok_or_else(|| ClientError::validation("reply_to_id", "no message to reply to"))?;

        let depth = {
            let store = self.sync.store().read().await;
            reply_depth(store.messages_for(conversation_id), context.message_id)
        };
        if depth >= self.depth_limit {
            return Err(ClientError::validation(
                "reply_to_id",
                format!("reply chain is limited to {} levels", self.depth_limit),
            ));
        }

        let message = self
            .sync
            .send_message(conversation_id, content, attachments, Some(context.message_id))
            .await?;
        self.clear_reply_context().await;
        Ok(message)
    }
}

/// Direct replies to `parent_id`, oldest first
pub fn replies_to(messages: &[Message], parent_id: MessageId) -> Vec<&Message> {
    let mut replies: Vec<&Message> = messages
        .iter()
        .filter(|m| m.reply_to_id == Some(parent_id))
        .collect();
    replies.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    replies
}

/// Message that `reply_id` answers, if it is loaded
pub fn parent_of(messages: &[Message], reply_id: MessageId) -> Option<&Message> {
    let parent_id = messages.iter().find(|m| m.id == reply_id)?.reply_to_id?;
    messages.iter().find(|m| m.id == parent_id)
}

pub fn has_replies(messages: &[Message], message_id: MessageId) -> bool {
    messages.iter().any(|m| m.reply_to_id == Some(message_id))
}

pub fn reply_count(messages: &[Message], message_id: MessageId) -> usize {
    messages
        .iter()
        .filter(|m| m.reply_to_id == Some(message_id))
        .count()
}

/// Parent followed by its direct replies; empty if the parent is not loaded
pub fn thread(messages: &[Message], parent_id: MessageId) -> Vec<&Message> {
    let Some(parent) = messages.iter().find(|m| m.id == parent_id) else {
        return Vec::new();
    };
    let mut thread = vec![parent];
    thread.extend(replies_to(messages, parent_id));
    thread
}

/// Ancestors of `message_id`, nearest parent first.
///
/// Stops at a missing parent or at the first id seen twice.
pub fn reply_chain(messages: &[Message], message_id: MessageId) -> Vec<&Message> {
    let mut chain = Vec::new();
    let mut seen = HashSet::from([message_id]);
    let mut current = messages.iter().find(|m| m.id == message_id);

    while let Some(parent_id) = current.and_then(|m| m.reply_to_id) {
        if !seen.insert(parent_id) {
            tracing::warn!("[REPLIES] Reply cycle through message {}", parent_id);
            break;
        }
        current = messages.iter().find(|m| m.id == parent_id);
        match current {
            Some(parent) => chain.push(parent),
            None => break,
        }
    }
    chain
}

/// Number of loaded ancestors above `message_id`
pub fn reply_depth(messages: &[Message], message_id: MessageId) -> usize {
    reply_chain(messages, message_id).len()
}

/// Truncate reply previews to `max_len` characters plus an ellipsis
pub fn format_reply_preview(content: &str, max_len: usize) -> String {
    if content.chars().count() <= max_len {
        return content.to_string();
    }
    let mut preview: String = content.chars().take(max_len).collect();
    preview.push_str("...");
    preview
}
