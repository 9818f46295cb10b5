//! Message reactions
//!
//! Per-message emoji summaries. Toggles are applied optimistically and
//! rolled back if the request fails; a successful toggle is reconciled
//! to the action the backend reports.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::client::api::MessagingApi;
use crate::client::error::ClientError;
use crate::shared::event::PushEvent;
use crate::shared::messaging::{
    MessageId, Reaction, ReactionSummary, ToggleAction, UserId, UserRef,
};

pub struct ReactionTracker {
    api: Arc<dyn MessagingApi>,
    current_user: RwLock<Option<UserRef>>,
    summaries: RwLock<HashMap<MessageId, Vec<ReactionSummary>>>,
}

impl ReactionTracker {
    pub fn new(api: Arc<dyn MessagingApi>) -> Self {
        Self {
            api,
            current_user: RwLock::new(None),
            summaries: RwLock::new(HashMap::new()),
        }
    }

    /// Set the user whose reactions count as "own"
    pub async fn set_current_user(&self, user: Option<UserRef>) {
        *self.current_user.write().await = user;
    }

    async fn current_user_id(&self) -> Option<UserId> {
        self.current_user.read().await.as_ref().map(|u| u.id)
    }

    /// Load the summaries of one message from the backend
    pub async fn fetch(&self, message_id: MessageId) -> Result<Vec<ReactionSummary>, ClientError> {
        let list = self.api.reactions(message_id).await.map_err(|e| {
            tracing::warn!("[REACTIONS] Failed to fetch reactions of {}: {}", message_id, e);
            e
        })?;
        let list: Vec<ReactionSummary> = list.into_iter().filter(|s| s.count > 0).collect();
        self.summaries.write().await.insert(message_id, list.clone());
        Ok(list)
    }

    /// Toggle the current user's `emoji` on a message
    pub async fn toggle(&self, message_id: MessageId, emoji: &str) -> Result<ToggleAction, ClientError> {
        let user = self
            .current_user
            .read()
            .await
            .clone()
            .ok_or(ClientError::NotAuthenticated)?;

        let snapshot = {
            let mut summaries = self.summaries.write().await;
            let list = summaries.entry(message_id).or_default();
            let snapshot = list.clone();
            let reacted = list
                .iter()
                .any(|s| s.emoji == emoji && s.users.iter().any(|u| u.id == user.id));
            if reacted {
                remove_user(list, emoji, user.id, true);
            } else {
                add_user(list, emoji, user.clone(), true);
            }
            snapshot
        };

        match self.api.toggle_reaction(message_id, emoji).await {
            Ok(response) => {
                let mut summaries = self.summaries.write().await;
                let list = summaries.entry(message_id).or_default();
                match response.action {
                    ToggleAction::Added => {
                        add_user(list, emoji, user, true);
                    }
                    ToggleAction::Removed => {
                        remove_user(list, emoji, user.id, true);
                    }
                }
                tracing::debug!(
                    "[REACTIONS] {} {:?} on message {}",
                    emoji,
                    response.action,
                    message_id
                );
                Ok(response.action)
            }
            Err(e) => {
                tracing::warn!("[REACTIONS] Toggle failed, rolling back: {}", e);
                self.summaries.write().await.insert(message_id, snapshot);
                Err(e)
            }
        }
    }

    pub async fn add(&self, message_id: MessageId, emoji: &str) -> Result<Reaction, ClientError> {
        let reaction = self.api.add_reaction(message_id, emoji).await?;
        self.apply_added(message_id, &reaction).await;
        Ok(reaction)
    }

    /// Delete a reaction by id, then refresh the message's summaries
    pub async fn remove(&self, message_id: MessageId, reaction_id: i64) -> Result<(), ClientError> {
        self.api.remove_reaction(message_id, reaction_id).await?;
        self.fetch(message_id).await?;
        Ok(())
    }

    /// Apply a `reaction.added` / `reaction.removed` push event
    pub async fn handle_event(&self, event: &PushEvent) {
        match event {
            PushEvent::ReactionAdded {
                message_id,
                reaction,
            } => self.apply_added(*message_id, reaction).await,
            PushEvent::ReactionRemoved {
                message_id,
                user_id,
                emoji,
            } => {
                let is_current = self.current_user_id().await == Some(*user_id);
                let mut summaries = self.summaries.write().await;
                if let Some(list) = summaries.get_mut(message_id) {
                    remove_user(list, emoji, *user_id, is_current);
                }
            }
            _ => {}
        }
    }

    async fn apply_added(&self, message_id: MessageId, reaction: &Reaction) {
        let is_current = self.current_user_id().await == Some(reaction.user_id);
        let user = reaction.user.clone().unwrap_or_else(|| UserRef {
            id: reaction.user_id,
            name: String::new(),
        });
        let mut summaries = self.summaries.write().await;
        add_user(summaries.entry(message_id).or_default(), &reaction.emoji, user, is_current);
    }

    pub async fn reactions_for(&self, message_id: MessageId) -> Vec<ReactionSummary> {
        self.summaries
            .read()
            .await
            .get(&message_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn has_user_reacted(&self, message_id: MessageId, emoji: &str) -> bool {
        self.summaries
            .read()
            .await
            .get(&message_id)
            .and_then(|list| list.iter().find(|s| s.emoji == emoji))
            .map(|s| s.user_reacted)
            .unwrap_or(false)
    }

    pub async fn clear_message(&self, message_id: MessageId) {
        self.summaries.write().await.remove(&message_id);
    }

    pub async fn clear_all(&self) {
        self.summaries.write().await.clear();
    }
}

fn add_user(list: &mut Vec<ReactionSummary>, emoji: &str, user: UserRef, is_current: bool) {
    match list.iter_mut().find(|s| s.emoji == emoji) {
        Some(summary) => {
            summary.add_user(user, is_current);
        }
        None => {
            let mut summary = ReactionSummary::new(emoji);
            summary.add_user(user, is_current);
            list.push(summary);
        }
    }
}

fn remove_user(list: &mut Vec<ReactionSummary>, emoji: &str, user_id: UserId, is_current: bool) {
    if let Some(summary) = list.iter_mut().find(|s| s.emoji == emoji) {
        summary.remove_user(user_id, is_current);
    }
    list.retain(|s| s.count > 0);
}
