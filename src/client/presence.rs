//! Presence / Typing Tracker
//!
//! Per-user `offline → online → away → offline` status plus an orthogonal
//! typing flag scoped to one conversation. Records are transient and are
//! never persisted.
//!
//! Typing flags are only cleared by a later `user-typing` event; there is
//! no local timeout.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::client::api::MessagingApi;
use crate::client::error::ClientError;
use crate::shared::event::PushEvent;
use crate::shared::messaging::{
    ConversationId, PresencePatch, PresenceStatus, UserId, UserPresence,
};

/// Visibility of the local client window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

pub struct PresenceTracker {
    api: Arc<dyn MessagingApi>,
    users: RwLock<HashMap<UserId, UserPresence>>,
    own_status: RwLock<PresenceStatus>,
    error: RwLock<Option<String>>,
}

impl PresenceTracker {
    pub fn new(api: Arc<dyn MessagingApi>) -> Self {
        Self {
            api,
            users: RwLock::new(HashMap::new()),
            own_status: RwLock::new(PresenceStatus::Offline),
            error: RwLock::new(None),
        }
    }

    /// Load the initial presence list
    pub async fn initialize(&self) -> Result<(), ClientError> {
        *self.error.write().await = None;
        match self.api.presence().await {
            Ok(list) => {
                let mut users = self.users.write().await;
                for presence in list {
                    users.insert(presence.user_id, presence);
                }
                tracing::info!("[PRESENCE] Loaded {} presence records", users.len());
                Ok(())
            }
            Err(e) => {
                tracing::error!("[PRESENCE] Failed to load presence: {}", e);
                *self.error.write().await = Some(e.to_string());
                Err(e)
            }
        }
    }

    pub async fn send_typing(&self, conversation_id: ConversationId, is_typing: bool) -> Result<(), ClientError> {
        self.api.send_typing(conversation_id, is_typing).await.map_err(|e| {
            tracing::warn!("[PRESENCE] Failed to send typing indicator: {}", e);
            e
        })
    }

    /// Report the local user's status to the backend
    pub async fn update_own_presence(&self, status: PresenceStatus) -> Result<(), ClientError> {
        match self.api.update_presence(status).await {
            Ok(()) => {
                *self.own_status.write().await = status;
                tracing::debug!("[PRESENCE] Own status is now {}", status.as_str());
                Ok(())
            }
            Err(e) => {
                tracing::warn!("[PRESENCE] Failed to update own status: {}", e);
                *self.error.write().await = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Map window visibility to the local user's status
    pub async fn set_visibility(&self, visibility: Visibility) -> Result<(), ClientError> {
        let status = match visibility {
            Visibility::Visible => PresenceStatus::Online,
            Visibility::Hidden => PresenceStatus::Away,
        };
        self.update_own_presence(status).await
    }

    pub async fn own_status(&self) -> PresenceStatus {
        *self.own_status.read().await
    }

    /// Apply a presence push event; other events are ignored
    pub async fn handle_event(&self, event: &PushEvent) {
        let now = Utc::now();
        match event {
            PushEvent::UserOnline { user_id } => {
                self.update(*user_id, now, |p| {
                    p.status = PresenceStatus::Online;
                    p.last_seen = now;
                })
                .await;
            }
            PushEvent::UserOffline { user_id } => {
                self.update(*user_id, now, |p| {
                    p.status = PresenceStatus::Offline;
                    p.last_seen = now;
                    p.is_typing = false;
                    p.typing_in_conversation = None;
                })
                .await;
            }
            PushEvent::UserTyping {
                user_id,
                is_typing,
                conversation_id,
            } => {
                let (is_typing, conversation_id) = (*is_typing, *conversation_id);
                self.update(*user_id, now, |p| {
                    p.is_typing = is_typing;
                    p.typing_in_conversation = if is_typing { conversation_id } else { None };
                })
                .await;
            }
            PushEvent::PresenceUpdate { user_id, presence } => {
                self.apply_patch(*user_id, presence, now).await;
            }
            _ => {}
        }
    }

    async fn update<F>(&self, user_id: UserId, now: DateTime<Utc>, change: F)
    where
        F: FnOnce(&mut UserPresence),
    {
        let mut users = self.users.write().await;
        let presence = users
            .entry(user_id)
            .or_insert_with(|| UserPresence::offline(user_id, now));
        change(presence);
    }

    async fn apply_patch(&self, user_id: UserId, patch: &PresencePatch, now: DateTime<Utc>) {
        self.update(user_id, now, |p| p.apply(patch)).await;
    }

    // ========== Queries ==========

    pub async fn presence(&self, user_id: UserId) -> Option<UserPresence> {
        self.users.read().await.get(&user_id).cloned()
    }

    pub async fn is_online(&self, user_id: UserId) -> bool {
        self.users
            .read()
            .await
            .get(&user_id)
            .map(|p| p.status == PresenceStatus::Online)
            .unwrap_or(false)
    }

    /// Whether `user_id` is typing, optionally in one conversation
    pub async fn is_typing(&self, user_id: UserId, conversation_id: Option<ConversationId>) -> bool {
        let users = self.users.read().await;
        let Some(presence) = users.get(&user_id) else {
            return false;
        };
        if !presence.is_typing {
            return false;
        }
        match conversation_id {
            Some(id) => presence.typing_in_conversation == Some(id),
            None => true,
        }
    }

    /// Users currently typing in a conversation, by id
    pub async fn typing_in(&self, conversation_id: ConversationId) -> Vec<UserId> {
        let mut typing: Vec<UserId> = self
            .users
            .read()
            .await
            .values()
            .filter(|p| p.is_typing && p.typing_in_conversation == Some(conversation_id))
            .map(|p| p.user_id)
            .collect();
        typing.sort_unstable();
        typing
    }

    pub async fn online_count(&self) -> usize {
        self.users
            .read()
            .await
            .values()
            .filter(|p| p.status == PresenceStatus::Online)
            .count()
    }

    pub async fn error(&self) -> Option<String> {
        self.error.read().await.clone()
    }

    /// Everyone offline; used when the push connection drops
    pub async fn mark_all_offline(&self) {
        let mut users = self.users.write().await;
        for presence in users.values_mut() {
            presence.status = PresenceStatus::Offline;
            presence.is_typing = false;
            presence.typing_in_conversation = None;
        }
        tracing::info!("[PRESENCE] Marked {} users offline", users.len());
    }

    /// Forget all records without contacting the backend
    pub async fn clear(&self) {
        self.users.write().await.clear();
        *self.own_status.write().await = PresenceStatus::Offline;
        *self.error.write().await = None;
    }

    /// Clear local state and report the local user offline
    pub async fn teardown(&self) {
        self.users.write().await.clear();
        if let Err(e) = self.update_own_presence(PresenceStatus::Offline).await {
            tracing::debug!("[PRESENCE] Offline report failed during teardown: {}", e);
        }
    }
}

/// Human-readable age of a last-seen timestamp
pub fn format_last_seen(last_seen: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - last_seen).num_minutes();
    if minutes < 1 {
        "Just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if minutes < 1440 {
        format!("{}h ago", minutes / 60)
    } else {
        format!("{}d ago", minutes / 1440)
    }
}
