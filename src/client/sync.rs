//! Conversation Synchronizer
//!
//! Moves data between the REST backend, the push channel and the
//! [`MessageStore`]. Every REST result and every live event ends up as a
//! store mutation; the synchronizer itself keeps only request
//! generations.
//!
//! # Failure policy
//!
//! - network failures set the store's error string and keep prior data
//! - a 401 expires the session: store reset, push connection closed,
//!   trackers cleared
//! - a dropped push connection triggers at most one reconnect, followed
//!   by a reload of the active conversation's first page
//!
//! Nothing is retried with backoff.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};

use crate::client::api::MessagingApi;
use crate::client::channel::{ChannelClient, ChannelEvent, ConnectionState};
use crate::client::error::ClientError;
use crate::client::presence::PresenceTracker;
use crate::client::reactions::ReactionTracker;
use crate::client::store::SharedStore;
use crate::shared::config::AppConfig;
use crate::shared::event::PushEvent;
use crate::shared::messaging::{
    AttachmentUpload, Conversation, ConversationId, ConversationKind, ConversationReadStatus,
    CreateConversationRequest, DeliveryStatus, Message, MessageId, MessageType,
    SendMessageRequest, UserId, WorkspaceRef,
};

/// Message-load bookkeeping of one conversation
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct LoadGenerations {
    /// Bumped when a page-1 request is issued
    first_page: u64,
    /// Bumped when a page-1 response replaces the list
    resets: u64,
}

/// Result of [`Synchronizer::load_messages`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Page applied to the store
    Loaded { count: usize, has_more: bool },
    /// The response was discarded: a newer page-1 load was issued
    /// meanwhile, or (for later pages) the list was reset since
    Stale,
}

#[derive(Debug, Clone, Copy)]
struct SyncSettings {
    page_size: u32,
    reconnect_on_disconnect: bool,
}

pub struct Synchronizer {
    api: Arc<dyn MessagingApi>,
    channel: Arc<ChannelClient>,
    store: SharedStore,
    presence: Arc<PresenceTracker>,
    reactions: Arc<ReactionTracker>,
    settings: SyncSettings,
    generations: Mutex<HashMap<ConversationId, LoadGenerations>>,
}

impl Synchronizer {
    pub fn new(
        app: &AppConfig,
        api: Arc<dyn MessagingApi>,
        channel: Arc<ChannelClient>,
        store: SharedStore,
        presence: Arc<PresenceTracker>,
        reactions: Arc<ReactionTracker>,
    ) -> Self {
        Self {
            api,
            channel,
            store,
            presence,
            reactions,
            settings: SyncSettings {
                page_size: app.message_page_size,
                reconnect_on_disconnect: app.reconnect_on_disconnect,
            },
            generations: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn channel(&self) -> &Arc<ChannelClient> {
        &self.channel
    }

    // ========== REST operations ==========

    /// Fetch the conversation list and replace the store's copy
    pub async fn load_conversations(&self) -> Result<usize, ClientError> {
        self.begin_loading().await;
        let result = self.api.conversations().await;
        self.store.write().await.set_loading(false);

        match result {
            Ok(conversations) => {
                let count = conversations.len();
                self.store.write().await.set_conversations(conversations);
                tracing::info!("[SYNC] Loaded {} conversations", count);
                Ok(count)
            }
            Err(e) => Err(self.fail("load conversations", e).await),
        }
    }

    /// Load one page of messages. Page 1 replaces the loaded list, later
    /// pages merge into it.
    ///
    /// Only a page-1 load supersedes earlier loads of the conversation.
    /// Messages that land while page 1 is in flight, live or from an
    /// older page, survive the replace.
    pub async fn load_messages(
        &self,
        conversation_id: ConversationId,
        page: u32,
    ) -> Result<LoadOutcome, ClientError> {
        if page == 0 {
            return Err(ClientError::validation("page", "pages start at 1"));
        }
        let issued = self.issue_load(conversation_id, page).await;
        let loaded_before = if page == 1 {
            self.store.read().await.message_ids(conversation_id)
        } else {
            HashSet::new()
        };
        self.begin_loading().await;
        let result = self
            .api
            .messages(conversation_id, page, self.settings.page_size)
            .await;
        self.store.write().await.set_loading(false);

        let response = match result {
            Ok(response) => response,
            Err(e) if e.is_unauthorized() => return Err(self.fail("load messages", e).await),
            Err(e) => {
                if !self.is_current_load(conversation_id, page, issued).await {
                    return Ok(self.stale(conversation_id, page));
                }
                return Err(self.fail("load messages", e).await);
            }
        };

        let count = response.data.len();
        let has_more = response.has_more();
        let mut store = self.store.write().await;
        // Checked under the store guard so a concurrent reset cannot slip in.
        {
            let mut generations = self.generations.lock().await;
            let current = generations.entry(conversation_id).or_default();
            if !issued.is_current(current, page) {
                return Ok(self.stale(conversation_id, page));
            }
            if page == 1 {
                current.resets += 1;
            }
        }
        if page == 1 {
            store.apply_first_page(conversation_id, response.data, &loaded_before);
        } else {
            store.merge_messages(conversation_id, response.data);
        }
        tracing::debug!(
            "[SYNC] Loaded {} messages (page {}) of conversation {}",
            count,
            page,
            conversation_id
        );
        Ok(LoadOutcome::Loaded { count, has_more })
    }

    /// Send a message and store the server's copy. Nothing is shown
    /// before the backend answers.
    pub async fn send_message(
        &self,
        conversation_id: ConversationId,
        content: impl Into<String>,
        attachments: Vec<AttachmentUpload>,
        reply_to_id: Option<MessageId>,
    ) -> Result<Message, ClientError> {
        let content = content.into();
        if content.trim().is_empty() && attachments.is_empty() {
            return Err(ClientError::validation("content", "message is empty"));
        }
        let request = SendMessageRequest {
            conversation_id,
            message_type: message_type_for(&attachments),
            content,
            reply_to_id,
            attachments,
        };

        match self.api.send_message(&request).await {
            Ok(message) => {
                tracing::info!(
                    "[SYNC] Sent message {} to conversation {}",
                    message.id,
                    conversation_id
                );
                self.store.write().await.upsert_message(message.clone());
                Ok(message)
            }
            Err(e) => Err(self.fail("send message", e).await),
        }
    }

    pub async fn create_conversation(
        &self,
        participants: Vec<UserId>,
        title: Option<String>,
        kind: ConversationKind,
    ) -> Result<Conversation, ClientError> {
        let request = CreateConversationRequest {
            participants,
            title,
            kind,
            workspace_id: None,
            workspace: None,
        };
        self.create(&request).await
    }

    /// Conversation with a workspace's provider; an existing one between
    /// the same users about the same workspace is returned as is.
    pub async fn create_workspace_conversation(
        &self,
        workspace: WorkspaceRef,
        provider_id: UserId,
    ) -> Result<Conversation, ClientError> {
        let user_id = {
            let store = self.store.read().await;
            let user_id = store.current_user().ok_or(ClientError::NotAuthenticated)?;
            if let Some(existing) = store.find_workspace_conversation(workspace.id, user_id, provider_id) {
                tracing::debug!(
                    "[SYNC] Reusing conversation {} for workspace {}",
                    existing.id,
                    workspace.id
                );
                return Ok(existing.clone());
            }
            user_id
        };

        let request = CreateConversationRequest {
            participants: vec![user_id, provider_id],
            title: Some(format!("{} - Discussion", workspace.name)),
            kind: ConversationKind::Direct,
            workspace_id: Some(workspace.id),
            workspace: Some(workspace),
        };
        self.create(&request).await
    }

    async fn create(&self, request: &CreateConversationRequest) -> Result<Conversation, ClientError> {
        match self.api.create_conversation(request).await {
            Ok(conversation) => {
                tracing::info!("[SYNC] Created conversation {}", conversation.id);
                self.store.write().await.add_conversation(conversation.clone());
                Ok(conversation)
            }
            Err(e) => Err(self.fail("create conversation", e).await),
        }
    }

    pub async fn mark_message_read(&self, message_id: MessageId) -> Result<(), ClientError> {
        match self.api.mark_read(message_id).await {
            Ok(ack) => {
                let read_at = ack.read_at.unwrap_or_else(Utc::now);
                self.store.write().await.mark_read(message_id, read_at);
                Ok(())
            }
            Err(e) => Err(self.fail("mark message read", e).await),
        }
    }

    /// Mark every unread message of a conversation read in one request.
    /// Returns how many messages were marked.
    pub async fn mark_conversation_read(&self, conversation_id: ConversationId) -> Result<usize, ClientError> {
        let ids = self.store.read().await.unread_message_ids(conversation_id);
        if ids.is_empty() {
            return Ok(0);
        }

        match self.api.mark_multiple_read(&ids).await {
            Ok(()) => {
                let read_at = Utc::now();
                let mut store = self.store.write().await;
                for id in &ids {
                    store.mark_read(*id, read_at);
                }
                tracing::debug!(
                    "[SYNC] Marked {} messages read in conversation {}",
                    ids.len(),
                    conversation_id
                );
                Ok(ids.len())
            }
            Err(e) => Err(self.fail("mark conversation read", e).await),
        }
    }

    /// Fetch delivery receipts and record the delivered ones locally
    pub async fn delivery_status(&self, message_id: MessageId) -> Result<DeliveryStatus, ClientError> {
        match self.api.delivery_status(message_id).await {
            Ok(status) => {
                let mut store = self.store.write().await;
                for receipt in &status.receipts {
                    if let Some(delivered_at) = receipt.delivered_at {
                        store.mark_delivered(message_id, receipt.user_id, delivered_at);
                    }
                }
                Ok(status)
            }
            Err(e) => Err(self.fail("fetch delivery status", e).await),
        }
    }

    pub async fn read_status(
        &self,
        conversation_id: Option<ConversationId>,
    ) -> Result<Vec<ConversationReadStatus>, ClientError> {
        match self.api.read_status(conversation_id).await {
            Ok(list) => Ok(list),
            Err(e) => Err(self.fail("fetch read status", e).await),
        }
    }

    pub async fn delete_message(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
    ) -> Result<(), ClientError> {
        match self.api.delete_message(message_id).await {
            Ok(()) => {
                self.store.write().await.remove_message(conversation_id, message_id);
                self.reactions.clear_message(message_id).await;
                Ok(())
            }
            // Already gone on the server.
            Err(e) if e.is_not_found() => {
                self.store.write().await.remove_message(conversation_id, message_id);
                Ok(())
            }
            Err(e) => Err(self.fail("delete message", e).await),
        }
    }

    /// Make a conversation active, subscribe its channel and load page 1
    pub async fn select_conversation(&self, conversation_id: ConversationId) -> Result<LoadOutcome, ClientError> {
        self.store
            .write()
            .await
            .set_active_conversation(Some(conversation_id));
        if let Err(e) = self.channel.subscribe(conversation_id).await {
            tracing::warn!(
                "[SYNC] Could not subscribe conversation {}: {}",
                conversation_id,
                e
            );
        }
        self.load_messages(conversation_id, 1).await
    }

    // ========== Live events ==========

    /// Apply one event from the channel client
    pub async fn handle_channel_event(&self, event: ChannelEvent) {
        match event {
            ChannelEvent::Push { channel, event, .. } => {
                tracing::debug!("[SYNC] {} on {}", event.name(), channel);
                self.apply_push(event).await;
            }
            ChannelEvent::StateChanged(state) => {
                self.store.write().await.set_connection_state(state);
                if state == ConnectionState::Connected {
                    self.store.write().await.set_error(None);
                }
            }
            ChannelEvent::ConnectionLost { reason, .. } => {
                self.on_connection_lost(reason).await;
            }
        }
    }

    async fn apply_push(&self, event: PushEvent) {
        match event {
            PushEvent::MessageSent { message } => {
                self.store.write().await.upsert_message(*message);
            }
            PushEvent::MessageRead {
                message_id,
                read_at,
                ..
            } => {
                self.store.write().await.mark_read(message_id, read_at);
            }
            PushEvent::MessageDelivered {
                message_id,
                delivered_to,
                delivered_at,
            } => {
                self.store
                    .write()
                    .await
                    .mark_delivered(message_id, delivered_to, delivered_at);
            }
            PushEvent::ConversationCreated { conversation } => {
                let id = conversation.id;
                self.store.write().await.add_conversation(*conversation);
                if let Err(e) = self.channel.subscribe(id).await {
                    tracing::warn!("[SYNC] Could not subscribe conversation {}: {}", id, e);
                }
            }
            event @ (PushEvent::ReactionAdded { .. } | PushEvent::ReactionRemoved { .. }) => {
                self.reactions.handle_event(&event).await;
            }
            event if event.is_presence() => {
                self.presence.handle_event(&event).await;
            }
            PushEvent::Unknown { name } => {
                tracing::debug!("[SYNC] Ignoring event {}", name);
            }
            _ => {}
        }
    }

    async fn on_connection_lost(&self, reason: Option<String>) {
        tracing::warn!(
            "[SYNC] Push connection lost: {}",
            reason.as_deref().unwrap_or("no reason")
        );
        self.presence.mark_all_offline().await;
        if !self.settings.reconnect_on_disconnect {
            return;
        }

        if let Err(e) = self.channel.reconnect().await {
            tracing::error!("[SYNC] Reconnect failed: {}", e);
            self.store
                .write()
                .await
                .set_error(Some(format!("Real-time connection lost: {}", e)));
            return;
        }

        let active = self.store.read().await.active_conversation_id();
        if let Some(conversation_id) = active {
            if let Err(e) = self.load_messages(conversation_id, 1).await {
                tracing::warn!("[SYNC] Resync of conversation {} failed: {}", conversation_id, e);
            }
        }
    }

    /// Apply channel events until the channel client goes away
    pub async fn run(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<ChannelEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_channel_event(event).await;
        }
        tracing::debug!("[SYNC] Event loop finished");
    }

    // ========== Session ==========

    /// Drop all session state after the backend rejected the credential
    pub async fn expire_session(&self) {
        tracing::warn!("[SYNC] Session expired");
        self.channel.disconnect().await;
        self.presence.clear().await;
        self.reactions.clear_all().await;
        self.generations.lock().await.clear();
        self.store.write().await.expire_session();
    }

    // ========== Internals ==========

    async fn begin_loading(&self) {
        let mut store = self.store.write().await;
        store.set_loading(true);
        store.set_error(None);
    }

    /// Record a failed operation and hand the error back
    async fn fail(&self, operation: &str, error: ClientError) -> ClientError {
        tracing::error!("[SYNC] Failed to {}: {}", operation, error);
        if error.is_unauthorized() {
            self.expire_session().await;
        } else {
            self.store
                .write()
                .await
                .set_error(Some(format!("Failed to {}: {}", operation, error)));
        }
        error
    }

    /// Snapshot the conversation's generations, starting a new first-page
    /// generation for page 1
    async fn issue_load(&self, conversation_id: ConversationId, page: u32) -> LoadGenerations {
        let mut generations = self.generations.lock().await;
        let current = generations.entry(conversation_id).or_default();
        if page == 1 {
            current.first_page += 1;
        }
        *current
    }

    async fn is_current_load(&self, conversation_id: ConversationId, page: u32, issued: LoadGenerations) -> bool {
        let generations = self.generations.lock().await;
        let current = generations.get(&conversation_id).copied().unwrap_or_default();
        issued.is_current(&current, page)
    }

    fn stale(&self, conversation_id: ConversationId, page: u32) -> LoadOutcome {
        tracing::debug!(
            "[SYNC] Discarding stale page {} of conversation {}",
            page,
            conversation_id
        );
        LoadOutcome::Stale
    }
}

impl LoadGenerations {
    /// Whether a load issued at `self` may still be applied
    fn is_current(&self, current: &LoadGenerations, page: u32) -> bool {
        if page == 1 {
            self.first_page == current.first_page
        } else {
            self.resets == current.resets
        }
    }
}

/// Message type implied by the attachments of an outgoing message
fn message_type_for(attachments: &[AttachmentUpload]) -> MessageType {
    if attachments.is_empty() {
        MessageType::Text
    } else if attachments.iter().all(|a| a.mime_type.starts_with("image/")) {
        MessageType::Image
    } else {
        MessageType::File
    }
}
