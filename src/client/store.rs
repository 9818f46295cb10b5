//! Message Store
//!
//! The canonical in-memory table of conversations and their messages.
//!
//! # Invariants
//!
//! After every mutating call returns:
//!
//! - a conversation's message list holds at most one entry per message id
//! - the list is ordered by `created_at` ascending, ties broken by id
//! - `last_message_at` never moves backwards
//! - the unread count equals the number of messages with no `read_at`
//!   sent by someone other than the current user (0 with no current user)
//!
//! Mutations are plain `&mut self` methods that cannot fail; the store is
//! shared as [`SharedStore`] so each mutation runs under one write guard.
//! Messages for a conversation that is not known yet are parked and
//! replayed once the conversation arrives. The parking area holds at most
//! [`PENDING_CAPACITY`] messages; the oldest are evicted first.
//!
//! Every mutation publishes a [`StoreEvent`] on a broadcast channel.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, RwLock};

use crate::client::channel::ConnectionState;
use crate::shared::messaging::{
    Conversation, ConversationId, Message, MessageId, UserId, WorkspaceId,
};

const EVENT_CAPACITY: usize = 256;

/// Most messages kept for conversations that are not known yet
pub const PENDING_CAPACITY: usize = 500;

/// Store shared between the client components
pub type SharedStore = Arc<RwLock<MessageStore>>;

/// Change notification published after each mutation
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    ConversationsLoaded { count: usize },
    ConversationUpdated { conversation_id: ConversationId },
    MessagesChanged { conversation_id: ConversationId },
    MessageRead { conversation_id: ConversationId, message_id: MessageId },
    MessageDelivered { conversation_id: ConversationId, message_id: MessageId },
    MessageRemoved { conversation_id: ConversationId, message_id: MessageId },
    UnreadChanged { conversation_id: ConversationId, unread: u32 },
    ActiveConversationChanged { conversation_id: Option<ConversationId> },
    ConnectionChanged(ConnectionState),
    LoadingChanged(bool),
    ErrorChanged(Option<String>),
    SessionExpired,
    Reset,
}

pub struct MessageStore {
    conversations: Vec<Conversation>,
    messages: HashMap<ConversationId, Vec<Message>>,
    unread: HashMap<ConversationId, u32>,
    /// Messages whose conversation is not known yet
    pending: HashMap<ConversationId, Vec<Message>>,
    active_conversation: Option<ConversationId>,
    current_user: Option<UserId>,
    connection: ConnectionState,
    /// Loads in flight; the store is loading while any is
    loads_in_flight: usize,
    error: Option<String>,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            conversations: Vec::new(),
            messages: HashMap::new(),
            unread: HashMap::new(),
            pending: HashMap::new(),
            active_conversation: None,
            current_user: None,
            connection: ConnectionState::Disconnected,
            loads_in_flight: 0,
            error: None,
            events,
        }
    }

    pub fn shared(self) -> SharedStore {
        Arc::new(RwLock::new(self))
    }

    /// Receive change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    // ========== Conversations ==========

    /// Replace the conversation list (bulk load)
    pub fn set_conversations(&mut self, conversations: Vec<Conversation>) {
        let mut list: Vec<Conversation> = Vec::with_capacity(conversations.len());
        for mut conversation in conversations {
            conversation.normalize_participants();
            // Loaded messages may be newer than the server's summary.
            if let Some(newest) = self.messages.get(&conversation.id).and_then(|m| m.last()) {
                conversation.observe_message(newest);
            }
            if let Some(previous) = self.conversation(conversation.id) {
                keep_newer_activity(&mut conversation, previous);
            }
            match list.iter_mut().find(|c| c.id == conversation.id) {
                Some(existing) => *existing = conversation,
                None => list.push(conversation),
            }
        }
        self.conversations = list;

        let ids: Vec<ConversationId> = self.conversations.iter().map(|c| c.id).collect();
        let dropped: Vec<ConversationId> = self
            .messages
            .keys()
            .chain(self.pending.keys())
            .filter(|id| !ids.contains(id))
            .copied()
            .collect();
        if !dropped.is_empty() {
            tracing::debug!("[STORE] Dropping messages of conversations {:?}", dropped);
        }
        self.messages.retain(|id, _| ids.contains(id));
        self.pending.retain(|id, _| ids.contains(id));
        self.unread.retain(|id, _| ids.contains(id));
        tracing::info!("[STORE] Loaded {} conversations", ids.len());
        self.emit(StoreEvent::ConversationsLoaded { count: ids.len() });

        for id in ids {
            self.recompute_unread(id);
            self.replay_pending(id);
        }
    }

    /// Insert or replace a single conversation
    pub fn add_conversation(&mut self, mut conversation: Conversation) {
        conversation.normalize_participants();
        let id = conversation.id;
        if let Some(newest) = self.messages.get(&id).and_then(|m| m.last()) {
            conversation.observe_message(newest);
        }
        match self.conversations.iter_mut().find(|c| c.id == id) {
            Some(existing) => {
                keep_newer_activity(&mut conversation, existing);
                *existing = conversation;
            }
            None => self.conversations.push(conversation),
        }
        tracing::debug!("[STORE] Conversation {} added", id);
        self.emit(StoreEvent::ConversationUpdated { conversation_id: id });
        self.recompute_unread(id);
        self.replay_pending(id);
    }

    pub fn set_participants(&mut self, conversation_id: ConversationId, participants: Vec<UserId>) -> bool {
        let Some(conversation) = self.conversation_mut(conversation_id) else {
            return false;
        };
        conversation.participants = participants;
        conversation.normalize_participants();
        self.emit(StoreEvent::ConversationUpdated { conversation_id });
        true
    }

    // ========== Messages ==========

    /// Replace a conversation's messages with a freshly loaded first page
    pub fn set_messages(&mut self, conversation_id: ConversationId, messages: Vec<Message>) {
        let loaded = self.message_ids(conversation_id);
        self.apply_first_page(conversation_id, messages, &loaded);
    }

    /// Apply a first page requested while `loaded_before` was in memory.
    ///
    /// Entries of `loaded_before` missing from the page are dropped.
    /// Entries that arrived while the request was in flight are kept and
    /// win over the page's copy.
    pub fn apply_first_page(
        &mut self,
        conversation_id: ConversationId,
        messages: Vec<Message>,
        loaded_before: &HashSet<MessageId>,
    ) {
        if !self.has_conversation(conversation_id) {
            tracing::debug!(
                "[STORE] Parking {} messages for unknown conversation {}",
                messages.len(),
                conversation_id
            );
            for message in messages {
                self.park(conversation_id, message);
            }
            return;
        }

        let mut list: Vec<Message> = Vec::with_capacity(messages.len());
        for message in messages.into_iter().filter(|m| m.conversation_id == conversation_id) {
            match list.iter_mut().find(|m| m.id == message.id) {
                Some(existing) => *existing = message,
                None => list.push(message),
            }
        }
        let arrived = self
            .messages
            .remove(&conversation_id)
            .unwrap_or_default()
            .into_iter()
            .filter(|m| !loaded_before.contains(&m.id));
        for message in arrived {
            match list.iter_mut().find(|m| m.id == message.id) {
                Some(existing) => *existing = message,
                None => list.push(message),
            }
        }
        sort_messages(&mut list);
        self.messages.insert(conversation_id, list);
        self.after_messages_changed(conversation_id);
    }

    /// Merge an older page into the loaded list; entries already in memory win
    pub fn merge_messages(&mut self, conversation_id: ConversationId, messages: Vec<Message>) {
        if !self.has_conversation(conversation_id) {
            for message in messages {
                self.park(conversation_id, message);
            }
            return;
        }

        let list = self.messages.entry(conversation_id).or_default();
        for message in messages.into_iter().filter(|m| m.conversation_id == conversation_id) {
            if !list.iter().any(|m| m.id == message.id) {
                list.push(message);
            }
        }
        sort_messages(list);
        self.after_messages_changed(conversation_id);
    }

    /// Insert a message or replace the entry with the same id
    pub fn upsert_message(&mut self, message: Message) {
        let conversation_id = message.conversation_id;
        if !self.has_conversation(conversation_id) {
            tracing::debug!(
                "[STORE] Parking message {} for unknown conversation {}",
                message.id,
                conversation_id
            );
            self.park(conversation_id, message);
            return;
        }

        let list = self.messages.entry(conversation_id).or_default();
        match list.iter_mut().find(|m| m.id == message.id) {
            Some(existing) => *existing = message,
            None => list.push(message),
        }
        sort_messages(list);
        self.after_messages_changed(conversation_id);
    }

    /// Set `read_at` on a message wherever it lives
    pub fn mark_read(&mut self, message_id: MessageId, read_at: DateTime<Utc>) -> bool {
        let found = self
            .messages
            .iter_mut()
            .find_map(|(conversation_id, list)| {
                list.iter_mut()
                    .find(|m| m.id == message_id)
                    .map(|m| (*conversation_id, m))
            });

        if let Some((conversation_id, message)) = found {
            message.read_at = Some(read_at);
            self.emit(StoreEvent::MessageRead {
                conversation_id,
                message_id,
            });
            self.recompute_unread(conversation_id);
            return true;
        }

        let parked = self.pending.iter_mut().find_map(|(conversation_id, list)| {
            list.iter_mut()
                .find(|m| m.id == message_id)
                .map(|m| (*conversation_id, m))
        });
        if let Some((conversation_id, message)) = parked {
            message.read_at = Some(read_at);
            self.emit(StoreEvent::MessageRead {
                conversation_id,
                message_id,
            });
            return true;
        }
        tracing::debug!("[STORE] mark_read for unknown message {}", message_id);
        false
    }

    /// Record a delivery receipt; content is not touched
    pub fn mark_delivered(&mut self, message_id: MessageId, user_id: UserId, delivered_at: DateTime<Utc>) -> bool {
        let found = self
            .messages
            .iter_mut()
            .find_map(|(conversation_id, list)| {
                list.iter_mut()
                    .find(|m| m.id == message_id)
                    .map(|m| (*conversation_id, m))
            });

        match found {
            Some((conversation_id, message)) => {
                message.record_delivery(user_id, delivered_at);
                self.emit(StoreEvent::MessageDelivered {
                    conversation_id,
                    message_id,
                });
                true
            }
            None => false,
        }
    }

    /// Local effect of a successful delete
    pub fn remove_message(&mut self, conversation_id: ConversationId, message_id: MessageId) -> bool {
        let Some(list) = self.messages.get_mut(&conversation_id) else {
            return false;
        };
        let before = list.len();
        list.retain(|m| m.id != message_id);
        if list.len() == before {
            return false;
        }
        if let Some(conversation) = self.conversation_mut(conversation_id) {
            if conversation.latest_message.as_ref().map(|m| m.id) == Some(message_id) {
                conversation.latest_message = None;
            }
        }
        self.emit(StoreEvent::MessageRemoved {
            conversation_id,
            message_id,
        });
        self.recompute_unread(conversation_id);
        true
    }

    /// Messages parked for a conversation that is not loaded
    pub fn pending_count(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    fn park(&mut self, conversation_id: ConversationId, message: Message) {
        let parked = self.pending.entry(conversation_id).or_default();
        match parked.iter_mut().find(|m| m.id == message.id) {
            Some(existing) => *existing = message,
            None => parked.push(message),
        }
        while self.pending_count() > PENDING_CAPACITY {
            self.evict_oldest_parked();
        }
    }

    fn evict_oldest_parked(&mut self) {
        let oldest = self
            .pending
            .iter()
            .flat_map(|(conversation_id, list)| list.iter().map(move |m| (m.created_at, m.id, *conversation_id)))
            .min();
        let Some((_, message_id, conversation_id)) = oldest else {
            return;
        };
        tracing::warn!(
            "[STORE] Parking area full, dropping message {} of conversation {}",
            message_id,
            conversation_id
        );
        if let Some(list) = self.pending.get_mut(&conversation_id) {
            list.retain(|m| m.id != message_id);
            if list.is_empty() {
                self.pending.remove(&conversation_id);
            }
        }
    }

    fn replay_pending(&mut self, conversation_id: ConversationId) {
        if let Some(parked) = self.pending.remove(&conversation_id) {
            tracing::debug!(
                "[STORE] Replaying {} parked messages for conversation {}",
                parked.len(),
                conversation_id
            );
            for message in parked {
                self.upsert_message(message);
            }
        }
    }

    fn after_messages_changed(&mut self, conversation_id: ConversationId) {
        let newest = self
            .messages
            .get(&conversation_id)
            .and_then(|list| list.last())
            .cloned();
        if let (Some(newest), Some(conversation)) = (newest, self.conversation_mut(conversation_id)) {
            conversation.observe_message(&newest);
        }
        self.emit(StoreEvent::MessagesChanged { conversation_id });
        self.recompute_unread(conversation_id);
    }

    fn recompute_unread(&mut self, conversation_id: ConversationId) {
        if !self.has_conversation(conversation_id) {
            self.unread.remove(&conversation_id);
            return;
        }
        let unread = match self.current_user {
            Some(user) => self
                .messages
                .get(&conversation_id)
                .map(|list| list.iter().filter(|m| m.is_unread_for(user)).count() as u32)
                .unwrap_or(0),
            None => 0,
        };
        let previous = self.unread.insert(conversation_id, unread);
        if previous != Some(unread) {
            self.emit(StoreEvent::UnreadChanged {
                conversation_id,
                unread,
            });
        }
    }

    fn recompute_all_unread(&mut self) {
        let ids: Vec<ConversationId> = self.conversations.iter().map(|c| c.id).collect();
        for id in ids {
            self.recompute_unread(id);
        }
    }

    fn has_conversation(&self, conversation_id: ConversationId) -> bool {
        self.conversations.iter().any(|c| c.id == conversation_id)
    }

    fn conversation_mut(&mut self, conversation_id: ConversationId) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.id == conversation_id)
    }

    // ========== Queries ==========

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    /// Conversations by recency, newest first
    pub fn sorted_conversations(&self) -> Vec<&Conversation> {
        let mut sorted: Vec<&Conversation> = self.conversations.iter().collect();
        sorted.sort_by(|a, b| {
            b.activity_at()
                .cmp(&a.activity_at())
                .then_with(|| b.id.cmp(&a.id))
        });
        sorted
    }

    pub fn conversation(&self, conversation_id: ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == conversation_id)
    }

    /// Ids currently loaded for a conversation
    pub fn message_ids(&self, conversation_id: ConversationId) -> HashSet<MessageId> {
        self.messages_for(conversation_id).iter().map(|m| m.id).collect()
    }

    pub fn messages_for(&self, conversation_id: ConversationId) -> &[Message] {
        self.messages
            .get(&conversation_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn message(&self, message_id: MessageId) -> Option<&Message> {
        self.messages
            .values()
            .flatten()
            .find(|m| m.id == message_id)
    }

    pub fn unread_count(&self, conversation_id: ConversationId) -> u32 {
        self.unread.get(&conversation_id).copied().unwrap_or(0)
    }

    pub fn total_unread(&self) -> u32 {
        self.unread.values().sum()
    }

    /// Ids of unread messages in a conversation, oldest first
    pub fn unread_message_ids(&self, conversation_id: ConversationId) -> Vec<MessageId> {
        match self.current_user {
            Some(user) => self
                .messages_for(conversation_id)
                .iter()
                .filter(|m| m.is_unread_for(user))
                .map(|m| m.id)
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn active_conversation_id(&self) -> Option<ConversationId> {
        self.active_conversation
    }

    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.active_conversation.and_then(|id| self.conversation(id))
    }

    pub fn active_messages(&self) -> &[Message] {
        match self.active_conversation {
            Some(id) => self.messages_for(id),
            None => &[],
        }
    }

    /// Existing conversation about `workspace_id` between `user` and `provider`
    pub fn find_workspace_conversation(
        &self,
        workspace_id: WorkspaceId,
        user: UserId,
        provider: UserId,
    ) -> Option<&Conversation> {
        self.conversations.iter().find(|c| {
            c.workspace_id == Some(workspace_id) && c.has_participant(user) && c.has_participant(provider)
        })
    }

    pub fn current_user(&self) -> Option<UserId> {
        self.current_user
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    pub fn is_loading(&self) -> bool {
        self.loads_in_flight > 0
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    // ========== Session / UI state ==========

    pub fn set_active_conversation(&mut self, conversation_id: Option<ConversationId>) {
        if self.active_conversation != conversation_id {
            self.active_conversation = conversation_id;
            self.emit(StoreEvent::ActiveConversationChanged { conversation_id });
        }
    }

    /// Set the user whose perspective unread counts are computed from
    pub fn set_current_user(&mut self, user_id: Option<UserId>) {
        if self.current_user != user_id {
            self.current_user = user_id;
            self.recompute_all_unread();
        }
    }

    pub fn set_connection_state(&mut self, state: ConnectionState) {
        if self.connection != state {
            self.connection = state;
            self.emit(StoreEvent::ConnectionChanged(state));
        }
    }

    /// Count a load starting (`true`) or finishing (`false`)
    pub fn set_loading(&mut self, loading: bool) {
        let was_loading = self.is_loading();
        if loading {
            self.loads_in_flight += 1;
        } else {
            self.loads_in_flight = self.loads_in_flight.saturating_sub(1);
        }
        if self.is_loading() != was_loading {
            self.emit(StoreEvent::LoadingChanged(self.is_loading()));
        }
    }

    pub fn set_error(&mut self, error: Option<String>) {
        if self.error != error {
            self.error = error.clone();
            self.emit(StoreEvent::ErrorChanged(error));
        }
    }

    /// Drop all session data
    pub fn reset(&mut self) {
        self.conversations.clear();
        self.messages.clear();
        self.unread.clear();
        self.pending.clear();
        self.active_conversation = None;
        self.current_user = None;
        self.connection = ConnectionState::Disconnected;
        self.loads_in_flight = 0;
        self.error = None;
        tracing::info!("[STORE] Reset");
        self.emit(StoreEvent::Reset);
    }

    /// Reset after the backend rejected the session credential
    pub fn expire_session(&mut self) {
        self.reset();
        self.emit(StoreEvent::SessionExpired);
    }
}

/// Carry over `previous` activity when it is newer than `incoming`'s
fn keep_newer_activity(incoming: &mut Conversation, previous: &Conversation) {
    if let Some(latest) = previous.latest_message.as_deref() {
        incoming.observe_message(latest);
    }
    if previous.last_message_at > incoming.last_message_at {
        incoming.last_message_at = previous.last_message_at;
    }
}

/// Order by `created_at`, ties by id
fn sort_messages(list: &mut [Message]) {
    list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}
