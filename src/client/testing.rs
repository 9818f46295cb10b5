//! In-memory fakes of the transport and REST seams for unit tests

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::client::api::MessagingApi;
use crate::client::channel::{PushConnection, PushTransport, TransportEvent};
use crate::client::error::ClientError;
use crate::shared::messaging::{
    Conversation, ConversationId, ConversationReadStatus, CreateConversationRequest,
    DeliveryStatus, Message, MessageId, MessagePage, PageMeta, PresenceStatus, Reaction,
    ReactionSummary, ReadAck, SearchFilters, SearchResponse, SendMessageRequest, ToggleAction,
    ToggleReactionResponse, UserId, UserPresence,
};

/// Fixed test clock: 2025-03-01T00:00:00Z plus `secs`
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_740_787_200 + secs, 0).unwrap()
}

// ========== Transport ==========

#[derive(Default)]
struct TransportState {
    senders: Vec<mpsc::UnboundedSender<TransportEvent>>,
    subscriptions: Vec<String>,
    unsubscriptions: Vec<String>,
    closed: usize,
    fail_next: bool,
}

/// Push transport whose connections are driven by the test
#[derive(Default, Clone)]
pub struct FakeTransport {
    state: Arc<Mutex<TransportState>>,
}

impl FakeTransport {
    fn lock(&self) -> MutexGuard<'_, TransportState> {
        self.state.lock().unwrap()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.lock().subscriptions.clone()
    }

    pub fn unsubscriptions(&self) -> Vec<String> {
        self.lock().unsubscriptions.clone()
    }

    pub fn open_count(&self) -> usize {
        self.lock().senders.len()
    }

    pub fn close_count(&self) -> usize {
        self.lock().closed
    }

    /// Event sender of the `index`-th opened connection
    pub fn sender(&self, index: usize) -> mpsc::UnboundedSender<TransportEvent> {
        self.lock().senders[index].clone()
    }

    /// Deliver an application event on the newest connection
    pub fn emit(&self, channel: &str, event: &str, data: Value) {
        let state = self.lock();
        if let Some(tx) = state.senders.last() {
            let _ = tx.send(TransportEvent::Message {
                channel: channel.to_string(),
                event: event.to_string(),
                data,
            });
        }
    }

    /// Simulate the server dropping the newest connection
    pub fn close_current(&self, reason: Option<&str>) {
        let state = self.lock();
        if let Some(tx) = state.senders.last() {
            let _ = tx.send(TransportEvent::Closed {
                reason: reason.map(str::to_string),
            });
        }
    }

    pub fn fail_next_open(&self) {
        self.lock().fail_next = true;
    }
}

#[async_trait]
impl PushTransport for FakeTransport {
    async fn open(
        &self,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn PushConnection>, ClientError> {
        let mut state = self.lock();
        if state.fail_next {
            state.fail_next = false;
            return Err(ClientError::transport("connection refused"));
        }
        state.senders.push(events);
        let socket_id = format!("{}.{}", state.senders.len(), 42);
        Ok(Box::new(FakeConnection {
            socket_id,
            state: self.state.clone(),
        }))
    }
}

struct FakeConnection {
    socket_id: String,
    state: Arc<Mutex<TransportState>>,
}

#[async_trait]
impl PushConnection for FakeConnection {
    fn socket_id(&self) -> &str {
        &self.socket_id
    }

    async fn subscribe(&self, channel: &str) -> Result<(), ClientError> {
        self.state.lock().unwrap().subscriptions.push(channel.to_string());
        Ok(())
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), ClientError> {
        self.state.lock().unwrap().unsubscriptions.push(channel.to_string());
        Ok(())
    }

    async fn close(&self) {
        self.state.lock().unwrap().closed += 1;
    }
}

// ========== REST ==========

/// Injected failure for one fake API call
#[derive(Debug, Clone, Copy)]
pub enum Failure {
    Network,
    Unauthorized,
    Status(u16),
}

impl From<Failure> for ClientError {
    fn from(failure: Failure) -> Self {
        match failure {
            Failure::Network => ClientError::network("connection reset"),
            Failure::Unauthorized => ClientError::Unauthorized,
            Failure::Status(status) => ClientError::from_status(status, ""),
        }
    }
}

/// Recorded calls and canned responses of [`FakeApi`]
pub struct ApiState {
    /// Sender of messages created through `send_message`
    pub user_id: UserId,
    pub conversations: Vec<Conversation>,
    /// Queued `(delay, answer)` per `(conversation, page)`. The last entry
    /// keeps being served once the queue is down to one.
    pub pages: HashMap<(ConversationId, u32), VecDeque<(Duration, Result<MessagePage, Failure>)>>,
    pub page_requests: Vec<(ConversationId, u32)>,
    pub next_message_id: MessageId,
    pub next_conversation_id: ConversationId,
    pub sent: Vec<SendMessageRequest>,
    pub created: Vec<CreateConversationRequest>,
    pub read: Vec<MessageId>,
    pub read_batches: Vec<Vec<MessageId>>,
    pub deleted: Vec<MessageId>,
    pub read_status: Vec<ConversationReadStatus>,
    pub delivery: HashMap<MessageId, DeliveryStatus>,
    pub reactions: HashMap<MessageId, Vec<ReactionSummary>>,
    pub toggles: Vec<(MessageId, String)>,
    /// Server answer to toggles; `None` mirrors the current summary
    pub toggle_action: Option<ToggleAction>,
    pub added_reactions: Vec<(MessageId, String)>,
    pub removed_reactions: Vec<(MessageId, i64)>,
    pub searches: Vec<(SearchFilters, u32)>,
    pub search_responses: VecDeque<(Duration, SearchResponse)>,
    pub presence: Vec<UserPresence>,
    pub presence_updates: Vec<PresenceStatus>,
    pub typing: Vec<(ConversationId, bool)>,
    failures: HashMap<&'static str, VecDeque<Failure>>,
}

impl Default for ApiState {
    fn default() -> Self {
        Self {
            user_id: 1,
            conversations: Vec::new(),
            pages: HashMap::new(),
            page_requests: Vec::new(),
            next_message_id: 1000,
            next_conversation_id: 500,
            sent: Vec::new(),
            created: Vec::new(),
            read: Vec::new(),
            read_batches: Vec::new(),
            deleted: Vec::new(),
            read_status: Vec::new(),
            delivery: HashMap::new(),
            reactions: HashMap::new(),
            toggles: Vec::new(),
            toggle_action: None,
            added_reactions: Vec::new(),
            removed_reactions: Vec::new(),
            searches: Vec::new(),
            search_responses: VecDeque::new(),
            presence: Vec::new(),
            presence_updates: Vec::new(),
            typing: Vec::new(),
            failures: HashMap::new(),
        }
    }
}

impl ApiState {
    fn check(&mut self, op: &'static str) -> Result<(), ClientError> {
        match self.failures.get_mut(op).and_then(VecDeque::pop_front) {
            Some(failure) => Err(failure.into()),
            None => Ok(()),
        }
    }
}

/// Build a message page
pub fn page(messages: Vec<Message>, current_page: u32, last_page: u32) -> MessagePage {
    let total = messages.len() as u64;
    MessagePage {
        data: messages,
        meta: PageMeta {
            current_page,
            last_page,
            total,
        },
    }
}

/// In-memory [`MessagingApi`]
#[derive(Default)]
pub struct FakeApi {
    state: Mutex<ApiState>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, ApiState> {
        self.state.lock().unwrap()
    }

    /// Fail the next call of `op` (named after the trait method)
    pub fn fail(&self, op: &'static str, failure: Failure) {
        self.state().failures.entry(op).or_default().push_back(failure);
    }

    pub fn set_conversations(&self, conversations: Vec<Conversation>) {
        self.state().conversations = conversations;
    }

    pub fn push_page(&self, conversation_id: ConversationId, page_no: u32, page: MessagePage) {
        self.push_delayed_page(conversation_id, page_no, Duration::ZERO, page);
    }

    pub fn push_delayed_page(
        &self,
        conversation_id: ConversationId,
        page_no: u32,
        delay: Duration,
        page: MessagePage,
    ) {
        self.state()
            .pages
            .entry((conversation_id, page_no))
            .or_default()
            .push_back((delay, Ok(page)));
    }

    /// Answer a page request with `failure` after `delay`
    pub fn push_delayed_failure(
        &self,
        conversation_id: ConversationId,
        page_no: u32,
        delay: Duration,
        failure: Failure,
    ) {
        self.state()
            .pages
            .entry((conversation_id, page_no))
            .or_default()
            .push_back((delay, Err(failure)));
    }

    pub fn push_search(&self, delay: Duration, response: SearchResponse) {
        self.state().search_responses.push_back((delay, response));
    }
}

#[async_trait]
impl MessagingApi for FakeApi {
    async fn conversations(&self) -> Result<Vec<Conversation>, ClientError> {
        let mut state = self.state();
        state.check("conversations")?;
        Ok(state.conversations.clone())
    }

    async fn create_conversation(
        &self,
        request: &CreateConversationRequest,
    ) -> Result<Conversation, ClientError> {
        let mut state = self.state();
        state.check("create_conversation")?;
        state.created.push(request.clone());
        let id = state.next_conversation_id;
        state.next_conversation_id += 1;
        let mut conversation = Conversation::new(id, request.kind, request.participants.clone(), at(0));
        conversation.title = request.title.clone();
        conversation.workspace_id = request.workspace_id;
        conversation.workspace = request.workspace.clone();
        conversation.created_by = Some(state.user_id);
        state.conversations.push(conversation.clone());
        Ok(conversation)
    }

    async fn read_status(
        &self,
        conversation_id: Option<ConversationId>,
    ) -> Result<Vec<ConversationReadStatus>, ClientError> {
        let mut state = self.state();
        state.check("read_status")?;
        Ok(state
            .read_status
            .iter()
            .filter(|s| conversation_id.map_or(true, |id| s.conversation_id == id))
            .cloned()
            .collect())
    }

    async fn messages(
        &self,
        conversation_id: ConversationId,
        page_no: u32,
        _limit: u32,
    ) -> Result<MessagePage, ClientError> {
        let (delay, result) = {
            let mut state = self.state();
            state.page_requests.push((conversation_id, page_no));
            state.check("messages")?;
            let entry = match state.pages.get_mut(&(conversation_id, page_no)) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            };
            entry.unwrap_or_else(|| (Duration::ZERO, Ok(page(Vec::new(), page_no, page_no))))
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        result.map_err(ClientError::from)
    }

    async fn send_message(&self, request: &SendMessageRequest) -> Result<Message, ClientError> {
        let mut state = self.state();
        state.check("send_message")?;
        state.sent.push(request.clone());
        let id = state.next_message_id;
        state.next_message_id += 1;
        let mut message = Message::new_text(
            id,
            request.conversation_id,
            state.user_id,
            request.content.clone(),
            at(id),
        );
        message.message_type = request.message_type;
        message.reply_to_id = request.reply_to_id;
        Ok(message)
    }

    async fn mark_read(&self, message_id: MessageId) -> Result<ReadAck, ClientError> {
        let mut state = self.state();
        state.check("mark_read")?;
        state.read.push(message_id);
        Ok(ReadAck {
            read_at: Some(at(5_000)),
        })
    }

    async fn mark_multiple_read(&self, message_ids: &[MessageId]) -> Result<(), ClientError> {
        let mut state = self.state();
        state.check("mark_multiple_read")?;
        state.read_batches.push(message_ids.to_vec());
        Ok(())
    }

    async fn delivery_status(&self, message_id: MessageId) -> Result<DeliveryStatus, ClientError> {
        let mut state = self.state();
        state.check("delivery_status")?;
        state
            .delivery
            .get(&message_id)
            .cloned()
            .ok_or_else(|| ClientError::from_status(404, ""))
    }

    async fn delete_message(&self, message_id: MessageId) -> Result<(), ClientError> {
        let mut state = self.state();
        state.check("delete_message")?;
        state.deleted.push(message_id);
        Ok(())
    }

    async fn reactions(&self, message_id: MessageId) -> Result<Vec<ReactionSummary>, ClientError> {
        let mut state = self.state();
        state.check("reactions")?;
        Ok(state.reactions.get(&message_id).cloned().unwrap_or_default())
    }

    async fn add_reaction(&self, message_id: MessageId, emoji: &str) -> Result<Reaction, ClientError> {
        let mut state = self.state();
        state.check("add_reaction")?;
        state.added_reactions.push((message_id, emoji.to_string()));
        Ok(Reaction {
            id: 7_000 + state.added_reactions.len() as i64,
            message_id,
            user_id: state.user_id,
            emoji: emoji.to_string(),
            created_at: at(6_000),
            user: None,
        })
    }

    async fn toggle_reaction(
        &self,
        message_id: MessageId,
        emoji: &str,
    ) -> Result<ToggleReactionResponse, ClientError> {
        let mut state = self.state();
        state.check("toggle_reaction")?;
        state.toggles.push((message_id, emoji.to_string()));
        let user_id = state.user_id;
        let action = match state.toggle_action {
            Some(action) => action,
            None => {
                let reacted = state
                    .reactions
                    .get(&message_id)
                    .and_then(|list| list.iter().find(|s| s.emoji == emoji))
                    .map(|s| s.users.iter().any(|u| u.id == user_id))
                    .unwrap_or(false);
                if reacted {
                    ToggleAction::Removed
                } else {
                    ToggleAction::Added
                }
            }
        };
        Ok(ToggleReactionResponse {
            success: true,
            action,
            reaction: None,
        })
    }

    async fn remove_reaction(&self, message_id: MessageId, reaction_id: i64) -> Result<(), ClientError> {
        let mut state = self.state();
        state.check("remove_reaction")?;
        state.removed_reactions.push((message_id, reaction_id));
        Ok(())
    }

    async fn search(
        &self,
        filters: &SearchFilters,
        page_no: u32,
        per_page: u32,
    ) -> Result<SearchResponse, ClientError> {
        let (delay, response) = {
            let mut state = self.state();
            state.searches.push((filters.clone(), page_no));
            state.check("search")?;
            match state.search_responses.pop_front() {
                Some(entry) => entry,
                None => (
                    Duration::ZERO,
                    SearchResponse {
                        results: Vec::new(),
                        total: 0,
                        page: page_no,
                        per_page,
                        total_pages: 0,
                    },
                ),
            }
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(response)
    }

    async fn presence(&self) -> Result<Vec<UserPresence>, ClientError> {
        let mut state = self.state();
        state.check("presence")?;
        Ok(state.presence.clone())
    }

    async fn update_presence(&self, status: PresenceStatus) -> Result<(), ClientError> {
        let mut state = self.state();
        state.check("update_presence")?;
        state.presence_updates.push(status);
        Ok(())
    }

    async fn send_typing(&self, conversation_id: ConversationId, is_typing: bool) -> Result<(), ClientError> {
        let mut state = self.state();
        state.check("send_typing")?;
        state.typing.push((conversation_id, is_typing));
        Ok(())
    }
}
