//! Messaging context
//!
//! Owns one session's worth of client components and wires them
//! together: the synchronizer consumes channel events, the notification
//! badge follows the store's unread total, and a rejected credential
//! expires the whole session.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::client::api::{ApiClient, MessagingApi};
use crate::client::channel::{ChannelClient, ChannelEvent, PushTransport, PusherTransport};
use crate::client::config::Config;
use crate::client::error::ClientError;
use crate::client::presence::PresenceTracker;
use crate::client::reactions::ReactionTracker;
use crate::client::replies::Replies;
use crate::client::search::{MessageSearch, SearchHistory, HISTORY_FILE};
use crate::client::store::{MessageStore, SharedStore, StoreEvent};
use crate::client::sync::Synchronizer;
use crate::shared::messaging::{PresenceStatus, UserRef};

/// Badge state shown by a host application
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotificationState {
    pub unread_messages: u32,
    pub has_unread_notifications: bool,
}

impl NotificationState {
    pub fn has_notifications(&self) -> bool {
        self.has_unread_notifications || self.unread_messages > 0
    }

    pub fn display_badge(&self) -> bool {
        self.has_notifications()
    }
}

/// Notification badge derived from the store's unread total
pub struct Notifications {
    state: watch::Sender<NotificationState>,
}

impl Default for Notifications {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifications {
    pub fn new() -> Self {
        let (state, _) = watch::channel(NotificationState::default());
        Self { state }
    }

    pub fn state(&self) -> NotificationState {
        *self.state.borrow()
    }

    /// Watch badge changes
    pub fn subscribe(&self) -> watch::Receiver<NotificationState> {
        self.state.subscribe()
    }

    pub fn total_unread(&self) -> u32 {
        self.state().unread_messages
    }

    pub fn set_unread_messages(&self, count: u32) {
        self.state.send_if_modified(|s| {
            let changed = s.unread_messages != count;
            s.unread_messages = count;
            changed
        });
    }

    pub fn set_has_unread_notifications(&self, has_unread: bool) {
        self.state.send_if_modified(|s| {
            let changed = s.has_unread_notifications != has_unread;
            s.has_unread_notifications = has_unread;
            changed
        });
    }

    pub fn clear_all(&self) {
        self.state.send_replace(NotificationState::default());
    }

    /// Follow the store's unread total until the store goes away
    async fn follow(self: Arc<Self>, store: SharedStore, mut events: broadcast::Receiver<StoreEvent>) {
        loop {
            match events.recv().await {
                Ok(StoreEvent::UnreadChanged { .. }) | Ok(StoreEvent::Reset) => {}
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("[NOTIFY] Skipped {} store events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
            let total = store.read().await.total_unread();
            self.set_unread_messages(total);
        }
    }
}

/// One signed-in messaging session
pub struct MessagingContext {
    config: Config,
    store: SharedStore,
    channel: Arc<ChannelClient>,
    sync: Arc<Synchronizer>,
    presence: Arc<PresenceTracker>,
    reactions: Arc<ReactionTracker>,
    search: Arc<MessageSearch>,
    replies: Arc<Replies>,
    notifications: Arc<Notifications>,
    channel_events: Mutex<Option<mpsc::UnboundedReceiver<ChannelEvent>>>,
    session_expired: Mutex<Option<broadcast::Receiver<()>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MessagingContext {
    /// Build a context talking to the configured backend and push server
    pub fn init(config: Config) -> Self {
        let api = Arc::new(ApiClient::new(&config));
        let transport = Arc::new(PusherTransport::new(config.app().push_url(), api.clone()));
        let expired = api.session_expired();
        Self::from_parts(config, api, transport, Some(expired))
    }

    /// Build a context over arbitrary API and transport implementations.
    ///
    /// `session_expired` fires when the API layer sees a rejected
    /// credential.
    pub fn from_parts(
        config: Config,
        api: Arc<dyn MessagingApi>,
        transport: Arc<dyn PushTransport>,
        session_expired: Option<broadcast::Receiver<()>>,
    ) -> Self {
        let app = config.app().clone();
        let store = MessageStore::new().shared();
        let (channel, channel_events) = ChannelClient::new(transport);
        let channel = Arc::new(channel);
        let presence = Arc::new(PresenceTracker::new(api.clone()));
        let reactions = Arc::new(ReactionTracker::new(api.clone()));
        let sync = Arc::new(Synchronizer::new(
            &app,
            api.clone(),
            channel.clone(),
            store.clone(),
            presence.clone(),
            reactions.clone(),
        ));
        let history = SearchHistory::load(config.data_dir().join(HISTORY_FILE), app.search_history_limit);
        let search = Arc::new(MessageSearch::new(api, &app, history));
        let replies = Arc::new(Replies::new(sync.clone(), app.reply_depth_limit));

        Self {
            config,
            store,
            channel,
            sync,
            presence,
            reactions,
            search,
            replies,
            notifications: Arc::new(Notifications::new()),
            channel_events: Mutex::new(Some(channel_events)),
            session_expired: Mutex::new(session_expired),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Start background tasks, connect the push channel and load the
    /// conversation list.
    pub async fn start(&self) -> Result<(), ClientError> {
        let user_id = self.config.current_user_id();
        self.store.write().await.set_current_user(user_id);
        if let Some(id) = user_id {
            self.reactions
                .set_current_user(Some(UserRef {
                    id,
                    name: String::new(),
                }))
                .await;
        }

        self.spawn_tasks().await;

        self.channel.connect().await?;
        self.channel.subscribe_presence().await?;
        if let Err(e) = self.presence.initialize().await {
            tracing::warn!("[CONTEXT] Presence unavailable: {}", e);
        }
        if let Err(e) = self.presence.update_own_presence(PresenceStatus::Online).await {
            tracing::warn!("[CONTEXT] Could not report online status: {}", e);
        }
        self.sync.load_conversations().await?;
        tracing::info!("[CONTEXT] Messaging session started");
        Ok(())
    }

    async fn spawn_tasks(&self) {
        let mut tasks = self.tasks.lock().await;

        if let Some(events) = self.channel_events.lock().await.take() {
            tasks.push(tokio::spawn(self.sync.clone().run(events)));
        }

        let store_events = self.store.read().await.subscribe();
        tasks.push(tokio::spawn(
            self.notifications
                .clone()
                .follow(self.store.clone(), store_events),
        ));

        if let Some(mut expired) = self.session_expired.lock().await.take() {
            let sync = self.sync.clone();
            tasks.push(tokio::spawn(async move {
                loop {
                    match expired.recv().await {
                        Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                            sync.expire_session().await;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }));
        }
    }

    /// Subscribe the channel of every loaded conversation
    pub async fn subscribe_all(&self) -> Result<usize, ClientError> {
        let ids: Vec<_> = self
            .store
            .read()
            .await
            .conversations()
            .iter()
            .map(|c| c.id)
            .collect();
        for id in &ids {
            self.channel.subscribe(*id).await?;
        }
        Ok(ids.len())
    }

    /// Stop background work, report offline and drop all session state
    pub async fn teardown(&self) {
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        self.presence.teardown().await;
        self.channel.disconnect().await;
        self.search.clear().await;
        self.reactions.clear_all().await;
        self.replies.clear_reply_context().await;
        self.store.write().await.reset();
        self.notifications.clear_all();
        tracing::info!("[CONTEXT] Messaging session closed");
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn channel(&self) -> &Arc<ChannelClient> {
        &self.channel
    }

    pub fn sync(&self) -> &Arc<Synchronizer> {
        &self.sync
    }

    pub fn presence(&self) -> &Arc<PresenceTracker> {
        &self.presence
    }

    pub fn reactions(&self) -> &Arc<ReactionTracker> {
        &self.reactions
    }

    pub fn search(&self) -> &Arc<MessageSearch> {
        &self.search
    }

    pub fn replies(&self) -> &Arc<Replies> {
        &self.replies
    }

    pub fn notifications(&self) -> &Arc<Notifications> {
        &self.notifications
    }
}
