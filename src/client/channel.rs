//! Push Channel Client
//!
//! Wraps the single real-time connection of a session. The client keeps
//! the set of subscribed channel names so a reconnect can restore them,
//! tags every connection with a fresh id, and drops events that arrive
//! from a connection that has since been torn down.
//!
//! # Overview
//!
//! - [`PushTransport`] opens connections; [`PusherTransport`] speaks the
//!   Pusher channel protocol (revision 7) over a WebSocket.
//! - [`ChannelClient`] owns the current connection and forwards decoded
//!   [`PushEvent`]s and connection state changes as [`ChannelEvent`]s.
//!
//! The client does no buffering, ordering or retry of its own; reconnect
//! policy lives in the synchronizer.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use daydeskr::client::{ApiClient, ChannelClient, Config, PusherTransport};
//!
//! # async fn example() -> Result<(), daydeskr::client::ClientError> {
//! let config = Config::from_env()?;
//! let api = Arc::new(ApiClient::new(&config));
//! let transport = Arc::new(PusherTransport::new(config.app().push_url(), api.clone()));
//! let (channel, mut events) = ChannelClient::new(transport);
//! channel.connect().await?;
//! channel.subscribe(42).await?;
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use uuid::Uuid;

use crate::client::error::ClientError;
use crate::shared::event::{conversation_channel, PushEvent, PRESENCE_CHANNEL};
use crate::shared::messaging::ConversationId;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection state signal of the push channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }
}

/// Credentials for a private or presence channel subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelAuth {
    pub auth: String,
    #[serde(default)]
    pub channel_data: Option<String>,
}

/// Authorizes private/presence channel subscriptions
#[async_trait]
pub trait ChannelAuthorizer: Send + Sync {
    async fn authorize(&self, socket_id: &str, channel: &str) -> Result<ChannelAuth, ClientError>;
}

/// Raw event produced by an open connection
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Application event on a channel
    Message {
        channel: String,
        event: String,
        data: Value,
    },
    SubscriptionSucceeded {
        channel: String,
    },
    /// Protocol-level error reported by the server
    Error {
        message: String,
    },
    /// Connection is gone; no further events follow
    Closed {
        reason: Option<String>,
    },
}

/// Opens push connections
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Open a connection. Events are sent on `events` until the connection
    /// closes.
    async fn open(
        &self,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn PushConnection>, ClientError>;
}

/// One open push connection
#[async_trait]
pub trait PushConnection: Send + Sync {
    fn socket_id(&self) -> &str;

    async fn subscribe(&self, channel: &str) -> Result<(), ClientError>;

    async fn unsubscribe(&self, channel: &str) -> Result<(), ClientError>;

    async fn close(&self);
}

/// Event delivered by [`ChannelClient`]
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Push {
        connection_id: Uuid,
        channel: String,
        event: PushEvent,
    },
    StateChanged(ConnectionState),
    /// The live connection was closed by the remote end or the network
    ConnectionLost {
        connection_id: Uuid,
        reason: Option<String>,
    },
}

struct ActiveConnection {
    id: Uuid,
    connection: Box<dyn PushConnection>,
    pump: JoinHandle<()>,
}

#[derive(Default)]
struct Inner {
    active: Option<ActiveConnection>,
    channels: BTreeSet<String>,
}

/// Client side of the push channel
pub struct ChannelClient {
    transport: Arc<dyn PushTransport>,
    inner: Mutex<Inner>,
    current: Arc<watch::Sender<Option<Uuid>>>,
    state: Arc<watch::Sender<ConnectionState>>,
    events_tx: mpsc::UnboundedSender<ChannelEvent>,
}

impl ChannelClient {
    /// Create a client and the receiver of its events
    pub fn new(
        transport: Arc<dyn PushTransport>,
    ) -> (Self, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (current, _) = watch::channel(None);
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let client = Self {
            transport,
            inner: Mutex::new(Inner::default()),
            current: Arc::new(current),
            state: Arc::new(state),
            events_tx,
        };
        (client, events_rx)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch connection state changes
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Id of the live connection, if any
    pub fn connection_id(&self) -> Option<Uuid> {
        *self.current.borrow()
    }

    pub async fn subscribed_channels(&self) -> Vec<String> {
        self.inner.lock().await.channels.iter().cloned().collect()
    }

    pub async fn is_subscribed(&self, conversation_id: ConversationId) -> bool {
        self.inner
            .lock()
            .await
            .channels
            .contains(&conversation_channel(conversation_id))
    }

    /// Open the connection if none is live
    pub async fn connect(&self) -> Result<(), ClientError> {
        let mut inner = self.inner.lock().await;
        if inner.active.is_some() && self.state().is_connected() {
            return Ok(());
        }
        self.teardown(&mut inner).await;
        self.open(&mut inner).await?;
        self.resubscribe(&inner).await;
        Ok(())
    }

    /// Tear down the current connection, open a new one and re-subscribe
    /// every previously subscribed channel.
    pub async fn reconnect(&self) -> Result<(), ClientError> {
        tracing::info!("[PUSH] Reconnecting");
        let mut inner = self.inner.lock().await;
        self.teardown(&mut inner).await;
        self.open(&mut inner).await?;
        self.resubscribe(&inner).await;
        Ok(())
    }

    /// Close the connection and forget all subscriptions
    pub async fn disconnect(&self) {
        let mut inner = self.inner.lock().await;
        self.teardown(&mut inner).await;
        inner.channels.clear();
        self.set_state(ConnectionState::Disconnected);
        tracing::info!("[PUSH] Disconnected");
    }

    /// Subscribe the message channel of a conversation
    pub async fn subscribe(&self, conversation_id: ConversationId) -> Result<(), ClientError> {
        self.subscribe_channel(&conversation_channel(conversation_id))
            .await
    }

    pub async fn unsubscribe(&self, conversation_id: ConversationId) -> Result<(), ClientError> {
        self.unsubscribe_channel(&conversation_channel(conversation_id))
            .await
    }

    /// Subscribe the shared presence channel
    pub async fn subscribe_presence(&self) -> Result<(), ClientError> {
        self.subscribe_channel(PRESENCE_CHANNEL).await
    }

    /// Record `channel` and subscribe it on the live connection.
    ///
    /// Without a live connection the channel is only recorded and will be
    /// subscribed by the next `connect`/`reconnect`.
    pub async fn subscribe_channel(&self, channel: &str) -> Result<(), ClientError> {
        let mut inner = self.inner.lock().await;
        if !inner.channels.insert(channel.to_string()) {
            return Ok(());
        }
        if let Some(active) = inner.active.as_ref() {
            if let Err(e) = active.connection.subscribe(channel).await {
                inner.channels.remove(channel);
                return Err(e);
            }
            tracing::info!("[PUSH] Subscribed to {}", channel);
        }
        Ok(())
    }

    pub async fn unsubscribe_channel(&self, channel: &str) -> Result<(), ClientError> {
        let mut inner = self.inner.lock().await;
        if !inner.channels.remove(channel) {
            return Ok(());
        }
        if let Some(active) = inner.active.as_ref() {
            active.connection.unsubscribe(channel).await?;
            tracing::info!("[PUSH] Unsubscribed from {}", channel);
        }
        Ok(())
    }

    fn set_state(&self, state: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            let _ = self.events_tx.send(ChannelEvent::StateChanged(state));
        }
    }

    async fn open(&self, inner: &mut Inner) -> Result<(), ClientError> {
        self.set_state(ConnectionState::Connecting);
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = match self.transport.open(tx).await {
            Ok(connection) => connection,
            Err(e) => {
                tracing::error!("[PUSH] Connection failed: {}", e);
                self.set_state(ConnectionState::Error);
                return Err(e);
            }
        };

        let id = Uuid::new_v4();
        self.current.send_replace(Some(id));
        let pump = tokio::spawn(pump_events(
            id,
            rx,
            self.current.clone(),
            self.state.clone(),
            self.events_tx.clone(),
        ));
        tracing::info!(
            "[PUSH] Connected: connection={}, socket={}",
            id,
            connection.socket_id()
        );
        inner.active = Some(ActiveConnection {
            id,
            connection,
            pump,
        });
        self.set_state(ConnectionState::Connected);
        Ok(())
    }

    async fn resubscribe(&self, inner: &Inner) {
        let Some(active) = inner.active.as_ref() else {
            return;
        };
        for channel in &inner.channels {
            match active.connection.subscribe(channel).await {
                Ok(()) => tracing::info!("[PUSH] Re-subscribed to {}", channel),
                Err(e) => tracing::warn!("[PUSH] Failed to re-subscribe {}: {}", channel, e),
            }
        }
    }

    async fn teardown(&self, inner: &mut Inner) {
        if let Some(active) = inner.active.take() {
            // Invalidate first so anything still in flight is dropped.
            self.current.send_replace(None);
            active.connection.close().await;
            active.pump.abort();
            tracing::debug!("[PUSH] Tore down connection {}", active.id);
        }
    }
}

/// Forward events of connection `id` while it is the current one
async fn pump_events(
    id: Uuid,
    mut rx: mpsc::UnboundedReceiver<TransportEvent>,
    current: Arc<watch::Sender<Option<Uuid>>>,
    state: Arc<watch::Sender<ConnectionState>>,
    events_tx: mpsc::UnboundedSender<ChannelEvent>,
) {
    let is_current = || *current.borrow() == Some(id);

    while let Some(event) = rx.recv().await {
        if !is_current() {
            tracing::debug!("[PUSH] Dropping event from stale connection {}", id);
            continue;
        }
        match event {
            TransportEvent::Message {
                channel,
                event,
                data,
            } => match PushEvent::decode(&event, data) {
                Ok(decoded) => {
                    tracing::debug!("[PUSH] {} on {}", decoded.name(), channel);
                    let _ = events_tx.send(ChannelEvent::Push {
                        connection_id: id,
                        channel,
                        event: decoded,
                    });
                }
                Err(e) => tracing::warn!("[PUSH] Undecodable {} on {}: {}", event, channel, e),
            },
            TransportEvent::SubscriptionSucceeded { channel } => {
                tracing::debug!("[PUSH] Subscription to {} confirmed", channel);
            }
            TransportEvent::Error { message } => {
                tracing::warn!("[PUSH] Server error: {}", message);
            }
            TransportEvent::Closed { reason } => {
                tracing::warn!(
                    "[PUSH] Connection {} closed: {}",
                    id,
                    reason.as_deref().unwrap_or("no reason")
                );
                current.send_replace(None);
                state.send_replace(ConnectionState::Disconnected);
                let _ = events_tx.send(ChannelEvent::StateChanged(ConnectionState::Disconnected));
                let _ = events_tx.send(ChannelEvent::ConnectionLost {
                    connection_id: id,
                    reason,
                });
                break;
            }
        }
    }
}

// ========== Pusher protocol ==========

#[derive(Debug, Deserialize)]
struct PusherFrame {
    event: String,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ConnectionEstablished {
    socket_id: String,
}

/// `data` is either a JSON object or a string holding JSON
fn decode_data(data: Option<Value>) -> Value {
    match data {
        Some(Value::String(text)) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        Some(value) => value,
        None => Value::Null,
    }
}

fn error_message(data: &Value) -> String {
    data.get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| data.to_string())
}

fn needs_auth(channel: &str) -> bool {
    channel.starts_with("private-") || channel.starts_with("presence-")
}

/// Read frames until `pusher:connection_established` and return the socket id
async fn wait_established<S>(stream: &mut S) -> Result<String, ClientError>
where
    S: Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        let WsMessage::Text(text) = frame? else {
            continue;
        };
        let frame: PusherFrame = serde_json::from_str(&text)?;
        match frame.event.as_str() {
            "pusher:connection_established" => {
                let established: ConnectionEstablished =
                    serde_json::from_value(decode_data(frame.data))?;
                return Ok(established.socket_id);
            }
            "pusher:error" => {
                return Err(ClientError::transport(error_message(&decode_data(frame.data))));
            }
            _ => {}
        }
    }
    Err(ClientError::transport("connection closed during handshake"))
}

/// [`PushTransport`] speaking the Pusher channel protocol over WebSocket
pub struct PusherTransport {
    url: String,
    authorizer: Arc<dyn ChannelAuthorizer>,
}

impl PusherTransport {
    pub fn new(url: impl Into<String>, authorizer: Arc<dyn ChannelAuthorizer>) -> Self {
        Self {
            url: url.into(),
            authorizer,
        }
    }
}

#[async_trait]
impl PushTransport for PusherTransport {
    async fn open(
        &self,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn PushConnection>, ClientError> {
        tracing::info!("[PUSH] Opening {}", self.url);
        let (socket, _) = tokio_tungstenite::connect_async(self.url.as_str()).await?;
        let (mut sink, mut stream) = socket.split();

        let socket_id = tokio::time::timeout(HANDSHAKE_TIMEOUT, wait_established(&mut stream))
            .await
            .map_err(|_| ClientError::transport("handshake timed out"))??;

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<WsMessage>();

        tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                let closing = matches!(message, WsMessage::Close(_));
                if let Err(e) = sink.send(message).await {
                    tracing::warn!("[PUSH] Write failed: {}", e);
                    break;
                }
                if closing {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let pong_tx = out_tx.clone();
        let reader = tokio::spawn(async move {
            let reason = loop {
                let frame = match stream.next().await {
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => break Some(e.to_string()),
                    None => break None,
                };
                let text = match frame {
                    WsMessage::Text(text) => text,
                    WsMessage::Close(close) => break close.map(|c| c.reason.to_string()),
                    _ => continue,
                };
                let frame: PusherFrame = match serde_json::from_str(&text) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!("[PUSH] Malformed frame: {}", e);
                        continue;
                    }
                };
                let event = match frame.event.as_str() {
                    "pusher:ping" => {
                        let pong = json!({ "event": "pusher:pong", "data": {} });
                        let _ = pong_tx.send(WsMessage::Text(pong.to_string()));
                        continue;
                    }
                    "pusher_internal:subscription_succeeded" => TransportEvent::SubscriptionSucceeded {
                        channel: frame.channel.unwrap_or_default(),
                    },
                    "pusher:error" => TransportEvent::Error {
                        message: error_message(&decode_data(frame.data)),
                    },
                    name if name.starts_with("pusher") => continue,
                    _ => match frame.channel {
                        Some(channel) => TransportEvent::Message {
                            channel,
                            event: frame.event.clone(),
                            data: decode_data(frame.data),
                        },
                        None => continue,
                    },
                };
                if events.send(event).is_err() {
                    return;
                }
            };
            let _ = events.send(TransportEvent::Closed { reason });
        });

        Ok(Box::new(PusherConnection {
            socket_id,
            authorizer: self.authorizer.clone(),
            out_tx,
            reader,
        }))
    }
}

struct PusherConnection {
    socket_id: String,
    authorizer: Arc<dyn ChannelAuthorizer>,
    out_tx: mpsc::UnboundedSender<WsMessage>,
    reader: JoinHandle<()>,
}

impl PusherConnection {
    fn send_frame(&self, frame: Value) -> Result<(), ClientError> {
        self.out_tx
            .send(WsMessage::Text(frame.to_string()))
            .map_err(|_| ClientError::transport("connection is closed"))
    }
}

#[async_trait]
impl PushConnection for PusherConnection {
    fn socket_id(&self) -> &str {
        &self.socket_id
    }

    async fn subscribe(&self, channel: &str) -> Result<(), ClientError> {
        let mut data = json!({ "channel": channel });
        if needs_auth(channel) {
            let auth = self.authorizer.authorize(&self.socket_id, channel).await?;
            data["auth"] = Value::String(auth.auth);
            if let Some(channel_data) = auth.channel_data {
                data["channel_data"] = Value::String(channel_data);
            }
        }
        self.send_frame(json!({ "event": "pusher:subscribe", "data": data }))
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), ClientError> {
        self.send_frame(json!({
            "event": "pusher:unsubscribe",
            "data": { "channel": channel }
        }))
    }

    async fn close(&self) {
        self.reader.abort();
        let _ = self.out_tx.send(WsMessage::Close(None));
    }
}

impl Drop for PusherConnection {
    fn drop(&mut self) {
        // The writer exits on its own once every sender is gone.
        self.reader.abort();
    }
}
