//! Local Pusher-protocol push server
//!
//! Accepts any number of WebSocket clients, completes the Pusher
//! handshake, confirms subscriptions and lets a test publish events or
//! drop every connection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;

#[derive(Debug, Clone)]
enum Outgoing {
    Frame(String),
    Close,
}

pub struct PushServer {
    port: u16,
    subscriptions: Arc<Mutex<Vec<(usize, String)>>>,
    connections: Arc<AtomicUsize>,
    outgoing: broadcast::Sender<Outgoing>,
    task: JoinHandle<()>,
}

impl PushServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let subscriptions = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let (outgoing, _) = broadcast::channel(64);

        let task = {
            let subscriptions = subscriptions.clone();
            let connections = connections.clone();
            let outgoing = outgoing.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let number = connections.fetch_add(1, Ordering::SeqCst) + 1;
                    let rx = outgoing.subscribe();
                    let subscriptions = subscriptions.clone();
                    tokio::spawn(async move {
                        if let Ok(ws) = tokio_tungstenite::accept_async(stream).await {
                            serve(number, ws, rx, subscriptions).await;
                        }
                    });
                }
            })
        };

        Self {
            port,
            subscriptions,
            connections,
            outgoing,
            task,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Connections accepted so far
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Channels subscribed on connection `number` (1-based)
    pub fn subscriptions_on(&self, number: usize) -> Vec<String> {
        self.subscriptions
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _)| *n == number)
            .map(|(_, channel)| channel.clone())
            .collect()
    }

    pub fn is_subscribed(&self, channel: &str) -> bool {
        let number = self.connection_count();
        self.subscriptions_on(number).iter().any(|c| c == channel)
    }

    /// Publish an application event to every open connection
    pub fn emit(&self, channel: &str, event: &str, data: Value) {
        let frame = json!({
            "event": event,
            "channel": channel,
            "data": data.to_string(),
        });
        let _ = self.outgoing.send(Outgoing::Frame(frame.to_string()));
    }

    /// Close every open connection from the server side
    pub fn drop_connections(&self) {
        let _ = self.outgoing.send(Outgoing::Close);
    }
}

impl Drop for PushServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve<S>(
    number: usize,
    ws: tokio_tungstenite::WebSocketStream<S>,
    mut outgoing: broadcast::Receiver<Outgoing>,
    subscriptions: Arc<Mutex<Vec<(usize, String)>>>,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = ws.split();
    let established = json!({
        "event": "pusher:connection_established",
        "data": json!({ "socket_id": format!("{}.1", number), "activity_timeout": 120 }).to_string(),
    });
    if sink.send(WsMessage::Text(established.to_string())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            incoming = stream.next() => {
                let Some(Ok(WsMessage::Text(text))) = incoming else {
                    break;
                };
                let Ok(frame) = serde_json::from_str::<Value>(&text) else {
                    continue;
                };
                if frame["event"] == "pusher:subscribe" {
                    let channel = frame["data"]["channel"].as_str().unwrap_or_default().to_string();
                    subscriptions.lock().unwrap().push((number, channel.clone()));
                    let ok = json!({
                        "event": "pusher_internal:subscription_succeeded",
                        "channel": channel,
                        "data": "{}",
                    });
                    if sink.send(WsMessage::Text(ok.to_string())).await.is_err() {
                        break;
                    }
                }
            }
            message = outgoing.recv() => match message {
                Ok(Outgoing::Frame(text)) => {
                    if sink.send(WsMessage::Text(text)).await.is_err() {
                        break;
                    }
                }
                Ok(Outgoing::Close) | Err(_) => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    break;
                }
            }
        }
    }
}
