//! Messaging REST API Client
//!
//! [`MessagingApi`] is the seam between the client components and the
//! backend; [`ApiClient`] implements it over `reqwest`. Tests substitute
//! in-memory fakes.
//!
//! Every request carries `Authorization: Bearer <token>` and
//! `Accept: application/json`. The backend answers either with the bare
//! payload or wrapped in `{ "success": true, "data" | "message" | ...: payload }`;
//! both shapes are accepted.
//!
//! A 401 response clears the stored token and notifies every receiver of
//! [`ApiClient::session_expired`]. The request is not retried.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};

use crate::client::channel::{ChannelAuth, ChannelAuthorizer};
use crate::client::config::Config;
use crate::client::error::ClientError;
use crate::shared::config::AppConfig;
use crate::shared::messaging::{
    Conversation, ConversationId, ConversationReadStatus, CreateConversationRequest,
    DeliveryStatus, MarkMultipleReadRequest, Message, MessageId, MessagePage, PageMeta,
    PresenceStatus, PresenceStatusRequest, Reaction, ReactionRequest, ReactionSummary, ReadAck,
    SearchFilters, SearchParams, SearchResponse, SendMessageRequest, ToggleReactionResponse,
    TypingRequest, UserPresence,
};

/// REST operations used by the messaging core
#[async_trait]
pub trait MessagingApi: Send + Sync {
    async fn conversations(&self) -> Result<Vec<Conversation>, ClientError>;

    async fn create_conversation(
        &self,
        request: &CreateConversationRequest,
    ) -> Result<Conversation, ClientError>;

    async fn read_status(
        &self,
        conversation_id: Option<ConversationId>,
    ) -> Result<Vec<ConversationReadStatus>, ClientError>;

    async fn messages(
        &self,
        conversation_id: ConversationId,
        page: u32,
        limit: u32,
    ) -> Result<MessagePage, ClientError>;

    async fn send_message(&self, request: &SendMessageRequest) -> Result<Message, ClientError>;

    async fn mark_read(&self, message_id: MessageId) -> Result<ReadAck, ClientError>;

    async fn mark_multiple_read(&self, message_ids: &[MessageId]) -> Result<(), ClientError>;

    async fn delivery_status(&self, message_id: MessageId) -> Result<DeliveryStatus, ClientError>;

    async fn delete_message(&self, message_id: MessageId) -> Result<(), ClientError>;

    async fn reactions(&self, message_id: MessageId) -> Result<Vec<ReactionSummary>, ClientError>;

    async fn add_reaction(&self, message_id: MessageId, emoji: &str) -> Result<Reaction, ClientError>;

    async fn toggle_reaction(
        &self,
        message_id: MessageId,
        emoji: &str,
    ) -> Result<ToggleReactionResponse, ClientError>;

    async fn remove_reaction(&self, message_id: MessageId, reaction_id: i64) -> Result<(), ClientError>;

    async fn search(
        &self,
        filters: &SearchFilters,
        page: u32,
        per_page: u32,
    ) -> Result<SearchResponse, ClientError>;

    async fn presence(&self) -> Result<Vec<UserPresence>, ClientError>;

    async fn update_presence(&self, status: PresenceStatus) -> Result<(), ClientError>;

    async fn send_typing(&self, conversation_id: ConversationId, is_typing: bool) -> Result<(), ClientError>;
}

/// `reqwest` implementation of [`MessagingApi`] and [`ChannelAuthorizer`]
pub struct ApiClient {
    app: AppConfig,
    client: Client,
    token: RwLock<Option<String>>,
    expired_tx: broadcast::Sender<()>,
}

impl ApiClient {
    pub fn new(config: &Config) -> Self {
        let (expired_tx, _) = broadcast::channel(4);
        Self {
            app: config.app().clone(),
            client: Client::new(),
            token: RwLock::new(config.get_token().cloned()),
            expired_tx,
        }
    }

    pub async fn set_token(&self, token: Option<String>) {
        *self.token.write().await = token;
    }

    pub async fn token(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.token.read().await.is_some()
    }

    /// Receiver notified once per rejected credential
    pub fn session_expired(&self) -> broadcast::Receiver<()> {
        self.expired_tx.subscribe()
    }

    fn url(&self, path: &str) -> String {
        self.app.api_endpoint(path)
    }

    async fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, ClientError> {
        let token = self.token().await.ok_or(ClientError::NotAuthenticated)?;
        Ok(request
            .header("Authorization", format!("Bearer {}", token))
            .header("Accept", "application/json"))
    }

    /// Send an authorized request and return the JSON body (`Null` if empty)
    async fn execute(&self, request: RequestBuilder) -> Result<Value, ClientError> {
        let response = self
            .authorized(request)
            .await?
            .send()
            .await
            .map_err(|e| ClientError::network(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 401 {
            tracing::warn!("[API] Credential rejected, clearing session token");
            *self.token.write().await = None;
            let _ = self.expired_tx.send(());
            return Err(ClientError::Unauthorized);
        }

        let body = response
            .text()
            .await
            .map_err(|e| ClientError::network(e.to_string()))?;

        if !status.is_success() {
            tracing::warn!("[API] Request failed: {} - {}", status, body);
            return Err(ClientError::from_status(status.as_u16(), &error_text(&body)));
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        let value: Value = serde_json::from_str(&body)?;
        if value.get("success") == Some(&Value::Bool(false)) {
            return Err(ClientError::Rejected {
                message: error_text(&body),
            });
        }
        Ok(value)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, keys: &[&str]) -> Result<T, ClientError> {
        let value = self.execute(self.client.get(self.url(path))).await?;
        unwrap_envelope(value, keys)
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        keys: &[&str],
    ) -> Result<T, ClientError> {
        let value = self.execute(self.client.post(self.url(path)).json(body)).await?;
        unwrap_envelope(value, keys)
    }
}

/// Extract a payload from a bare or enveloped response body.
///
/// Wrapper keys are tried first, in order, then the whole value.
pub fn unwrap_envelope<T: DeserializeOwned>(value: Value, keys: &[&str]) -> Result<T, ClientError> {
    if let Value::Object(map) = &value {
        for key in keys {
            if let Some(inner) = map.get(*key) {
                if let Ok(payload) = serde_json::from_value::<T>(inner.clone()) {
                    return Ok(payload);
                }
            }
        }
    }
    serde_json::from_value(value).map_err(|e| ClientError::decode(e.to_string()))
}

/// Best-effort human-readable error text from a response body
fn error_text(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        error: Option<String>,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { message: Some(m), .. }) => m,
        Ok(ErrorBody { error: Some(e), .. }) => e,
        _ => body.to_string(),
    }
}

#[async_trait]
impl MessagingApi for ApiClient {
    async fn conversations(&self) -> Result<Vec<Conversation>, ClientError> {
        self.get("/api/conversations", &["data", "conversations"]).await
    }

    async fn create_conversation(
        &self,
        request: &CreateConversationRequest,
    ) -> Result<Conversation, ClientError> {
        self.post("/api/conversations", request, &["data", "conversation"])
            .await
    }

    async fn read_status(
        &self,
        conversation_id: Option<ConversationId>,
    ) -> Result<Vec<ConversationReadStatus>, ClientError> {
        let mut request = self.client.get(self.url("/api/conversations/read-status"));
        if let Some(id) = conversation_id {
            request = request.query(&[("conversation_id", id)]);
        }
        let value = self.execute(request).await?;
        match unwrap_envelope::<Vec<ConversationReadStatus>>(value.clone(), &["data"]) {
            Ok(list) => Ok(list),
            Err(_) => unwrap_envelope::<ConversationReadStatus>(value, &["data"]).map(|s| vec![s]),
        }
    }

    async fn messages(
        &self,
        conversation_id: ConversationId,
        page: u32,
        limit: u32,
    ) -> Result<MessagePage, ClientError> {
        let request = self
            .client
            .get(self.url(&format!("/api/conversations/{}/messages", conversation_id)))
            .query(&[("page", page), ("limit", limit)]);
        let value = self.execute(request).await?;

        if let Ok(page) = serde_json::from_value::<MessagePage>(value.clone()) {
            return Ok(page);
        }
        // Unpaginated list: treat as the only page.
        let data: Vec<Message> = unwrap_envelope(value, &["data", "messages"])?;
        let total = data.len() as u64;
        Ok(MessagePage {
            data,
            meta: PageMeta {
                current_page: page,
                last_page: page,
                total,
            },
        })
    }

    async fn send_message(&self, request: &SendMessageRequest) -> Result<Message, ClientError> {
        self.post("/api/messages", request, &["message", "data"]).await
    }

    async fn mark_read(&self, message_id: MessageId) -> Result<ReadAck, ClientError> {
        let request = self
            .client
            .patch(self.url(&format!("/api/messages/{}/read", message_id)));
        let value = self.execute(request).await?;
        if value.is_null() {
            return Ok(ReadAck { read_at: None });
        }
        unwrap_envelope(value, &["data"])
    }

    async fn mark_multiple_read(&self, message_ids: &[MessageId]) -> Result<(), ClientError> {
        let body = MarkMultipleReadRequest {
            message_ids: message_ids.to_vec(),
        };
        self.execute(
            self.client
                .post(self.url("/api/messages/mark-multiple-read"))
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn delivery_status(&self, message_id: MessageId) -> Result<DeliveryStatus, ClientError> {
        self.get(&format!("/api/messages/{}/delivery-status", message_id), &["data"])
            .await
    }

    async fn delete_message(&self, message_id: MessageId) -> Result<(), ClientError> {
        self.execute(
            self.client
                .delete(self.url(&format!("/api/messages/{}", message_id))),
        )
        .await?;
        Ok(())
    }

    async fn reactions(&self, message_id: MessageId) -> Result<Vec<ReactionSummary>, ClientError> {
        self.get(
            &format!("/api/messages/{}/reactions", message_id),
            &["reactions", "data"],
        )
        .await
    }

    async fn add_reaction(&self, message_id: MessageId, emoji: &str) -> Result<Reaction, ClientError> {
        let body = ReactionRequest {
            emoji: emoji.to_string(),
        };
        self.post(
            &format!("/api/messages/{}/reactions", message_id),
            &body,
            &["reaction", "data"],
        )
        .await
    }

    async fn toggle_reaction(
        &self,
        message_id: MessageId,
        emoji: &str,
    ) -> Result<ToggleReactionResponse, ClientError> {
        let body = ReactionRequest {
            emoji: emoji.to_string(),
        };
        let request = self
            .client
            .patch(self.url(&format!("/api/messages/{}/reactions/toggle", message_id)))
            .json(&body);
        let value = self.execute(request).await?;
        unwrap_envelope(value, &["data"])
    }

    async fn remove_reaction(&self, message_id: MessageId, reaction_id: i64) -> Result<(), ClientError> {
        let request = self.client.delete(self.url(&format!(
            "/api/messages/{}/reactions/{}",
            message_id, reaction_id
        )));
        self.execute(request).await?;
        Ok(())
    }

    async fn search(
        &self,
        filters: &SearchFilters,
        page: u32,
        per_page: u32,
    ) -> Result<SearchResponse, ClientError> {
        let params = SearchParams {
            filters,
            page,
            per_page,
        };
        let request = self
            .client
            .get(self.url("/api/messages/search"))
            .query(&params);
        let value = self.execute(request).await?;
        unwrap_envelope(value, &["data"])
    }

    async fn presence(&self) -> Result<Vec<UserPresence>, ClientError> {
        self.get("/api/user-presence", &["presence", "data"]).await
    }

    async fn update_presence(&self, status: PresenceStatus) -> Result<(), ClientError> {
        let request = self
            .client
            .patch(self.url("/api/user-presence"))
            .json(&PresenceStatusRequest { status });
        self.execute(request).await?;
        Ok(())
    }

    async fn send_typing(&self, conversation_id: ConversationId, is_typing: bool) -> Result<(), ClientError> {
        let body = TypingRequest {
            conversation_id,
            is_typing,
        };
        self.execute(
            self.client
                .post(self.url("/api/user-presence/typing"))
                .json(&body),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ChannelAuthorizer for ApiClient {
    async fn authorize(&self, socket_id: &str, channel: &str) -> Result<ChannelAuth, ClientError> {
        tracing::debug!("[API] Authorizing channel {} for socket {}", channel, socket_id);
        let request = self
            .client
            .post(self.app.auth_url())
            .form(&[("socket_id", socket_id), ("channel_name", channel)]);
        let value = self.execute(request).await?;
        unwrap_envelope(value, &["data"])
    }
}
