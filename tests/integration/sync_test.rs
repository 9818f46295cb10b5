//! Synchronizer against the REST backend

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use daydeskr::client::{
    ApiClient, ChannelClient, ClientError, Config, LoadOutcome, MessageStore, PresenceTracker, PusherTransport,
    ReactionTracker, StoreEvent, Synchronizer,
};
use daydeskr::shared::messaging::WorkspaceRef;

use crate::common::*;
use crate::{assert_err, assert_ok};

struct Client {
    api: Arc<ApiClient>,
    sync: Arc<Synchronizer>,
}

async fn client(config: &Config) -> Client {
    let api = Arc::new(ApiClient::new(config));
    let transport = Arc::new(PusherTransport::new(config.app().push_url(), api.clone()));
    let (channel, _events) = ChannelClient::new(transport);
    let store = MessageStore::new().shared();
    store.write().await.set_current_user(config.current_user_id());
    let sync = Arc::new(Synchronizer::new(
        config.app(),
        api.clone(),
        Arc::new(channel),
        store,
        Arc::new(PresenceTracker::new(api.clone())),
        Arc::new(ReactionTracker::new(api.clone())),
    ));
    Client { api, sync }
}

#[tokio::test]
async fn test_load_conversations_and_pages() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_conversations(&server, vec![conversation_json(7, &[1, 2])]).await;
    mount_page(
        &server,
        7,
        1,
        page_json(
            vec![message_json(3, 7, 2, "third", 30), message_json(2, 7, 1, "second", 20)],
            1,
            2,
        ),
    )
    .await;
    mount_page(&server, 7, 2, page_json(vec![message_json(1, 7, 2, "first", 10)], 2, 2)).await;

    let client = client(&config_for(&server, None, dir.path())).await;
    assert_eq!(assert_ok!(client.sync.load_conversations().await), 1);

    let outcome = assert_ok!(client.sync.select_conversation(7).await);
    assert_eq!(outcome, LoadOutcome::Loaded { count: 2, has_more: true });
    let outcome = assert_ok!(client.sync.load_messages(7, 2).await);
    assert_eq!(outcome, LoadOutcome::Loaded { count: 1, has_more: false });

    let store = client.sync.store().read().await;
    let ids: Vec<i64> = store.messages_for(7).iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    // Messages 1 and 3 come from the other participant and are unread.
    assert_eq!(store.unread_count(7), 2);
    assert_eq!(store.active_conversation_id(), Some(7));
}

#[tokio::test]
async fn test_send_reply_and_mark_conversation_read() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_conversations(&server, vec![conversation_json(7, &[1, 2])]).await;
    mount_page(&server, 7, 1, page_json(vec![message_json(3, 7, 2, "ping", 30)], 1, 1)).await;
    Mock::given(method("POST"))
        .and(path("/api/messages"))
        .and(header("Authorization", format!("Bearer {}", TEST_TOKEN).as_str()))
        .and(body_json(json!({
            "conversation_id": 7,
            "type": "text",
            "content": "pong",
            "reply_to_id": 3
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "success": true,
            "message": message_json(4, 7, 1, "pong", 40),
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/messages/mark-multiple-read"))
        .and(body_json(json!({ "message_ids": [3] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&config_for(&server, None, dir.path())).await;
    assert_ok!(client.sync.load_conversations().await);
    assert_ok!(client.sync.select_conversation(7).await);

    let sent = assert_ok!(client.sync.send_message(7, "pong", Vec::new(), Some(3)).await);
    assert_eq!(sent.reply_to_id, Some(3));
    assert_eq!(assert_ok!(client.sync.mark_conversation_read(7).await), 1);

    let store = client.sync.store().read().await;
    assert_eq!(store.messages_for(7).len(), 2);
    assert_eq!(store.unread_count(7), 0);
    assert_eq!(
        store.conversation(7).and_then(|c| c.latest_message.as_ref()).map(|m| m.id),
        Some(4)
    );
}

#[tokio::test]
async fn test_workspace_conversation_is_created_once() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_conversations(&server, Vec::new()).await;
    Mock::given(method("POST"))
        .and(path("/api/conversations"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "data": {
                "id": 12,
                "type": "direct",
                "title": "Harbor Loft - Discussion",
                "participants": [1, 9],
                "workspace_id": 44,
                "created_at": timestamp(0),
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&config_for(&server, None, dir.path())).await;
    assert_ok!(client.sync.load_conversations().await);
    let workspace = WorkspaceRef {
        id: 44,
        name: "Harbor Loft".to_string(),
        workspace_type: "coworking".to_string(),
    };
    let first = assert_ok!(client.sync.create_workspace_conversation(workspace.clone(), 9).await);
    let second = assert_ok!(client.sync.create_workspace_conversation(workspace, 9).await);
    assert_eq!(first.id, 12);
    assert_eq!(second.id, 12);
}

#[tokio::test]
async fn test_rejected_credential_expires_session() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_conversations(&server, vec![conversation_json(7, &[1, 2])]).await;
    Mock::given(method("GET"))
        .and(path("/api/conversations/7/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "Unauthenticated." })))
        .mount(&server)
        .await;

    let client = client(&config_for(&server, None, dir.path())).await;
    let mut expired = client.api.session_expired();
    assert_ok!(client.sync.load_conversations().await);
    let mut events = client.sync.store().read().await.subscribe();

    assert_err!(client.sync.select_conversation(7).await, ClientError::Unauthorized);
    assert!(!client.api.is_authenticated().await);
    assert!(expired.try_recv().is_ok());

    let mut saw_expiry = false;
    while let Ok(event) = events.try_recv() {
        saw_expiry |= event == StoreEvent::SessionExpired;
    }
    assert!(saw_expiry);
    assert!(client.sync.store().read().await.conversations().is_empty());

    // Later calls fail before reaching the network.
    assert_err!(client.sync.load_conversations().await, ClientError::NotAuthenticated);
}

#[tokio::test]
async fn test_delete_of_missing_message_succeeds() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_conversations(&server, vec![conversation_json(7, &[1, 2])]).await;
    mount_page(&server, 7, 1, page_json(vec![message_json(3, 7, 2, "gone", 30)], 1, 1)).await;
    Mock::given(method("DELETE"))
        .and(path("/api/messages/3"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "message": "Not found" })))
        .mount(&server)
        .await;

    let client = client(&config_for(&server, None, dir.path())).await;
    assert_ok!(client.sync.load_conversations().await);
    assert_ok!(client.sync.select_conversation(7).await);
    assert_ok!(client.sync.delete_message(7, 3).await);
    assert!(client.sync.store().read().await.messages_for(7).is_empty());
}
