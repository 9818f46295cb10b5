//! Full client session over a real WebSocket push connection

use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::MockServer;

use daydeskr::client::{ConnectionState, MessagingContext};

use crate::assert_eventually;
use crate::common::*;

async fn session(server: &MockServer, push: &PushServer, dir: &std::path::Path) -> MessagingContext {
    mount_session(server).await;
    mount_conversations(server, vec![conversation_json(7, &[1, 2])]).await;
    mount_page(server, 7, 1, page_json(vec![message_json(1, 7, 1, "hello", 10)], 1, 1)).await;

    let context = MessagingContext::init(config_for(server, Some(push), dir));
    context.start().await.unwrap();
    context.sync().select_conversation(7).await.unwrap();
    assert_eventually!(
        || async move { push.is_subscribed("private-conversation.7") },
        "conversation channel was not subscribed"
    );
    context
}

#[tokio::test]
async fn test_live_message_reaches_store_and_badge() {
    let server = MockServer::start().await;
    let push = PushServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let context = session(&server, &push, dir.path()).await;

    assert_eq!(context.channel().state(), ConnectionState::Connected);
    assert!(push.is_subscribed("presence-users"));

    push.emit(
        "private-conversation.7",
        "message.sent",
        json!({ "message": message_json(2, 7, 2, "hi there", 20) }),
    );

    let store = context.store().clone();
    assert_eventually!(
        || {
            let store = store.clone();
            async move { store.read().await.messages_for(7).len() == 2 }
        },
        "live message was not stored"
    );
    assert_eq!(store.read().await.unread_count(7), 1);

    let notifications = context.notifications().clone();
    assert_eventually!(
        || {
            let notifications = notifications.clone();
            async move { notifications.total_unread() == 1 }
        },
        "badge did not follow the unread count"
    );

    // The same message again changes nothing.
    push.emit(
        "private-conversation.7",
        "message.sent",
        json!({ "message": message_json(2, 7, 2, "hi there", 20) }),
    );
    push.emit(
        "private-conversation.7",
        "message.read",
        json!({ "message_id": 2, "read_by": 1, "read_at": timestamp(25) }),
    );
    assert_eventually!(
        || {
            let store = store.clone();
            async move { store.read().await.unread_count(7) == 0 }
        },
        "read receipt was not applied"
    );
    assert_eq!(store.read().await.messages_for(7).len(), 2);

    context.teardown().await;
}

#[tokio::test]
async fn test_typing_and_presence_events() {
    let server = MockServer::start().await;
    let push = PushServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let context = session(&server, &push, dir.path()).await;

    push.emit("presence-users", "user-online", json!({ "user_id": 2 }));
    push.emit(
        "presence-users",
        "user-typing",
        json!({ "user_id": 2, "is_typing": true, "conversation_id": 7 }),
    );

    let presence = context.presence().clone();
    assert_eventually!(
        || {
            let presence = presence.clone();
            async move { presence.is_typing(2, Some(7)).await }
        },
        "typing indicator was not applied"
    );
    assert!(presence.is_online(2).await);
    assert_eq!(presence.typing_in(7).await, vec![2]);

    context.teardown().await;
}

#[tokio::test]
async fn test_dropped_connection_reconnects_once_and_resubscribes() {
    let server = MockServer::start().await;
    let push = PushServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let context = session(&server, &push, dir.path()).await;
    assert_eq!(push.connection_count(), 1);

    push.drop_connections();

    let push = &push;
    assert_eventually!(
        || async move { push.connection_count() == 2 && push.is_subscribed("private-conversation.7") },
        "client did not reconnect and resubscribe"
    );
    let channel = context.channel().clone();
    assert_eventually!(
        || {
            let channel = channel.clone();
            async move { channel.state() == ConnectionState::Connected }
        },
        "channel did not return to connected"
    );

    // Events on the new connection still flow.
    push.emit(
        "private-conversation.7",
        "message.sent",
        json!({ "message": message_json(5, 7, 2, "back again", 50) }),
    );
    let store = context.store().clone();
    assert_eventually!(
        || {
            let store = store.clone();
            async move { store.read().await.message(5).is_some() }
        },
        "event after reconnect was not stored"
    );
    assert_eq!(push.connection_count(), 2);

    context.teardown().await;
}
