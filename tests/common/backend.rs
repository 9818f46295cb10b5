//! Backend fixtures on a wiremock server
//!
//! JSON builders in the shapes the DayDeskr backend returns, and helpers
//! that mount them on a [`MockServer`].

use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use daydeskr::client::Config;
use daydeskr::shared::AppConfig;

use super::push_server::PushServer;

pub const TEST_TOKEN: &str = "test-token";
pub const TEST_USER: i64 = 1;

/// Seconds after 2025-03-01T00:00:00Z as an RFC 3339 string
pub fn timestamp(secs: i64) -> String {
    let base = chrono::DateTime::parse_from_rfc3339("2025-03-01T00:00:00Z")
        .unwrap()
        .with_timezone(&chrono::Utc);
    (base + chrono::Duration::seconds(secs)).to_rfc3339()
}

pub fn conversation_json(id: i64, participants: &[i64]) -> Value {
    json!({
        "id": id,
        "type": "direct",
        "participants": participants,
        "created_at": timestamp(0),
    })
}

pub fn message_json(id: i64, conversation_id: i64, sender_id: i64, content: &str, secs: i64) -> Value {
    json!({
        "id": id,
        "conversation_id": conversation_id,
        "sender_id": sender_id,
        "content": content,
        "type": "text",
        "created_at": timestamp(secs),
        "sender": { "id": sender_id, "name": format!("User {}", sender_id) },
    })
}

pub fn page_json(messages: Vec<Value>, current_page: u32, last_page: u32) -> Value {
    let total = messages.len();
    json!({
        "data": messages,
        "meta": { "current_page": current_page, "last_page": last_page, "total": total },
    })
}

/// Client configuration for a wiremock backend and an optional push server
pub fn config_for(server: &MockServer, push: Option<&PushServer>, data_dir: &std::path::Path) -> Config {
    let mut builder = AppConfig::builder()
        .api_url(server.uri())
        .data_dir(data_dir)
        .search_debounce_ms(10);
    if let Some(push) = push {
        builder = builder.push_host("127.0.0.1").push_port(push.port()).push_key("local-key");
    }
    let mut config = Config::from_app(builder.build().unwrap());
    config.set_token(Some(TEST_TOKEN.to_string()));
    config.set_current_user_id(Some(TEST_USER));
    config
}

/// `GET /api/conversations`, wrapped in a `data` envelope
pub async fn mount_conversations(server: &MockServer, conversations: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path("/api/conversations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": conversations,
        })))
        .mount(server)
        .await;
}

/// `GET /api/conversations/{id}/messages?page={page}`
pub async fn mount_page(server: &MockServer, conversation_id: i64, page: u32, body: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/api/conversations/{}/messages", conversation_id)))
        .and(query_param("page", page.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Channel authorization plus empty presence endpoints
pub async fn mount_session(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/broadcasting/auth"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "auth": "local-key:signature" })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/user-presence"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "presence": [] })))
        .mount(server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/user-presence"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .mount(server)
        .await;
}
