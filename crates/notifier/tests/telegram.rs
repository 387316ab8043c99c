//! Telegram client tests against a local `wiremock` server.
//!
//! ```bash
//! cargo test -p relay-notifier --test telegram
//! ```

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use relay_common::types::{ChatId, MessagePayload};
use relay_notifier::telegram::TelegramClient;
use relay_notifier::transport::{BotCommand, ChatTransport, TransportError};

const TOKEN: &str = "123456:test-token";

fn client(server: &MockServer) -> TelegramClient {
    TelegramClient::new(&server.uri(), TOKEN, Duration::from_secs(2)).unwrap()
}

fn api_path(method: &str) -> String {
    format!("/bot{}/{}", TOKEN, method)
}

#[tokio::test]
async fn test_send_message_posts_chat_and_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(api_path("sendMessage")))
        .and(body_partial_json(json!({
            "chat_id": -100123,
            "text": "<b>deploy failed</b>",
            "parse_mode": "HTML"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": { "message_id": 1, "chat": { "id": -100123, "type": "group" } }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = client(&server)
        .send_message(ChatId(-100123), &MessagePayload::html("<b>deploy failed</b>"))
        .await;
    assert!(result.is_ok(), "{:?}", result);
}

#[tokio::test]
async fn test_send_message_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(api_path("sendMessage")))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "ok": false,
            "error_code": 429,
            "description": "Too Many Requests: retry after 14",
            "parameters": { "retry_after": 14 }
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .send_message(ChatId(1), &MessagePayload::text("hi"))
        .await
        .unwrap_err();
    assert_eq!(err, TransportError::RateLimited { retry_after: Some(14) });
}

#[tokio::test]
async fn test_send_message_chat_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(api_path("sendMessage")))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: chat not found"
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .send_message(ChatId(1), &MessagePayload::text("hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::InvalidDestination(_)));
}

#[tokio::test]
async fn test_non_json_server_error_is_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(api_path("sendMessage")))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
        .mount(&server)
        .await;

    let err = client(&server)
        .send_message(ChatId(1), &MessagePayload::text("hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Api { code: 502, .. }));
}

#[tokio::test]
async fn test_unreachable_server_is_network_error() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let client = TelegramClient::new(&uri, TOKEN, Duration::from_millis(500)).unwrap();
    let err = client
        .send_message(ChatId(1), &MessagePayload::text("hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Network(_)));
    assert!(!err.to_string().contains(TOKEN), "token leaked: {}", err);
}

#[tokio::test]
async fn test_get_updates_passes_offset_and_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(api_path("getUpdates")))
        .and(body_partial_json(json!({ "offset": 42, "timeout": 1 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": [
                { "update_id": 42, "message": {
                    "message_id": 5,
                    "chat": { "id": 77, "type": "private" },
                    "text": "/start"
                }},
                { "update_id": 43 }
            ]
        })))
        .mount(&server)
        .await;

    let updates = client(&server)
        .get_updates(42, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0].update_id, 42);
    assert_eq!(
        updates[0].message.as_ref().unwrap().text.as_deref(),
        Some("/start")
    );
    assert!(updates[1].message.is_none());
}

#[tokio::test]
async fn test_bad_token_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(api_path("getMe")))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "ok": false,
            "error_code": 401,
            "description": "Unauthorized"
        })))
        .mount(&server)
        .await;

    let err = client(&server).get_me().await.unwrap_err();
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_get_me_and_set_commands() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(api_path("getMe")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": { "id": 99, "is_bot": true, "first_name": "Relay", "username": "ops_relay_bot" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(api_path("setMyCommands")))
        .and(body_partial_json(json!({
            "commands": [{ "command": "start", "description": "Start" }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": true })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let me = client.get_me().await.unwrap();
    assert_eq!(me.username.as_deref(), Some("ops_relay_bot"));

    client
        .set_my_commands(&[BotCommand::new("start", "Start")])
        .await
        .unwrap();
}
