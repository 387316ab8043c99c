//! Telegram Bot API client.
//!
//! Thin `reqwest` wrapper over the four Bot API methods the relay uses. Every
//! failure is mapped onto [`TransportError`] before it leaves this module.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use relay_common::error::AppError;
use relay_common::types::{ChatId, MessagePayload};

use crate::transport::{BotCommand, BotUser, ChatTransport, TransportError, Update};

/// Bot API response envelope.
#[derive(Debug, serde::Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<u16>,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, serde::Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

/// HTTP client for the Telegram Bot API.
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    /// `{api_url}/bot{token}`. Never logged.
    endpoint: String,
    request_timeout: Duration,
}

impl TelegramClient {
    pub fn new(api_url: &str, token: &str, request_timeout: Duration) -> Result<Self, AppError> {
        if token.trim().is_empty() {
            return Err(AppError::Config("Telegram bot token is empty".to_string()));
        }

        let http = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
            request_timeout,
        })
    }

    async fn call<P, R>(&self, method: &str, params: &P, timeout: Duration) -> Result<R, TransportError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .http
            .post(format!("{}/{}", self.endpoint, method))
            .timeout(timeout)
            .json(params)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.without_url().to_string()))?;

        let status = response.status();
        let body: ApiResponse<R> = match response.json().await {
            Ok(body) => body,
            Err(e) if status.is_success() => {
                return Err(TransportError::Api {
                    code: status.as_u16(),
                    description: format!("malformed response: {}", e.without_url()),
                });
            }
            Err(_) => {
                return Err(classify(
                    status.as_u16(),
                    status.canonical_reason().unwrap_or_default().to_string(),
                    None,
                ));
            }
        };

        if body.ok {
            return body.result.ok_or_else(|| TransportError::Api {
                code: status.as_u16(),
                description: format!("{} returned no result", method),
            });
        }

        Err(classify(
            body.error_code.unwrap_or(status.as_u16()),
            body.description.unwrap_or_default(),
            body.parameters.and_then(|p| p.retry_after),
        ))
    }
}

/// Map a Bot API failure onto the transport error taxonomy.
pub fn classify(code: u16, description: String, retry_after: Option<u64>) -> TransportError {
    let lowered = description.to_lowercase();
    match StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR) {
        StatusCode::TOO_MANY_REQUESTS => TransportError::RateLimited { retry_after },
        // Telegram answers 404 for requests made with an unknown token
        StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND => TransportError::Unauthorized(description),
        StatusCode::FORBIDDEN => TransportError::InvalidDestination(description),
        StatusCode::BAD_REQUEST
            if lowered.contains("chat not found")
                || lowered.contains("user not found")
                || lowered.contains("chat_id is empty") =>
        {
            TransportError::InvalidDestination(description)
        }
        _ => TransportError::Api { code, description },
    }
}

impl ChatTransport for TelegramClient {
    async fn send_message(&self, chat: ChatId, payload: &MessagePayload) -> Result<(), TransportError> {
        let mut params = json!({
            "chat_id": chat,
            "text": payload.body(),
            "link_preview_options": { "is_disabled": payload.disable_preview },
        });
        if let Some(mode) = payload.parse_mode {
            params["parse_mode"] = json!(mode);
        }

        let _: serde_json::Value = self.call("sendMessage", &params, self.request_timeout).await?;
        Ok(())
    }

    async fn get_updates(&self, offset: i64, timeout: Duration) -> Result<Vec<Update>, TransportError> {
        let params = json!({
            "offset": offset,
            "timeout": timeout.as_secs(),
            "allowed_updates": ["message"],
        });
        // The server holds the request for up to `timeout`; leave room on top of it.
        self.call("getUpdates", &params, timeout + self.request_timeout)
            .await
    }

    async fn get_me(&self) -> Result<BotUser, TransportError> {
        self.call("getMe", &json!({}), self.request_timeout).await
    }

    async fn set_my_commands(&self, commands: &[BotCommand]) -> Result<(), TransportError> {
        let _: bool = self
            .call("setMyCommands", &json!({ "commands": commands }), self.request_timeout)
            .await?;
        Ok(())
    }
}
