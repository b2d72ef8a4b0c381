//! Minimal Telegram Bot API client: just the three methods the dispatcher needs.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::models::account::ExternalIdentity;

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("telegram request failed: {0}")]
    Http(reqwest::Error),

    #[error("telegram api error {code}: {description}")]
    Api { code: i64, description: String },

    #[error("telegram response has no result")]
    MissingResult,
}

// The request URL embeds the bot token; keep it out of error messages and logs.
impl From<reqwest::Error> for TelegramError {
    fn from(e: reqwest::Error) -> Self {
        TelegramError::Http(e.without_url())
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

impl User {
    pub fn full_name(&self) -> String {
        match &self.last_name {
            Some(last) => format!("{} {}", self.first_name, last),
            None => self.first_name.clone(),
        }
    }

    pub fn identity(&self) -> ExternalIdentity {
        ExternalIdentity {
            id: self.id,
            handle: self.username.clone(),
            display_name: Some(self.full_name()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    base: String,
}

impl TelegramClient {
    /// `api_url` is normally `https://api.telegram.org`.
    pub fn new(api_url: &str, bot_token: &str) -> Self {
        Self {
            // longer than the longest long-poll we ask for
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(90))
                .build()
                .unwrap_or_default(),
            base: format!("{}/bot{}", api_url.trim_end_matches('/'), bot_token),
        }
    }

    async fn call<P, T>(&self, method: &str, params: &P) -> Result<T, TelegramError>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let resp = self
            .http
            .post(format!("{}/{}", self.base, method))
            .json(params)
            .send()
            .await?;
        let status = resp.status();
        let body: ApiResponse<T> = resp.json().await?;

        if !body.ok {
            return Err(TelegramError::Api {
                code: body.error_code.unwrap_or(status.as_u16() as i64),
                description: body.description.unwrap_or_default(),
            });
        }
        body.result.ok_or(TelegramError::MissingResult)
    }

    pub async fn get_me(&self) -> Result<User, TelegramError> {
        self.call("getMe", &json!({})).await
    }

    /// Long-poll for updates with `update_id >= offset`.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u32) -> Result<Vec<Update>, TelegramError> {
        self.call(
            "getUpdates",
            &json!({
                "offset": offset,
                "timeout": timeout_secs,
                "allowed_updates": ["message"],
            }),
        )
        .await
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<Message, TelegramError> {
        self.call(
            "sendMessage",
            &SendMessage {
                chat_id,
                text,
                disable_web_page_preview: true,
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_get_updates_parses_messages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTEST/getUpdates"))
            .and(body_partial_json(json!({"offset": 10, "timeout": 0})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": [{
                    "update_id": 10,
                    "message": {
                        "message_id": 1,
                        "from": {"id": 42, "is_bot": false, "first_name": "Ada", "username": "ada"},
                        "chat": {"id": 42, "type": "private"},
                        "text": "/start abc"
                    }
                }]
            })))
            .mount(&server)
            .await;

        let client = TelegramClient::new(&server.uri(), "TEST");
        let updates = client.get_updates(10, 0).await.unwrap();
        assert_eq!(updates.len(), 1);
        let msg = updates[0].message.as_ref().unwrap();
        assert_eq!(msg.text.as_deref(), Some("/start abc"));
        let identity = msg.from.as_ref().unwrap().identity();
        assert_eq!(identity.id, 42);
        assert_eq!(identity.handle.as_deref(), Some("ada"));
    }

    #[tokio::test]
    async fn test_api_error_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTEST/sendMessage"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: chat not found"
            })))
            .mount(&server)
            .await;

        let client = TelegramClient::new(&server.uri(), "TEST");
        let err = client.send_message(1, "hi").await.unwrap_err();
        match err {
            TelegramError::Api { code, description } => {
                assert_eq!(code, 400);
                assert!(description.contains("chat not found"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_transport_error_hides_token() {
        // nothing listens on port 9 locally
        let client = TelegramClient::new("http://127.0.0.1:9", "SECRET123");
        let err = client.get_me().await.unwrap_err();
        assert!(matches!(err, TelegramError::Http(_)));
        assert!(!err.to_string().contains("SECRET123"));
    }
}
