use crate::automacro_error;
use crate::config::TelegramConfig;
use crate::debug_if_enabled;
use crate::error::Result;
use crate::events::AlertKind;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::warn;

use super::r#trait::Notifier;

const API_BASE: &str = "https://api.telegram.org";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Ответ Bot API: `{ok, result | description}`
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    /// Unix-время отправки
    pub date: i64,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// Минимальный клиент Telegram Bot API
#[derive(Clone)]
pub struct TelegramApi {
    client: Client,
    base_url: String,
    chat_id: String,
}

impl TelegramApi {
    pub fn new(bot_token: &str, chat_id: &str) -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            base_url: format!("{}/bot{}", API_BASE, bot_token.trim()),
            chat_id: chat_id.trim().to_string(),
        })
    }

    pub fn from_config(config: &TelegramConfig) -> Result<Self> {
        match (config.bot_token.as_deref(), config.chat_id.as_deref()) {
            (Some(token), Some(chat_id)) => Self::new(token, chat_id),
            _ => Err(automacro_error!(service_unavailable, "Telegram: не заданы bot_token и chat_id")),
        }
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: reqwest::Response, method: &str) -> Result<Option<T>> {
        let body: ApiResponse<T> = response.json().await?;
        if !body.ok {
            return Err(automacro_error!(
                service_unavailable,
                "Telegram {}: {}",
                method,
                body.description.unwrap_or_else(|| "unknown error".to_string())
            ));
        }
        Ok(body.result)
    }

    pub async fn send_message(&self, text: &str) -> Result<()> {
        let response = self
            .client
            .post(self.url("sendMessage"))
            .timeout(REQUEST_TIMEOUT)
            .json(&json!({ "chat_id": self.chat_id, "text": text }))
            .send()
            .await?;
        Self::parse::<serde_json::Value>(response, "sendMessage").await?;
        debug_if_enabled!("Telegram: сообщение отправлено");
        Ok(())
    }

    pub async fn send_photo(&self, png: Vec<u8>, caption: &str) -> Result<()> {
        let photo = Part::bytes(png).file_name("screenshot.png").mime_str("image/png")?;
        let form = Form::new()
            .text("chat_id", self.chat_id.clone())
            .text("caption", caption.to_string())
            .part("photo", photo);

        let response = self
            .client
            .post(self.url("sendPhoto"))
            .timeout(REQUEST_TIMEOUT * 3)
            .multipart(form)
            .send()
            .await?;
        Self::parse::<serde_json::Value>(response, "sendPhoto").await?;
        Ok(())
    }

    /// Long polling входящих сообщений начиная с `offset`
    pub async fn get_updates(&self, offset: Option<i64>, poll_timeout_secs: u64) -> Result<Vec<Update>> {
        let mut query = vec![
            ("timeout", poll_timeout_secs.to_string()),
            ("allowed_updates", r#"["message"]"#.to_string()),
        ];
        if let Some(offset) = offset {
            query.push(("offset", offset.to_string()));
        }

        let response = self
            .client
            .get(self.url("getUpdates"))
            .timeout(Duration::from_secs(poll_timeout_secs) + REQUEST_TIMEOUT)
            .query(&query)
            .send()
            .await?;
        Ok(Self::parse::<Vec<Update>>(response, "getUpdates").await?.unwrap_or_default())
    }
}

/// Оповещения в чат Telegram; отправка в отдельной задаче
pub struct TelegramNotifier {
    api: TelegramApi,
}

impl TelegramNotifier {
    pub fn new(api: TelegramApi) -> Self {
        Self { api }
    }
}

impl Notifier for TelegramNotifier {
    fn send(&self, kind: AlertKind, context: &str) {
        let api = self.api.clone();
        let text = context.to_string();
        tokio::spawn(async move {
            if let Err(e) = api.send_message(&text).await {
                warn!(%kind, "Не удалось отправить оповещение в Telegram: {}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_deserialization() {
        let raw = r#"{
            "ok": true,
            "result": [
                {"update_id": 10, "message": {"message_id": 1, "date": 1700000000,
                 "chat": {"id": 42, "type": "private"}, "text": "/status"}},
                {"update_id": 11, "edited_message": {"message_id": 1}}
            ]
        }"#;
        let response: ApiResponse<Vec<Update>> = serde_json::from_str(raw).unwrap();
        assert!(response.ok);

        let updates = response.result.unwrap();
        assert_eq!(updates.len(), 2);
        let message = updates[0].message.as_ref().unwrap();
        assert_eq!(message.chat.id, 42);
        assert_eq!(message.text.as_deref(), Some("/status"));
        assert!(updates[1].message.is_none());
    }

    #[test]
    fn test_error_response() {
        let raw = r#"{"ok": false, "error_code": 401, "description": "Unauthorized"}"#;
        let response: ApiResponse<Vec<Update>> = serde_json::from_str(raw).unwrap();
        assert!(!response.ok);
        assert_eq!(response.description.as_deref(), Some("Unauthorized"));
    }

    #[test]
    fn test_api_urls() {
        let api = TelegramApi::new(" 123:abc ", " 42 ").unwrap();
        assert_eq!(api.url("sendMessage"), "https://api.telegram.org/bot123:abc/sendMessage");
        assert_eq!(api.chat_id(), "42");
    }
}
