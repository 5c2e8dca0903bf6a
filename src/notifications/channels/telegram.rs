//! Telegram Bot API channel

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::{error_for_response, Channel, ChannelError, ChannelResult, DeliveryStatus};
use crate::config::TelegramConfig;
use crate::notifications::Message;

/// Envelope of every Bot API response
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct BotUser {
    #[serde(default)]
    username: Option<String>,
}

/// Sends Markdown messages to one chat through a bot
///
/// Without a bot token or chat id the channel still constructs, but every
/// delivery fails with a logged error.
pub struct TelegramChannel {
    api_url: String,
    bot_token: Option<String>,
    chat_id: Option<String>,
    client: Client,
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig) -> ChannelResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| ChannelError::Other(format!("Failed to create HTTP client: {e}")))?;

        if config.bot_token.is_none() {
            tracing::warn!("Telegram bot token not configured");
        }

        Ok(Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            chat_id: config.chat_id.clone(),
            client,
        })
    }

    pub fn has_chat(&self) -> bool {
        self.chat_id.is_some()
    }

    fn method_url(&self, token: &str, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, token, method)
    }

    fn token(&self) -> ChannelResult<&str> {
        self.bot_token
            .as_deref()
            .ok_or_else(|| ChannelError::InvalidConfig("Telegram bot token not configured".into()))
    }

    async fn send_message(&self, text: &str) -> ChannelResult<()> {
        let token = self.token()?;
        let chat_id = self
            .chat_id
            .as_deref()
            .ok_or_else(|| ChannelError::InvalidConfig("Telegram chat id not configured".into()))?;

        let response = self
            .client
            .post(self.method_url(token, "sendMessage"))
            .json(&serde_json::json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "Markdown",
                "disable_web_page_preview": true,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }

        let body: ApiResponse<serde_json::Value> = response.json().await?;
        if body.ok {
            Ok(())
        } else {
            Err(ChannelError::Other(
                body.description
                    .unwrap_or_else(|| "sendMessage returned ok=false".to_string()),
            ))
        }
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, message: &Message) -> ChannelResult<DeliveryStatus> {
        match self.send_message(&message.text).await {
            Ok(()) => {
                tracing::info!(kind = message.kind.as_str(), "Telegram message sent");
                Ok(DeliveryStatus::success("telegram"))
            }
            Err(e) => {
                tracing::error!("Failed to send Telegram message: {}", e);
                Ok(DeliveryStatus::failure("telegram", e.to_string()))
            }
        }
    }

    async fn health_check(&self) -> ChannelResult<bool> {
        let token = self.token()?;

        let response = self.client.get(self.method_url(token, "getMe")).send().await?;
        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }

        let body: ApiResponse<BotUser> = response.json().await?;
        if !body.ok {
            tracing::warn!(description = ?body.description, "Telegram getMe returned ok=false");
            return Ok(false);
        }

        let username = body.result.and_then(|u| u.username).unwrap_or_default();
        tracing::info!("Telegram bot connected: @{}", username);
        Ok(true)
    }

    fn config(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name(),
            "api_url": self.api_url,
            "has_token": self.bot_token.is_some(),
            "has_chat": self.chat_id.is_some(),
        })
    }
}
