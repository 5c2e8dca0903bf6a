//! Webhook notification channel
//!
//! Posts each message as JSON to a configured URL.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use super::{error_for_response, Channel, ChannelError, ChannelResult, DeliveryStatus};
use crate::notifications::Message;
use crate::resilience::{with_retry_if, RetryConfig};

/// Webhook channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Webhook URL endpoint
    pub url: String,
    /// Optional authentication token (sent as Bearer token)
    pub auth_token: Option<String>,
    /// Custom headers to include in requests
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Maximum retry attempts on failure
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    /// Delay before the first retry, doubled on each further one
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

fn default_timeout() -> u64 {
    10
}

fn default_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1000
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: None,
            headers: HashMap::new(),
            timeout_secs: default_timeout(),
            max_retries: default_retries(),
            retry_delay_ms: default_retry_delay(),
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay_ms: u64) -> Self {
        self.retry_delay_ms = retry_delay_ms;
        self
    }

    fn retry_config(&self) -> RetryConfig {
        RetryConfig::with_delays(
            self.max_retries,
            self.retry_delay_ms,
            self.retry_delay_ms.saturating_mul(8),
        )
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("Webhook URL cannot be empty".to_string());
        }

        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err("Webhook URL must start with http:// or https://".to_string());
        }

        if self.timeout_secs == 0 {
            return Err("Timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// Webhook notification channel
///
/// # Payload Format
///
/// ```json
/// {
///   "kind": "emerging",
///   "text": "🚀 *Emerging Trends Alert*\n\n...",
///   "created_at": "2024-01-01T12:00:00Z"
/// }
/// ```
///
/// Client errors (4xx other than 429) are not retried.
pub struct WebhookChannel {
    config: WebhookConfig,
    client: Client,
}

impl WebhookChannel {
    pub fn new(config: WebhookConfig) -> ChannelResult<Self> {
        config.validate().map_err(ChannelError::InvalidConfig)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ChannelError::Other(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    pub fn from_url(url: impl Into<String>) -> ChannelResult<Self> {
        Self::new(WebhookConfig::new(url))
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    fn build_payload(&self, message: &Message) -> serde_json::Value {
        serde_json::json!({
            "kind": message.kind.as_str(),
            "text": message.text,
            "created_at": message.created_at.to_rfc3339(),
        })
    }

    async fn post(&self, payload: &serde_json::Value) -> ChannelResult<()> {
        let mut request = self.client.post(&self.config.url);

        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }

        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }

        let response = request.json(payload).send().await?;
        if response.status().is_success() {
            tracing::debug!(url = %self.config.url, status = %response.status(), "Webhook accepted");
            Ok(())
        } else {
            Err(error_for_response(response).await)
        }
    }

    async fn send_with_retry(&self, payload: &serde_json::Value) -> ChannelResult<()> {
        with_retry_if(
            &self.config.retry_config(),
            || self.post(payload),
            ChannelError::is_retryable,
        )
        .await
    }
}

#[async_trait]
impl Channel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, message: &Message) -> ChannelResult<DeliveryStatus> {
        let payload = self.build_payload(message);

        match self.send_with_retry(&payload).await {
            Ok(()) => {
                tracing::info!(url = %self.config.url, kind = message.kind.as_str(), "Webhook delivered");
                Ok(DeliveryStatus::success_with_message(
                    "webhook",
                    format!("Delivered to {}", self.config.url),
                ))
            }
            Err(e) => {
                tracing::error!("Failed to deliver webhook to {}: {}", self.config.url, e);
                Ok(DeliveryStatus::failure("webhook", e.to_string()))
            }
        }
    }

    async fn health_check(&self) -> ChannelResult<bool> {
        match self.client.head(&self.config.url).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!("Webhook health check failed for {}: {}", self.config.url, e);
                Ok(false)
            }
        }
    }

    fn config(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name(),
            "url": self.config.url,
            "timeout_secs": self.config.timeout_secs,
            "max_retries": self.config.max_retries,
            "has_auth": self.config.auth_token.is_some(),
            "custom_headers": self.config.headers.keys().collect::<Vec<_>>(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::AlertKind;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn channel_for(server: &MockServer, retries: u32) -> WebhookChannel {
        let config = WebhookConfig::new(format!("{}/hook", server.uri()))
            .with_auth_token("secret")
            .with_max_retries(retries)
            .with_retry_delay(5);
        WebhookChannel::new(config).unwrap()
    }

    #[test]
    fn test_webhook_config_validation() {
        assert!(WebhookConfig::new("https://example.com/webhook").validate().is_ok());
        assert!(WebhookConfig::new("").validate().is_err());
        assert!(WebhookConfig::new("example.com/webhook").validate().is_err());
        assert!(WebhookConfig::new("https://example.com")
            .with_timeout(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_webhook_config_defaults_from_toml() {
        let config: WebhookConfig = toml::from_str(r#"url = "https://hooks.example.com""#).unwrap();
        assert_eq!(config.timeout_secs, 10);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay_ms, 1000);
        assert!(config.headers.is_empty());
    }

    #[test]
    fn test_webhook_payload() {
        let channel = WebhookChannel::from_url("https://example.com/webhook").unwrap();
        let payload = channel.build_payload(&Message::new(AlertKind::Emerging, "hi"));

        assert_eq!(payload["kind"], "emerging");
        assert_eq!(payload["text"], "hi");
        assert!(payload["created_at"].is_string());
    }

    #[tokio::test]
    async fn test_webhook_delivers_with_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(serde_json::json!({"text": "hello", "kind": "plain"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let status = channel_for(&server, 0)
            .send(&Message::plain("hello"))
            .await
            .unwrap();
        assert!(status.success);
    }

    #[tokio::test]
    async fn test_webhook_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let status = channel_for(&server, 2)
            .send(&Message::plain("hello"))
            .await
            .unwrap();
        assert!(!status.success);
    }

    #[tokio::test]
    async fn test_webhook_does_not_retry_client_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad payload"))
            .expect(1)
            .mount(&server)
            .await;

        let status = channel_for(&server, 3)
            .send(&Message::plain("hello"))
            .await
            .unwrap();
        assert!(!status.success);
        assert!(status.message.unwrap().contains("bad payload"));
    }
}
