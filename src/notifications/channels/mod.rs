//! Delivery channels
//!
//! Each channel turns a [`Message`] into one request against its transport.

pub mod telegram;
pub mod webhook;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::notifications::Message;

/// Result type for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Errors that can occur during channel operations
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Invalid channel configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Endpoint refused the request; not worth retrying
    #[error("Rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Endpoint failed on its side
    #[error("Server error HTTP {status}: {body}")]
    ServerError { status: u16, body: String },

    /// Rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Generic error
    #[error("Channel error: {0}")]
    Other(String),
}

impl ChannelError {
    /// Whether sending the same request again may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::HttpError(_) | Self::ServerError { .. } | Self::RateLimited(_) => true,
            Self::InvalidConfig(_)
            | Self::Rejected { .. }
            | Self::SerializationError(_)
            | Self::Other(_) => false,
        }
    }
}

/// Outcome of one delivery attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryStatus {
    pub success: bool,
    /// Channel that delivered (or failed to deliver) the message
    pub channel: String,
    pub message: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl DeliveryStatus {
    pub fn success(channel: impl Into<String>) -> Self {
        Self {
            success: true,
            channel: channel.into(),
            message: None,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn success_with_message(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            channel: channel.into(),
            message: Some(message.into()),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn failure(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            channel: channel.into(),
            message: Some(message.into()),
            timestamp: chrono::Utc::now(),
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.success { "SUCCESS" } else { "FAILED" };
        write!(f, "[{status}] {}", self.channel)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

/// A transport messages can be delivered over
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver one message
    ///
    /// Transport failures come back as a failed [`DeliveryStatus`]; `Err` is
    /// reserved for problems building the request.
    async fn send(&self, message: &Message) -> ChannelResult<DeliveryStatus>;

    /// Check if the channel is reachable and authorised
    async fn health_check(&self) -> ChannelResult<bool> {
        Ok(true)
    }

    /// Channel configuration as JSON, secrets omitted
    fn config(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name(),
        })
    }
}

/// Map a non-success HTTP response to a channel error
pub(crate) async fn error_for_response(response: reqwest::Response) -> ChannelError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read response body".to_string());

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        ChannelError::RateLimited(body)
    } else if status.is_client_error() {
        ChannelError::Rejected {
            status: status.as_u16(),
            body,
        }
    } else {
        ChannelError::ServerError {
            status: status.as_u16(),
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_status_constructors() {
        let status = DeliveryStatus::success("telegram");
        assert!(status.success);
        assert!(status.message.is_none());

        let status = DeliveryStatus::failure("webhook", "Connection timeout");
        assert!(!status.success);
        assert_eq!(status.message, Some("Connection timeout".to_string()));
    }

    #[test]
    fn test_delivery_status_display() {
        let success = DeliveryStatus::success_with_message("webhook", "Delivered");
        assert_eq!(success.to_string(), "[SUCCESS] webhook: Delivered");

        let failure = DeliveryStatus::failure("telegram", "chat not found");
        assert!(failure.to_string().contains("FAILED"));
        assert!(failure.to_string().contains("chat not found"));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(ChannelError::RateLimited("slow down".into()).is_retryable());
        assert!(ChannelError::ServerError {
            status: 502,
            body: String::new()
        }
        .is_retryable());
        assert!(!ChannelError::Rejected {
            status: 400,
            body: String::new()
        }
        .is_retryable());
        assert!(!ChannelError::InvalidConfig("x".into()).is_retryable());
    }
}
