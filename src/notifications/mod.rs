//! Alert formatting and delivery
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │      NotificationDispatcher (Notifier)     │
//! │  - Message routing                         │
//! │  - Delivery accounting                     │
//! └────────────────────────────────────────────┘
//!                     │
//!             ┌───────┴───────┐
//!             ▼               ▼
//!       ┌──────────┐    ┌─────────┐
//!       │ Telegram │    │ Webhook │
//!       │ Channel  │    │ Channel │
//!       └──────────┘    └─────────┘
//! ```
//!
//! The scheduler only sees the [`Notifier`] trait. Delivery never fails
//! loudly: every method reports `false` and logs when nothing got through.

pub mod channels;
mod dispatcher;
pub mod format;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::analytics::DailySummary;

pub use channels::telegram::TelegramChannel;
pub use channels::webhook::{WebhookChannel, WebhookConfig};
pub use channels::{Channel, ChannelError, DeliveryStatus};
pub use dispatcher::NotificationDispatcher;
pub use format::{
    format_daily_summary, format_emerging_alert, format_emerging_row, format_trend_alert,
};

/// Text sent by connection tests
pub const TEST_MESSAGE: &str = "🤖 TrendBot test message - connection successful!";

/// What a message is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Topics whose velocity crossed the threshold
    Emerging,
    /// Top trends of one platform
    TrendAlert,
    DailySummary,
    /// Connection test
    Test,
    /// Free text
    Plain,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Emerging => "emerging",
            Self::TrendAlert => "trend_alert",
            Self::DailySummary => "daily_summary",
            Self::Test => "test",
            Self::Plain => "plain",
        }
    }
}

/// Formatted message ready for delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub kind: AlertKind,
    /// Markdown body
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(kind: AlertKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            created_at: Utc::now(),
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self::new(AlertKind::Plain, text)
    }
}

/// Delivery capability used by the scheduler
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one message; true if at least one channel accepted it
    async fn send(&self, message: &Message) -> bool;

    /// Deliver free text
    async fn deliver(&self, text: &str) -> bool {
        self.send(&Message::plain(text)).await
    }

    /// Format and deliver a daily summary
    async fn deliver_daily_summary(&self, summary: &DailySummary) -> bool {
        let text = format_daily_summary(summary);
        self.send(&Message::new(AlertKind::DailySummary, text)).await
    }

    /// Check the transport
    async fn test_connection(&self) -> bool;
}

pub type SharedNotifier = Arc<dyn Notifier>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<Message>>,
    }

    #[async_trait]
    impl Notifier for Recording {
        async fn send(&self, message: &Message) -> bool {
            self.sent.lock().unwrap().push(message.clone());
            true
        }

        async fn test_connection(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_default_methods_tag_kind() {
        let notifier = Recording::default();
        assert!(notifier.deliver("hello").await);

        let summary = DailySummary {
            generated_at: Utc::now(),
            platforms: Vec::new(),
            total_records: 0,
            top_keywords: Vec::new(),
        };
        assert!(notifier.deliver_daily_summary(&summary).await);

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent[0].kind, AlertKind::Plain);
        assert_eq!(sent[0].text, "hello");
        assert_eq!(sent[1].kind, AlertKind::DailySummary);
        assert!(sent[1].text.starts_with("📈 *Daily Trend Summary*"));
    }

    #[test]
    fn test_alert_kind_labels() {
        assert_eq!(AlertKind::Emerging.as_str(), "emerging");
        assert_eq!(
            serde_json::to_string(&AlertKind::DailySummary).unwrap(),
            "\"daily_summary\""
        );
    }
}
