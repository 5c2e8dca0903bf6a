//! Fan-out of messages to every registered channel

use async_trait::async_trait;
use chrono::Local;

use super::channels::telegram::TelegramChannel;
use super::channels::webhook::WebhookChannel;
use super::channels::{Channel, ChannelResult};
use super::format::{format_emerging_alert, format_trend_alert};
use super::{AlertKind, Message, Notifier, TEST_MESSAGE};
use crate::config::Config;
use crate::metrics;
use crate::models::{Platform, TopTrend, TrendScore};

/// Delivers each message over all channels
///
/// A message counts as delivered when at least one channel accepted it.
#[derive(Default)]
pub struct NotificationDispatcher {
    channels: Vec<Box<dyn Channel + Send + Sync>>,
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
        }
    }

    /// Build the channels enabled in `config`
    pub fn from_config(config: &Config) -> ChannelResult<Self> {
        let mut dispatcher = Self::new();

        if config.telegram.is_configured() {
            dispatcher.add_channel(Box::new(TelegramChannel::new(&config.telegram)?));
        }

        if let Some(webhook) = &config.webhook {
            dispatcher.add_channel(Box::new(WebhookChannel::new(webhook.clone())?));
        }

        tracing::info!(channels = dispatcher.channels.len(), "Notification dispatcher ready");
        Ok(dispatcher)
    }

    pub fn add_channel(&mut self, channel: Box<dyn Channel + Send + Sync>) {
        self.channels.push(channel);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Alert for already-ranked emerging trends
    pub async fn send_emerging_alert(&self, trends: &[TrendScore]) -> bool {
        if trends.is_empty() {
            return false;
        }
        let text = format_emerging_alert(trends, Local::now());
        self.send(&Message::new(AlertKind::Emerging, text)).await
    }

    /// Alert for the top trends of one platform
    pub async fn send_trend_alert(&self, platform: Platform, trends: &[TopTrend]) -> bool {
        match format_trend_alert(platform, trends) {
            Some(text) => self.send(&Message::new(AlertKind::TrendAlert, text)).await,
            None => false,
        }
    }
}

#[async_trait]
impl Notifier for NotificationDispatcher {
    async fn send(&self, message: &Message) -> bool {
        if self.channels.is_empty() {
            tracing::warn!(kind = message.kind.as_str(), "No notification channels configured");
            metrics::record_alert(message.kind.as_str(), false);
            return false;
        }

        let sends = self.channels.iter().map(|channel| channel.send(message));
        let results = futures::future::join_all(sends).await;

        let mut delivered = false;
        for (channel, result) in self.channels.iter().zip(results) {
            match result {
                Ok(status) if status.success => delivered = true,
                Ok(status) => tracing::warn!("{}", status),
                Err(e) => tracing::error!(channel = channel.name(), "Failed to send alert: {}", e),
            }
        }

        metrics::record_alert(message.kind.as_str(), delivered);
        delivered
    }

    async fn test_connection(&self) -> bool {
        let mut connected = false;

        for channel in &self.channels {
            match channel.health_check().await {
                Ok(true) => match channel.send(&Message::new(AlertKind::Test, TEST_MESSAGE)).await {
                    Ok(status) if status.success => connected = true,
                    Ok(status) => tracing::warn!(channel = channel.name(), "Test message rejected: {}", status),
                    Err(e) => tracing::warn!(channel = channel.name(), "Test message failed: {}", e),
                },
                Ok(false) => tracing::warn!(channel = channel.name(), "Channel health check failed"),
                Err(e) => tracing::error!(channel = channel.name(), "Channel health check error: {}", e),
            }
        }

        connected
    }
}
