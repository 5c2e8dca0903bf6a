//! One-shot pipeline steps shared by the scheduler loops and the CLI
//!
//! Every step swallows its own failures after logging them; the loops
//! that call them never stop because of a bad cycle.

use anyhow::Result;
use chrono::{Local, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::analytics::{summarize, DailySummary, EmergenceDetector, KeywordExtractor};
use crate::config::SchedulerConfig;
use crate::metrics::{self, PollOutcome};
use crate::models::{Observation, Platform, TrendScore};
use crate::notifications::{format_emerging_alert, AlertKind, Message, SharedNotifier};
use crate::sources::TrendSource;
use crate::storage::SharedTrendStore;

/// Store, detector and notifier wired together
#[derive(Clone)]
pub struct Pipeline {
    store: SharedTrendStore,
    notifier: SharedNotifier,
    detector: Arc<EmergenceDetector>,
    extractor: Arc<KeywordExtractor>,
    settings: Arc<SchedulerConfig>,
}

impl Pipeline {
    pub fn new(
        store: SharedTrendStore,
        notifier: SharedNotifier,
        detector: EmergenceDetector,
        settings: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            detector: Arc::new(detector),
            extractor: Arc::new(KeywordExtractor::new()),
            settings: Arc::new(settings),
        }
    }

    pub fn store(&self) -> &SharedTrendStore {
        &self.store
    }

    pub fn notifier(&self) -> &SharedNotifier {
        &self.notifier
    }

    pub fn settings(&self) -> &SchedulerConfig {
        &self.settings
    }

    /// Fetch → convert → persist, once
    pub async fn poll_source_once(&self, source: &dyn TrendSource) -> PollOutcome {
        let name = source.name();
        let started = Instant::now();
        let observed_at = Utc::now();

        let fetched = source
            .fetch(source.default_filters(), source.default_limit())
            .await;
        metrics::record_fetch_duration(name, started.elapsed().as_secs_f64());

        let items = match fetched {
            Ok(items) => items,
            Err(e) => {
                warn!(source = name, error = %e, "Fetch failed, skipping cycle");
                metrics::record_poll(name, PollOutcome::FetchFailed);
                return PollOutcome::FetchFailed;
            }
        };

        if items.is_empty() {
            debug!(source = name, "Nothing fetched");
            metrics::record_poll(name, PollOutcome::Empty);
            return PollOutcome::Empty;
        }

        let observations: Vec<Observation> = items
            .into_iter()
            .map(|item| item.into_observation(observed_at))
            .collect();

        match self.store.write_batch(&observations).await {
            Ok(saved) => {
                info!(source = name, fetched = observations.len(), saved, "Saved observations");
                metrics::record_saved(name, saved);
                metrics::record_poll(name, PollOutcome::Saved);
                PollOutcome::Saved
            }
            Err(e) => {
                error!(source = name, error = %e, "Failed to save observations");
                metrics::record_poll(name, PollOutcome::StoreFailed);
                PollOutcome::StoreFailed
            }
        }
    }

    /// Run detection over the configured recent and historical windows
    pub async fn detect_emerging(&self) -> Result<Vec<TrendScore>> {
        let s = &self.settings;
        let recent = self
            .store
            .read_recent(None, s.recent_window_hours, s.recent_limit)
            .await?;
        let historical = self
            .store
            .read_recent(None, s.history_window_hours, s.history_limit)
            .await?;

        let emerging = self
            .detector
            .detect(&recent, &historical, s.emergence_threshold);

        for platform in Platform::all() {
            let count = emerging.iter().filter(|t| t.platform == platform).count();
            metrics::set_emerging_topics(platform.as_str(), count);
        }

        Ok(emerging)
    }

    /// Detect and alert on the top emerging topics; returns what was alerted
    pub async fn notify_emerging_once(&self) -> Vec<TrendScore> {
        let emerging = match self.detect_emerging().await {
            Ok(emerging) => emerging,
            Err(e) => {
                warn!(error = %e, "Emergence detection failed");
                return Vec::new();
            }
        };

        if emerging.is_empty() {
            debug!("No emerging trends");
            return Vec::new();
        }

        let top: Vec<TrendScore> = emerging
            .into_iter()
            .take(self.settings.alert_top_n)
            .collect();

        let text = format_emerging_alert(&top, Local::now());
        if self.notifier.send(&Message::new(AlertKind::Emerging, text)).await {
            info!(count = top.len(), "Sent emerging trends alert");
        } else {
            warn!("Emerging trends alert was not delivered");
        }

        top
    }

    /// Summarize the trailing summary window per platform
    pub async fn build_daily_summary(&self) -> DailySummary {
        let s = &self.settings;
        let mut windows: Vec<(Platform, Vec<Observation>)> = Vec::new();

        for platform in Platform::all() {
            let rows = match self
                .store
                .read_recent(Some(platform), s.summary_window_hours, s.summary_limit)
                .await
            {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(platform = %platform, error = %e, "Failed to read summary window");
                    Vec::new()
                }
            };
            windows.push((platform, rows));
        }

        summarize(
            windows.iter().map(|(p, rows)| (*p, rows.as_slice())),
            &self.extractor,
        )
    }

    /// Build and deliver the daily summary
    pub async fn send_daily_summary(&self) -> bool {
        let summary = self.build_daily_summary().await;
        let delivered = self.notifier.deliver_daily_summary(&summary).await;

        if delivered {
            info!(total_records = summary.total_records, "Daily summary sent");
        } else {
            warn!("Daily summary was not delivered");
        }
        delivered
    }
}
