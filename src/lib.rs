//! trendbot - Social media trend monitor
//!
//! Polls Twitter and Reddit on fixed intervals, stores the observations,
//! scores topics by engagement, velocity and recency, and pushes alerts
//! for emerging topics plus a daily digest to Telegram or a webhook.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration from environment and TOML files
//! - [`sources`] - Twitter and Reddit API clients
//! - [`models`] - Core data structures and types
//! - [`storage`] - Observation store (SQLite, in-memory)
//! - [`analytics`] - Keyword extraction, scoring, emergence detection, summaries
//! - [`notifications`] - Alert formatting and delivery channels
//! - [`scheduler`] - Periodic polling, alerting and summary tasks
//! - [`resilience`] - Retry, rate limiting and circuit breaking
//! - [`metrics`] - Prometheus counters and gauges
//! - [`utils`] - Text helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use trendbot::config::Config;
//! use trendbot::notifications::NotificationDispatcher;
//! use trendbot::scheduler::PollingScheduler;
//! use trendbot::storage::open_store;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let store = open_store(&config.database)?;
//!     let notifier = Arc::new(NotificationDispatcher::from_config(&config)?);
//!     let scheduler = PollingScheduler::from_config(&config, store, notifier)?;
//!     scheduler.run().await?;
//!     Ok(())
//! }
//! ```

pub mod analytics;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod notifications;
pub mod resilience;
pub mod scheduler;
pub mod sources;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::analytics::{EmergenceDetector, KeywordExtractor, ScoreEngine};
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, Result, TrendbotErrorTrait};
    pub use crate::models::{Engagement, Observation, Platform, TopTrend, TrendScore};
    pub use crate::notifications::{NotificationDispatcher, Notifier};
    pub use crate::scheduler::PollingScheduler;
    pub use crate::sources::TrendSource;
    pub use crate::storage::TrendStore;
}

pub use models::{Engagement, Observation, Platform, TopTrend, TrendScore};
