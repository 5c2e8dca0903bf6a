//! Configuration management for trendbot
//!
//! Configuration comes from a TOML file or from environment variables
//! (the binary loads `.env` first). Every section has defaults so a partial
//! file is enough.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::analytics::PlatformWeights;
use crate::notifications::channels::webhook::WebhookConfig;
use crate::resilience::ResilienceConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub twitter: TwitterConfig,
    pub reddit: RedditConfig,
    pub telegram: TelegramConfig,

    /// Optional generic webhook channel
    pub webhook: Option<WebhookConfig>,

    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,

    /// Platform weights used by the score engine
    pub scoring: PlatformWeights,

    pub logging: LoggingConfig,
}

/// Twitter recent-search source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TwitterConfig {
    pub bearer_token: Option<String>,

    /// Search terms; each becomes the topic of the tweets it returns
    pub filters: Vec<String>,

    /// Tweets requested per filter (the API accepts 10..=100)
    pub max_results: u32,

    pub api_url: String,
    pub request_timeout_secs: u64,
    pub resilience: ResilienceConfig,
}

impl Default for TwitterConfig {
    fn default() -> Self {
        Self {
            bearer_token: None,
            filters: vec![
                "#AI".to_string(),
                "#technology".to_string(),
                "#crypto".to_string(),
                "#news".to_string(),
            ],
            max_results: 10,
            api_url: String::from("https://api.twitter.com"),
            request_timeout_secs: 30,
            resilience: ResilienceConfig::default(),
        }
    }
}

/// Reddit hot-listing source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub user_agent: String,

    /// Subreddits polled every cycle
    pub subreddits: Vec<String>,

    /// Hot posts requested per subreddit
    pub limit: u32,

    /// Host issuing OAuth tokens
    pub auth_url: String,

    /// Host serving authenticated listings
    pub api_url: String,

    pub request_timeout_secs: u64,
    pub resilience: ResilienceConfig,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            user_agent: String::from("TrendBot/1.0"),
            subreddits: [
                "technology",
                "worldnews",
                "politics",
                "cryptocurrency",
                "programming",
                "artificial",
                "MachineLearning",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            limit: 5,
            auth_url: String::from("https://www.reddit.com"),
            api_url: String::from("https://oauth.reddit.com"),
            request_timeout_secs: 30,
            resilience: ResilienceConfig::default(),
        }
    }
}

/// Telegram bot channel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    pub api_url: String,
    pub request_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            api_url: String::from("https://api.telegram.org"),
            request_timeout_secs: 15,
        }
    }
}

impl TelegramConfig {
    pub fn is_configured(&self) -> bool {
        self.bot_token.is_some()
    }
}

/// Observation store location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file path, or `:memory:`
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/trends.db"),
        }
    }
}

/// Polling, detection and summary schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub twitter_interval_mins: u64,
    pub reddit_interval_mins: u64,
    pub notification_interval_mins: u64,

    /// Local hour (0-23) at which the daily summary goes out
    pub summary_hour: u32,
    pub summary_check_secs: u64,
    pub summary_cooldown_secs: u64,
    pub summary_window_hours: u32,
    pub summary_limit: usize,

    /// Minimum velocity for a topic to count as emerging
    pub emergence_threshold: f64,
    pub recent_window_hours: u32,
    pub recent_limit: usize,
    pub history_window_hours: u32,
    pub history_limit: usize,

    /// Emerging topics included in one alert
    pub alert_top_n: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            twitter_interval_mins: 30,
            reddit_interval_mins: 45,
            notification_interval_mins: 60,
            summary_hour: 20,
            summary_check_secs: 300,
            summary_cooldown_secs: 3600,
            summary_window_hours: 24,
            summary_limit: 100,
            emergence_threshold: 1.5,
            recent_window_hours: 2,
            recent_limit: 100,
            history_window_hours: 24,
            history_limit: 500,
            alert_top_n: 3,
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn twitter_interval(&self) -> Duration {
        Duration::from_secs(self.twitter_interval_mins * 60)
    }

    #[must_use]
    pub fn reddit_interval(&self) -> Duration {
        Duration::from_secs(self.reddit_interval_mins * 60)
    }

    #[must_use]
    pub fn notification_interval(&self) -> Duration {
        Duration::from_secs(self.notification_interval_mins * 60)
    }

    #[must_use]
    pub fn summary_check_interval(&self) -> Duration {
        Duration::from_secs(self.summary_check_secs)
    }

    #[must_use]
    pub fn summary_cooldown(&self) -> Duration {
        Duration::from_secs(self.summary_cooldown_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.twitter_interval_mins == 0
            || self.reddit_interval_mins == 0
            || self.notification_interval_mins == 0
        {
            anyhow::bail!("polling and notification intervals must be greater than 0");
        }

        if self.summary_hour > 23 {
            anyhow::bail!("summary_hour must be between 0 and 23");
        }

        if self.summary_check_secs == 0 {
            anyhow::bail!("summary_check_secs must be greater than 0");
        }

        if !self.emergence_threshold.is_finite() {
            anyhow::bail!("emergence_threshold must be a finite number");
        }

        if self.recent_limit == 0 || self.history_limit == 0 || self.alert_top_n == 0 {
            anyhow::bail!("window limits and alert_top_n must be greater than 0");
        }

        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

// ============================================================================
// Environment helpers
// ============================================================================

/// Non-empty environment variable
fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match env_string(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Ignoring unparsable environment value");
            default
        }),
        None => default,
    }
}

fn env_list(key: &str, default: Vec<String>) -> Vec<String> {
    match env_string(key) {
        Some(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        None => default,
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let twitter = TwitterConfig {
            bearer_token: env_string("TWITTER_BEARER_TOKEN"),
            filters: env_list("TRENDBOT_TWITTER_FILTERS", defaults.twitter.filters.clone()),
            max_results: env_parse("TRENDBOT_TWITTER_MAX_RESULTS", defaults.twitter.max_results),
            ..defaults.twitter.clone()
        };

        let reddit = RedditConfig {
            client_id: env_string("REDDIT_CLIENT_ID"),
            client_secret: env_string("REDDIT_CLIENT_SECRET"),
            user_agent: env_string("REDDIT_USER_AGENT")
                .unwrap_or_else(|| defaults.reddit.user_agent.clone()),
            subreddits: env_list("TRENDBOT_SUBREDDITS", defaults.reddit.subreddits.clone()),
            limit: env_parse("TRENDBOT_REDDIT_LIMIT", defaults.reddit.limit),
            ..defaults.reddit.clone()
        };

        let telegram = TelegramConfig {
            bot_token: env_string("TELEGRAM_BOT_TOKEN"),
            chat_id: env_string("TELEGRAM_CHAT_ID"),
            ..defaults.telegram.clone()
        };

        let webhook = env_string("TRENDBOT_WEBHOOK_URL").map(|url| {
            let config = WebhookConfig::new(url);
            match env_string("TRENDBOT_WEBHOOK_TOKEN") {
                Some(token) => config.with_auth_token(token),
                None => config,
            }
        });

        let database = DatabaseConfig {
            path: env_string("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database.path.clone()),
        };

        let sched = &defaults.scheduler;
        let scheduler = SchedulerConfig {
            twitter_interval_mins: env_parse("TRENDBOT_TWITTER_INTERVAL", sched.twitter_interval_mins),
            reddit_interval_mins: env_parse("TRENDBOT_REDDIT_INTERVAL", sched.reddit_interval_mins),
            notification_interval_mins: env_parse(
                "TRENDBOT_NOTIFICATION_INTERVAL",
                sched.notification_interval_mins,
            ),
            summary_hour: env_parse("TRENDBOT_SUMMARY_HOUR", sched.summary_hour),
            emergence_threshold: env_parse("TRENDBOT_THRESHOLD", sched.emergence_threshold),
            ..sched.clone()
        };

        let scoring = PlatformWeights {
            twitter: env_parse("TRENDBOT_TWITTER_WEIGHT", defaults.scoring.twitter),
            reddit: env_parse("TRENDBOT_REDDIT_WEIGHT", defaults.scoring.reddit),
        };

        let logging = LoggingConfig {
            level: env_string("TRENDBOT_LOG_LEVEL").unwrap_or_else(|| defaults.logging.level.clone()),
            format: env_string("TRENDBOT_LOG_FORMAT")
                .unwrap_or_else(|| defaults.logging.format.clone()),
        };

        Ok(Self {
            twitter,
            reddit,
            telegram,
            webhook,
            database,
            scheduler,
            scoring,
            logging,
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load from `path` when given, otherwise from the environment, then validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.scheduler.validate()?;

        for (name, weight) in [
            ("twitter", self.scoring.twitter),
            ("reddit", self.scoring.reddit),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                anyhow::bail!("{name} platform weight must be a non-negative number");
            }
        }

        if self.twitter.max_results == 0 || self.reddit.limit == 0 {
            anyhow::bail!("per-request item limits must be greater than 0");
        }

        if let Some(webhook) = &self.webhook {
            webhook
                .validate()
                .map_err(|e| anyhow::anyhow!("invalid webhook config: {e}"))?;
        }

        Ok(())
    }
}
