//! Platform clients producing raw items for the pipeline
//!
//! A [`TrendSource`] fetches platform items into [`RawItem`]s whose fields are
//! all optional; [`RawItem::into_observation`] fills the gaps so conversion
//! never fails.

pub mod reddit;
pub mod twitter;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::models::{Engagement, Observation, Platform};
use crate::resilience::BreakerError;

pub use reddit::RedditSource;
pub use twitter::TwitterSource;

/// Errors that can occur while fetching from a platform
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request error (connect, timeout, body)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Credentials absent from configuration
    #[error("Missing credentials: {0}")]
    MissingCredentials(&'static str),

    /// Credentials rejected by the platform
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Server error with status code
    #[error("Server error: {0}")]
    ServerError(u16),

    /// Unexpected non-success status
    #[error("Unexpected status: {0}")]
    Status(u16),

    /// Response body did not match the expected shape
    #[error("Decoding error: {0}")]
    Decode(String),

    /// Circuit breaker refused the call
    #[error("Circuit breaker open for {0}")]
    CircuitOpen(String),
}

impl FetchError {
    /// Whether the same request may succeed when repeated
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => !e.is_decode() && !e.is_builder(),
            Self::RateLimited | Self::ServerError(_) => true,
            Self::MissingCredentials(_)
            | Self::Unauthorized(_)
            | Self::Status(_)
            | Self::Decode(_)
            | Self::CircuitOpen(_) => false,
        }
    }

    /// Unwrap a policy result, naming the breaker when it refused the call
    pub fn from_breaker(policy: &str, error: BreakerError<FetchError>) -> Self {
        match error {
            BreakerError::Open => Self::CircuitOpen(policy.to_string()),
            BreakerError::Inner(e) => e,
        }
    }
}

/// Map a non-success status to a fetch error
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let code = status.as_u16();
    match code {
        401 | 403 => {
            let body = response.text().await.unwrap_or_default();
            Err(FetchError::Unauthorized(format!("HTTP {code}: {body}")))
        }
        429 => Err(FetchError::RateLimited),
        500..=599 => Err(FetchError::ServerError(code)),
        _ => Err(FetchError::Status(code)),
    }
}

/// Tweet as returned by recent search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTweet {
    pub id: Option<String>,
    /// Search term that matched the tweet
    pub query: String,
    pub text: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub like_count: Option<u64>,
    pub retweet_count: Option<u64>,
    pub reply_count: Option<u64>,
}

/// Reddit submission from a listing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPost {
    pub id: Option<String>,
    pub title: Option<String>,
    pub subreddit: Option<String>,
    pub score: Option<i64>,
    pub upvote_ratio: Option<f64>,
    pub num_comments: Option<u64>,
    /// Creation time in Unix seconds
    pub created_utc: Option<f64>,
    pub url: Option<String>,
    pub permalink: Option<String>,
}

/// Platform item before conversion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "platform", rename_all = "lowercase")]
pub enum RawItem {
    Twitter(RawTweet),
    Reddit(RawPost),
}

impl RawItem {
    pub fn platform(&self) -> Platform {
        match self {
            Self::Twitter(_) => Platform::Twitter,
            Self::Reddit(_) => Platform::Reddit,
        }
    }

    /// Convert into an observation fetched at `observed_at`
    ///
    /// Missing timestamps fall back to `observed_at`, missing counters to 0,
    /// a missing id to a content hash.
    pub fn into_observation(self, observed_at: DateTime<Utc>) -> Observation {
        match self {
            Self::Twitter(tweet) => Observation::new(
                &tweet.query,
                Engagement::Twitter {
                    like_count: tweet.like_count.unwrap_or(0),
                    retweet_count: tweet.retweet_count.unwrap_or(0),
                    reply_count: tweet.reply_count.unwrap_or(0),
                },
                tweet.created_at.unwrap_or(observed_at),
                observed_at,
                tweet.id.unwrap_or_default(),
            ),
            Self::Reddit(post) => {
                let created_at = post
                    .created_utc
                    .filter(|secs| secs.is_finite())
                    .and_then(|secs| {
                        DateTime::from_timestamp(secs.trunc() as i64, (secs.fract() * 1e9) as u32)
                    })
                    .unwrap_or(observed_at);

                Observation::new(
                    post.title.as_deref().unwrap_or_default(),
                    Engagement::Reddit {
                        score: post.score.unwrap_or(0),
                        num_comments: post.num_comments.unwrap_or(0),
                        upvote_ratio: post.upvote_ratio.unwrap_or(0.0),
                        subreddit: post.subreddit.unwrap_or_default(),
                    },
                    created_at,
                    observed_at,
                    post.id.unwrap_or_default(),
                )
            }
        }
    }
}

/// Source-fetch capability of one platform
#[async_trait]
pub trait TrendSource: Send + Sync {
    fn name(&self) -> &str;

    fn platform(&self) -> Platform;

    /// Filters polled when the caller has no preference
    /// (search terms or subreddits)
    fn default_filters(&self) -> &[String];

    /// Items requested per filter when the caller has no preference
    fn default_limit(&self) -> u32;

    /// Fetch up to `limit` items for each filter
    ///
    /// A failing filter is logged and skipped; the call only fails when every
    /// filter failed.
    async fn fetch(&self, filters: &[String], limit: u32) -> Result<Vec<RawItem>, FetchError>;
}

pub type SharedSource = Arc<dyn TrendSource>;

/// Run `fetch_one` per filter, keeping partial results
pub(crate) async fn fetch_each<'a, F, Fut>(
    source: &str,
    filters: &'a [String],
    mut fetch_one: F,
) -> Result<Vec<RawItem>, FetchError>
where
    F: FnMut(&'a str) -> Fut,
    Fut: std::future::Future<Output = Result<Vec<RawItem>, FetchError>>,
{
    let mut items = Vec::new();
    let mut last_error = None;
    let mut succeeded = 0usize;

    for filter in filters {
        match fetch_one(filter.as_str()).await {
            Ok(batch) => {
                tracing::debug!(source, filter = %filter, count = batch.len(), "Fetched");
                succeeded += 1;
                items.extend(batch);
            }
            Err(e) => {
                tracing::warn!(source, filter = %filter, error = %e, "Fetch failed");
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) if succeeded == 0 => Err(e),
        _ => Ok(items),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_tweet_defaults_missing_fields() {
        let observed = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let obs = RawItem::Twitter(RawTweet {
            query: "#Rust".into(),
            like_count: Some(7),
            ..Default::default()
        })
        .into_observation(observed);

        assert_eq!(obs.topic, "#rust");
        assert_eq!(obs.created_at, observed);
        assert_eq!(obs.raw_score(), 7);
        assert!(obs.source_id.starts_with("twitter_"));
    }

    #[test]
    fn test_post_conversion() {
        let observed = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let obs = RawItem::Reddit(RawPost {
            id: Some("abc".into()),
            title: Some("Rust 2.0 Announced".into()),
            subreddit: Some("rust".into()),
            score: Some(-3),
            created_utc: Some(1_714_560_000.5),
            ..Default::default()
        })
        .into_observation(observed);

        assert_eq!(obs.topic, "rust 2.0 announced");
        assert_eq!(obs.source_id, "abc");
        assert_eq!(obs.raw_score(), -3);
        assert_eq!(obs.engagement.subreddit(), Some("rust"));
        assert_eq!(obs.created_at.timestamp(), 1_714_560_000);
        assert_eq!(obs.created_at.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn test_post_bad_timestamp_falls_back() {
        let observed = Utc::now();
        let obs = RawItem::Reddit(RawPost {
            created_utc: Some(f64::NAN),
            ..Default::default()
        })
        .into_observation(observed);
        assert_eq!(obs.created_at, observed);
        assert_eq!(obs.raw_score(), 0);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(FetchError::RateLimited.is_retryable());
        assert!(FetchError::ServerError(503).is_retryable());
        assert!(!FetchError::Unauthorized("no".into()).is_retryable());
        assert!(!FetchError::MissingCredentials("token").is_retryable());
        assert!(!FetchError::CircuitOpen("twitter".into()).is_retryable());
    }

    #[test]
    fn test_from_breaker() {
        let open = FetchError::from_breaker("reddit", BreakerError::Open);
        assert!(matches!(open, FetchError::CircuitOpen(ref name) if name == "reddit"));

        let inner = FetchError::from_breaker("reddit", BreakerError::Inner(FetchError::Status(404)));
        assert!(matches!(inner, FetchError::Status(404)));
    }

    #[tokio::test]
    async fn test_fetch_each_keeps_partial_results() {
        let filters = vec!["ok".to_string(), "bad".to_string()];
        let items = fetch_each("test", &filters, |f| async move {
            if f == "ok" {
                Ok(vec![RawItem::Twitter(RawTweet {
                    query: f.to_string(),
                    ..Default::default()
                })])
            } else {
                Err(FetchError::Status(404))
            }
        })
        .await
        .unwrap();
        assert_eq!(items.len(), 1);

        let err = fetch_each("test", &filters[1..], |_| async {
            Err::<Vec<RawItem>, _>(FetchError::RateLimited)
        })
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::RateLimited));
    }
}
