//! Twitter API v2 recent search
//!
//! One request per filter against `/2/tweets/search/recent` with bearer
//! authentication. Each tweet is tagged with the filter that matched it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::{check_status, fetch_each, FetchError, RawItem, RawTweet, TrendSource};
use crate::config::TwitterConfig;
use crate::models::Platform;
use crate::resilience::ResiliencePolicy;

/// Bounds the search endpoint accepts for `max_results`
const MIN_RESULTS: u32 = 10;
const MAX_RESULTS: u32 = 100;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<Tweet>,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    id: Option<String>,
    text: Option<String>,
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    public_metrics: PublicMetrics,
}

#[derive(Debug, Default, Deserialize)]
struct PublicMetrics {
    like_count: Option<u64>,
    retweet_count: Option<u64>,
    reply_count: Option<u64>,
}

pub struct TwitterSource {
    client: Client,
    api_url: String,
    bearer_token: Option<String>,
    filters: Vec<String>,
    max_results: u32,
    policy: ResiliencePolicy,
}

impl TwitterSource {
    pub fn new(config: &TwitterConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .gzip(true)
            .build()?;

        if config.bearer_token.is_none() {
            tracing::warn!("No Twitter bearer token provided");
        }

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            bearer_token: config.bearer_token.clone(),
            filters: config.filters.clone(),
            max_results: config.max_results,
            policy: ResiliencePolicy::new("twitter", &config.resilience),
        })
    }

    /// Replace the resilience policy
    pub fn with_policy(mut self, policy: ResiliencePolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn search(&self, token: &str, query: &str, max_results: u32) -> Result<Vec<RawItem>, FetchError> {
        let response = self
            .client
            .get(format!("{}/2/tweets/search/recent", self.api_url))
            .bearer_auth(token)
            .query(&[
                ("query", query),
                ("max_results", &max_results.to_string()),
                ("tweet.fields", "created_at,public_metrics"),
            ])
            .send()
            .await?;

        let body: SearchResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        Ok(body
            .data
            .into_iter()
            .map(|tweet| {
                RawItem::Twitter(RawTweet {
                    id: tweet.id,
                    query: query.to_string(),
                    text: tweet.text,
                    created_at: tweet.created_at,
                    like_count: tweet.public_metrics.like_count,
                    retweet_count: tweet.public_metrics.retweet_count,
                    reply_count: tweet.public_metrics.reply_count,
                })
            })
            .collect())
    }
}

#[async_trait]
impl TrendSource for TwitterSource {
    fn name(&self) -> &str {
        "twitter"
    }

    fn platform(&self) -> Platform {
        Platform::Twitter
    }

    fn default_filters(&self) -> &[String] {
        &self.filters
    }

    fn default_limit(&self) -> u32 {
        self.max_results
    }

    async fn fetch(&self, filters: &[String], limit: u32) -> Result<Vec<RawItem>, FetchError> {
        let token = self
            .bearer_token
            .as_deref()
            .ok_or(FetchError::MissingCredentials("TWITTER_BEARER_TOKEN"))?;
        let max_results = limit.clamp(MIN_RESULTS, MAX_RESULTS);

        fetch_each(self.name(), filters, |query| async move {
            let items = self
                .policy
                .execute_if(|| self.search(token, query, max_results), FetchError::is_retryable)
                .await
                .map_err(|e| FetchError::from_breaker(self.policy.name(), e))?;

            tracing::info!("Found {} tweets for query: {}", items.len(), query);
            Ok::<_, FetchError>(items)
        })
        .await
    }
}
