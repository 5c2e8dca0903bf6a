//! Reddit hot listings with application-only OAuth
//!
//! A client-credentials token is fetched from `{auth_url}/api/v1/access_token`
//! and cached until shortly before it expires. Listings come from
//! `{api_url}/r/{subreddit}/hot`.

use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{check_status, fetch_each, FetchError, RawItem, RawPost, TrendSource};
use crate::config::RedditConfig;
use crate::models::Platform;
use crate::resilience::ResiliencePolicy;

/// Tokens are refreshed this long before their advertised expiry
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

const MAX_LISTING_LIMIT: u32 = 100;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: RawPost,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

pub struct RedditSource {
    client: Client,
    auth_url: String,
    api_url: String,
    credentials: Option<(String, String)>,
    user_agent: String,
    subreddits: Vec<String>,
    limit: u32,
    token: Mutex<Option<CachedToken>>,
    policy: ResiliencePolicy,
}

impl RedditSource {
    pub fn new(config: &RedditConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .gzip(true)
            .build()?;

        let credentials = match (&config.client_id, &config.client_secret) {
            (Some(id), Some(secret)) => Some((id.clone(), secret.clone())),
            _ => {
                tracing::warn!("Reddit credentials not provided");
                None
            }
        };

        Ok(Self {
            client,
            auth_url: config.auth_url.trim_end_matches('/').to_string(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            credentials,
            user_agent: config.user_agent.clone(),
            subreddits: config.subreddits.clone(),
            limit: config.limit,
            token: Mutex::new(None),
            policy: ResiliencePolicy::new("reddit", &config.resilience),
        })
    }

    /// Replace the resilience policy
    pub fn with_policy(mut self, policy: ResiliencePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Cached token, fetching a new one when missing or near expiry
    async fn access_token(&self) -> Result<String, FetchError> {
        let (client_id, client_secret) = self
            .credentials
            .as_ref()
            .ok_or(FetchError::MissingCredentials("REDDIT_CLIENT_ID/REDDIT_CLIENT_SECRET"))?;

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let response = self
            .client
            .post(format!("{}/api/v1/access_token", self.auth_url))
            .basic_auth(client_id, Some(client_secret))
            .header(USER_AGENT, &self.user_agent)
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let body: TokenResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        let lifetime = Duration::from_secs(body.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        *cached = Some(CachedToken {
            value: body.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });

        tracing::debug!(expires_in = body.expires_in, "Reddit access token refreshed");
        Ok(body.access_token)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    async fn hot(&self, subreddit: &str, limit: u32) -> Result<Vec<RawItem>, FetchError> {
        let token = self.access_token().await?;

        let response = self
            .client
            .get(format!("{}/r/{}/hot", self.api_url, subreddit))
            .bearer_auth(&token)
            .header(USER_AGENT, &self.user_agent)
            .query(&[("limit", limit)])
            .send()
            .await?;

        let response = match check_status(response).await {
            Ok(response) => response,
            Err(e @ FetchError::Unauthorized(_)) => {
                self.invalidate_token().await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let listing: Listing = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        Ok(listing
            .data
            .children
            .into_iter()
            .map(|child| {
                let mut post = child.data;
                if post.subreddit.is_none() {
                    post.subreddit = Some(subreddit.to_string());
                }
                RawItem::Reddit(post)
            })
            .collect())
    }
}

#[async_trait]
impl TrendSource for RedditSource {
    fn name(&self) -> &str {
        "reddit"
    }

    fn platform(&self) -> Platform {
        Platform::Reddit
    }

    fn default_filters(&self) -> &[String] {
        &self.subreddits
    }

    fn default_limit(&self) -> u32 {
        self.limit
    }

    async fn fetch(&self, filters: &[String], limit: u32) -> Result<Vec<RawItem>, FetchError> {
        if self.credentials.is_none() {
            return Err(FetchError::MissingCredentials(
                "REDDIT_CLIENT_ID/REDDIT_CLIENT_SECRET",
            ));
        }
        let limit = limit.clamp(1, MAX_LISTING_LIMIT);

        fetch_each(self.name(), filters, |subreddit| async move {
            let items = self
                .policy
                .execute_if(|| self.hot(subreddit, limit), FetchError::is_retryable)
                .await
                .map_err(|e| FetchError::from_breaker(self.policy.name(), e))?;

            tracing::info!("Fetched {} hot posts from r/{}", items.len(), subreddit);
            Ok::<_, FetchError>(items)
        })
        .await
    }
}
