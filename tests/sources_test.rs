//! Source clients against mock platform APIs, through to the SQLite store

mod common;

use common::RecordingNotifier;
use std::sync::Arc;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use trendbot::analytics::EmergenceDetector;
use trendbot::config::{RedditConfig, SchedulerConfig, TwitterConfig};
use trendbot::metrics::PollOutcome;
use trendbot::models::Platform;
use trendbot::resilience::{
    CircuitBreakerConfig, ResilienceConfig, ResiliencePolicy, RetryConfig,
};
use trendbot::scheduler::Pipeline;
use trendbot::sources::{FetchError, RedditSource, TrendSource, TwitterSource};
use trendbot::storage::create_sqlite_store;

fn search_body(likes: &[u64]) -> serde_json::Value {
    let data: Vec<_> = likes
        .iter()
        .enumerate()
        .map(|(i, likes)| {
            serde_json::json!({
                "id": format!("t{i}"),
                "text": "tweet",
                "public_metrics": {"like_count": likes, "retweet_count": 1, "reply_count": 0}
            })
        })
        .collect();
    serde_json::json!({ "data": data })
}

fn twitter(server: &MockServer, filters: &[&str]) -> TwitterConfig {
    TwitterConfig {
        bearer_token: Some("bearer".to_string()),
        filters: filters.iter().map(|f| f.to_string()).collect(),
        api_url: server.uri(),
        ..Default::default()
    }
}

fn tripping_policy(name: &str) -> ResiliencePolicy {
    ResiliencePolicy::new(
        name,
        &ResilienceConfig {
            retry: RetryConfig::none(),
            breaker: CircuitBreakerConfig {
                failure_threshold: 2,
                timeout_secs: 600,
            },
            calls_per_minute: 0,
        },
    )
}

#[tokio::test]
async fn test_twitter_poll_lands_in_sqlite() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2/tweets/search/recent"))
        .and(query_param("query", "#ai"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body(&[5, 50])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/2/tweets/search/recent"))
        .and(query_param("query", "#crypto"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "meta": {"result_count": 0}
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = create_sqlite_store(dir.path().join("trends.db")).unwrap();
    let pipeline = Pipeline::new(
        store.clone(),
        Arc::new(RecordingNotifier::default()),
        EmergenceDetector::default(),
        SchedulerConfig::default(),
    );

    let source = TwitterSource::new(&twitter(&server, &["#ai", "#crypto"]))
        .unwrap()
        .with_policy(ResiliencePolicy::passthrough("twitter"));

    assert_eq!(pipeline.poll_source_once(&source).await, PollOutcome::Saved);

    let top = store.read_top(Some(Platform::Twitter), 1, 10).await.unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].topic, "#ai");
    assert_eq!(top[0].mentions, 2);
    assert_eq!(top[0].max_score, 50);
}

#[tokio::test]
async fn test_breaker_opens_after_repeated_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let source = TwitterSource::new(&twitter(&server, &["#ai"]))
        .unwrap()
        .with_policy(tripping_policy("twitter"));
    let filters = source.default_filters().to_vec();

    for _ in 0..2 {
        assert!(matches!(
            source.fetch(&filters, 10).await.unwrap_err(),
            FetchError::ServerError(500)
        ));
    }

    let err = source.fetch(&filters, 10).await.unwrap_err();
    assert!(matches!(err, FetchError::CircuitOpen(ref name) if name == "twitter"));
}

#[tokio::test]
async fn test_reddit_partial_failure_keeps_other_subreddits() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "tok", "expires_in": 3600
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/r/rust/hot"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"children": [
                {"data": {"id": "a", "title": "Rust 2024 edition", "score": 900}}
            ]}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/r/private/hot"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let config = RedditConfig {
        client_id: Some("id".to_string()),
        client_secret: Some("secret".to_string()),
        auth_url: server.uri(),
        api_url: server.uri(),
        ..Default::default()
    };
    let source = RedditSource::new(&config)
        .unwrap()
        .with_policy(ResiliencePolicy::passthrough("reddit"));

    let filters = vec!["private".to_string(), "rust".to_string()];
    let items = source.fetch(&filters, 5).await.unwrap();
    assert_eq!(items.len(), 1);

    let obs = items
        .into_iter()
        .next()
        .unwrap()
        .into_observation(chrono::Utc::now());
    assert_eq!(obs.topic, "rust 2024 edition");
    assert_eq!(obs.engagement.subreddit(), Some("rust"));
    assert_eq!(obs.raw_score(), 900);
}

#[tokio::test]
async fn test_missing_token_is_reported_not_fetched() {
    let source = TwitterSource::new(&TwitterConfig::default()).unwrap();
    let err = source
        .fetch(source.default_filters(), source.default_limit())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::MissingCredentials(_)));
    assert!(!err.is_retryable());
}
