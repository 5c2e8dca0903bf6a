//! Common test utilities

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration as StdDuration;

use trendbot::models::{Engagement, Observation, Platform};
use trendbot::notifications::{AlertKind, Message, Notifier};
use trendbot::sources::{FetchError, RawItem, RawPost, RawTweet, TrendSource};

/// Tweet observation fetched `hours_ago`, created at the same time
pub fn tweet(topic: &str, likes: u64, hours_ago: i64) -> Observation {
    let at = Utc::now() - Duration::hours(hours_ago);
    tweet_at(topic, likes, at, &format!("{topic}-{likes}-{hours_ago}"))
}

pub fn tweet_at(topic: &str, likes: u64, at: DateTime<Utc>, id: &str) -> Observation {
    Observation::new(
        topic,
        Engagement::Twitter {
            like_count: likes,
            retweet_count: 0,
            reply_count: 0,
        },
        at,
        at,
        id,
    )
}

/// Reddit observation fetched `hours_ago`
pub fn post(title: &str, subreddit: &str, score: i64, hours_ago: i64) -> Observation {
    let at = Utc::now() - Duration::hours(hours_ago);
    Observation::new(
        title,
        Engagement::Reddit {
            score,
            num_comments: 0,
            upvote_ratio: 0.9,
            subreddit: subreddit.to_string(),
        },
        at,
        at,
        format!("{subreddit}-{score}-{hours_ago}"),
    )
}

// ============================================================================
// Recording Notifier
// ============================================================================

/// Notifier that keeps every message it is asked to send
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Message>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count(&self, kind: AlertKind) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.kind == kind)
            .count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &Message) -> bool {
        self.sent.lock().unwrap().push(message.clone());
        true
    }

    async fn test_connection(&self) -> bool {
        true
    }
}

// ============================================================================
// Fake Source
// ============================================================================

/// Source returning canned items and counting calls
pub struct FakeSource {
    name: String,
    platform: Platform,
    filters: Vec<String>,
    fetches: AtomicUsize,
    completed: AtomicUsize,
    delay: Option<StdDuration>,
    fail: bool,
    panic: bool,
}

impl FakeSource {
    pub fn new(name: &str, platform: Platform) -> Self {
        Self {
            name: name.to_string(),
            platform,
            filters: vec!["#rust".to_string()],
            fetches: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            delay: None,
            fail: false,
            panic: false,
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panic = true;
        self
    }

    /// Every fetch takes `delay` before answering
    pub fn with_delay(mut self, delay: StdDuration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fetches started
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Fetches that ran to the end
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TrendSource for FakeSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn platform(&self) -> Platform {
        self.platform
    }

    fn default_filters(&self) -> &[String] {
        &self.filters
    }

    fn default_limit(&self) -> u32 {
        2
    }

    async fn fetch(&self, filters: &[String], limit: u32) -> Result<Vec<RawItem>, FetchError> {
        let call = self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);

        if self.panic {
            panic!("{} exploded", self.name);
        }
        if self.fail {
            return Err(FetchError::ServerError(503));
        }

        let mut items = Vec::new();
        for filter in filters {
            for i in 0..limit {
                let id = format!("{}-{call}-{i}", self.name);
                items.push(match self.platform {
                    Platform::Twitter => RawItem::Twitter(RawTweet {
                        id: Some(id),
                        query: filter.clone(),
                        like_count: Some(10),
                        ..Default::default()
                    }),
                    Platform::Reddit => RawItem::Reddit(RawPost {
                        id: Some(id),
                        title: Some(format!("Post about {filter}")),
                        subreddit: Some(filter.trim_start_matches('#').to_string()),
                        score: Some(42),
                        ..Default::default()
                    }),
                });
            }
        }
        Ok(items)
    }
}
