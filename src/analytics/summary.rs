//! Daily summary aggregation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::keywords::KeywordExtractor;
use crate::models::{Observation, Platform};

/// Maximum number of keywords carried in a summary
pub const SUMMARY_KEYWORD_LIMIT: usize = 10;

/// Per-platform slice of a daily summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformSummary {
    pub platform: Platform,
    pub count: usize,
    /// Mean raw score (likes or net votes)
    pub avg_score: f64,
    /// Topic with the highest raw score
    pub top_topic: Option<String>,
    /// Most frequent subreddit, Reddit only
    pub top_subreddit: Option<String>,
}

/// Structured daily summary handed to notifiers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub generated_at: DateTime<Utc>,
    pub platforms: Vec<PlatformSummary>,
    pub total_records: usize,
    pub top_keywords: Vec<(String, usize)>,
}

impl DailySummary {
    pub fn platform(&self, platform: Platform) -> Option<&PlatformSummary> {
        self.platforms.iter().find(|p| p.platform == platform)
    }

    pub fn is_empty(&self) -> bool {
        self.total_records == 0
    }
}

/// Most frequent subreddit among Reddit observations
///
/// Ties resolve to the subreddit seen first.
pub fn top_subreddit(observations: &[Observation]) -> Option<String> {
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();

    for sub in observations.iter().filter_map(|o| o.engagement.subreddit()) {
        let count = counts.entry(sub).or_insert(0);
        if *count == 0 {
            order.push(sub);
        }
        *count += 1;
    }

    let mut best: Option<(&str, usize)> = None;
    for sub in order {
        let count = counts[sub];
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((sub, count));
        }
    }

    best.map(|(sub, _)| sub.to_string())
}

fn summarize_platform(platform: Platform, observations: &[Observation]) -> PlatformSummary {
    let count = observations.len();
    let avg_score = if count == 0 {
        0.0
    } else {
        observations.iter().map(|o| o.raw_score() as f64).sum::<f64>() / count as f64
    };

    let mut top: Option<&Observation> = None;
    for obs in observations {
        if top.map_or(true, |t| obs.raw_score() > t.raw_score()) {
            top = Some(obs);
        }
    }

    PlatformSummary {
        platform,
        count,
        avg_score,
        top_topic: top.map(|o| o.topic.clone()),
        top_subreddit: match platform {
            Platform::Reddit => top_subreddit(observations),
            Platform::Twitter => None,
        },
    }
}

/// Build a daily summary from per-platform observation windows
pub fn summarize<'a, I>(windows: I, extractor: &KeywordExtractor) -> DailySummary
where
    I: IntoIterator<Item = (Platform, &'a [Observation])>,
{
    let mut platforms = Vec::new();
    let mut total_records = 0;
    let mut topics: Vec<&str> = Vec::new();

    for (platform, observations) in windows {
        total_records += observations.len();
        topics.extend(observations.iter().map(|o| o.topic.as_str()));
        platforms.push(summarize_platform(platform, observations));
    }

    let mut top_keywords = extractor.keyword_frequencies(topics);
    top_keywords.truncate(SUMMARY_KEYWORD_LIMIT);

    tracing::debug!(
        total_records,
        keywords = top_keywords.len(),
        "Generated daily summary"
    );

    DailySummary {
        generated_at: Utc::now(),
        platforms,
        total_records,
        top_keywords,
    }
}
