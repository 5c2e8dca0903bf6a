// Core data structures for trendbot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Social platform an observation was collected from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Twitter,
    Reddit,
}

impl Platform {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Twitter => "twitter",
            Self::Reddit => "reddit",
        }
    }

    /// Capitalized name for display
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Twitter => "Twitter",
            Self::Reddit => "Reddit",
        }
    }

    /// Create from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "twitter" | "x" => Some(Self::Twitter),
            "reddit" => Some(Self::Reddit),
            _ => None,
        }
    }

    /// Get all platforms
    pub fn all() -> Vec<Self> {
        vec![Self::Twitter, Self::Reddit]
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("Unknown platform: {s}"))
    }
}

/// Platform-specific engagement counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "platform", rename_all = "lowercase")]
pub enum Engagement {
    Twitter {
        like_count: u64,
        retweet_count: u64,
        reply_count: u64,
    },
    Reddit {
        /// Net votes, can go negative
        score: i64,
        num_comments: u64,
        upvote_ratio: f64,
        subreddit: String,
    },
}

impl Engagement {
    /// Platform this payload belongs to
    pub fn platform(&self) -> Platform {
        match self {
            Self::Twitter { .. } => Platform::Twitter,
            Self::Reddit { .. } => Platform::Reddit,
        }
    }

    /// Base counter of the payload (likes on Twitter, net score on Reddit)
    pub fn raw_score(&self) -> i64 {
        match self {
            Self::Twitter { like_count, .. } => i64::try_from(*like_count).unwrap_or(i64::MAX),
            Self::Reddit { score, .. } => *score,
        }
    }

    /// Secondary volume counter (retweets / comments)
    pub fn volume(&self) -> u64 {
        match self {
            Self::Twitter { retweet_count, .. } => *retweet_count,
            Self::Reddit { num_comments, .. } => *num_comments,
        }
    }

    /// Subreddit name for Reddit payloads
    pub fn subreddit(&self) -> Option<&str> {
        match self {
            Self::Reddit { subreddit, .. } if !subreddit.is_empty() => Some(subreddit),
            _ => None,
        }
    }
}

/// One engagement record for a topic on a platform at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Lower-cased topic key
    pub topic: String,
    pub engagement: Engagement,
    /// When the item itself was created on the platform
    pub created_at: DateTime<Utc>,
    /// When this crate fetched the item
    pub observed_at: DateTime<Utc>,
    /// Platform item ID (or content hash when the platform gave none)
    pub source_id: String,
}

impl Observation {
    /// Create a new observation; the topic is lower-cased and trimmed
    pub fn new(
        topic: impl AsRef<str>,
        engagement: Engagement,
        created_at: DateTime<Utc>,
        observed_at: DateTime<Utc>,
        source_id: impl Into<String>,
    ) -> Self {
        let topic = topic.as_ref().trim().to_lowercase();
        let mut source_id = source_id.into();
        if source_id.is_empty() {
            source_id = fallback_source_id(engagement.platform(), &topic, created_at);
        }

        Self {
            topic,
            engagement,
            created_at,
            observed_at,
            source_id,
        }
    }

    pub fn platform(&self) -> Platform {
        self.engagement.platform()
    }

    pub fn raw_score(&self) -> i64 {
        self.engagement.raw_score()
    }
}

/// Derive a stable ID from content when a platform item carries none
pub fn fallback_source_id(platform: Platform, topic: &str, created_at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(platform.as_str().as_bytes());
    hasher.update(topic.as_bytes());
    hasher.update(created_at.timestamp().to_be_bytes());
    let hash = format!("{:x}", hasher.finalize());
    format!("{}_{}", platform.as_str(), &hash[..24])
}

/// Derived trend view over a topic's observations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendScore {
    pub topic: String,
    pub platform: Platform,
    /// Bounded score in [0, 100]
    pub score: f64,
    /// Score delta against history (or the score itself for new topics)
    pub velocity: f64,
    pub mentions: usize,
    pub peak_score: i64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Aggregate row returned by `TrendStore::read_top`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopTrend {
    pub topic: String,
    pub platform: Platform,
    pub max_score: i64,
    pub mentions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reddit(score: i64) -> Engagement {
        Engagement::Reddit {
            score,
            num_comments: 4,
            upvote_ratio: 0.9,
            subreddit: "rust".to_string(),
        }
    }

    #[test]
    fn test_platform_parse() {
        assert_eq!(Platform::parse("Twitter"), Some(Platform::Twitter));
        assert_eq!(Platform::parse(" reddit "), Some(Platform::Reddit));
        assert_eq!(Platform::parse("mastodon"), None);
        assert_eq!("reddit".parse::<Platform>().unwrap(), Platform::Reddit);
    }

    #[test]
    fn test_observation_normalizes_topic() {
        let now = Utc::now();
        let obs = Observation::new("  Rust Lang ", reddit(10), now, now, "abc");
        assert_eq!(obs.topic, "rust lang");
        assert_eq!(obs.platform(), Platform::Reddit);
        assert_eq!(obs.raw_score(), 10);
    }

    #[test]
    fn test_observation_fallback_source_id() {
        let now = Utc::now();
        let a = Observation::new("topic", reddit(1), now, now, "");
        let b = Observation::new("TOPIC", reddit(2), now, now, "");
        assert!(a.source_id.starts_with("reddit_"));
        assert_eq!(a.source_id, b.source_id);
    }

    #[test]
    fn test_engagement_serde_is_tagged() {
        let e = Engagement::Twitter {
            like_count: 1,
            retweet_count: 2,
            reply_count: 3,
        };
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("\"platform\":\"twitter\""));
        let back: Engagement = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn test_subreddit_accessor() {
        assert_eq!(reddit(0).subreddit(), Some("rust"));
        let tw = Engagement::Twitter {
            like_count: 0,
            retweet_count: 0,
            reply_count: 0,
        };
        assert_eq!(tw.subreddit(), None);
    }
}
