//! Trend score computation
//!
//! A topic's score summarizes the engagement of its observations:
//!
//! 1. Each observation's engagement is a platform-specific weighted sum of
//!    its counters (see the `*_WEIGHT` constants).
//! 2. Engagement decays linearly with age over 24 hours, floored at
//!    [`MIN_TIME_WEIGHT`] so older mentions never vanish completely.
//! 3. A per-platform weight scales the decayed engagement.
//! 4. The weighted sum is normalized by the summed time weights and
//!    compressed with `ln(x + 1) * 10`, capped at [`MAX_SCORE`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Engagement, Observation, Platform};

/// Upper bound of any score
pub const MAX_SCORE: f64 = 100.0;

/// Floor of the time-decay weight
pub const MIN_TIME_WEIGHT: f64 = 0.1;

/// Age over which the decay weight reaches its floor
pub const DECAY_WINDOW_SECS: f64 = 24.0 * 3600.0;

/// Multiplier for retweets
pub const RETWEET_WEIGHT: f64 = 3.0;

/// Multiplier for tweet replies
pub const REPLY_WEIGHT: f64 = 2.0;

/// Multiplier for Reddit comments
pub const COMMENT_WEIGHT: f64 = 2.0;

/// Per-platform multipliers applied after time decay
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformWeights {
    pub twitter: f64,
    pub reddit: f64,
}

impl Default for PlatformWeights {
    fn default() -> Self {
        Self {
            twitter: 1.0,
            reddit: 0.8,
        }
    }
}

impl PlatformWeights {
    pub fn weight(&self, platform: Platform) -> f64 {
        match platform {
            Platform::Twitter => self.twitter,
            Platform::Reddit => self.reddit,
        }
    }
}

/// Raw engagement of one observation before decay and platform weighting
pub fn engagement_value(engagement: &Engagement) -> f64 {
    match engagement {
        Engagement::Twitter {
            like_count,
            retweet_count,
            reply_count,
        } => {
            *like_count as f64
                + *retweet_count as f64 * RETWEET_WEIGHT
                + *reply_count as f64 * REPLY_WEIGHT
        }
        Engagement::Reddit {
            score,
            num_comments,
            ..
        } => (*score).max(0) as f64 + *num_comments as f64 * COMMENT_WEIGHT,
    }
}

/// Linear decay weight for an item created at `created_at`
///
/// Items from the future count as brand new.
pub fn time_weight(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_secs = (now - created_at).num_milliseconds().max(0) as f64 / 1000.0;
    (1.0 - age_secs / DECAY_WINDOW_SECS).max(MIN_TIME_WEIGHT)
}

/// Computes bounded trend scores
#[derive(Debug, Clone, Default)]
pub struct ScoreEngine {
    weights: PlatformWeights,
}

impl ScoreEngine {
    pub fn new(weights: PlatformWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &PlatformWeights {
        &self.weights
    }

    /// Score observations relative to the current time
    pub fn score<'a, I>(&self, observations: I) -> f64
    where
        I: IntoIterator<Item = &'a Observation>,
    {
        self.score_at(observations, Utc::now())
    }

    /// Score observations relative to `now`
    pub fn score_at<'a, I>(&self, observations: I, now: DateTime<Utc>) -> f64
    where
        I: IntoIterator<Item = &'a Observation>,
    {
        let mut total_score = 0.0;
        let mut total_weight = 0.0;

        for obs in observations {
            let engagement = engagement_value(&obs.engagement);
            let decay = time_weight(obs.created_at, now);
            let platform_weight = self.weights.weight(obs.platform());

            total_score += engagement * decay * platform_weight;
            total_weight += decay;
        }

        if total_weight <= 0.0 {
            return 0.0;
        }

        let normalized = (total_score / total_weight).max(0.0);
        let final_score = (normalized + 1.0).ln() * 10.0;

        final_score.clamp(0.0, MAX_SCORE)
    }
}
