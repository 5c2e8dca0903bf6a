//! Emerging trend detection
//!
//! Compares each topic's score over a current window with its score over
//! the trailing day and reports topics whose velocity crosses a threshold.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::info;

use super::scoring::ScoreEngine;
use crate::models::{Observation, TrendScore};

/// How far back historical observations are considered
pub const HISTORY_LOOKBACK_HOURS: i64 = 24;

/// Topics with shorter keys are treated as noise
pub const MIN_TOPIC_LEN: usize = 3;

/// Groups observations by topic, keeping first-seen topic order
fn group_by_topic<'a, I>(observations: I) -> Vec<(String, Vec<&'a Observation>)>
where
    I: IntoIterator<Item = &'a Observation>,
{
    let mut groups: Vec<(String, Vec<&'a Observation>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for obs in observations {
        let key = obs.topic.to_lowercase();
        match index.get(&key) {
            Some(&i) => groups[i].1.push(obs),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![obs]));
            }
        }
    }

    groups
}

/// Detects topics whose score is rising faster than a threshold
#[derive(Debug, Clone, Default)]
pub struct EmergenceDetector {
    engine: ScoreEngine,
}

impl EmergenceDetector {
    pub fn new(engine: ScoreEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &ScoreEngine {
        &self.engine
    }

    /// Detect emerging topics relative to the current time
    pub fn detect(
        &self,
        current: &[Observation],
        historical: &[Observation],
        threshold: f64,
    ) -> Vec<TrendScore> {
        self.detect_at(current, historical, threshold, Utc::now())
    }

    /// Detect emerging topics relative to `now`
    ///
    /// Results are ordered by descending velocity; equal velocities keep the
    /// order in which their topics first appeared in `current`.
    pub fn detect_at(
        &self,
        current: &[Observation],
        historical: &[Observation],
        threshold: f64,
        now: DateTime<Utc>,
    ) -> Vec<TrendScore> {
        if current.is_empty() {
            return Vec::new();
        }

        let cutoff = now - Duration::hours(HISTORY_LOOKBACK_HOURS);
        let history: HashMap<String, Vec<&Observation>> =
            group_by_topic(historical.iter().filter(|obs| obs.observed_at >= cutoff))
                .into_iter()
                .collect();

        let mut emerging = Vec::new();

        for (topic, items) in group_by_topic(current) {
            if topic.chars().count() < MIN_TOPIC_LEN {
                continue;
            }

            let current_score = self.engine.score_at(items.iter().copied(), now);
            let velocity = match history.get(&topic) {
                Some(past) if !past.is_empty() => {
                    current_score - self.engine.score_at(past.iter().copied(), now)
                }
                _ => current_score,
            };

            if velocity < threshold {
                continue;
            }

            let first = items[0];
            let peak_score = items.iter().map(|o| o.raw_score()).max().unwrap_or(0);
            let first_seen = items.iter().map(|o| o.observed_at).min().unwrap_or(now);
            let last_seen = items.iter().map(|o| o.observed_at).max().unwrap_or(now);

            emerging.push(TrendScore {
                topic,
                platform: first.platform(),
                score: current_score,
                velocity,
                mentions: items.len(),
                peak_score,
                first_seen,
                last_seen,
            });
        }

        emerging.sort_by(|a, b| b.velocity.total_cmp(&a.velocity));

        info!(count = emerging.len(), threshold, "Detected emerging trends");
        emerging
    }
}
