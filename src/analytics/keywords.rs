//! Keyword extraction from free text
//!
//! Tokenizes post titles and tweet text into normalized terms. Hashtags and
//! mentions survive untouched; short tokens, pure numbers and common English
//! function words are dropped.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

/// Default minimum token length for regular words
pub const DEFAULT_MIN_LENGTH: usize = 3;

const STOP_WORDS: &[&str] = &[
    "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "a", "an",
    "is", "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does", "did",
    "will", "would", "could", "should", "may", "might", "must", "can", "this", "that", "these",
    "those", "check",
];

fn non_word_re() -> &'static Regex {
    static NON_WORD_RE: OnceLock<Regex> = OnceLock::new();
    NON_WORD_RE.get_or_init(|| Regex::new(r"[^\w\s#@]").expect("Invalid regex pattern"))
}

/// Stop-word aware keyword tokenizer
#[derive(Debug, Clone)]
pub struct KeywordExtractor {
    stop_words: HashSet<&'static str>,
    min_length: usize,
}

impl Default for KeywordExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl KeywordExtractor {
    /// Create an extractor with the default stop-word set and minimum length
    pub fn new() -> Self {
        Self {
            stop_words: STOP_WORDS.iter().copied().collect(),
            min_length: DEFAULT_MIN_LENGTH,
        }
    }

    /// Override the minimum length for regular words
    #[must_use]
    pub fn with_min_length(mut self, min_length: usize) -> Self {
        self.min_length = min_length;
        self
    }

    pub fn min_length(&self) -> usize {
        self.min_length
    }

    pub fn is_stop_word(&self, word: &str) -> bool {
        self.stop_words.contains(word)
    }

    /// Extract keywords in the order they appear
    pub fn extract_keywords(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let lowered = text.to_lowercase();
        let cleaned = non_word_re().replace_all(&lowered, " ");

        cleaned
            .split_whitespace()
            .filter(|word| self.keep(word))
            .map(str::to_string)
            .collect()
    }

    fn keep(&self, word: &str) -> bool {
        if word.starts_with('#') || word.starts_with('@') {
            return true;
        }

        word.chars().count() >= self.min_length
            && !word.chars().all(|c| c.is_numeric())
            && !self.is_stop_word(word)
    }

    /// Count keywords across texts
    ///
    /// Only keywords seen more than once and longer than two characters are
    /// returned, most frequent first. Ties keep first-appearance order.
    pub fn keyword_frequencies<I, S>(&self, texts: I) -> Vec<(String, usize)>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut order: Vec<String> = Vec::new();
        let mut counts: HashMap<String, usize> = HashMap::new();

        for text in texts {
            for keyword in self.extract_keywords(text.as_ref()) {
                let count = counts.entry(keyword.clone()).or_insert(0);
                if *count == 0 {
                    order.push(keyword);
                }
                *count += 1;
            }
        }

        let mut frequent: Vec<(String, usize)> = order
            .into_iter()
            .filter_map(|k| {
                let count = counts.get(&k).copied().unwrap_or(0);
                (count > 1 && k.chars().count() > 2).then_some((k, count))
            })
            .collect();

        frequent.sort_by(|a, b| b.1.cmp(&a.1));
        frequent
    }
}

/// Extract keywords with the default extractor
pub fn extract_keywords(text: &str) -> Vec<String> {
    KeywordExtractor::new().extract_keywords(text)
}
