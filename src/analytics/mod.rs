//! Analytics module for trend scoring and emergence detection

pub mod emergence;
pub mod keywords;
pub mod scoring;
pub mod summary;

pub use emergence::EmergenceDetector;
pub use keywords::{extract_keywords, KeywordExtractor};
pub use scoring::{PlatformWeights, ScoreEngine};
pub use summary::{summarize, top_subreddit, DailySummary, PlatformSummary};
