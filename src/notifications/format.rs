//! Telegram-flavoured Markdown bodies for each alert kind

use chrono::{DateTime, TimeZone};
use std::fmt::Write;

use crate::analytics::DailySummary;
use crate::models::{Platform, TopTrend, TrendScore};
use crate::utils::clean_text;

/// Rows shown in a per-platform trend alert
pub const TREND_ALERT_ROWS: usize = 5;

/// Characters of a Reddit title kept in a trend alert
pub const TITLE_PREVIEW_CHARS: usize = 60;

/// Drop characters that would open a Markdown entity inside user content
pub fn markdown_safe(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '*' | '_' | '`' | '['))
        .collect()
}

/// Emerging trends alert, one block per trend in the given order
pub fn format_emerging_alert<Tz>(trends: &[TrendScore], detected_at: DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let mut message = String::from("🚀 *Emerging Trends Alert*\n\n");

    for (i, trend) in trends.iter().enumerate() {
        let _ = write!(
            message,
            "{}. *{}* ({})\n   Score: {:.1} | Velocity: +{:.1}\n   Mentions: {}\n\n",
            i + 1,
            markdown_safe(&trend.topic),
            trend.platform,
            trend.score,
            trend.velocity,
            trend.mentions,
        );
    }

    let _ = write!(message, "_Detected at {}_", detected_at.format("%H:%M"));
    message
}

/// Plain one-line listing of an emerging trend for terminal output
pub fn format_emerging_row(trend: &TrendScore) -> String {
    format!(
        "{:<8} {}  score={:.1} velocity={:.2} mentions={}",
        trend.platform.as_str(),
        clean_text(&trend.topic, 60),
        trend.score,
        trend.velocity,
        trend.mentions
    )
}

/// Top trends of one platform; `None` when there is nothing to report
pub fn format_trend_alert(platform: Platform, trends: &[TopTrend]) -> Option<String> {
    if trends.is_empty() {
        return None;
    }

    let mut message = format!("🔥 *Trending on {}*\n\n", platform.display_name());

    for (i, trend) in trends.iter().take(TREND_ALERT_ROWS).enumerate() {
        let topic = markdown_safe(&trend.topic);
        let _ = match platform {
            Platform::Twitter => writeln!(
                message,
                "{}. `{}` (vol: {})",
                i + 1,
                topic,
                trend.mentions
            ),
            Platform::Reddit => writeln!(
                message,
                "{}. *{}* (⬆️{})",
                i + 1,
                clean_text(&topic, TITLE_PREVIEW_CHARS),
                trend.max_score
            ),
        };
    }

    let _ = write!(message, "\n📊 Total trends: {}", trends.len());
    Some(message)
}

/// Daily digest body
pub fn format_daily_summary(summary: &DailySummary) -> String {
    let mut message = String::from("📈 *Daily Trend Summary*\n\n");

    if let Some(twitter) = summary.platform(Platform::Twitter) {
        let _ = writeln!(message, "📱 *Twitter*: {} trends tracked", twitter.count);
        if let Some(top) = &twitter.top_topic {
            let _ = writeln!(message, "   Top: `{}`", markdown_safe(top));
        }
    }

    if let Some(reddit) = summary.platform(Platform::Reddit) {
        let _ = writeln!(message, "🔴 *Reddit*: {} hot topics", reddit.count);
        if let Some(sub) = &reddit.top_subreddit {
            let _ = writeln!(message, "   Most active: r/{}", markdown_safe(sub));
        }
    }

    if !summary.top_keywords.is_empty() {
        let keywords: Vec<String> = summary
            .top_keywords
            .iter()
            .map(|(word, count)| format!("{} ({count})", markdown_safe(word)))
            .collect();
        let _ = writeln!(message, "\n🔑 Keywords: {}", keywords.join(", "));
    }

    let _ = write!(message, "\n💾 Total records: {}", summary.total_records);
    message.push_str("\n\n_Powered by TrendBot_ 🤖");
    message
}
