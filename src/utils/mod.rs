//! Text and display helpers shared by formatting and the CLI

use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

/// Default cap used by [`clean_text`] callers that display free text
pub const DEFAULT_TEXT_LIMIT: usize = 200;

/// Collapse runs of whitespace into single spaces and trim
pub fn normalize_whitespace(text: &str) -> String {
    static WHITESPACE_RE: OnceLock<Regex> = OnceLock::new();

    let re = WHITESPACE_RE.get_or_init(|| Regex::new(r"\s+").expect("Invalid regex pattern"));

    re.replace_all(text.trim(), " ").to_string()
}

/// Normalize whitespace and truncate to `max_chars`, ending in `...` when cut
pub fn clean_text(text: &str, max_chars: usize) -> String {
    let cleaned = normalize_whitespace(text);

    if cleaned.chars().count() <= max_chars {
        return cleaned;
    }

    let kept: String = cleaned.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}

/// Human-readable duration: seconds below a minute, minutes below an hour
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();

    if secs < 60.0 {
        format!("{secs:.1}s")
    } else if secs < 3600.0 {
        format!("{:.1}m", secs / 60.0)
    } else {
        format!("{:.1}h", secs / 3600.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  hello   world  "), "hello world");
        assert_eq!(normalize_whitespace("hello\n\nworld"), "hello world");
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("short", 10), "short");
        assert_eq!(clean_text("very long text here", 10), "very lo...");
        assert_eq!(clean_text("  multi\n line\ttext ", 200), "multi line text");
        assert_eq!(clean_text("", 10), "");
    }

    #[test]
    fn test_clean_text_counts_chars() {
        let text = "한글 텍스트입니다 아주 길어요";
        let cleaned = clean_text(text, 8);
        assert_eq!(cleaned.chars().count(), 8);
        assert!(cleaned.ends_with("..."));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(4_200)), "4.2s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1.5m");
        assert_eq!(format_duration(Duration::from_secs(5_400)), "1.5h");
    }
}
