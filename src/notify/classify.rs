//! Severity classification of captured output lines.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::notify::NotificationLevel;

static ERROR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(exception|error|fail(ed|ure)?|fatal|unhandled|crash(ed)?|critical|stack\s*trace|null\s*reference)\b",
    )
    .expect("valid regex")
});

static WARNING_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(warn(ing)?|deprecated|timeout|timed?\s*out|retry|retrying)\b")
        .expect("valid regex")
});

/// Explicit zero-count or success phrasing that mentions error vocabulary.
static FALSE_POSITIVE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(error\s*count\s*:\s*0|0\s+error|errors?\s*:\s*0|no\s+errors?|warn(ing)?s?\s*:\s*0|0\s+warn|successfully|succeeded)",
    )
    .expect("valid regex")
});

/// Classifies one output line.
///
/// Returns `None` for blank lines, false positives and lines without alert
/// vocabulary. Error vocabulary wins over warning vocabulary.
pub fn classify(text: &str) -> Option<NotificationLevel> {
    if text.trim().is_empty() || FALSE_POSITIVE_PATTERN.is_match(text) {
        return None;
    }
    if ERROR_PATTERN.is_match(text) {
        Some(NotificationLevel::Error)
    } else if WARNING_PATTERN.is_match(text) {
        Some(NotificationLevel::Warning)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_vocabulary() {
        for line in [
            "Unhandled exception: System.NullReferenceException",
            "ERROR: connection refused",
            "build FAILED",
            "npm ERR! fatal: something",
            "worker crashed",
            "Null reference at line 3",
        ] {
            assert_eq!(classify(line), Some(NotificationLevel::Error), "{line}");
        }
    }

    #[test]
    fn warning_vocabulary() {
        for line in ["warn: slow query", "Request timed out", "retrying in 5s", "API is deprecated"] {
            assert_eq!(classify(line), Some(NotificationLevel::Warning), "{line}");
        }
    }

    #[test]
    fn error_wins_over_warning() {
        assert_eq!(classify("warning: fatal timeout"), Some(NotificationLevel::Error));
    }

    #[test]
    fn false_positives_are_ignored() {
        for line in [
            "Build succeeded. 0 Error(s)",
            "Errors: 0, Warnings: 0",
            "compiled successfully",
            "no errors found",
            "error count: 0",
        ] {
            assert_eq!(classify(line), None, "{line}");
        }
    }

    #[test]
    fn plain_and_blank_lines() {
        assert_eq!(classify("Listening on http://localhost:5173"), None);
        assert_eq!(classify("   "), None);
        assert_eq!(classify(""), None);
        // word boundaries: "errorless" is not an error
        assert_eq!(classify("terrors and errorless"), None);
    }
}
