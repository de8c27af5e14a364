use std::sync::OnceLock;

use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use serde_json::Value;
use tracing::warn;

// ── TimestampProcessor ────────────────────────────────────────────────────────

/// Parses the timestamp strings found in tracking-log exports.
pub struct TimestampProcessor;

impl TimestampProcessor {
    /// Parse an ISO-8601 string with a zone suffix (`Z` or `±HH:MM`) into an
    /// absolute UTC instant. Naive strings are read as UTC.
    pub fn parse_str(s: &str) -> Option<DateTime<Utc>> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }

        // Replace trailing 'Z' with '+00:00' for RFC 3339 compatibility.
        let normalised = if let Some(stripped) = s.strip_suffix('Z') {
            format!("{}+00:00", stripped)
        } else {
            s.to_string()
        };

        if let Ok(dt) = DateTime::parse_from_rfc3339(&normalised) {
            return Some(dt.with_timezone(&Utc));
        }

        // Space-separated variant with offset, as written by some exporters.
        const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];
        for fmt in OFFSET_FORMATS {
            if let Ok(dt) = DateTime::parse_from_str(&normalised, fmt) {
                return Some(dt.with_timezone(&Utc));
            }
        }

        const NAIVE_FORMATS: &[&str] = &[
            "%Y-%m-%dT%H:%M:%S%.f",
            "%Y-%m-%dT%H:%M:%S",
            "%Y-%m-%d %H:%M:%S%.f",
            "%Y-%m-%d %H:%M:%S",
        ];
        for fmt in NAIVE_FORMATS {
            if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, fmt) {
                return Some(Utc.from_utc_datetime(&naive));
            }
        }

        warn!(
            "TimestampProcessor: could not parse timestamp string \"{}\"",
            s
        );
        None
    }
}

// ── PayloadExtractor ──────────────────────────────────────────────────────────

/// Length of the hex block ids the platform assigns to content.
pub const BLOCK_ID_LEN: usize = 32;

fn alnum_run_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z0-9]+").expect("regex is valid"))
}

/// Field extraction from free-form event payloads.
///
/// Payloads are usually JSON objects serialised as text, so lookups by field
/// name come first. Positional lookups over double-quote-delimited tokens
/// reproduce the historical extraction for payloads that are not valid JSON.
pub struct PayloadExtractor;

impl PayloadExtractor {
    /// `true` for blank payloads and empty JSON objects.
    pub fn is_empty(payload: &str) -> bool {
        let trimmed = payload.trim();
        if trimmed.is_empty() || trimmed == "{}" {
            return true;
        }
        matches!(
            serde_json::from_str::<Value>(trimmed),
            Ok(Value::Object(map)) if map.is_empty()
        )
    }

    /// Parse the payload as a JSON object, if it is one.
    pub fn object(payload: &str) -> Option<serde_json::Map<String, Value>> {
        match serde_json::from_str::<Value>(payload.trim()) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        }
    }

    /// The first of `names` present in the payload object, rendered as text.
    pub fn field(payload: &str, names: &[&str]) -> Option<String> {
        let map = Self::object(payload)?;
        names.iter().find_map(|name| match map.get(*name)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    /// The `n`-th (1-based) token of `payload` split on double quotes.
    pub fn quoted_token(payload: &str, n: usize) -> Option<&str> {
        if n == 0 {
            return None;
        }
        payload.split('"').nth(n - 1)
    }

    /// The first standalone 32-character alphanumeric run in `text`.
    pub fn block_id(text: &str) -> Option<&str> {
        alnum_run_regex()
            .find_iter(text)
            .map(|m| m.as_str())
            .find(|run| run.len() == BLOCK_ID_LEN)
    }

    /// Strip everything but ASCII letters and digits from a child-index
    /// reference. Returns `None` when nothing is left.
    pub fn normalize_child_index(raw: &str) -> Option<String> {
        let cleaned: String = raw.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
        if cleaned.is_empty() {
            None
        } else {
            Some(cleaned)
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    // ── TimestampProcessor ───────────────────────────────────────────────────

    #[test]
    fn test_parse_platform_timestamp_with_micros() {
        let dt = TimestampProcessor::parse_str("2017-06-01T12:34:56.123456+00:00").unwrap();
        assert_eq!(dt.year(), 2017);
        assert_eq!(dt.hour(), 12);
        assert_eq!(dt.minute(), 34);
        assert_eq!(dt.nanosecond(), 123_456_000);
    }

    #[test]
    fn test_parse_z_suffix_iso() {
        let dt = TimestampProcessor::parse_str("2024-01-15T10:30:00Z").unwrap();
        assert_eq!(dt.day(), 15);
        assert_eq!(dt.hour(), 10);
    }

    #[test]
    fn test_parse_rfc3339_with_offset() {
        let dt = TimestampProcessor::parse_str("2024-03-20T14:00:00+05:00").unwrap();
        // 14:00 +05:00 = 09:00 UTC
        assert_eq!(dt.hour(), 9);
    }

    #[test]
    fn test_parse_space_separated_with_offset() {
        let dt = TimestampProcessor::parse_str("2017-06-01 08:00:00.5+02:00").unwrap();
        assert_eq!(dt.hour(), 6);
    }

    #[test]
    fn test_parse_naive_datetime_no_tz() {
        let dt = TimestampProcessor::parse_str("2024-01-15 12:30:45").unwrap();
        assert_eq!(dt.hour(), 12);
        assert_eq!(dt.minute(), 30);
    }

    #[test]
    fn test_parse_empty_and_garbage_return_none() {
        assert!(TimestampProcessor::parse_str("").is_none());
        assert!(TimestampProcessor::parse_str("not-a-timestamp").is_none());
    }

    // ── PayloadExtractor ─────────────────────────────────────────────────────

    #[test]
    fn test_is_empty() {
        assert!(PayloadExtractor::is_empty(""));
        assert!(PayloadExtractor::is_empty("  {}  "));
        assert!(PayloadExtractor::is_empty("{ }"));
        assert!(!PayloadExtractor::is_empty(r#"{"id": "x"}"#));
        assert!(!PayloadExtractor::is_empty("input_abc=1"));
    }

    #[test]
    fn test_field_by_name() {
        let payload = r#"{"widget_placement": "top", "target_tab": 3, "id": "seq"}"#;
        assert_eq!(
            PayloadExtractor::field(payload, &["target_tab", "new"]).as_deref(),
            Some("3")
        );
        assert_eq!(PayloadExtractor::field(payload, &["id"]).as_deref(), Some("seq"));
        assert!(PayloadExtractor::field(payload, &["missing"]).is_none());
        assert!(PayloadExtractor::field("not json", &["id"]).is_none());
    }

    #[test]
    fn test_quoted_token_positions() {
        let payload = r#"{"problem_id": "block-v1:X+Y+Z+type@problem+block@abc"}"#;
        assert_eq!(PayloadExtractor::quoted_token(payload, 2), Some("problem_id"));
        assert_eq!(
            PayloadExtractor::quoted_token(payload, 4),
            Some("block-v1:X+Y+Z+type@problem+block@abc")
        );
        assert!(PayloadExtractor::quoted_token(payload, 0).is_none());
        assert!(PayloadExtractor::quoted_token(payload, 40).is_none());
    }

    #[test]
    fn test_block_id_skips_shorter_and_longer_runs() {
        let id = "0123456789abcdef0123456789abcdef";
        let payload = format!(
            r#"{{"code": "dQw4w9WgXcQ", "id": "i4x-MITx-6_00x-video-{}", "currentTime": 12}}"#,
            id
        );
        assert_eq!(PayloadExtractor::block_id(&payload), Some(id));

        let too_long = format!("{}ff", id);
        assert!(PayloadExtractor::block_id(&too_long).is_none());
    }

    #[test]
    fn test_normalize_child_index() {
        assert_eq!(
            PayloadExtractor::normalize_child_index(": 3, ").as_deref(),
            Some("3")
        );
        assert_eq!(PayloadExtractor::normalize_child_index("12").as_deref(), Some("12"));
        assert!(PayloadExtractor::normalize_child_index(", ").is_none());
    }
}
