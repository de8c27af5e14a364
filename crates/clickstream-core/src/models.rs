use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A single tracking-log row for one user, as exported by the platform.
///
/// Exports are loose about types: ids arrive as numbers or strings, the
/// payload arrives either as JSON text or as an embedded object, and the
/// numeric problem fields may be strings or `null`. Every field is therefore
/// deserialised leniently.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEvent {
    /// Platform user id.
    #[serde(default, deserialize_with = "lenient_text")]
    pub user_id: String,
    /// Course run id, e.g. `course-v1:MITx+6.00x+2T2017`.
    #[serde(default, deserialize_with = "lenient_text")]
    pub course_id: String,
    /// Category tag: a semantic action name or a URL path.
    #[serde(default, deserialize_with = "lenient_text")]
    pub event_type: String,
    /// Free-form payload text. Embedded objects are kept as serialised JSON.
    #[serde(default, deserialize_with = "lenient_text")]
    pub event: String,
    /// ISO-8601 timestamp with zone offset.
    #[serde(default, alias = "timestamp", deserialize_with = "lenient_text")]
    pub time: String,
    /// Platform session token. Blank on many server-issued events.
    #[serde(default, deserialize_with = "lenient_text")]
    pub session: String,
    /// Content usage reference attached by the platform.
    #[serde(default, alias = "module_usage_key", deserialize_with = "lenient_text")]
    pub module_id: String,
    #[serde(default, deserialize_with = "lenient_count")]
    pub attempts: Option<u32>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub grade: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub max_grade: Option<f64>,
    /// Problem outcome (`correct` / `incorrect`).
    #[serde(default, deserialize_with = "lenient_optional_text")]
    pub success: Option<String>,
}

/// A [`RawEvent`] after temporal normalisation, segmentation, classification
/// and resolution.
#[derive(Debug, Clone, Serialize)]
pub struct NormalizedEvent {
    #[serde(flatten)]
    pub raw: RawEvent,
    /// Parsed absolute time (UTC).
    pub timestamp: DateTime<Utc>,
    /// Minutes until the next event. Synthetic for the final event.
    pub period: f64,
    /// Temporal session id.
    pub tsess: u32,
    /// Classification outcome.
    pub keep: bool,
    /// Current module key; starts as the raw usage reference.
    pub module_key: String,
    /// Child position referenced by navigation events.
    pub child_index: Option<String>,
    /// Tree depth of the node the module key was last resolved to.
    pub depth: Option<u32>,
}

impl NormalizedEvent {
    /// Wrap a raw event with its parsed time; derived fields start empty.
    pub fn new(raw: RawEvent, timestamp: DateTime<Utc>) -> Self {
        let module_key = raw.module_id.clone();
        Self {
            raw,
            timestamp,
            period: 0.0,
            tsess: 0,
            keep: true,
            module_key,
            child_index: None,
            depth: None,
        }
    }
}

/// One output row: the fixed 14-field schema consumed by trajectory models.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRecord {
    pub user_id: String,
    /// Hex id of the leaf content module.
    pub module_id: Option<String>,
    /// Sequence order of the module within the course.
    pub order: Option<u32>,
    /// Hex id of the module's parent.
    pub parent_module_id: Option<String>,
    pub module_type: Option<String>,
    pub event_type: Option<String>,
    pub time: Option<DateTime<Utc>>,
    pub period: Option<f64>,
    /// Platform session token (backfilled).
    pub session: Option<String>,
    pub tsess: Option<u32>,
    pub attempts: Option<u32>,
    pub grade: Option<f64>,
    pub max_grade: Option<f64>,
    pub success: Option<String>,
}

impl ResolvedRecord {
    /// The single row written for a user without any events.
    pub fn placeholder(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            ..Default::default()
        }
    }
}

/// Where a user's output lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputBucket {
    /// Resolved records.
    Resolved,
    /// The input was missing or empty.
    ZeroEvents,
    /// Classification dropped every event.
    NoUsableEvents,
    /// Classification kept events but none resolved to a content module.
    NoResolvedEvents,
}

impl OutputBucket {
    pub const ALL: [OutputBucket; 4] = [
        OutputBucket::Resolved,
        OutputBucket::ZeroEvents,
        OutputBucket::NoUsableEvents,
        OutputBucket::NoResolvedEvents,
    ];

    /// Sub-directory under the output root; `None` for the primary location.
    pub fn subdir(&self) -> Option<&'static str> {
        match self {
            OutputBucket::Resolved => None,
            OutputBucket::ZeroEvents => Some("zero_events"),
            OutputBucket::NoUsableEvents => Some("no_usable_events"),
            OutputBucket::NoResolvedEvents => Some("no_resolved_events"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputBucket::Resolved => "resolved",
            OutputBucket::ZeroEvents => "zero_events",
            OutputBucket::NoUsableEvents => "no_usable_events",
            OutputBucket::NoResolvedEvents => "no_resolved_events",
        }
    }
}

impl std::fmt::Display for OutputBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Lenient field decoding ────────────────────────────────────────────────────

/// Render any JSON value as text: strings verbatim, `null` as empty,
/// everything else as compact JSON.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn value_to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_text(&value))
}

fn lenient_optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let text = value_to_text(&value);
    Ok(if text.trim().is_empty() { None } else { Some(text) })
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_number(&value))
}

fn lenient_count<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_number(&value)
        .filter(|n| *n >= 0.0)
        .map(|n| n.round() as u32))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_event_lenient_types() {
        let line = serde_json::json!({
            "user_id": 1234,
            "course_id": "course-v1:MITx+6.00x+2T2017",
            "event_type": "problem_check",
            "event": {"answers": {"q1": "42"}},
            "time": "2017-06-01T12:00:00.000000+00:00",
            "session": null,
            "module_id": "block-v1:MITx+6.00x+2T2017+type@problem+block@abc",
            "attempts": "2",
            "grade": 1,
            "max_grade": "2.0",
            "success": "correct",
        });
        let raw: RawEvent = serde_json::from_value(line).unwrap();

        assert_eq!(raw.user_id, "1234");
        assert_eq!(raw.event, r#"{"answers":{"q1":"42"}}"#);
        assert_eq!(raw.session, "");
        assert_eq!(raw.attempts, Some(2));
        assert_eq!(raw.grade, Some(1.0));
        assert_eq!(raw.max_grade, Some(2.0));
        assert_eq!(raw.success.as_deref(), Some("correct"));
    }

    #[test]
    fn test_raw_event_missing_fields_default() {
        let raw: RawEvent = serde_json::from_str(r#"{"event_type": "page_close"}"#).unwrap();
        assert_eq!(raw.event_type, "page_close");
        assert!(raw.user_id.is_empty());
        assert!(raw.attempts.is_none());
        assert!(raw.success.is_none());
    }

    #[test]
    fn test_raw_event_timestamp_alias() {
        let raw: RawEvent =
            serde_json::from_str(r#"{"timestamp": "2017-06-01T12:00:00+00:00"}"#).unwrap();
        assert_eq!(raw.time, "2017-06-01T12:00:00+00:00");
    }

    #[test]
    fn test_raw_event_string_payload_kept_verbatim() {
        let raw: RawEvent =
            serde_json::from_str(r#"{"event": "{\"id\": \"abc\"}"}"#).unwrap();
        assert_eq!(raw.event, r#"{"id": "abc"}"#);
    }

    #[test]
    fn test_placeholder_has_only_user_id() {
        let rec = ResolvedRecord::placeholder("u1");
        assert_eq!(rec.user_id, "u1");
        assert!(rec.module_id.is_none());
        assert!(rec.order.is_none());
        assert!(rec.time.is_none());
    }

    #[test]
    fn test_output_bucket_subdirs() {
        assert_eq!(OutputBucket::Resolved.subdir(), None);
        assert_eq!(OutputBucket::ZeroEvents.subdir(), Some("zero_events"));
        assert_eq!(
            OutputBucket::NoUsableEvents.subdir(),
            Some("no_usable_events")
        );
        assert_eq!(
            OutputBucket::NoResolvedEvents.subdir(),
            Some("no_resolved_events")
        );
    }

    #[test]
    fn test_normalized_event_starts_with_usage_reference() {
        let raw = RawEvent {
            module_id: "block-v1:X+Y+Z+type@html+block@abc".to_string(),
            ..Default::default()
        };
        let ev = NormalizedEvent::new(raw, Utc::now());
        assert_eq!(ev.module_key, "block-v1:X+Y+Z+type@html+block@abc");
        assert!(ev.keep);
        assert!(ev.child_index.is_none());
    }
}
