use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::lenient;

/// A value written either as an integer or as a string.
///
/// Actual snapshots carry numbers (`"duration": 12`); expectation files
/// usually carry predicates (`"duration": "ge 0"`). Both compare through
/// their string form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntOrString {
    /// An integer value
    Int(i64),
    /// A string value, possibly a predicate
    String(String),
}

impl IntOrString {
    /// The integer value; strings that do not parse yield 0.
    #[must_use]
    pub fn int_value(&self) -> i64 {
        match self {
            Self::Int(n) => *n,
            Self::String(s) => s.trim().parse().unwrap_or(0),
        }
    }
}

impl Default for IntOrString {
    fn default() -> Self {
        Self::String(String::new())
    }
}

impl fmt::Display for IntOrString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<i64> for IntOrString {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for IntOrString {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

/// A causal link from one span to another, possibly in another trace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    /// Referenced span
    #[serde(default, deserialize_with = "lenient::string")]
    pub span_id: String,
    /// Trace of the referenced span
    #[serde(default, deserialize_with = "lenient::string")]
    pub trace_id: String,
    /// Relationship, e.g. `CHILD_OF` or `FOLLOWS_FROM`
    #[serde(default, deserialize_with = "lenient::string")]
    pub ref_type: String,
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Reference[{}, {}, {}]",
            self.ref_type, self.trace_id, self.span_id
        )
    }
}

/// A single recorded operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    /// Trace this span belongs to
    #[serde(default, deserialize_with = "lenient::string")]
    pub trace_id: String,
    /// Span identifier, unique within its trace
    #[serde(default, deserialize_with = "lenient::string")]
    pub span_id: String,
    /// Parent span identifier
    #[serde(default, deserialize_with = "lenient::string")]
    pub parent_span_id: String,
    /// Duration
    #[serde(default)]
    pub duration: IntOrString,
    /// Flags
    #[serde(default)]
    pub flags: IntOrString,
    /// Start time
    #[serde(default)]
    pub start_time: IntOrString,
    /// Operation name
    #[serde(default, deserialize_with = "lenient::string")]
    pub operation_name: String,
    /// Tags; compared with an exact key set
    #[serde(default, deserialize_with = "lenient::string_map")]
    pub tags: BTreeMap<String, String>,
    /// References to other spans; compared as a subset
    #[serde(default)]
    pub references: Vec<Reference>,
    /// Logs; carried but never asserted
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<serde_json::Value>,
}

/// Spans sharing a trace identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    /// Trace identifier
    #[serde(default, deserialize_with = "lenient::string")]
    pub trace_id: String,
    /// Spans of the trace
    #[serde(default)]
    pub spans: Vec<Span>,
}

impl Trace {
    /// Sort spans by start time, ascending.
    pub fn sort_spans(&mut self) {
        self.spans.sort_by_key(|s| s.start_time.int_value());
    }
}

/// A set of traces, as captured or as expected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceSnapshot {
    /// Declared number of traces, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    /// The traces
    #[serde(default)]
    pub traces: Vec<Trace>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_or_string_forms() {
        let span: Span = serde_json::from_str(
            r#"{"spanId": "1", "duration": 15, "startTime": "gt 0", "flags": 1}"#,
        )
        .unwrap();
        assert_eq!(span.duration, IntOrString::Int(15));
        assert_eq!(span.duration.to_string(), "15");
        assert_eq!(span.start_time.to_string(), "gt 0");
        assert_eq!(span.flags.to_string(), "1");
    }

    #[test]
    fn test_missing_numeric_field_is_unchecked() {
        let span: Span = serde_json::from_str(r#"{"spanId": "1"}"#).unwrap();
        assert_eq!(span.duration.to_string(), "");
    }

    #[test]
    fn test_int_value_of_predicate_is_zero() {
        assert_eq!(IntOrString::from("gt 0").int_value(), 0);
        assert_eq!(IntOrString::from(" 42 ").int_value(), 42);
        assert_eq!(IntOrString::Int(7).int_value(), 7);
    }

    #[test]
    fn test_sort_spans_by_start_time() {
        let mut trace = Trace {
            trace_id: "t".to_string(),
            spans: vec![
                Span {
                    span_id: "late".to_string(),
                    start_time: IntOrString::Int(30),
                    ..Span::default()
                },
                Span {
                    span_id: "early".to_string(),
                    start_time: IntOrString::Int(10),
                    ..Span::default()
                },
            ],
        };
        trace.sort_spans();
        assert_eq!(trace.spans[0].span_id, "early");
    }

    #[test]
    fn test_snapshot_size_is_optional() {
        let snapshot: TraceSnapshot = serde_json::from_str(r#"{"traces": []}"#).unwrap();
        assert_eq!(snapshot.size, None);

        let snapshot: TraceSnapshot = serde_json::from_str(r#"{"size": 2, "traces": []}"#).unwrap();
        assert_eq!(snapshot.size, Some(2));
    }
}
