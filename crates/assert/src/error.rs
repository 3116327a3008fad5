//! Error types for the e2e-verify-assert crate

use std::fmt;
use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::model::{MetricType, Span};

/// Main error type for trace and metric assertions
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// A single field failed its predicate
    #[error("{field}: {source}")]
    #[diagnostic(code(e2e_verify::assert::field))]
    Field {
        /// Name of the compared field (e.g. `SpanID`, a tag key, a label name)
        field: String,
        /// Outcome of the predicate evaluation
        #[source]
        source: e2e_verify_expression::Error,
    },

    /// Two collections that must have equal cardinality differ in size
    #[error("{what} size not equal: expected=>{expected}, actual=>{actual}")]
    #[diagnostic(code(e2e_verify::assert::size_mismatch))]
    SizeMismatch {
        /// What was counted
        what: &'static str,
        /// Expected count
        expected: usize,
        /// Actual count
        actual: usize,
    },

    /// An expected key is absent from the actual side
    #[error("{what} '{key}' is missing on the actual side")]
    #[diagnostic(code(e2e_verify::assert::missing_key))]
    MissingKey {
        /// Kind of map the key belongs to (tag, quantile, bucket)
        what: &'static str,
        /// The missing key
        key: String,
    },

    /// The expected span declares references but the actual span has none
    #[error("actual span has no references")]
    #[diagnostic(code(e2e_verify::assert::reference))]
    MissingReferences,

    /// No actual reference satisfied an expected reference
    #[error("ReferenceNotFound: {expected}{}", render_reasons(.reasons))]
    #[diagnostic(code(e2e_verify::assert::reference))]
    ReferenceNotFound {
        /// The expected reference, rendered
        expected: String,
        /// Why each actual reference was rejected
        reasons: Vec<String>,
    },

    /// Every span sharing the expected operation name is already bound
    #[error("every actual span named '{operation_name}' is already matched by another expected span")]
    #[diagnostic(code(e2e_verify::assert::span_claimed))]
    CandidatesClaimed {
        /// The expected operation name
        operation_name: String,
    },

    /// An expected span found no matching actual span
    #[error("expected:\t{expected}\nactual:\t{actual}\n  reason:\t{reason}")]
    #[diagnostic(code(e2e_verify::assert::span_mismatch))]
    SpanMismatch {
        /// The expected span
        expected: SpanSummary,
        /// The last actual span it was compared with
        actual: SpanSummary,
        /// Why that comparison failed
        reason: Box<Error>,
    },

    /// An expected trace found no matching actual trace
    #[error("TraceNotFoundError:\nexpected:\n{}actual:\n{}", render_spans(.expected), render_cause(.trace_id.as_deref(), .cause.as_deref()))]
    #[diagnostic(
        code(e2e_verify::assert::trace_not_found),
        help("each expected trace must match a distinct actual trace with the same number of spans")
    )]
    TraceNotFound {
        /// Spans of the expected trace
        expected: Vec<SpanSummary>,
        /// Id of the last actual trace attempted, if any
        trace_id: Option<String>,
        /// Failure of the last attempt, if any
        cause: Option<Box<Error>>,
    },

    /// The expectation contains nothing to assert
    #[error("expected {what} can not be empty")]
    #[diagnostic(code(e2e_verify::assert::empty_expectation))]
    EmptyExpectation {
        /// What was empty (traces, metrics)
        what: &'static str,
    },

    /// No actual family has the expected name and type
    #[error("FamilyNotFoundError: expected[{name} {kind}]")]
    #[diagnostic(code(e2e_verify::assert::family_not_found))]
    FamilyNotFound {
        /// Expected family name
        name: String,
        /// Expected family type
        kind: MetricType,
    },

    /// A family that must not exist was found
    #[error("expected notContains Metrics[`{pattern}`], but found `{found}`")]
    #[diagnostic(code(e2e_verify::assert::family_present))]
    FamilyPresent {
        /// The pattern from the expectation
        pattern: String,
        /// Name of the actual family that matched it
        found: String,
    },

    /// A `notContains` family name is not a valid regular expression
    #[error("invalid notContains pattern `{pattern}`: {source}")]
    #[diagnostic(code(e2e_verify::assert::pattern))]
    InvalidPattern {
        /// The pattern as written
        pattern: String,
        /// Compiler error
        #[source]
        source: regex::Error,
    },

    /// A failure inside one metric family
    #[error("Metric[{family}]: {source}")]
    #[diagnostic(code(e2e_verify::assert::metric))]
    Metric {
        /// Family name
        family: String,
        /// Underlying failure
        #[source]
        source: Box<Error>,
    },

    /// An expected sample found no matching actual sample
    #[error("no actual sample matches expected sample #{index}: {}", render_sample_reason(.reason.as_deref()))]
    #[diagnostic(code(e2e_verify::assert::sample_not_found))]
    SampleNotFound {
        /// Position of the expected sample in its family
        index: usize,
        /// Failure of the last comparison, if any was made
        reason: Option<Box<Error>>,
    },

    /// The actual sample carries fewer labels than expected
    #[error("len(actualLabels) < len(expectedLabels), expected: {expected}, actual: {actual}")]
    #[diagnostic(code(e2e_verify::assert::labels))]
    TooFewLabels {
        /// Expected label count
        expected: usize,
        /// Actual label count
        actual: usize,
    },

    /// Expected and actual samples have different shapes
    #[error("sample shape differs: expected {expected}, actual {actual}")]
    #[diagnostic(code(e2e_verify::assert::sample_shape))]
    SampleShape {
        /// Expected shape
        expected: &'static str,
        /// Actual shape
        actual: &'static str,
    },

    /// I/O error with path context
    #[error("failed to read {}: {source}", .path.display())]
    #[diagnostic(code(e2e_verify::load::io))]
    Io {
        /// The file being read
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A data file could not be deserialized
    #[error("failed to parse {}: {message}", .path.display())]
    #[diagnostic(code(e2e_verify::load::parse))]
    Parse {
        /// The file being parsed
        path: PathBuf,
        /// Deserializer message
        message: String,
    },

    /// A metrics endpoint could not be reached
    #[error("failed to fetch metrics from {url}: {source}")]
    #[diagnostic(code(e2e_verify::load::http))]
    Http {
        /// Endpoint URL
        url: String,
        /// Transport error
        #[source]
        source: reqwest::Error,
    },

    /// A metrics endpoint answered with a non-success status
    #[error("metrics endpoint {url} returned HTTP {status}")]
    #[diagnostic(code(e2e_verify::load::http_status))]
    HttpStatus {
        /// Endpoint URL
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// Prometheus exposition text is malformed
    #[error("invalid exposition format at line {line}: {reason}")]
    #[diagnostic(code(e2e_verify::load::exposition))]
    Exposition {
        /// 1-based line number
        line: usize,
        /// What was wrong
        reason: String,
    },
}

impl Error {
    /// Wrap a predicate failure with the name of the field it concerns
    pub fn field(field: impl Into<String>, source: e2e_verify_expression::Error) -> Self {
        Self::Field {
            field: field.into(),
            source,
        }
    }

    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a deserialization error with path context
    pub fn parse(path: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Whether the failure comes from loading data rather than matching it
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::Parse { .. } | Self::Http { .. } | Self::HttpStatus { .. } | Self::Exposition { .. }
        )
    }
}

/// Result type for e2e-verify-assert operations
pub type Result<T> = std::result::Result<T, Error>;

/// Identifying fields of a span, used in diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanSummary {
    /// Trace the span belongs to
    pub trace_id: String,
    /// Parent span id
    pub parent_span_id: String,
    /// Span id
    pub span_id: String,
    /// Operation name
    pub operation_name: String,
}

impl From<&Span> for SpanSummary {
    fn from(span: &Span) -> Self {
        Self {
            trace_id: span.trace_id.clone(),
            parent_span_id: span.parent_span_id.clone(),
            span_id: span.span_id.clone(),
            operation_name: span.operation_name.clone(),
        }
    }
}

impl fmt::Display for SpanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Span[{}, {}] {}",
            self.parent_span_id, self.span_id, self.operation_name
        )
    }
}

fn render_spans(spans: &[SpanSummary]) -> String {
    spans.iter().map(|s| format!("  - {s}\n")).collect()
}

fn render_cause(trace_id: Option<&str>, cause: Option<&Error>) -> String {
    match (trace_id, cause) {
        (Some(id), Some(cause)) => format!("  Trace[{id}]:\n{cause}"),
        (None, Some(cause)) => cause.to_string(),
        _ => "  no unmatched actual trace left".to_string(),
    }
}

fn render_reasons(reasons: &[String]) -> String {
    reasons.iter().map(|r| format!("\n  - {r}")).collect()
}

fn render_sample_reason(reason: Option<&Error>) -> String {
    reason.map_or_else(
        || "no unmatched actual sample left".to_string(),
        ToString::to_string,
    )
}
