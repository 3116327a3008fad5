//! Trace and metric matching engine for e2e-verify.
//!
//! This crate decides whether captured data satisfies an expectation:
//! - [`TraceMatcher`] binds expected traces and spans to actual ones
//! - [`MetricMatcher`] binds expected metric families and samples, and
//!   checks `notContains` patterns
//! - [`load_traces`], [`load_expected_metrics`] and [`load_metrics`] read
//!   snapshots from files or live endpoints
//!
//! # Binding
//!
//! Expected entities may appear in any order and the actual side may carry
//! extra traces, families and samples. Each actual entity binds to at most
//! one expected entity. Spans of a trace and samples of a family are
//! matched in parallel; binding is an atomic insert into a shared set, so
//! two expected entities never claim the same actual one.
//!
//! # Example
//!
//! ```
//! use e2e_verify_assert::{MetricMatcher, Family};
//!
//! let expected: Vec<Family> = serde_json::from_str(
//!     r#"[{"name": "up", "type": "gauge", "metrics": [{"value": "eq 1"}]}]"#,
//! ).unwrap();
//! let actual = e2e_verify_assert::parse_exposition("# TYPE up gauge\nup 1\n").unwrap();
//!
//! assert!(MetricMatcher::default().assert_metrics(&expected, &actual).is_ok());
//! ```

mod claim;
mod env;
mod error;
mod exposition;
mod loader;
mod metric;
mod model;
mod trace;

pub use env::expand_env;
pub use error::{Error, Result, SpanSummary};
pub use exposition::parse_exposition;
pub use loader::{MetricsSource, load_expected_metrics, load_metrics, load_traces};
pub use metric::MetricMatcher;
pub use model::{
    Family, HistogramSample, IntOrString, Labels, MetricType, PlainSample, Reference, Sample, Span, SummarySample,
    Trace, TraceSnapshot,
};
pub use trace::TraceMatcher;
