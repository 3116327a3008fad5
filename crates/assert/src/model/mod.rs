//! In-memory model of trace and metric snapshots.
//!
//! The same types describe both sides of an assertion. On the actual side
//! every field holds a concrete value; on the expected side a field holds
//! either a concrete value or a predicate understood by
//! [`e2e_verify_expression`].

mod lenient;
mod metric;
mod trace;

pub use metric::{Family, HistogramSample, Labels, MetricType, PlainSample, Sample, SummarySample};
pub use trace::{IntOrString, Reference, Span, Trace, TraceSnapshot};
