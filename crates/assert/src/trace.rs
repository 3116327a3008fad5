//! Trace and span matching.
//!
//! Each expected trace must bind to a distinct actual trace with exactly as
//! many spans, and each expected span to a distinct span of that trace.
//! Extra actual traces are tolerated; extra actual spans are not.

use std::collections::BTreeMap;
use std::sync::Arc;

use e2e_verify_expression::ExpressionCache;
use rayon::prelude::*;

use crate::claim::{self, ClaimSet};
use crate::env::expand_env;
use crate::error::{Error, Result, SpanSummary};
use crate::model::{Reference, Span, Trace, TraceSnapshot};

/// Tag whose expected value is environment-expanded before comparison.
const HTTP_URL_TAG: &str = "http.url";

/// Matches expected traces against actual traces.
#[derive(Debug, Clone)]
pub struct TraceMatcher {
    cache: Arc<ExpressionCache>,
}

impl Default for TraceMatcher {
    fn default() -> Self {
        Self::new(ExpressionCache::global())
    }
}

impl TraceMatcher {
    /// Create a matcher evaluating predicates through `cache`.
    #[must_use]
    pub const fn new(cache: Arc<ExpressionCache>) -> Self {
        Self { cache }
    }

    /// Compare two snapshots. The declared `size` is informational only.
    ///
    /// # Errors
    ///
    /// See [`TraceMatcher::assert_traces`].
    pub fn assert_snapshot(&self, expected: &TraceSnapshot, actual: &TraceSnapshot) -> Result<()> {
        self.assert_traces(&expected.traces, &actual.traces)
    }

    /// Bind every expected trace, in order, to a distinct actual trace.
    /// Actual traces are claimed by position, so missing trace ids never
    /// collide.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyExpectation`] if `expected` is empty, and
    /// [`Error::TraceNotFound`] for the first expected trace that matches no
    /// unbound actual trace.
    #[tracing::instrument(name = "assert_traces", skip_all, fields(expected = expected.len(), actual = actual.len()))]
    pub fn assert_traces(&self, expected: &[Trace], actual: &[Trace]) -> Result<()> {
        if expected.is_empty() {
            return Err(Error::EmptyExpectation { what: "traces" });
        }

        let claims = ClaimSet::new();
        for expected_trace in expected {
            let mut last_attempt: Option<(String, Error)> = None;
            let mut bound = false;

            for (slot, actual_trace) in actual.iter().enumerate() {
                if claims.is_claimed(&slot) {
                    continue;
                }
                match self.spans_assert(expected_trace, actual_trace) {
                    Ok(()) => {
                        claims.claim(slot);
                        tracing::debug!(trace_id = %actual_trace.trace_id, "Trace matched");
                        bound = true;
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(trace_id = %actual_trace.trace_id, error = %e, "Trace candidate rejected");
                        last_attempt = Some((actual_trace.trace_id.clone(), e));
                    }
                }
            }

            if !bound {
                let (trace_id, cause) = last_attempt.map_or((None, None), |(id, e)| (Some(id), Some(Box::new(e))));
                return Err(Error::TraceNotFound {
                    expected: expected_trace.spans.iter().map(SpanSummary::from).collect(),
                    trace_id,
                    cause,
                });
            }
        }
        Ok(())
    }

    /// Check that `actual` has the same number of spans as `expected` and
    /// that every expected span binds to a distinct actual span.
    ///
    /// Candidates of each expected span are collected in parallel, then the
    /// spans are assigned so that a loose pattern never steals the only span
    /// a stricter one accepts. With several spans lacking any candidate,
    /// which failure is reported is unspecified.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SizeMismatch`] on a span count difference,
    /// [`Error::SpanMismatch`] for an expected span no actual span accepts,
    /// and [`Error::CandidatesClaimed`] when the candidates run out.
    pub fn spans_assert(&self, expected: &Trace, actual: &Trace) -> Result<()> {
        if expected.spans.len() != actual.spans.len() {
            return Err(Error::SizeMismatch {
                what: "spans",
                expected: expected.spans.len(),
                actual: actual.spans.len(),
            });
        }

        let candidates = expected
            .spans
            .par_iter()
            .map(|span| self.span_candidates(span, &actual.spans))
            .collect::<Result<Vec<_>>>()?;

        match claim::assign(&candidates, actual.spans.len()) {
            Ok(picked) => {
                for (span, slot) in expected.spans.iter().zip(picked) {
                    tracing::trace!(
                        span_id = %actual.spans[slot].span_id,
                        operation = %span.operation_name,
                        "Span matched"
                    );
                }
                Ok(())
            }
            Err(unbound) => Err(Error::CandidatesClaimed {
                operation_name: expected.spans[unbound].operation_name.clone(),
            }),
        }
    }

    /// Positions in `pool` of every span `expected` accepts.
    fn span_candidates(&self, expected: &Span, pool: &[Span]) -> Result<Vec<usize>> {
        let named: Vec<usize> = pool
            .iter()
            .enumerate()
            .filter(|(_, s)| self.cache.evaluate(&expected.operation_name, &s.operation_name).is_ok())
            .map(|(slot, _)| slot)
            .collect();

        if named.is_empty() {
            let first = pool.first().cloned().unwrap_or_default();
            let reason = self
                .value_assert("operationName", &expected.operation_name, &first.operation_name)
                .err()
                .unwrap_or_else(|| Error::SizeMismatch {
                    what: "spans",
                    expected: 1,
                    actual: 0,
                });
            return Err(Error::SpanMismatch {
                expected: SpanSummary::from(expected),
                actual: SpanSummary::from(&first),
                reason: Box::new(reason),
            });
        }

        let mut accepted = Vec::with_capacity(named.len());
        let mut last_attempt: Option<(usize, Error)> = None;
        for slot in named {
            match self.span_assert(expected, &pool[slot]) {
                Ok(()) => accepted.push(slot),
                Err(e) => last_attempt = Some((slot, e)),
            }
        }

        match (accepted.is_empty(), last_attempt) {
            (true, Some((slot, reason))) => Err(Error::SpanMismatch {
                expected: SpanSummary::from(expected),
                actual: SpanSummary::from(&pool[slot]),
                reason: Box::new(reason),
            }),
            _ => Ok(accepted),
        }
    }

    /// Compare every asserted field of one span pair. Logs are not compared.
    ///
    /// # Errors
    ///
    /// Returns the first failing field, wrapped with its name.
    pub fn span_assert(&self, expected: &Span, actual: &Span) -> Result<()> {
        self.value_assert("spanId", &expected.span_id, &actual.span_id)?;
        self.value_assert("duration", &expected.duration.to_string(), &actual.duration.to_string())?;
        self.value_assert("flags", &expected.flags.to_string(), &actual.flags.to_string())?;
        self.value_assert("operationName", &expected.operation_name, &actual.operation_name)?;
        self.value_assert("startTime", &expected.start_time.to_string(), &actual.start_time.to_string())?;
        self.value_assert("parentSpanId", &expected.parent_span_id, &actual.parent_span_id)?;
        self.tags_assert(&expected.tags, &actual.tags)?;
        self.references_assert(&expected.references, &actual.references)
    }

    /// Tags must have exactly the same keys; values are predicates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SizeMismatch`], [`Error::MissingKey`] or the failing
    /// tag value.
    pub fn tags_assert(&self, expected: &BTreeMap<String, String>, actual: &BTreeMap<String, String>) -> Result<()> {
        if expected.len() != actual.len() {
            return Err(Error::SizeMismatch {
                what: "tags",
                expected: expected.len(),
                actual: actual.len(),
            });
        }

        for (key, predicate) in expected {
            let Some(value) = actual.get(key) else {
                return Err(Error::MissingKey {
                    what: "tag",
                    key: key.clone(),
                });
            };
            if key == HTTP_URL_TAG {
                self.value_assert(&format!("tag[{key}]"), &expand_env(predicate), value)?;
            } else {
                self.value_assert(&format!("tag[{key}]"), predicate, value)?;
            }
        }
        Ok(())
    }

    /// Every expected reference must match some actual reference; extra
    /// actual references are allowed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingReferences`] if references are expected but
    /// the actual span has none, or [`Error::ReferenceNotFound`] listing why
    /// each actual reference was rejected.
    pub fn references_assert(&self, expected: &[Reference], actual: &[Reference]) -> Result<()> {
        if expected.is_empty() {
            return Ok(());
        }
        if actual.is_empty() {
            return Err(Error::MissingReferences);
        }

        for reference in expected {
            let mut reasons = Vec::new();
            let found = actual.iter().any(|candidate| match self.reference_assert(reference, candidate) {
                Ok(()) => true,
                Err(e) => {
                    reasons.push(format!("{candidate}: {e}"));
                    false
                }
            });
            if !found {
                return Err(Error::ReferenceNotFound {
                    expected: reference.to_string(),
                    reasons,
                });
            }
        }
        Ok(())
    }

    fn reference_assert(&self, expected: &Reference, actual: &Reference) -> Result<()> {
        self.value_assert("refType", &expected.ref_type, &actual.ref_type)?;
        self.value_assert("spanId", &expected.span_id, &actual.span_id)?;
        self.value_assert("traceId", &expected.trace_id, &actual.trace_id)
    }

    fn value_assert(&self, field: &str, expected: &str, actual: &str) -> Result<()> {
        self.cache
            .evaluate(expected, actual)
            .map_err(|source| Error::field(field, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::IntOrString;

    fn span(id: &str, parent: &str, op: &str) -> Span {
        Span {
            trace_id: "t1".to_string(),
            span_id: id.to_string(),
            parent_span_id: parent.to_string(),
            operation_name: op.to_string(),
            duration: IntOrString::Int(12),
            start_time: IntOrString::Int(1000),
            flags: IntOrString::Int(1),
            ..Span::default()
        }
    }

    fn pattern(id: &str, parent: &str, op: &str) -> Span {
        Span {
            span_id: id.to_string(),
            parent_span_id: parent.to_string(),
            operation_name: op.to_string(),
            duration: IntOrString::from("ge 0"),
            start_time: IntOrString::from("gt 0"),
            flags: IntOrString::from("notEmpty"),
            ..Span::default()
        }
    }

    fn trace(id: &str, spans: Vec<Span>) -> Trace {
        Trace {
            trace_id: id.to_string(),
            spans,
        }
    }

    fn matcher() -> TraceMatcher {
        TraceMatcher::new(Arc::new(ExpressionCache::new()))
    }

    #[test]
    fn test_span_assert_accepts_predicates() {
        assert!(matcher().span_assert(&pattern("1", "0", "GET:/users"), &span("1", "0", "GET:/users")).is_ok());
    }

    #[test]
    fn test_span_assert_names_failing_field() {
        let mut actual = span("1", "0", "GET:/users");
        actual.parent_span_id = "7".to_string();
        let err = matcher().span_assert(&pattern("1", "0", "GET:/users"), &actual).unwrap_err();
        assert!(matches!(&err, Error::Field { field, .. } if field == "parentSpanId"), "{err}");
    }

    #[test]
    fn test_tags_require_exact_key_set() {
        let m = matcher();
        let expected = BTreeMap::from([("a".to_string(), "1".to_string())]);
        let actual = BTreeMap::from([("a".to_string(), "1".to_string()), ("b".to_string(), "2".to_string())]);
        assert!(matches!(m.tags_assert(&expected, &actual), Err(Error::SizeMismatch { what: "tags", .. })));

        let actual = BTreeMap::from([("c".to_string(), "1".to_string())]);
        assert!(matches!(m.tags_assert(&expected, &actual), Err(Error::MissingKey { .. })));
    }

    #[test]
    fn test_http_url_tag_is_expanded() {
        temp_env::with_var("E2E_TAG_HOST", Some("gateway"), || {
            let expected = BTreeMap::from([(HTTP_URL_TAG.to_string(), "http://${E2E_TAG_HOST}/users".to_string())]);
            let actual = BTreeMap::from([(HTTP_URL_TAG.to_string(), "http://gateway/users".to_string())]);
            assert!(matcher().tags_assert(&expected, &actual).is_ok());
        });
    }

    #[test]
    fn test_references_are_a_subset() {
        let m = matcher();
        let parent = Reference {
            span_id: "0".to_string(),
            trace_id: "notEmpty".to_string(),
            ref_type: "CrossProcess".to_string(),
        };
        let actual = vec![
            Reference {
                span_id: "9".to_string(),
                trace_id: "other".to_string(),
                ref_type: "CrossThread".to_string(),
            },
            Reference {
                span_id: "0".to_string(),
                trace_id: "abc".to_string(),
                ref_type: "CrossProcess".to_string(),
            },
        ];
        assert!(m.references_assert(&[], &actual).is_ok());
        assert!(m.references_assert(std::slice::from_ref(&parent), &actual).is_ok());
        assert!(matches!(m.references_assert(&[parent.clone()], &[]), Err(Error::MissingReferences)));

        let err = m.references_assert(&[parent], &actual[..1]).unwrap_err();
        match err {
            Error::ReferenceNotFound { reasons, .. } => assert_eq!(reasons.len(), 1),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_span_count_must_match() {
        let expected = trace("e", vec![pattern("0", "-1", "A")]);
        let actual = trace("t1", vec![span("0", "-1", "A"), span("1", "0", "B")]);
        let err = matcher().spans_assert(&expected, &actual).unwrap_err();
        assert!(matches!(err, Error::SizeMismatch { what: "spans", expected: 1, actual: 2 }));
    }

    #[test]
    fn test_spans_bind_regardless_of_order() {
        let expected = trace("e", vec![pattern("0", "-1", "A"), pattern("1", "0", "B"), pattern("2", "0", "B")]);
        let actual = trace("t1", vec![span("2", "0", "B"), span("1", "0", "B"), span("0", "-1", "A")]);
        assert!(matcher().spans_assert(&expected, &actual).is_ok());
    }

    #[test]
    fn test_duplicate_expected_span_cannot_bind_twice() {
        let mut loose = pattern("notEmpty", "0", "B");
        loose.parent_span_id = "notEmpty".to_string();
        let expected = trace("e", vec![loose.clone(), loose]);
        let actual = trace("t1", vec![span("1", "0", "B"), span("0", "-1", "A")]);
        let err = matcher().spans_assert(&expected, &actual).unwrap_err();
        assert!(matches!(err, Error::CandidatesClaimed { .. }), "{err}");
    }

    #[test]
    fn test_loose_span_yields_to_strict_one() {
        let expected = trace("e", vec![pattern("notEmpty", "0", "B"), pattern("1", "0", "B")]);
        let actual = trace("t1", vec![span("1", "0", "B"), span("2", "0", "B")]);
        assert!(matcher().spans_assert(&expected, &actual).is_ok());

        let reversed = trace("t1", vec![span("2", "0", "B"), span("1", "0", "B")]);
        assert!(matcher().spans_assert(&expected, &reversed).is_ok());
    }

    #[test]
    fn test_unknown_operation_name_is_reported() {
        let expected = trace("e", vec![pattern("0", "-1", "Missing")]);
        let actual = trace("t1", vec![span("0", "-1", "A")]);
        let err = matcher().spans_assert(&expected, &actual).unwrap_err();
        match err {
            Error::SpanMismatch { reason, .. } => {
                assert!(matches!(*reason, Error::Field { ref field, .. } if field == "operationName"));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_extra_actual_traces_are_tolerated() {
        let expected = vec![
            trace("", vec![pattern("0", "-1", "A")]),
            trace("", vec![pattern("0", "-1", "B")]),
        ];
        let actual = vec![
            trace("t3", vec![span("0", "-1", "C")]),
            trace("t2", vec![span("0", "-1", "B")]),
            trace("t1", vec![span("0", "-1", "A")]),
        ];
        assert!(matcher().assert_traces(&expected, &actual).is_ok());
    }

    #[test]
    fn test_actual_trace_binds_once() {
        let expected = vec![
            trace("", vec![pattern("0", "-1", "A")]),
            trace("", vec![pattern("0", "-1", "A")]),
        ];
        let actual = vec![trace("t1", vec![span("0", "-1", "A")])];
        let err = matcher().assert_traces(&expected, &actual).unwrap_err();
        assert!(matches!(err, Error::TraceNotFound { trace_id: None, .. }), "{err}");
    }

    #[test]
    fn test_traces_without_ids_bind_by_position() {
        let expected = vec![
            trace("", vec![pattern("0", "-1", "A")]),
            trace("", vec![pattern("0", "-1", "A")]),
        ];
        let actual = vec![
            trace("", vec![span("0", "-1", "A")]),
            trace("", vec![span("0", "-1", "A")]),
        ];
        assert!(matcher().assert_traces(&expected, &actual).is_ok());
    }

    #[test]
    fn test_empty_expectation_fails() {
        assert!(matches!(
            matcher().assert_traces(&[], &[]),
            Err(Error::EmptyExpectation { what: "traces" })
        ));
    }
}
