//! Metric family matching.
//!
//! Expected families are split into families that must exist and name
//! patterns that must not (`notContains <regex>`). Families that must exist
//! are matched against the actual families by a merge over both lists
//! sorted by name; samples inside a matched family bind one-to-one.

use std::collections::BTreeMap;
use std::sync::Arc;

use e2e_verify_expression::ExpressionCache;
use rayon::prelude::*;
use regex::Regex;

use crate::claim;
use crate::error::{Error, Result};
use crate::model::{Family, HistogramSample, Labels, PlainSample, Sample, SummarySample};

/// Prefix marking an expected family name as a must-not-exist pattern.
const NOT_CONTAINS: &str = "notContains";

/// Matches expected metric families against actual ones.
#[derive(Debug, Clone)]
pub struct MetricMatcher {
    cache: Arc<ExpressionCache>,
}

impl Default for MetricMatcher {
    fn default() -> Self {
        Self::new(ExpressionCache::global())
    }
}

struct Absent<'a> {
    pattern: &'a str,
    regex: Regex,
}

impl MetricMatcher {
    /// Create a matcher evaluating predicates through `cache`.
    #[must_use]
    pub const fn new(cache: Arc<ExpressionCache>) -> Self {
        Self { cache }
    }

    /// Assert `actual` satisfies every expected family.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyExpectation`] if `expected` is empty
    /// - [`Error::InvalidPattern`] / [`Error::FamilyPresent`] for `notContains` entries
    /// - [`Error::FamilyNotFound`] when no actual family has the expected name and type
    /// - [`Error::Metric`] wrapping the first sample failure of a family
    #[tracing::instrument(name = "assert_metrics", skip_all, fields(expected = expected.len(), actual = actual.len()))]
    pub fn assert_metrics(&self, expected: &[Family], actual: &[Family]) -> Result<()> {
        if expected.is_empty() {
            return Err(Error::EmptyExpectation { what: "metrics" });
        }

        let (mut present, absent) = partition(expected)?;
        assert_absent(&absent, actual)?;

        present.sort_by(|a, b| a.name.cmp(&b.name));
        let mut pool: Vec<&Family> = actual.iter().collect();
        pool.sort_by(|a, b| a.name.cmp(&b.name));

        let mut cursor = 0;
        for family in present {
            loop {
                let Some(candidate) = pool.get(cursor) else {
                    return Err(not_found(family));
                };
                if candidate.name > family.name {
                    return Err(not_found(family));
                }
                cursor += 1;
                if candidate.name == family.name && candidate.kind == family.kind {
                    self.family_assert(family, candidate)
                        .map_err(|source| Error::Metric {
                            family: family.name.clone(),
                            source: Box::new(source),
                        })?;
                    tracing::debug!(family = %family.name, "Metric family matched");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Bind every expected sample of `expected` to a distinct sample of
    /// `actual`.
    ///
    /// Candidates are collected in parallel, one unit per expected sample,
    /// then assigned so that a loose expectation never takes the only sample
    /// a stricter one accepts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SampleNotFound`] for an expected sample that binds
    /// to nothing. With several failing samples, which one is reported is
    /// unspecified.
    pub fn family_assert(&self, expected: &Family, actual: &Family) -> Result<()> {
        let candidates = expected
            .metrics
            .par_iter()
            .enumerate()
            .map(|(index, sample)| self.sample_candidates(index, sample, &actual.metrics))
            .collect::<Result<Vec<_>>>()?;

        claim::assign(&candidates, actual.metrics.len())
            .map(|_| ())
            .map_err(|index| Error::SampleNotFound { index, reason: None })
    }

    /// Positions in `pool` of every sample `expected` accepts.
    fn sample_candidates(&self, index: usize, expected: &Sample, pool: &[Sample]) -> Result<Vec<usize>> {
        let mut accepted = Vec::new();
        let mut last_failure = None;
        for (slot, candidate) in pool.iter().enumerate() {
            match self.sample_assert(expected, candidate) {
                Ok(()) => accepted.push(slot),
                Err(e) => last_failure = Some(Box::new(e)),
            }
        }
        if accepted.is_empty() {
            return Err(Error::SampleNotFound {
                index,
                reason: last_failure,
            });
        }
        Ok(accepted)
    }

    /// Compare one sample pair of the same family.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SampleShape`] when the shapes differ, or the first
    /// failing label or value.
    pub fn sample_assert(&self, expected: &Sample, actual: &Sample) -> Result<()> {
        match (expected, actual) {
            (Sample::Plain(e), Sample::Plain(a)) => self.plain_assert(e, a),
            (Sample::Summary(e), Sample::Summary(a)) => self.summary_assert(e, a),
            (Sample::Histogram(e), Sample::Histogram(a)) => self.histogram_assert(e, a),
            _ => Err(Error::SampleShape {
                expected: expected.shape(),
                actual: actual.shape(),
            }),
        }
    }

    fn plain_assert(&self, expected: &PlainSample, actual: &PlainSample) -> Result<()> {
        self.labels_assert(&expected.labels, &actual.labels)?;
        self.value_assert("value", &expected.value, &actual.value)
    }

    fn summary_assert(&self, expected: &SummarySample, actual: &SummarySample) -> Result<()> {
        self.labels_assert(&expected.labels, &actual.labels)?;
        self.value_assert("count", &expected.count, &actual.count)?;
        self.value_assert("sum", &expected.sum, &actual.sum)?;
        self.entries_assert("quantile", &expected.quantiles, &actual.quantiles)
    }

    fn histogram_assert(&self, expected: &HistogramSample, actual: &HistogramSample) -> Result<()> {
        self.labels_assert(&expected.labels, &actual.labels)?;
        self.value_assert("count", &expected.count, &actual.count)?;
        self.value_assert("sum", &expected.sum, &actual.sum)?;
        self.entries_assert("bucket", &expected.buckets, &actual.buckets)
    }

    /// The actual sample may carry more labels; a missing one compares as "".
    fn labels_assert(&self, expected: &Labels, actual: &Labels) -> Result<()> {
        if actual.len() < expected.len() {
            return Err(Error::TooFewLabels {
                expected: expected.len(),
                actual: actual.len(),
            });
        }
        for (name, predicate) in expected {
            let value = actual.get(name).map_or("", String::as_str);
            self.value_assert(&format!("label[{name}]"), predicate, value)?;
        }
        Ok(())
    }

    fn entries_assert(
        &self,
        what: &'static str,
        expected: &BTreeMap<String, String>,
        actual: &BTreeMap<String, String>,
    ) -> Result<()> {
        for (key, predicate) in expected {
            let value = actual.get(key).ok_or_else(|| Error::MissingKey {
                what,
                key: key.clone(),
            })?;
            self.value_assert(&format!("{what}[{key}]"), predicate, value)?;
        }
        Ok(())
    }

    fn value_assert(&self, field: &str, expected: &str, actual: &str) -> Result<()> {
        self.cache
            .evaluate(expected, actual)
            .map_err(|source| Error::field(field, source))
    }
}

fn partition(expected: &[Family]) -> Result<(Vec<&Family>, Vec<Absent<'_>>)> {
    let mut present = Vec::new();
    let mut absent = Vec::new();

    for family in expected {
        match family.name.split_once(' ') {
            Some((mark, pattern)) if mark.eq_ignore_ascii_case(NOT_CONTAINS) => {
                let pattern = pattern.trim();
                let regex = Regex::new(pattern).map_err(|source| Error::InvalidPattern {
                    pattern: pattern.to_string(),
                    source,
                })?;
                absent.push(Absent { pattern, regex });
            }
            _ => present.push(family),
        }
    }
    Ok((present, absent))
}

fn assert_absent(absent: &[Absent<'_>], actual: &[Family]) -> Result<()> {
    absent.par_iter().try_for_each(|entry| {
        actual
            .iter()
            .find(|family| entry.regex.is_match(&family.name))
            .map_or(Ok(()), |family| {
                Err(Error::FamilyPresent {
                    pattern: entry.pattern.to_string(),
                    found: family.name.clone(),
                })
            })
    })
}

fn not_found(family: &Family) -> Error {
    Error::FamilyNotFound {
        name: family.name.clone(),
        kind: family.kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MetricType;

    fn plain(labels: &[(&str, &str)], value: &str) -> Sample {
        Sample::Plain(PlainSample {
            labels: labels.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect(),
            timestamp_ms: None,
            value: value.to_string(),
        })
    }

    fn family(name: &str, kind: MetricType, metrics: Vec<Sample>) -> Family {
        Family {
            metrics,
            ..Family::new(name, kind)
        }
    }

    fn matcher() -> MetricMatcher {
        MetricMatcher::new(Arc::new(ExpressionCache::new()))
    }

    fn actual() -> Vec<Family> {
        vec![
            family(
                "http_requests_total",
                MetricType::Counter,
                vec![
                    plain(&[("code", "200"), ("method", "GET")], "12"),
                    plain(&[("code", "500"), ("method", "GET")], "1"),
                ],
            ),
            family("up", MetricType::Gauge, vec![plain(&[], "1")]),
        ]
    }

    #[test]
    fn test_matching_families_in_any_order() {
        let expected = vec![
            family("up", MetricType::Gauge, vec![plain(&[], "eq 1")]),
            family(
                "http_requests_total",
                MetricType::Counter,
                vec![plain(&[("code", "500")], "gt 0"), plain(&[("code", "200")], "ge 10")],
            ),
        ];
        assert!(matcher().assert_metrics(&expected, &actual()).is_ok());
    }

    #[test]
    fn test_type_must_match() {
        let expected = vec![family("up", MetricType::Counter, vec![plain(&[], "1")])];
        let err = matcher().assert_metrics(&expected, &actual()).unwrap_err();
        assert!(matches!(err, Error::FamilyNotFound { kind: MetricType::Counter, .. }), "{err}");
    }

    #[test]
    fn test_sample_failure_is_wrapped_with_family() {
        let expected = vec![family("up", MetricType::Gauge, vec![plain(&[], "eq 0")])];
        let err = matcher().assert_metrics(&expected, &actual()).unwrap_err();
        assert!(err.to_string().starts_with("Metric[up]"), "{err}");
    }

    #[test]
    fn test_samples_bind_once() {
        let expected = vec![family(
            "up",
            MetricType::Gauge,
            vec![plain(&[], "notEmpty"), plain(&[], "notEmpty")],
        )];
        assert!(matcher().assert_metrics(&expected, &actual()).is_err());
    }

    #[test]
    fn test_loose_sample_yields_to_strict_one() {
        let actual = vec![family("up", MetricType::Gauge, vec![plain(&[], "1"), plain(&[], "2")])];
        let expected = vec![family(
            "up",
            MetricType::Gauge,
            vec![plain(&[], "notEmpty"), plain(&[], "eq 1")],
        )];
        assert!(matcher().assert_metrics(&expected, &actual).is_ok());
    }

    #[test]
    fn test_too_few_labels() {
        let m = matcher();
        let err = m
            .sample_assert(&plain(&[("a", "1"), ("b", "2")], "1"), &plain(&[("a", "1")], "1"))
            .unwrap_err();
        assert!(matches!(err, Error::TooFewLabels { expected: 2, actual: 1 }));
    }

    #[test]
    fn test_missing_label_compares_as_empty() {
        let m = matcher();
        assert!(m.sample_assert(&plain(&[("zone", "empty")], "1"), &plain(&[("other", "x")], "1")).is_ok());
    }

    #[test]
    fn test_not_contains() {
        let m = matcher();
        let expected = vec![family("notContains ^go_.*", MetricType::Untyped, vec![])];
        assert!(m.assert_metrics(&expected, &actual()).is_ok());
        assert!(m.assert_metrics(&expected, &[]).is_ok());

        let expected = vec![family("NOTCONTAINS  http_.*_total", MetricType::Untyped, vec![])];
        let err = m.assert_metrics(&expected, &actual()).unwrap_err();
        assert!(matches!(err, Error::FamilyPresent { ref found, .. } if found == "http_requests_total"));
    }

    #[test]
    fn test_invalid_not_contains_pattern() {
        let expected = vec![family("notContains (", MetricType::Untyped, vec![])];
        let err = matcher().assert_metrics(&expected, &actual()).unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { .. }));
    }

    #[test]
    fn test_summary_quantiles_are_a_subset() {
        let actual = Sample::Summary(SummarySample {
            count: "4".to_string(),
            sum: "1.5".to_string(),
            quantiles: BTreeMap::from([("0.5".to_string(), "0.2".to_string()), ("0.99".to_string(), "0.9".to_string())]),
            ..SummarySample::default()
        });
        let expected = Sample::Summary(SummarySample {
            count: "gt 0".to_string(),
            quantiles: BTreeMap::from([("0.99".to_string(), "lt 1".to_string())]),
            ..SummarySample::default()
        });
        assert!(matcher().sample_assert(&expected, &actual).is_ok());

        let expected = Sample::Summary(SummarySample {
            quantiles: BTreeMap::from([("0.75".to_string(), String::new())]),
            ..SummarySample::default()
        });
        assert!(matches!(
            matcher().sample_assert(&expected, &actual),
            Err(Error::MissingKey { what: "quantile", .. })
        ));
    }

    #[test]
    fn test_histogram_bucket_mismatch() {
        let actual = Sample::Histogram(HistogramSample {
            count: "3".to_string(),
            sum: "0.7".to_string(),
            buckets: BTreeMap::from([("0.5".to_string(), "2".to_string()), ("+Inf".to_string(), "3".to_string())]),
            ..HistogramSample::default()
        });
        let expected = Sample::Histogram(HistogramSample {
            buckets: BTreeMap::from([("+Inf".to_string(), "4".to_string())]),
            ..HistogramSample::default()
        });
        let err = matcher().sample_assert(&expected, &actual).unwrap_err();
        assert!(matches!(err, Error::Field { ref field, .. } if field == "bucket[+Inf]"));
    }

    #[test]
    fn test_shape_mismatch() {
        let err = matcher()
            .sample_assert(&plain(&[], "1"), &Sample::Summary(SummarySample::default()))
            .unwrap_err();
        assert!(matches!(err, Error::SampleShape { expected: "plain", actual: "summary" }));
    }

    #[test]
    fn test_empty_expectation_fails() {
        assert!(matches!(
            matcher().assert_metrics(&[], &actual()),
            Err(Error::EmptyExpectation { what: "metrics" })
        ));
    }
}
