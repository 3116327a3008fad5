//! Trace matching against snapshot files.

use std::path::PathBuf;

use e2e_verify_assert::{Error, IntOrString, Reference, Span, Trace, TraceMatcher, TraceSnapshot, load_traces};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn snapshots() -> (TraceSnapshot, TraceSnapshot) {
    let expected = load_traces(fixture("expected-traces.yml")).unwrap();
    let actual = load_traces(fixture("actual-traces.json")).unwrap();
    (expected, actual)
}

fn span(id: &str, parent: &str, op: &str, start: i64) -> Span {
    Span {
        trace_id: "t".to_string(),
        span_id: id.to_string(),
        parent_span_id: parent.to_string(),
        operation_name: op.to_string(),
        start_time: IntOrString::Int(start),
        duration: IntOrString::Int(3),
        flags: IntOrString::Int(0),
        ..Span::default()
    }
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn test_spans_are_sorted_by_start_time() {
    let (_, actual) = snapshots();
    let trace = actual.traces.iter().find(|t| t.trace_id == "a91be4f2").unwrap();
    assert_eq!(trace.spans[0].operation_name, "GET:/users");
    assert_eq!(trace.spans[1].operation_name, "SELECT users");
    assert_eq!(actual.size, Some(3));
}

// ============================================================================
// Snapshot scenarios
// ============================================================================

#[test]
fn test_fixture_snapshots_match() {
    temp_env::with_var("E2E_GATEWAY", Some("gateway:8080"), || {
        let (expected, actual) = snapshots();
        TraceMatcher::default().assert_snapshot(&expected, &actual).unwrap();
    });
}

#[test]
fn test_http_url_depends_on_environment() {
    temp_env::with_var("E2E_GATEWAY", Some("elsewhere:80"), || {
        let (expected, actual) = snapshots();
        let err = TraceMatcher::default().assert_snapshot(&expected, &actual).unwrap_err();
        assert!(matches!(err, Error::TraceNotFound { .. }), "{err}");
        assert!(err.to_string().contains("tag[http.url]"), "{err}");
    });
}

#[test]
fn test_two_expected_traces_among_three_actual() {
    let expected = vec![
        Trace {
            trace_id: String::new(),
            spans: vec![span("0", "-1", "A", 1)],
        },
        Trace {
            trace_id: String::new(),
            spans: vec![span("0", "-1", "B", 1)],
        },
    ];
    let actual = vec![
        Trace {
            trace_id: "x".to_string(),
            spans: vec![span("0", "-1", "Unrelated", 1)],
        },
        Trace {
            trace_id: "b".to_string(),
            spans: vec![span("0", "-1", "B", 1)],
        },
        Trace {
            trace_id: "a".to_string(),
            spans: vec![span("0", "-1", "A", 1)],
        },
    ];
    TraceMatcher::default().assert_traces(&expected, &actual).unwrap();
}

#[test]
fn test_extra_span_in_trace_is_size_mismatch() {
    let expected = Trace {
        trace_id: String::new(),
        spans: vec![span("0", "-1", "A", 1), span("1", "0", "B", 2)],
    };
    let mut actual = expected.clone();
    actual.spans.push(span("2", "0", "C", 3));

    let err = TraceMatcher::default().spans_assert(&expected, &actual).unwrap_err();
    assert!(matches!(err, Error::SizeMismatch { expected: 2, actual: 3, .. }));
}

#[test]
fn test_perturbed_field_is_named() {
    let expected = Trace {
        trace_id: String::new(),
        spans: vec![span("0", "-1", "A", 1), span("1", "0", "B", 2)],
    };
    let mut actual = expected.clone();
    actual.spans[1].duration = IntOrString::Int(99);

    let err = TraceMatcher::default().spans_assert(&expected, &actual).unwrap_err();
    match err {
        Error::SpanMismatch { reason, .. } => {
            assert!(matches!(*reason, Error::Field { ref field, .. } if field == "duration"));
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn test_extra_actual_tag_fails() {
    let mut expected = span("0", "-1", "A", 1);
    expected.tags.insert("a".to_string(), "1".to_string());
    let mut actual = expected.clone();
    actual.tags.insert("b".to_string(), "2".to_string());

    let err = TraceMatcher::default().span_assert(&expected, &actual).unwrap_err();
    assert!(matches!(err, Error::SizeMismatch { what: "tags", .. }));
}

#[test]
fn test_extra_actual_reference_is_allowed() {
    let reference = Reference {
        span_id: "0".to_string(),
        trace_id: "p".to_string(),
        ref_type: "CrossProcess".to_string(),
    };
    let mut expected = span("0", "-1", "A", 1);
    expected.references.push(reference.clone());
    let mut actual = expected.clone();
    actual.references.insert(
        0,
        Reference {
            ref_type: "CrossThread".to_string(),
            ..reference
        },
    );

    TraceMatcher::default().span_assert(&expected, &actual).unwrap();
    let err = TraceMatcher::default().span_assert(&actual, &expected).unwrap_err();
    assert!(matches!(err, Error::ReferenceNotFound { .. }), "{err}");
}
