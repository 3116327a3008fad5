//! Case progress and result reporting.

use crate::error::Error;

/// Outcome of one case.
#[derive(Debug)]
pub struct CaseResult {
    /// Case display name
    pub name: String,
    /// Human-readable outcome
    pub message: String,
    /// The failure, if the case failed
    pub error: Option<Error>,
    /// Whether the case was not (fully) run because of fail-fast
    pub skipped: bool,
}

impl CaseResult {
    /// A case that passed.
    #[must_use]
    pub fn passed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            error: None,
            skipped: false,
        }
    }

    /// A case that failed with `error`.
    #[must_use]
    pub fn failed(name: impl Into<String>, message: impl Into<String>, error: Error) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            error: Some(error),
            skipped: false,
        }
    }

    /// A case that was skipped.
    #[must_use]
    pub fn skipped(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            message: format!("skipped {name}"),
            name,
            error: None,
            skipped: true,
        }
    }

    /// Whether this result counts as a failure.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        !self.skipped && self.error.is_some()
    }
}

/// Counts of case outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    /// Cases that passed
    pub passed: usize,
    /// Cases that failed
    pub failed: usize,
    /// Cases skipped by fail-fast
    pub skipped: usize,
}

impl Summary {
    /// Tally `results`.
    #[must_use]
    pub fn from_results(results: &[CaseResult]) -> Self {
        results.iter().fold(Self::default(), |mut summary, result| {
            if result.skipped {
                summary.skipped += 1;
            } else if result.error.is_some() {
                summary.failed += 1;
            } else {
                summary.passed += 1;
            }
            summary
        })
    }
}

/// Receives case progress and the final results.
///
/// Calls may come from several tasks at once in concurrent mode.
pub trait Printer: Send + Sync {
    /// A case is about to run its first attempt.
    fn case_started(&self, _name: &str) {}

    /// A case failed an attempt and will be retried.
    fn case_retrying(&self, _name: &str, _retry: u32, _error: &Error) {}

    /// A case reached its final outcome.
    fn case_finished(&self, _result: &CaseResult) {}

    /// Report all results once every case is done.
    fn print_results(&self, results: &[CaseResult]) -> Summary {
        Summary::from_results(results)
    }
}

/// Reports through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingPrinter;

impl Printer for TracingPrinter {
    fn case_started(&self, name: &str) {
        tracing::info!(case = %name, "Asserting case");
    }

    fn case_retrying(&self, name: &str, retry: u32, error: &Error) {
        tracing::warn!(case = %name, retry, error = %error, "Assertion failed, retrying");
    }

    fn case_finished(&self, result: &CaseResult) {
        if result.skipped {
            tracing::warn!(case = %result.name, "{}", result.message);
        } else if let Some(error) = &result.error {
            tracing::error!(case = %result.name, "{}\n{error}", result.message);
        } else {
            tracing::info!(case = %result.name, "{}", result.message);
        }
    }

    fn print_results(&self, results: &[CaseResult]) -> Summary {
        let summary = Summary::from_results(results);
        for result in results.iter().filter(|r| r.is_failure()) {
            tracing::error!(case = %result.name, "{}", result.message);
        }
        tracing::info!(
            passed = summary.passed,
            failed = summary.failed,
            skipped = summary.skipped,
            "Assertion summary"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let results = vec![
            CaseResult::passed("a", "asserted a success"),
            CaseResult::failed("b", "failed to assert b", Error::configuration("no expected file")),
            CaseResult::skipped("c"),
        ];
        assert_eq!(
            TracingPrinter.print_results(&results),
            Summary {
                passed: 1,
                failed: 1,
                skipped: 1
            }
        );
        assert!(results[1].is_failure());
        assert!(!results[2].is_failure());
    }
}
