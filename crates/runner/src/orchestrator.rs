//! Runs assertion cases with retries, optional concurrency and fail-fast.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use e2e_verify_assert::{MetricMatcher, TraceMatcher, load_expected_metrics, load_metrics, load_traces};
use e2e_verify_expression::ExpressionCache;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::config::{AssertConfig, Case, CaseKind, RetryPolicy};
use crate::error::{Error, Result};
use crate::printer::{CaseResult, Printer, Summary, TracingPrinter};

/// How a list of cases is run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Retry behaviour for every case
    pub retry: RetryPolicy,
    /// Stop at the first failing case
    pub fail_fast: bool,
    /// Run cases concurrently
    pub concurrency: bool,
}

impl RunOptions {
    /// Options from the `assert` configuration section.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInterval`] for an invalid retry interval.
    pub fn from_config(config: &AssertConfig) -> Result<Self> {
        Ok(Self {
            retry: RetryPolicy::from_config(&config.retry)?,
            fail_fast: config.fail_fast,
            concurrency: config.concurrency,
        })
    }

    /// Set the retry policy
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Enable or disable fail-fast
    #[must_use]
    pub const fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Enable or disable concurrent execution
    #[must_use]
    pub const fn with_concurrency(mut self, concurrency: bool) -> Self {
        self.concurrency = concurrency;
        self
    }
}

/// Runs cases and reports their outcomes to a [`Printer`].
#[derive(Clone)]
pub struct Orchestrator {
    options: RunOptions,
    printer: Arc<dyn Printer>,
    traces: TraceMatcher,
    metrics: MetricMatcher,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator").field("options", &self.options).finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create an orchestrator reporting through [`TracingPrinter`].
    #[must_use]
    pub fn new(options: RunOptions) -> Self {
        Self {
            options,
            printer: Arc::new(TracingPrinter),
            traces: TraceMatcher::default(),
            metrics: MetricMatcher::default(),
        }
    }

    /// Report through `printer` instead
    #[must_use]
    pub fn with_printer(mut self, printer: Arc<dyn Printer>) -> Self {
        self.printer = printer;
        self
    }

    /// Evaluate predicates through `cache` instead of the global cache
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<ExpressionCache>) -> Self {
        self.traces = TraceMatcher::new(Arc::clone(&cache));
        self.metrics = MetricMatcher::new(cache);
        self
    }

    /// Run `cases`, print the results and fail if any case failed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CasesFailed`] when at least one case failed.
    #[tracing::instrument(name = "run_cases", skip_all, fields(cases = cases.len(), concurrency = self.options.concurrency))]
    pub async fn run(&self, cases: &[Case]) -> Result<Summary> {
        let results = self.execute(cases).await;
        let summary = self.printer.print_results(&results);
        if summary.failed > 0 {
            return Err(Error::CasesFailed { failed: summary.failed });
        }
        Ok(summary)
    }

    /// Run `cases` and return one result per case, in case order.
    ///
    /// Cases not run because of fail-fast are reported as skipped.
    pub async fn execute(&self, cases: &[Case]) -> Vec<CaseResult> {
        let mut results: Vec<CaseResult> = cases.iter().map(|c| CaseResult::skipped(c.display_name())).collect();
        let cancel = CancellationToken::new();

        if self.options.concurrency {
            self.execute_concurrently(cases, &cancel, &mut results).await;
        } else {
            for (index, case) in cases.iter().enumerate() {
                let this = self.clone();
                let task_case = case.clone();
                let task_cancel = cancel.clone();
                let result = tokio::spawn(async move { this.run_case(&task_case, &task_cancel).await })
                    .await
                    .unwrap_or_else(|e| aborted_case(case.display_name(), e));
                self.printer.case_finished(&result);
                let failed = result.is_failure();
                results[index] = result;
                if failed && self.options.fail_fast {
                    tracing::warn!("Fail-fast: skipping remaining cases");
                    break;
                }
            }
        }
        results
    }

    async fn execute_concurrently(&self, cases: &[Case], cancel: &CancellationToken, results: &mut [CaseResult]) {
        let mut join_set = JoinSet::new();
        let mut slots = HashMap::with_capacity(cases.len());
        for (index, case) in cases.iter().cloned().enumerate() {
            let this = self.clone();
            let cancel = cancel.clone();
            let name = case.display_name();
            let handle = join_set.spawn(async move {
                let result = this.run_case(&case, &cancel).await;
                if result.is_failure() && this.options.fail_fast && !cancel.is_cancelled() {
                    tracing::warn!(case = %result.name, "Fail-fast: cancelling remaining cases");
                    cancel.cancel();
                }
                result
            });
            slots.insert(handle.id(), (index, name));
        }

        while let Some(joined) = join_set.join_next_with_id().await {
            let (id, result) = match joined {
                Ok((id, result)) => (id, result),
                Err(e) => {
                    let id = e.id();
                    let Some((_, name)) = slots.get(&id) else {
                        tracing::error!(error = %e, "Untracked case task terminated abnormally");
                        continue;
                    };
                    tracing::error!(case = %name, error = %e, "Case task terminated abnormally");
                    let result = aborted_case(name.clone(), e);
                    if self.options.fail_fast && !cancel.is_cancelled() {
                        tracing::warn!(case = %result.name, "Fail-fast: cancelling remaining cases");
                        cancel.cancel();
                    }
                    (id, result)
                }
            };
            if let Some((index, _)) = slots.remove(&id) {
                self.printer.case_finished(&result);
                results[index] = result;
            }
        }
    }

    /// Run one case with retries. Cancellation is observed before the first
    /// attempt and between attempts.
    async fn run_case(&self, case: &Case, cancel: &CancellationToken) -> CaseResult {
        let name = case.display_name();
        if cancel.is_cancelled() {
            return CaseResult::skipped(name);
        }
        self.printer.case_started(&name);

        if let Err(e) = case.validate() {
            return CaseResult::failed(&name, format!("failed to assert {name}"), e);
        }

        let attempts = self.options.retry.attempts();
        let mut retried = 0;
        loop {
            match self.attempt(case, &name).await {
                Ok(()) if retried == 0 => return CaseResult::passed(&name, format!("asserted {name} success")),
                Ok(()) => {
                    return CaseResult::passed(&name, format!("asserted {name} success, retried {retried} time(s)"));
                }
                Err(e) if retried + 1 >= attempts => {
                    return CaseResult::failed(&name, format!("failed to assert {name}, retried {retried} time(s)"), e);
                }
                Err(e) => {
                    retried += 1;
                    self.printer.case_retrying(&name, retried, &e);
                    if !sleep_unless_cancelled(self.options.retry.interval, cancel).await {
                        tracing::debug!(case = %name, "Cancelled between attempts");
                        return CaseResult::skipped(name);
                    }
                }
            }
        }
    }

    async fn attempt(&self, case: &Case, name: &str) -> Result<()> {
        match case.kind() {
            CaseKind::Traces => {
                let matcher = self.traces.clone();
                let (expected, actual) = (case.expected.clone(), case.actual.clone());
                run_blocking(name, move || {
                    let expected = load_traces(&expected)?;
                    let actual = load_traces(&actual)?;
                    matcher.assert_snapshot(&expected, &actual)
                })
                .await
            }
            CaseKind::Metrics => {
                let actual = load_metrics(&case.query).await?;
                let matcher = self.metrics.clone();
                let expected = case.expected.clone();
                run_blocking(name, move || {
                    let expected = load_expected_metrics(&expected)?;
                    matcher.assert_metrics(&expected, &actual)
                })
                .await
            }
        }
    }
}

/// Run a matcher on the blocking pool; a panic becomes an ordinary failure
/// of this case.
async fn run_blocking<F>(case: &str, job: F) -> Result<()>
where
    F: FnOnce() -> e2e_verify_assert::Result<()> + Send + 'static,
{
    match tokio::task::spawn_blocking(job).await {
        Ok(outcome) => outcome.map_err(Error::from),
        Err(e) => Err(task_fault(case, e)),
    }
}

/// Result for a case whose task died before producing one.
fn aborted_case(name: String, e: JoinError) -> CaseResult {
    let error = task_fault(&name, e);
    CaseResult::failed(&name, format!("failed to assert {name}"), error)
}

fn task_fault(case: &str, e: JoinError) -> Error {
    let message = if e.is_panic() {
        panic_message(e.into_panic())
    } else {
        e.to_string()
    };
    Error::AssertionPanicked {
        case: case.to_string(),
        message,
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Returns false if cancelled before `interval` elapsed.
async fn sleep_unless_cancelled(interval: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(interval) => !cancel.is_cancelled(),
    }
}
