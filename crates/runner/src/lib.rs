//! Case orchestration for e2e-verify.
//!
//! This crate turns a configuration file into assertion runs:
//! - [`Config`] reads the `assert` and `trigger` sections
//! - [`Orchestrator`] runs cases serially or concurrently, with retries
//!   and fail-fast cancellation
//! - [`Printer`] receives progress and the final [`CaseResult`] list
//! - [`Trigger`] drives the system under test, e.g. [`HttpTrigger`]
//!
//! # Fail-fast
//!
//! In serial mode the first failing case stops the run and the remaining
//! cases are reported as skipped. In concurrent mode a failing case cancels
//! a token shared by all cases; each case checks it before its first
//! attempt and between attempts, and reports itself skipped once it is
//! cancelled.

mod config;
mod duration;
mod error;
mod orchestrator;
mod printer;
pub mod trigger;

pub use config::{
    AssertConfig, Case, CaseKind, Config, DEFAULT_CONFIG_FILE, IntervalSetting, RetryConfig, RetryPolicy,
    TriggerConfig,
};
pub use duration::{SignedDuration, parse_duration};
pub use error::{Error, Result};
pub use orchestrator::{Orchestrator, RunOptions};
pub use printer::{CaseResult, Printer, Summary, TracingPrinter};
pub use trigger::{HttpTrigger, Trigger};
