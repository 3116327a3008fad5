//! Configuration file model.
//!
//! ```yaml
//! trigger:
//!   action: http
//!   interval: 3s
//!   times: 10
//!   url: http://${GATEWAY_HOST}:${GATEWAY_PORT}/users
//!   method: POST
//! assert:
//!   retry: { count: 10, interval: 10s }
//!   failFast: true
//!   concurrency: false
//!   cases:
//!     - expected: expected/traces.yml
//!       actual: actual/traces.json
//!     - query: http://localhost:9090/metrics
//!       expected: expected/metrics.yml
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use e2e_verify_assert::MetricsSource;
use serde::Deserialize;

use crate::duration::parse_duration;
use crate::error::{Error, Result};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "e2e.yaml";

/// Root of the configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Action driving the system under test while assertions run
    #[serde(default)]
    pub trigger: Option<TriggerConfig>,
    /// Assertions
    #[serde(default)]
    pub assert: AssertConfig,
}

impl Config {
    /// Read a configuration file.
    ///
    /// Relative `expected`, `actual` and file `query` paths are resolved
    /// against the directory containing the file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] or [`Error::ConfigParse`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = serde_yaml::from_str(&content).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        for case in &mut config.assert.cases {
            case.resolve_paths(base);
        }
        tracing::debug!(path = %path.display(), cases = config.assert.cases.len(), "Loaded configuration");
        Ok(config)
    }
}

/// The `assert` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertConfig {
    /// Cases to run
    #[serde(default)]
    pub cases: Vec<Case>,
    /// Retry settings shared by all cases
    #[serde(default)]
    pub retry: RetryConfig,
    /// Stop at the first failing case
    #[serde(default, alias = "fail-fast")]
    pub fail_fast: bool,
    /// Run cases concurrently
    #[serde(default)]
    pub concurrency: bool,
}

/// The `retry` setting as written.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetryConfig {
    /// Number of retries after the first attempt
    #[serde(default)]
    pub count: i64,
    /// Pause between attempts
    #[serde(default)]
    pub interval: Option<IntervalSetting>,
}

/// A pause written as a duration string or, deprecated, as milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum IntervalSetting {
    /// Deprecated integer milliseconds
    Millis(i64),
    /// Duration string, e.g. `10s`
    Text(String),
}

/// Retry behaviour derived from [`RetryConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (at least 1)
    pub count: u32,
    /// Pause between attempts
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            count: 1,
            interval: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// Normalise the configured values.
    ///
    /// A count of zero or less becomes 1. A negative interval becomes one
    /// second; an absent one is zero.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInterval`] for an unparsable duration string.
    pub fn from_config(config: &RetryConfig) -> Result<Self> {
        let count = u32::try_from(config.count).ok().filter(|c| *c > 0).unwrap_or(1);

        let interval = match &config.interval {
            None => Duration::ZERO,
            Some(IntervalSetting::Millis(ms)) => {
                tracing::warn!(
                    interval = ms,
                    "Integer retry interval is deprecated, use a duration string such as \"10s\""
                );
                u64::try_from(*ms).map_or(Duration::from_secs(1), Duration::from_millis)
            }
            Some(IntervalSetting::Text(text)) if text.trim().is_empty() => Duration::ZERO,
            Some(IntervalSetting::Text(text)) => {
                let parsed = parse_duration(text).map_err(|reason| Error::invalid_interval("retry interval", text, reason))?;
                if parsed.negative && !parsed.magnitude.is_zero() {
                    Duration::from_secs(1)
                } else {
                    parsed.magnitude
                }
            }
        };

        Ok(Self { count, interval })
    }

    /// Set the retry count
    #[must_use]
    pub const fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    /// Set the pause between attempts
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Total number of attempts per case.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.count.saturating_add(1)
    }
}

/// What a case compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseKind {
    /// Trace snapshot files
    Traces,
    /// Metric families from a query endpoint or file
    Metrics,
}

/// One assertion to run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Case {
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Expectation file
    #[serde(default)]
    pub expected: String,
    /// Actual trace snapshot file
    #[serde(default)]
    pub actual: String,
    /// Metrics endpoint URL or file
    #[serde(default)]
    pub query: String,
}

impl Case {
    /// A trace case.
    #[must_use]
    pub fn traces(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
            actual: actual.into(),
            ..Self::default()
        }
    }

    /// A metrics case.
    #[must_use]
    pub fn metrics(expected: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
            query: query.into(),
            ..Self::default()
        }
    }

    /// Set the display name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// `name`, else `case[<actual>]`, else `case[<query>]`.
    #[must_use]
    pub fn display_name(&self) -> String {
        if !self.name.is_empty() {
            self.name.clone()
        } else if !self.actual.is_empty() {
            format!("case[{}]", self.actual)
        } else {
            format!("case[{}]", self.query)
        }
    }

    /// Metrics when a query is set, traces otherwise.
    #[must_use]
    pub fn kind(&self) -> CaseKind {
        if self.query.is_empty() {
            CaseKind::Traces
        } else {
            CaseKind::Metrics
        }
    }

    /// Check the case names everything its kind needs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] naming the missing setting.
    pub fn validate(&self) -> Result<()> {
        if self.expected.is_empty() {
            return Err(Error::configuration(format!(
                "the expected data file for {} is not specified",
                self.display_name()
            )));
        }
        if self.kind() == CaseKind::Traces && self.actual.is_empty() {
            return Err(Error::configuration(format!(
                "neither the actual data file nor a query is specified for {}",
                self.display_name()
            )));
        }
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        resolve(&mut self.expected, base);
        resolve(&mut self.actual, base);
        if matches!(MetricsSource::parse(&self.query), MetricsSource::File(_)) {
            resolve(&mut self.query, base);
        }
    }
}

fn resolve(path: &mut String, base: &Path) {
    if path.is_empty() || path.contains('$') || Path::new(path.as_str()).is_absolute() {
        return;
    }
    *path = base.join(path.as_str()).to_string_lossy().into_owned();
}

/// The `trigger` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerConfig {
    /// Trigger kind; only `http` is known
    #[serde(default)]
    pub action: String,
    /// Pause between requests
    #[serde(default)]
    pub interval: String,
    /// Maximum number of requests; 0 keeps going until success or stop
    #[serde(default)]
    pub times: u32,
    /// Target URL, environment-expanded
    #[serde(default)]
    pub url: String,
    /// HTTP method
    #[serde(default)]
    pub method: String,
    /// Request body
    #[serde(default)]
    pub body: String,
    /// Request headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl TriggerConfig {
    /// Parsed [`TriggerConfig::interval`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInterval`] unless the interval is a positive
    /// duration.
    pub fn interval(&self) -> Result<Duration> {
        let parsed =
            parse_duration(&self.interval).map_err(|reason| Error::invalid_interval("trigger interval", &self.interval, reason))?;
        if parsed.negative || parsed.magnitude.is_zero() {
            return Err(Error::invalid_interval(
                "trigger interval",
                &self.interval,
                "trigger interval should be > 0",
            ));
        }
        Ok(parsed.magnitude)
    }
}
