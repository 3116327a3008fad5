//! Error types for the e2e-verify-runner crate

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Main error type for configuration, orchestration and triggers
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// A case or setting cannot be run as configured
    #[error("{message}")]
    #[diagnostic(code(e2e_verify::config::invalid))]
    Configuration {
        /// What is wrong
        message: String,
    },

    /// The configuration file could not be read
    #[error("failed to read configuration {}: {source}", .path.display())]
    #[diagnostic(code(e2e_verify::config::io))]
    Io {
        /// Configuration file
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid YAML for the expected shape
    #[error("failed to parse configuration {}: {source}", .path.display())]
    #[diagnostic(code(e2e_verify::config::parse), help("see the `assert` section layout in the documentation"))]
    ConfigParse {
        /// Configuration file
        path: PathBuf,
        /// Deserializer error
        #[source]
        source: serde_yaml::Error,
    },

    /// A duration setting could not be parsed
    #[error("invalid {what} '{value}': {reason}")]
    #[diagnostic(code(e2e_verify::config::interval), help("use a duration such as `500ms`, `10s` or `1m30s`"))]
    InvalidInterval {
        /// Which setting
        what: &'static str,
        /// The value as written
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// Loading or matching failed
    #[error(transparent)]
    #[diagnostic(transparent)]
    Assert(#[from] e2e_verify_assert::Error),

    /// An assertion panicked; the fault is confined to its case
    #[error("assertion of {case} panicked: {message}")]
    #[diagnostic(code(e2e_verify::run::panic))]
    AssertionPanicked {
        /// Case display name
        case: String,
        /// Panic payload, if it was a string
        message: String,
    },

    /// At least one case failed
    #[error("failed to assert {failed} case(s)")]
    #[diagnostic(code(e2e_verify::run::failed))]
    CasesFailed {
        /// Number of failed cases
        failed: usize,
    },

    /// A trigger request could not be sent
    #[error("trigger request to {url} failed: {source}")]
    #[diagnostic(code(e2e_verify::trigger::request))]
    TriggerRequest {
        /// Target URL
        url: String,
        /// Transport error
        #[source]
        source: reqwest::Error,
    },

    /// A trigger request was answered with a status other than 200
    #[error("trigger request to {url} failed, response status code: {status}")]
    #[diagnostic(code(e2e_verify::trigger::status))]
    TriggerStatus {
        /// Target URL
        url: String,
        /// HTTP status code
        status: u16,
    },
}

impl Error {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an invalid duration error
    pub fn invalid_interval(what: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInterval {
            what,
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for e2e-verify-runner operations
pub type Result<T> = std::result::Result<T, Error>;
