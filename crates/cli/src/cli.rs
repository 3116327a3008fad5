//! Command-line interface definition

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use e2e_verify_runner::{Case, DEFAULT_CONFIG_FILE};

use crate::tracing::{LogLevel, TracingFormat};

/// Verify captured traces and metrics against expectation files
#[derive(Debug, Parser)]
#[command(name = "e2e-verify", version, about)]
pub struct Cli {
    /// Log level for e2e-verify output (RUST_LOG takes precedence)
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = TracingFormat::Compact)]
    pub log_format: TracingFormat,

    /// Subcommand
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Assert that actual data matches the expected data
    Assert(AssertArgs),
}

/// Arguments of `assert`
#[derive(Debug, Args)]
pub struct AssertArgs {
    /// Configuration file listing the cases
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Expectation file for a single case
    #[arg(long)]
    pub expected: Option<String>,

    /// Actual trace snapshot for a single case
    #[arg(long, requires = "expected", conflicts_with = "query")]
    pub actual: Option<String>,

    /// Metrics endpoint URL or file for a single case
    #[arg(long, requires = "expected")]
    pub query: Option<String>,
}

impl AssertArgs {
    /// The case given on the command line, if any.
    #[must_use]
    pub fn single_case(&self) -> Option<Case> {
        let expected = self.expected.clone()?;
        Some(Case {
            name: String::new(),
            expected,
            actual: self.actual.clone().unwrap_or_default(),
            query: self.query.clone().unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_single_case_flags() {
        let cli = Cli::parse_from(["e2e-verify", "assert", "--expected", "e.yml", "--query", "http://h/metrics"]);
        let Command::Assert(args) = cli.command;
        let case = args.single_case().unwrap();
        assert_eq!(case.query, "http://h/metrics");
        assert!(case.actual.is_empty());
    }

    #[test]
    fn test_config_mode_by_default() {
        let cli = Cli::parse_from(["e2e-verify", "assert"]);
        let Command::Assert(args) = cli.command;
        assert!(args.single_case().is_none());
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG_FILE));
    }

    #[test]
    fn test_actual_requires_expected() {
        assert!(Cli::try_parse_from(["e2e-verify", "assert", "--actual", "a.json"]).is_err());
        assert!(
            Cli::try_parse_from(["e2e-verify", "assert", "--expected", "e", "--actual", "a", "--query", "q"]).is_err()
        );
    }
}
