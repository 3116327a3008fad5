//! Error types for predicate evaluation.

use miette::Diagnostic;
use thiserror::Error;

use crate::Operator;

/// Result type for predicate evaluation.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while evaluating a predicate against an actual value.
///
/// [`Error::Mismatch`] means the predicate was well formed but the value did
/// not satisfy it. Every other variant means the predicate (or the value it
/// was applied to) could not be interpreted at all; see [`Error::is_malformed`].
#[derive(Error, Debug, Clone, PartialEq, Diagnostic)]
pub enum Error {
    /// The actual value did not satisfy the predicate.
    #[error("--expectedValue => {}, ++actualValue => {actual}", render_expected(.operator, .operand))]
    #[diagnostic(code(e2e_verify::expression::mismatch))]
    Mismatch {
        /// Operator of the failed predicate.
        operator: Operator,
        /// Operand of the failed predicate.
        operand: String,
        /// The actual value that was compared.
        actual: String,
    },

    /// A numeric comparison received a value that is not a number.
    #[error("failed to parse {side} value '{value}' as a number: {reason}")]
    #[diagnostic(
        code(e2e_verify::expression::parse),
        help("gt, ge, lt and le compare both sides as 64-bit floats")
    )]
    Parse {
        /// Which side of the comparison was malformed ("expected" or "actual").
        side: &'static str,
        /// The offending text.
        value: String,
        /// Parser message.
        reason: String,
    },

    /// A `regexp` predicate carried a pattern that does not compile.
    #[error("invalid regular expression '{pattern}': {reason}")]
    #[diagnostic(code(e2e_verify::expression::pattern))]
    InvalidPattern {
        /// The pattern as written in the predicate.
        pattern: String,
        /// Compiler message.
        reason: String,
    },
}

impl Error {
    /// Returns true when the predicate could not be evaluated, as opposed to
    /// evaluating cleanly to "no match".
    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        !matches!(self, Self::Mismatch { .. })
    }

    pub(crate) fn mismatch(operator: Operator, operand: &str, actual: &str) -> Self {
        Self::Mismatch {
            operator,
            operand: operand.to_string(),
            actual: actual.to_string(),
        }
    }
}

fn render_expected(operator: &Operator, operand: &str) -> String {
    match operator {
        Operator::Eq | Operator::Noop => operand.to_string(),
        Operator::Empty | Operator::NotEmpty => operator.keyword().to_string(),
        _ => format!("{} {operand}", operator.keyword()),
    }
}
