//! Predicate parsing and evaluation.

use std::fmt;

use regex::Regex;

use crate::{Error, Result};

/// Comparison operator of a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Always succeeds. Used for fields that are intentionally unchecked.
    Noop,
    /// String equality.
    Eq,
    /// String inequality.
    Ne,
    /// Numeric `actual >= operand`.
    Ge,
    /// Numeric `actual > operand`.
    Gt,
    /// Numeric `actual <= operand`.
    Le,
    /// Numeric `actual < operand`.
    Lt,
    /// Actual value is the empty string.
    Empty,
    /// Actual value is not the empty string.
    NotEmpty,
    /// Actual value contains a match of the operand pattern.
    Regexp,
}

impl Operator {
    /// Look up an operator by its keyword. Keywords are case-sensitive.
    #[must_use]
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        let op = match keyword {
            "noop" => Self::Noop,
            "eq" => Self::Eq,
            "ne" => Self::Ne,
            "ge" => Self::Ge,
            "gt" => Self::Gt,
            "le" => Self::Le,
            "lt" => Self::Lt,
            "empty" => Self::Empty,
            "notEmpty" => Self::NotEmpty,
            "regexp" => Self::Regexp,
            _ => return None,
        };
        Some(op)
    }

    /// The keyword this operator is written as.
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Noop => "noop",
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Ge => "ge",
            Self::Gt => "gt",
            Self::Le => "le",
            Self::Lt => "lt",
            Self::Empty => "empty",
            Self::NotEmpty => "notEmpty",
            Self::Regexp => "regexp",
        }
    }

    const fn is_numeric(self) -> bool {
        matches!(self, Self::Ge | Self::Gt | Self::Le | Self::Lt)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Operand prepared for its operator at parse time.
#[derive(Debug, Clone)]
enum Operand {
    Text,
    Number(f64),
    Pattern(Regex),
    Malformed(Error),
}

/// A parsed predicate: an operator plus its operand.
///
/// Numeric operands are converted and patterns compiled once, when the
/// expression is parsed, so a cached expression never re-does that work.
#[derive(Debug, Clone)]
pub struct Expression {
    operator: Operator,
    raw_operand: String,
    operand: Operand,
}

impl Expression {
    /// Parse predicate text.
    ///
    /// Empty (or all-whitespace) text is `noop`. When the first
    /// space-separated token is an operator keyword the remainder is the
    /// operand; otherwise the whole text is compared with `eq`.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() {
            return Self::new(Operator::Noop, "");
        }

        let (head, rest) = text.split_once(' ').unwrap_or((text, ""));
        match Operator::from_keyword(head) {
            Some(operator) => Self::new(operator, rest),
            None => Self::new(Operator::Eq, text),
        }
    }

    fn new(operator: Operator, raw_operand: &str) -> Self {
        let operand = if operator.is_numeric() {
            match parse_number("expected", raw_operand) {
                Ok(n) => Operand::Number(n),
                Err(e) => Operand::Malformed(e),
            }
        } else if operator == Operator::Regexp {
            match Regex::new(raw_operand) {
                Ok(re) => Operand::Pattern(re),
                Err(e) => Operand::Malformed(Error::InvalidPattern {
                    pattern: raw_operand.to_string(),
                    reason: e.to_string(),
                }),
            }
        } else {
            Operand::Text
        };

        Self {
            operator,
            raw_operand: raw_operand.to_string(),
            operand,
        }
    }

    /// The operator of this expression.
    #[must_use]
    pub const fn operator(&self) -> Operator {
        self.operator
    }

    /// The operand exactly as written.
    #[must_use]
    pub fn operand(&self) -> &str {
        &self.raw_operand
    }

    /// Evaluate this expression against an actual value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Mismatch`] when the value does not satisfy the
    /// predicate, and [`Error::Parse`] or [`Error::InvalidPattern`] when the
    /// predicate cannot be applied.
    pub fn evaluate(&self, actual: &str) -> Result<()> {
        let satisfied = match (&self.operand, self.operator) {
            (Operand::Malformed(err), _) => return Err(err.clone()),
            (_, Operator::Noop) => true,
            (_, Operator::Eq) => self.raw_operand == actual,
            (_, Operator::Ne) => self.raw_operand != actual,
            (_, Operator::Empty) => actual.is_empty(),
            (_, Operator::NotEmpty) => !actual.is_empty(),
            (Operand::Number(expected), op) => {
                let actual_number = parse_number("actual", actual)?;
                compare_numbers(op, actual_number, *expected)
            }
            (Operand::Pattern(re), _) => re.is_match(actual),
            // Numeric and regexp operators always carry a prepared operand.
            (Operand::Text, _) => false,
        };

        if satisfied {
            Ok(())
        } else {
            Err(Error::mismatch(self.operator, &self.raw_operand, actual))
        }
    }
}

fn parse_number(side: &'static str, value: &str) -> Result<f64> {
    value.parse::<f64>().map_err(|e| Error::Parse {
        side,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn compare_numbers(operator: Operator, actual: f64, expected: f64) -> bool {
    match operator {
        Operator::Gt => actual > expected,
        Operator::Ge => actual >= expected,
        Operator::Lt => actual < expected,
        Operator::Le => actual <= expected,
        _ => false,
    }
}
