//! Predicate expression language for e2e-verify.
//!
//! Expectation files describe values either literally or as a predicate.
//! A predicate is a keyword followed by an operand:
//!
//! | Predicate | Satisfied when |
//! |---|---|
//! | *(empty)* / `noop` | always |
//! | `eq x` / `x` | actual equals `x` |
//! | `ne x` | actual differs from `x` |
//! | `gt n`, `ge n`, `lt n`, `le n` | actual, as a float, compares to `n` |
//! | `empty` / `notEmpty` | actual is / is not the empty string |
//! | `regexp p` | actual contains a match of `p` |
//!
//! Text whose first word is not a keyword is compared literally, so plain
//! values in expectation files keep working.
//!
//! # Example
//!
//! ```
//! use e2e_verify_expression::{evaluate, ExpressionCache};
//!
//! assert!(evaluate("gt 0", "2").is_ok());
//! assert!(evaluate("notEmpty", "").is_err());
//!
//! // An isolated cache, e.g. for tests
//! let cache = ExpressionCache::new();
//! assert!(cache.evaluate("regexp ^GET", "GET:/users").is_ok());
//! ```

mod cache;
mod error;
mod expression;

pub use cache::ExpressionCache;
pub use error::{Error, Result};
pub use expression::{Expression, Operator};

/// Evaluate `predicate` against `actual` with the process-wide cache.
///
/// # Errors
///
/// Returns [`Error::Mismatch`] when the value does not satisfy the
/// predicate, or a malformed-predicate error (see [`Error::is_malformed`]).
pub fn evaluate(predicate: &str, actual: &str) -> Result<()> {
    ExpressionCache::global().evaluate(predicate, actual)
}
