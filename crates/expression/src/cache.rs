//! Process-wide cache of parsed predicates.

use std::sync::{Arc, LazyLock};

use dashmap::DashMap;

use crate::{Expression, Result};

static GLOBAL: LazyLock<Arc<ExpressionCache>> = LazyLock::new(|| Arc::new(ExpressionCache::new()));

/// Concurrent cache mapping raw predicate text to its parsed [`Expression`].
///
/// Predicate strings repeat heavily across a suite of expectation files, so
/// each distinct text is parsed once and shared afterwards. Entries are
/// never evicted. The cache is append-only and safe to use from any number
/// of threads without external locking.
///
/// Most callers use [`ExpressionCache::global`]; tests that want isolation
/// create their own instance and inject it.
#[derive(Debug, Default)]
pub struct ExpressionCache {
    entries: DashMap<String, Arc<Expression>>,
}

impl ExpressionCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache, created on first use.
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL)
    }

    /// Return the parsed form of `text`, parsing it on first sight.
    pub fn parse(&self, text: &str) -> Arc<Expression> {
        if let Some(hit) = self.entries.get(text) {
            return Arc::clone(hit.value());
        }

        let entry = self
            .entries
            .entry(text.to_string())
            .or_insert_with(|| {
                tracing::trace!(predicate = text, "Parsing predicate");
                Arc::new(Expression::parse(text))
            });
        Arc::clone(entry.value())
    }

    /// Evaluate `predicate` against `actual` using the cached expression.
    ///
    /// # Errors
    ///
    /// See [`Expression::evaluate`].
    pub fn evaluate(&self, predicate: &str, actual: &str) -> Result<()> {
        self.parse(predicate).evaluate(actual)
    }

    /// Number of distinct predicates parsed so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no predicate has been parsed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_parse_is_cached() {
        let cache = ExpressionCache::new();
        let first = cache.parse("gt 0");
        let second = cache.parse("gt 0");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_distinct_texts_get_distinct_entries() {
        let cache = ExpressionCache::new();
        cache.parse("gt 0");
        cache.parse("gt  0");
        cache.parse("");
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_malformed_predicates_are_cached_too() {
        let cache = ExpressionCache::new();
        assert!(cache.evaluate("regexp (", "x").is_err());
        assert!(cache.evaluate("regexp (", "x").is_err());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_concurrent_parse_yields_single_entry() {
        let cache = Arc::new(ExpressionCache::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for _ in 0..100 {
                        assert!(cache.evaluate("le 10", "3").is_ok());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_global_is_shared() {
        assert!(Arc::ptr_eq(&ExpressionCache::global(), &ExpressionCache::global()));
    }
}
