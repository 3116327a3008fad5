use std::hash::Hash;

use dashmap::DashSet;

/// Actual entities already bound to an expected entity.
///
/// Shared by the concurrent matching units of one comparison. [`claim`]
/// is an atomic insert-if-absent, so two units can never bind the same
/// actual entity.
///
/// [`claim`]: ClaimSet::claim
#[derive(Debug)]
pub(crate) struct ClaimSet<K: Eq + Hash> {
    claimed: DashSet<K>,
}

impl<K: Eq + Hash + Clone> ClaimSet<K> {
    pub(crate) fn new() -> Self {
        Self {
            claimed: DashSet::new(),
        }
    }

    /// Bind `key`; returns false if another unit got there first.
    pub(crate) fn claim(&self, key: K) -> bool {
        self.claimed.insert(key)
    }

    pub(crate) fn is_claimed(&self, key: &K) -> bool {
        self.claimed.contains(key)
    }
}

/// Give every expected entity a distinct actual slot out of its
/// `candidates`, moving earlier bindings along augmenting paths when a later
/// entity needs their slot. The outcome does not depend on input order.
///
/// Returns the slot picked for each expected entity, or the index of the
/// first expected entity left without one. Every candidate must be below
/// `pool`.
pub(crate) fn assign(candidates: &[Vec<usize>], pool: usize) -> Result<Vec<usize>, usize> {
    let mut owner: Vec<Option<usize>> = vec![None; pool];
    for expected in 0..candidates.len() {
        let mut visited = vec![false; pool];
        if !augment(expected, candidates, &mut owner, &mut visited) {
            return Err(expected);
        }
    }

    let mut picked = vec![0; candidates.len()];
    for (slot, bound) in owner.iter().enumerate() {
        if let Some(expected) = bound {
            picked[*expected] = slot;
        }
    }
    Ok(picked)
}

fn augment(expected: usize, candidates: &[Vec<usize>], owner: &mut [Option<usize>], visited: &mut [bool]) -> bool {
    for &slot in &candidates[expected] {
        if visited[slot] {
            continue;
        }
        visited[slot] = true;
        let free = match owner[slot] {
            None => true,
            Some(other) => augment(other, candidates, owner, visited),
        };
        if free {
            owner[slot] = Some(expected);
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn test_claim_is_exclusive() {
        let set = ClaimSet::new();
        assert!(set.claim("a"));
        assert!(!set.claim("a"));
        assert!(set.is_claimed(&"a"));
        assert!(!set.is_claimed(&"b"));
    }

    #[test]
    fn test_concurrent_claims_bind_once() {
        let set = ClaimSet::new();
        let winners = (0..64).into_par_iter().filter(|_| set.claim(7_usize)).count();
        assert_eq!(winners, 1);
        assert!(set.is_claimed(&7));
    }

    #[test]
    fn test_assign_moves_earlier_binding() {
        // The loose first entity takes slot 0 until the strict second one needs it.
        assert_eq!(assign(&[vec![0, 1], vec![0]], 2), Ok(vec![1, 0]));
        assert_eq!(assign(&[vec![0], vec![0, 1]], 2), Ok(vec![0, 1]));
    }

    #[test]
    fn test_assign_reports_unbound_entity() {
        assert_eq!(assign(&[vec![0], vec![0]], 2), Err(1));
        assert_eq!(assign(&[vec![], vec![0]], 1), Err(0));
    }

    #[test]
    fn test_assign_empty() {
        assert_eq!(assign(&[], 3), Ok(vec![]));
    }
}
