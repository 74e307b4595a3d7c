//! Minimal unsatisfiable subset extraction.
//!
//! Used to turn a failed resolve into an explanation: which of the user's
//! explicit specs, together with which additional candidate clauses, can
//! never be jointly satisfied.

use std::collections::HashSet;
use std::hash::Hash;

/// Finds a minimal unsatisfiable subset of `candidates`, seeded with
/// `explicit`.
///
/// A set is *minimal* unsatisfiable if no proper subset of it is also
/// unsatisfiable. A given unsatisfiable formula may have several minimal
/// unsatisfiable subsets of different sizes; this returns one of them, not
/// necessarily the smallest.
///
/// `sat` must be order-reversing: for any `A ⊆ B`, `sat(B) == false`
/// implies `sat(A) == false` is not required, but the converse — adding
/// clauses can only turn a satisfiable set unsatisfiable, never the other
/// way — must hold. Resolver clause sets satisfy this by construction,
/// since clauses are only ever conjoined.
///
/// Runs `sat` once per candidate in the worst case, building up a working
/// set of clauses known to remain jointly satisfiable and peeling off every
/// candidate that breaks it into the returned conflict set.
pub fn minimal_unsatisfiable_subset<T, F>(
    candidates: impl IntoIterator<Item = T>,
    explicit: impl IntoIterator<Item = T>,
    mut sat: F,
) -> HashSet<T>
where
    T: Clone + Eq + Hash,
    F: FnMut(&HashSet<T>) -> bool,
{
    let explicit: HashSet<T> = explicit.into_iter().collect();

    let mut working_set: HashSet<T> = HashSet::new();
    let mut found_conflicts: HashSet<T> = HashSet::new();

    if sat(&explicit) {
        working_set = explicit.clone();
    } else {
        found_conflicts = explicit.clone();
    }

    for candidate in candidates {
        if working_set.contains(&candidate) || explicit.contains(&candidate) {
            continue;
        }
        let mut trial = working_set.clone();
        trial.insert(candidate.clone());
        if sat(&trial) {
            working_set = trial;
        } else {
            found_conflicts.insert(candidate);
        }
    }

    found_conflicts
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Toy satisfiability oracle over string "specs": a set is unsatisfiable
    /// iff it contains both members of a hardcoded conflicting pair.
    fn toy_sat(conflicting: &(&str, &str)) -> impl Fn(&HashSet<&str>) -> bool + '_ {
        move |set: &HashSet<&str>| !(set.contains(conflicting.0) && set.contains(conflicting.1))
    }

    #[test]
    fn returns_empty_when_everything_is_satisfiable() {
        let sat = toy_sat(&("x", "y"));
        let conflicts =
            minimal_unsatisfiable_subset(["a", "b", "c"], ["a"], |set| sat(set));
        assert!(conflicts.is_empty());
    }

    #[test]
    fn isolates_the_conflicting_pair() {
        let sat = toy_sat(&("a", "b"));
        let conflicts =
            minimal_unsatisfiable_subset(["a", "b", "c"], ["a"], |set| sat(set));
        assert!(conflicts.contains("b"));
        assert!(!conflicts.contains("c"));
    }

    #[test]
    fn explicit_specs_conflicting_with_each_other_are_all_reported() {
        let sat = toy_sat(&("a", "b"));
        let conflicts =
            minimal_unsatisfiable_subset(["c"], ["a", "b"], |set| sat(set));
        assert!(conflicts.contains("a"));
        assert!(conflicts.contains("b"));
    }
}
