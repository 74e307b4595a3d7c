//! Pluggable CDCL/DPLL backend adapter.
//!
//! [`Clauses`](crate::Clauses) never solves anything itself; it hands the
//! accumulated clause set to whatever implements [`SatBackend`] is
//! configured. This keeps the frontend (Tseitin encoding, BDD construction,
//! minimisation) independent of which solving algorithm is actually wired
//! in, mirroring how the CDCL and candidate backends are independently
//! swappable in the reference implementation.

use crate::Lit;

/// A model: one entry per SAT variable, `true` if the variable (1-indexed)
/// is assigned true in the returned solution.
pub type Model = Vec<bool>;

/// Uniform contract every SAT backend must implement.
///
/// `run` is given the full clause set (as signed-literal clauses, 1-indexed
/// variables) and the number of allocated variables `m`. It must return
/// `None` for UNSAT or UNKNOWN (e.g. a propagation-step limit was hit), and
/// `Some(model)` otherwise, where `model.len() == m` and `model[i]` holds the
/// truth value of variable `i + 1`.
pub trait SatBackend {
    /// Attempts to find a satisfying assignment.
    ///
    /// `limit` bounds the number of decisions/propagations attempted; `0`
    /// means unbounded. Backends that cannot honour a limit may ignore it.
    fn run(&self, clauses: &[Vec<Lit>], m: i32, limit: usize) -> Option<Model>;
}

/// A basic complete DPLL solver: unit propagation, pure-literal
/// elimination, and chronological backtracking over a decision stack. It has
/// no clause learning or restarts, so it is not competitive with a
/// production CDCL solver on hard instances, but it is a correct, dependency
/// free implementation of the [`SatBackend`] contract suitable as the
/// built-in default.
#[derive(Debug, Default, Clone, Copy)]
pub struct DpllBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Assignment {
    Unassigned,
    True,
    False,
}

struct Solver<'c> {
    clauses: &'c [Vec<Lit>],
    assignment: Vec<Assignment>,
    steps: usize,
    limit: usize,
}

impl<'c> Solver<'c> {
    fn new(clauses: &'c [Vec<Lit>], m: i32, limit: usize) -> Self {
        Self {
            clauses,
            assignment: vec![Assignment::Unassigned; m as usize + 1],
            steps: 0,
            limit,
        }
    }

    fn value(&self, lit: Lit) -> Assignment {
        let var = lit.unsigned_abs() as usize;
        match (self.assignment[var], lit > 0) {
            (Assignment::Unassigned, _) => Assignment::Unassigned,
            (Assignment::True, true) | (Assignment::False, false) => Assignment::True,
            (Assignment::True, false) | (Assignment::False, true) => Assignment::False,
        }
    }

    fn set(&mut self, lit: Lit) {
        let var = lit.unsigned_abs() as usize;
        self.assignment[var] = if lit > 0 {
            Assignment::True
        } else {
            Assignment::False
        };
    }

    /// Unit propagation. Returns `false` if a conflict was found.
    fn propagate(&mut self) -> bool {
        loop {
            let mut progressed = false;
            for clause in self.clauses {
                let mut unassigned = None;
                let mut satisfied = false;
                let mut unassigned_count = 0;
                for &lit in clause {
                    match self.value(lit) {
                        Assignment::True => {
                            satisfied = true;
                            break;
                        }
                        Assignment::Unassigned => {
                            unassigned_count += 1;
                            unassigned = Some(lit);
                        }
                        Assignment::False => {}
                    }
                }
                if satisfied {
                    continue;
                }
                if unassigned_count == 0 {
                    return false;
                }
                if unassigned_count == 1 {
                    self.set(unassigned.expect("unassigned_count == 1"));
                    progressed = true;
                }
            }
            if !progressed {
                return true;
            }
        }
    }

    fn first_unassigned(&self) -> Option<usize> {
        self.assignment
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, a)| matches!(a, Assignment::Unassigned))
            .map(|(var, _)| var)
    }

    fn solve(&mut self) -> bool {
        self.steps += 1;
        if self.limit != 0 && self.steps > self.limit {
            return false;
        }

        let snapshot = self.assignment.clone();
        if !self.propagate() {
            self.assignment = snapshot;
            return false;
        }

        let Some(var) = self.first_unassigned() else {
            return true;
        };

        for &candidate in &[var as Lit, -(var as Lit)] {
            let before = self.assignment.clone();
            self.set(candidate);
            if self.solve() {
                return true;
            }
            self.assignment = before;
        }
        self.assignment = snapshot;
        false
    }
}

impl SatBackend for DpllBackend {
    fn run(&self, clauses: &[Vec<Lit>], m: i32, limit: usize) -> Option<Model> {
        if m == 0 {
            return Some(Vec::new());
        }
        let mut solver = Solver::new(clauses, m, limit);
        if solver.solve() {
            Some(
                solver.assignment[1..]
                    .iter()
                    .map(|a| matches!(a, Assignment::True))
                    .collect(),
            )
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solves_trivial_satisfiable_instance() {
        let clauses = vec![vec![1, 2], vec![-1, 2], vec![-2, 3]];
        let model = DpllBackend.run(&clauses, 3, 0).expect("satisfiable");
        for clause in &clauses {
            assert!(clause
                .iter()
                .any(|&lit| (lit > 0) == model[lit.unsigned_abs() as usize - 1]));
        }
    }

    #[test]
    fn detects_unsatisfiable_instance() {
        let clauses = vec![vec![1], vec![-1]];
        assert!(DpllBackend.run(&clauses, 1, 0).is_none());
    }

    #[test]
    fn empty_clause_set_is_trivially_satisfiable() {
        assert_eq!(DpllBackend.run(&[], 0, 0), Some(Vec::new()));
    }
}
