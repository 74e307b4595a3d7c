//! Multi-objective minimisation over a satisfiable clause set: first the
//! largest active coefficient ("peak"), then the sum, each via bisection.

use crate::backend::{Model, SatBackend};
use crate::clauses::{Clauses, Lit, Polarity, Value};

/// One coefficient/literal pair in an objective `Σ cᵢ·xᵢ`. Coefficients may
/// be any integer; [`Clauses::minimize`] normalises internally.
pub type ObjectiveTerm = (i64, Lit);

/// Returned by [`Clauses::minimize`]: the best model found together with
/// the minimised objective value.
#[derive(Debug, Clone)]
pub struct MinimizeResult {
    /// The best satisfying assignment found.
    pub solution: Model,
    /// The value of the objective at that assignment (after the final, sum,
    /// pass — or the peak value if the objective had a trivial peak).
    pub value: i64,
}

impl Clauses {
    /// Minimises `objective` (given as `(coefficient, literal)` pairs)
    /// subject to the clauses currently in the store, starting from
    /// `bestsol` if one is already known to be a valid (if suboptimal)
    /// solution.
    ///
    /// Runs two passes when the largest coefficient exceeds 1: first
    /// minimise the peak active coefficient via bisection, then — having
    /// fixed the peak — minimise the sum of active coefficients, also via
    /// bisection. A single pass (sum only) suffices when every coefficient
    /// is `0` or `1`.
    pub fn minimize(
        &mut self,
        backend: &dyn SatBackend,
        objective: Vec<ObjectiveTerm>,
        bestsol: Option<Model>,
    ) -> MinimizeResult {
        let seed = bestsol.filter(|s| s.len() as i32 >= self.num_vars());
        let computed = match seed {
            Some(s) => Some(s),
            None => self.sat(backend, &[], false, 0),
        };

        let Some(mut bestsol) = computed else {
            let fallback = objective.iter().map(|&(c, _)| c.abs()).sum::<i64>() + 1;
            return MinimizeResult {
                solution: Vec::new(),
                value: fallback,
            };
        };
        if self.is_unsat() {
            let fallback = objective.iter().map(|&(c, _)| c.abs()).sum::<i64>() + 1;
            return MinimizeResult {
                solution: bestsol,
                value: fallback,
            };
        }
        if objective.is_empty() {
            return MinimizeResult {
                solution: bestsol,
                value: 0,
            };
        }

        let values: Vec<(i64, Value)> = objective.iter().map(|&(c, l)| (c, Value::Lit(l))).collect();
        let (equation, offset) = self.lb_preprocess(values);
        let maxval = equation.iter().map(|&(c, _)| c).max().unwrap_or(0);

        let odict = |lit: Lit, eq: &[(i64, Lit)]| -> i64 {
            eq.iter().find(|&&(_, a)| a == lit).map_or(0, |&(c, _)| c)
        };
        let peak_val = |sol: &Model, eq: &[(i64, Lit)]| -> i64 {
            true_lits(sol).map(|lit| odict(lit, eq)).max().unwrap_or(0)
        };
        let sum_val =
            |sol: &Model, eq: &[(i64, Lit)]| -> i64 { true_lits(sol).map(|lit| odict(lit, eq)).sum() };

        let mut lo = 0i64;
        let mut equation = equation;
        let mut bestval = 0i64;
        let passes: &[bool] = if maxval > 1 { &[true, false] } else { &[false] };
        let mut seeded_try0: Option<i64> = None;

        for &peak in passes {
            let mut hi = if peak {
                peak_val(&bestsol, &equation)
            } else {
                sum_val(&bestsol, &equation)
            };
            let m_orig = self.num_vars();
            let checkpoint = self.checkpoint();
            let mut try0 = seeded_try0.take();

            loop {
                let mid = try0.unwrap_or((lo + hi) / 2);
                if peak {
                    let over: Vec<Value> = equation
                        .iter()
                        .filter(|&&(c, _)| c > mid)
                        .map(|&(_, a)| Value::Lit(a))
                        .collect();
                    let any_over = self.any(over, Polarity::Both);
                    self.prevent(any_over);
                    let within: Vec<Value> = equation
                        .iter()
                        .filter(|&&(c, _)| c >= lo && c <= mid)
                        .map(|&(_, a)| Value::Lit(a))
                        .collect();
                    if !within.is_empty() {
                        let any_within = self.any(within, Polarity::Both);
                        self.require(any_within);
                    }
                } else {
                    let gate = self.linear_bound_lits(equation.clone(), lo, mid, Polarity::Both);
                    self.require(gate);
                }

                let newsol = self.sat(backend, &[], false, 0);
                match newsol {
                    None => {
                        lo = mid + 1;
                        if lo > hi {
                            break;
                        }
                    }
                    Some(sol) => {
                        let done = lo == mid;
                        bestval = if peak {
                            peak_val(&sol, &equation)
                        } else {
                            sum_val(&sol, &equation)
                        };
                        hi = bestval;
                        bestsol = sol;
                        if done {
                            break;
                        }
                    }
                }
                self.truncate_vars(m_orig);
                self.restore(checkpoint);
                self.set_unsat(false);
                try0 = None;
            }

            if bestval == 0 {
                break;
            } else if peak {
                equation.retain(|&(c, _)| c <= bestval);
                lo = bestval;
                // Seed the sum pass's bisection with the sum value the peak
                // pass already achieved, rather than blind midpoint search.
                seeded_try0 = Some(sum_val(&bestsol, &equation));
            }
        }

        MinimizeResult {
            solution: bestsol,
            value: bestval + offset,
        }
    }
}

fn true_lits(model: &Model) -> impl Iterator<Item = Lit> + '_ {
    model
        .iter()
        .enumerate()
        .filter(|&(_, &v)| v)
        .map(|(i, _)| (i + 1) as Lit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DpllBackend;

    #[test]
    fn minimizes_sum_with_uniform_coefficients() {
        let mut c = Clauses::new();
        let vars: Vec<Lit> = (0..3).map(|_| c.new_var()).collect();
        // Require at least one of the three to be true.
        let any = c.any(vars.iter().map(|&v| Value::Lit(v)), Polarity::Both);
        c.require(any);

        let objective: Vec<ObjectiveTerm> = vars.iter().map(|&v| (1, v)).collect();
        let result = c.minimize(&DpllBackend, objective, None);
        assert_eq!(result.value, 1);
        let true_count = vars.iter().filter(|&&v| result.solution[v as usize - 1]).count();
        assert_eq!(true_count, 1);
    }

    #[test]
    fn two_pass_minimisation_respects_peak_then_sum() {
        let mut c = Clauses::new();
        let vars: Vec<Lit> = (0..3).map(|_| c.new_var()).collect();
        let any = c.any(vars.iter().map(|&v| Value::Lit(v)), Polarity::Both);
        c.require(any);

        // Coefficients 1, 5, 5: minimizing the peak first should avoid ever
        // selecting the costly variables when the cheap one alone suffices.
        let objective: Vec<ObjectiveTerm> = vec![(1, vars[0]), (5, vars[1]), (5, vars[2])];
        let result = c.minimize(&DpllBackend, objective, None);
        assert_eq!(result.value, 1);
        assert!(result.solution[vars[0] as usize - 1]);
    }
}
