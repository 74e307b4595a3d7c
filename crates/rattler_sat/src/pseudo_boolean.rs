//! Pseudo-boolean `lo <= Σ cᵢ·xᵢ <= hi` encoding via a bottom-up,
//! memoised binary decision diagram. Backs `AtMostOne_BDD`/`ExactlyOne_BDD`
//! and the sum-pass of the minimiser.

use std::collections::HashMap;

use crate::clauses::{Clauses, Lit, Polarity, Value};

impl Clauses {
    /// Folds constants out of `equation`, negates negative-coefficient terms
    /// (offsetting `lo`/`hi` accordingly), and sorts by coefficient
    /// ascending — the shape [`Clauses::bdd`] requires.
    ///
    /// Returns the cleaned equation (all coefficients positive, atoms are
    /// plain literals) together with the offset that must be subtracted
    /// from both bounds.
    pub(crate) fn lb_preprocess(&self, equation: Vec<(i64, Value)>) -> (Vec<(i64, Lit)>, i64) {
        let needs_preprocess = equation
            .iter()
            .any(|&(c, a)| c <= 0 || matches!(a, Value::True | Value::False));

        let mut offset = 0i64;
        let mut out = Vec::with_capacity(equation.len());
        if !needs_preprocess {
            for (c, a) in equation {
                if let Value::Lit(l) = a {
                    out.push((c, l));
                }
            }
        } else {
            for (c, a) in equation {
                let counts_toward_offset =
                    matches!(a, Value::True) || (!matches!(a, Value::False) && c <= 0);
                if counts_toward_offset {
                    offset += c;
                }
                if matches!(a, Value::True | Value::False) || c == 0 {
                    continue;
                }
                if let Value::Lit(l) = a {
                    if c > 0 {
                        out.push((c, l));
                    } else {
                        out.push((-c, -l));
                    }
                }
            }
        }
        out.sort_by_key(|&(c, _)| c);
        (out, offset)
    }

    /// Builds `lo <= Σ cᵢ·xᵢ <= hi` bottom-up over the first `nterms` terms
    /// of `equation` (coefficients ascending), memoising on
    /// `(remaining_index, accumulated_sum, remaining_total)` so that shared
    /// subexpressions are only encoded once.
    fn bdd(&mut self, equation: &[(i64, Lit)], nterms: usize, lo: i64, hi: i64, polarity: Polarity) -> Value {
        let total0: i64 = equation[..nterms].iter().map(|&(c, _)| c).sum();
        let target = (nterms as i64 - 1, 0i64, total0);
        let mut call_stack = vec![target];
        let mut ret: HashMap<(i64, i64, i64), Value> = HashMap::new();

        while let Some(&(ndx, csum, total)) = call_stack.last() {
            let lower_limit = lo - csum;
            let upper_limit = hi - csum;
            if lower_limit <= 0 && upper_limit >= total {
                call_stack.pop();
                ret.insert((ndx, csum, total), Value::True);
                continue;
            }
            if lower_limit > total || upper_limit < 0 {
                call_stack.pop();
                ret.insert((ndx, csum, total), Value::False);
                continue;
            }

            let (lc, la) = equation[ndx as usize];
            let new_ndx = ndx - 1;
            let new_total = total - lc;
            let hi_key = (new_ndx, if la < 0 { csum } else { csum + lc }, new_total);
            let Some(&thi) = ret.get(&hi_key) else {
                call_stack.push(hi_key);
                continue;
            };
            let lo_key = (new_ndx, if la < 0 { csum + lc } else { csum }, new_total);
            let Some(&tlo) = ret.get(&lo_key) else {
                call_stack.push(lo_key);
                continue;
            };

            call_stack.pop();
            let gate = self.ite(Value::Lit(la.abs()), thi, tlo, polarity);
            ret.insert((ndx, csum, total), gate);
        }
        ret[&target]
    }

    /// Encodes `lo <= Σ cᵢ·xᵢ <= hi` over literal terms that have already
    /// been preprocessed (positive coefficients, sorted ascending, no
    /// constant atoms). Used internally by the minimiser, which preprocesses
    /// its objective once and then re-tightens bounds across bisection
    /// steps without re-running [`Clauses::lb_preprocess`] each time.
    pub(crate) fn linear_bound_lits(
        &mut self,
        mut equation: Vec<(i64, Lit)>,
        mut lo: i64,
        mut hi: i64,
        polarity: Polarity,
    ) -> Value {
        equation.sort_by_key(|&(c, _)| c);
        let mut nterms = equation.len();
        let nprune = if nterms > 0 && equation[nterms - 1].0 > hi {
            let nprune = equation.iter().filter(|&&(c, _)| c > hi).count();
            nterms -= nprune;
            nprune
        } else {
            0
        };

        let total: i64 = equation[..nterms].iter().map(|&(c, _)| c).sum();
        lo = lo.max(0);
        hi = hi.min(total);
        if lo > hi {
            return Value::False;
        }

        let mut result = if nterms == 0 {
            if lo == 0 {
                Value::True
            } else {
                Value::False
            }
        } else {
            self.bdd(&equation, nterms, lo, hi, polarity)
        };

        if nprune > 0 {
            let pruned: Vec<Value> = equation[nterms..]
                .iter()
                .map(|&(_, a)| Value::Lit(-a))
                .collect();
            let forced_false = self.all(pruned, polarity);
            result = self.and(result, forced_false, polarity);
        }
        result
    }

    /// Encodes `lo <= Σ cᵢ·vᵢ <= hi` over arbitrary values (constants
    /// allowed), preprocessing first. Used by `AtMostOne`/`ExactlyOne`'s BDD
    /// path.
    pub fn linear_bound_values(
        &mut self,
        equation: Vec<(i64, Value)>,
        lo: i64,
        hi: i64,
        polarity: Polarity,
    ) -> Value {
        let (equation, offset) = self.lb_preprocess(equation);
        self.linear_bound_lits(equation, lo - offset, hi - offset, polarity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DpllBackend;

    #[test]
    fn linear_bound_at_most_two_of_four() {
        let mut c = Clauses::new();
        let vars: Vec<Lit> = (0..4).map(|_| c.new_var()).collect();
        let terms: Vec<(i64, Value)> = vars.iter().map(|&v| (1, Value::Lit(v))).collect();
        let gate = c.linear_bound_values(terms, 0, 2, Polarity::Both);
        c.require(gate);

        // Forcing three true must be unsatisfiable.
        let additional = vec![vec![vars[0]], vec![vars[1]], vec![vars[2]]];
        assert!(c.sat(&DpllBackend, &additional, false, 0).is_none());

        // Exactly two true is fine.
        let mut c2 = Clauses::new();
        let vars2: Vec<Lit> = (0..4).map(|_| c2.new_var()).collect();
        let terms2: Vec<(i64, Value)> = vars2.iter().map(|&v| (1, Value::Lit(v))).collect();
        let gate2 = c2.linear_bound_values(terms2, 0, 2, Polarity::Both);
        c2.require(gate2);
        let additional2 = vec![vec![vars2[0]], vec![vars2[1]]];
        assert!(c2.sat(&DpllBackend, &additional2, false, 0).is_some());
    }

    #[test]
    fn lb_preprocess_folds_negative_coefficients() {
        let c = Clauses::new();
        let (eq, offset) = c.lb_preprocess(vec![(-2, Value::Lit(1)), (3, Value::Lit(2))]);
        assert_eq!(offset, -2);
        assert_eq!(eq, vec![(2, -1), (3, 2)]);
    }
}
