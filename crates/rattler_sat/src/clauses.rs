//! The clause-store frontend: variable allocation, naming, and the logical
//! combinators that compile boolean expressions down to CNF via Tseitin
//! encoding.

use ahash::AHashMap;

use crate::backend::{Model, SatBackend};
use crate::clause_store::{Checkpoint, ClauseStore};

/// A signed SAT variable reference. Positive means the variable itself,
/// negative its negation. Variable numbers start at 1.
pub type Lit = i32;

/// The outcome of evaluating a logical combinator: it may fold away to a
/// boolean constant, resolve to an already-existing literal, or require a
/// fresh auxiliary variable whose defining clauses have just been emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    /// The expression is unconditionally true.
    True,
    /// The expression is unconditionally false.
    False,
    /// The expression is equivalent to this literal.
    Lit(Lit),
}

impl Value {
    /// Negates a value, constant-folding `True`/`False`.
    pub fn negate(self) -> Value {
        match self {
            Value::True => Value::False,
            Value::False => Value::True,
            Value::Lit(l) => Value::Lit(-l),
        }
    }
}

/// Whether a caller only ever needs a gate's positive form, only its
/// negative form, or both. Supplying one saves emitting the clauses that
/// only matter for the other, mirroring the `polarity` argument threaded
/// through every combinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// Only `x -> expr` is needed.
    Positive,
    /// Only `expr -> x` is needed.
    Negative,
    /// Both directions are needed (the default, used whenever the caller
    /// doesn't know in advance how a gate will be used).
    Both,
}

impl Polarity {
    fn wants_positive(self) -> bool {
        matches!(self, Polarity::Positive | Polarity::Both)
    }

    fn wants_negative(self) -> bool {
        matches!(self, Polarity::Negative | Polarity::Both)
    }
}

/// Error raised when an out-of-range or unregistered variable is used.
#[derive(Debug, thiserror::Error)]
pub enum ClausesError {
    /// A raw literal was given whose variable id is outside `1..=m`.
    #[error("SAT variable out of bounds: {literal} (max_var: {max_var})")]
    VariableOutOfBounds {
        /// The offending literal.
        literal: Lit,
        /// The highest variable id currently allocated.
        max_var: i32,
    },
    /// A name was looked up that was never bound via [`Clauses::new_var`].
    #[error("unregistered SAT variable name: {0}")]
    UnregisteredName(String),
}

/// The clause store plus variable bookkeeping: named variables, the literal
/// `<-> name` registries, and the logical combinators used to build up a
/// CNF encoding of a boolean formula.
pub struct Clauses {
    m: i32,
    store: ClauseStore,
    names: AHashMap<String, Lit>,
    indices: AHashMap<Lit, String>,
    /// Set once a combinator discovers the accumulated clause set can never
    /// be satisfied, short-circuiting further solving attempts.
    unsat: bool,
}

impl Default for Clauses {
    fn default() -> Self {
        Self::new()
    }
}

impl Clauses {
    /// Creates an empty clause store with no variables allocated.
    pub fn new() -> Self {
        Self {
            m: 0,
            store: ClauseStore::new(),
            names: AHashMap::new(),
            indices: AHashMap::new(),
            unsat: false,
        }
    }

    /// Number of variables allocated so far.
    pub fn num_vars(&self) -> i32 {
        self.m
    }

    /// Whether the store has already been proven unsatisfiable by a prior
    /// constant-folding step (independent of whether `sat` has been called).
    pub fn is_unsat(&self) -> bool {
        self.unsat
    }

    /// Number of clauses currently stored.
    pub fn clause_count(&self) -> usize {
        self.store.len()
    }

    /// Takes a checkpoint of the underlying clause store.
    pub fn checkpoint(&self) -> Checkpoint {
        self.store.checkpoint()
    }

    /// Restores the underlying clause store to a checkpoint, discarding any
    /// clauses (but not variables) added since. The caller is responsible
    /// for resetting `unsat` if the checkpoint predates it being set.
    pub fn restore(&mut self, checkpoint: Checkpoint) {
        self.store.restore(checkpoint);
    }

    fn check_variable(&self, lit: Lit) -> Result<Lit, ClausesError> {
        let var = lit.unsigned_abs() as i32;
        if var > 0 && var <= self.m {
            Ok(lit)
        } else {
            Err(ClausesError::VariableOutOfBounds {
                literal: lit,
                max_var: self.m,
            })
        }
    }

    /// Registers clause `clause`, checking that every literal refers to an
    /// allocated variable.
    pub fn add_clause(&mut self, clause: Vec<Lit>) -> Result<(), ClausesError> {
        for &lit in &clause {
            self.check_variable(lit)?;
        }
        self.store.push(clause);
        Ok(())
    }

    fn add_clauses(&mut self, clauses: impl IntoIterator<Item = Vec<Lit>>) {
        self.store.extend(clauses);
    }

    /// Allocates a fresh, unnamed variable and returns it as a positive
    /// literal.
    pub fn new_var(&mut self) -> Lit {
        self.m += 1;
        self.m
    }

    /// Allocates a fresh variable and registers it under `name`.
    pub fn new_named_var(&mut self, name: impl Into<String>) -> Lit {
        let lit = self.new_var();
        self.name_var(lit, name);
        lit
    }

    /// Binds `name` (and `!name` for its negation) to literal `lit`.
    pub fn name_var(&mut self, lit: Lit, name: impl Into<String>) -> Lit {
        let name = name.into();
        let negated_name = format!("!{name}");
        self.names.insert(name.clone(), lit);
        self.names.insert(negated_name.clone(), -lit);
        self.indices.entry(lit).or_insert_with(|| name.clone());
        self.indices.entry(-lit).or_insert(negated_name);
        lit
    }

    /// Looks up the literal bound to `name`, if any.
    pub fn from_name(&self, name: &str) -> Option<Lit> {
        self.names.get(name).copied()
    }

    /// Looks up the name bound to literal `lit`, if any.
    pub fn from_index(&self, lit: Lit) -> Option<&str> {
        self.indices.get(&lit).map(String::as_str)
    }

    fn resolve(&self, name_or_lit: &str) -> Result<Lit, ClausesError> {
        self.names
            .get(name_or_lit)
            .copied()
            .ok_or_else(|| ClausesError::UnregisteredName(name_or_lit.to_string()))
    }

    /// Evaluates `what` for side effects only (no fresh literal/name is
    /// returned), folding the result directly into the clause set with the
    /// given forced polarity. Used by [`Clauses::require`] and
    /// [`Clauses::prevent`].
    fn assert_value(&mut self, value: Value, polarity: bool) {
        match value {
            Value::Lit(lit) => {
                let clause = if polarity { vec![lit] } else { vec![-lit] };
                self.store.push(clause);
            }
            Value::True | Value::False => {
                let resolved = matches!(value, Value::True);
                if resolved != polarity {
                    self.unsat = true;
                }
            }
        }
    }

    /// Forces `value` to hold (`Require`): the accumulated formula gains an
    /// extra conjunct rather than a fresh named variable.
    pub fn require(&mut self, value: Value) {
        self.assert_value(value, true);
    }

    /// Forces `value` to not hold (`Prevent`).
    pub fn prevent(&mut self, value: Value) {
        self.assert_value(value, false);
    }

    /// Negation. Always resolves without new clauses.
    pub fn not(&self, x: Value) -> Value {
        x.negate()
    }

    /// Allocates (or reuses) a literal equivalent to `f AND g`, emitting the
    /// defining clauses `polarity` requires.
    pub fn and(&mut self, f: Value, g: Value, polarity: Polarity) -> Value {
        match (f, g) {
            (Value::False, _) | (_, Value::False) => Value::False,
            (Value::True, other) | (other, Value::True) => other,
            (Value::Lit(a), Value::Lit(b)) if a == b => Value::Lit(a),
            (Value::Lit(a), Value::Lit(b)) if a == -b => Value::False,
            (Value::Lit(a), Value::Lit(b)) => {
                let (a, b) = if b < a { (b, a) } else { (a, b) };
                let x = self.new_var();
                if polarity.wants_positive() {
                    self.add_clauses([vec![-x, a], vec![-x, b]]);
                }
                if polarity.wants_negative() {
                    self.add_clauses([vec![x, -a, -b]]);
                }
                Value::Lit(x)
            }
        }
    }

    /// Allocates (or reuses) a literal equivalent to `f OR g`.
    pub fn or(&mut self, f: Value, g: Value, polarity: Polarity) -> Value {
        match (f, g) {
            (Value::True, _) | (_, Value::True) => Value::True,
            (Value::False, other) | (other, Value::False) => other,
            (Value::Lit(a), Value::Lit(b)) if a == b => Value::Lit(a),
            (Value::Lit(a), Value::Lit(b)) if a == -b => Value::True,
            (Value::Lit(a), Value::Lit(b)) => {
                let (a, b) = if b < a { (b, a) } else { (a, b) };
                let x = self.new_var();
                if polarity.wants_positive() {
                    self.add_clauses([vec![-x, a, b]]);
                }
                if polarity.wants_negative() {
                    self.add_clauses([vec![x, -a], vec![x, -b]]);
                }
                Value::Lit(x)
            }
        }
    }

    /// Allocates (or reuses) a literal equivalent to `f XOR g`.
    pub fn xor(&mut self, f: Value, g: Value, polarity: Polarity) -> Value {
        match (f, g) {
            (Value::False, other) | (other, Value::False) => other,
            (Value::True, other) | (other, Value::True) => self.not(other),
            (Value::Lit(a), Value::Lit(b)) if a == b => Value::False,
            (Value::Lit(a), Value::Lit(b)) if a == -b => Value::True,
            (Value::Lit(a), Value::Lit(b)) => {
                let (a, b) = if b < a { (b, a) } else { (a, b) };
                let x = self.new_var();
                if polarity.wants_positive() {
                    self.add_clauses([vec![-x, a, b], vec![-x, -a, -b]]);
                }
                if polarity.wants_negative() {
                    self.add_clauses([vec![x, -a, b], vec![x, a, -b]]);
                }
                Value::Lit(x)
            }
        }
    }

    /// `if c then t else f`, resolving fully if any of `c`, `t`, `f` is a
    /// constant.
    pub fn ite(&mut self, c: Value, t: Value, f: Value, polarity: Polarity) -> Value {
        match (c, t, f) {
            (Value::True, t, _) => t,
            (Value::False, _, f) => f,
            (c, Value::True, f) => self.or(c, f, polarity),
            (c, Value::False, f) => self.and(self.not(c), f, polarity),
            (c, t, Value::False) => self.and(c, t, polarity),
            (c, t, Value::True) => self.or(t, self.not(c), polarity),
            (Value::Lit(c_lit), Value::Lit(t_lit), Value::Lit(f_lit)) => {
                if t_lit == c_lit {
                    return self.or(c, f, polarity);
                }
                if t_lit == -c_lit {
                    return self.and(self.not(c), f, polarity);
                }
                if f_lit == c_lit {
                    return self.and(c, t, polarity);
                }
                if f_lit == -c_lit {
                    return self.or(t, self.not(c), polarity);
                }
                if t_lit == f_lit {
                    return t;
                }
                if t_lit == -f_lit {
                    return self.xor(c, f, polarity);
                }
                let (t_lit, f_lit, c_lit) = if f_lit < t_lit {
                    (f_lit, t_lit, -c_lit)
                } else {
                    (t_lit, f_lit, c_lit)
                };
                let x = self.new_var();
                if polarity.wants_positive() {
                    self.add_clauses([
                        vec![-x, -c_lit, t_lit],
                        vec![-x, c_lit, f_lit],
                        vec![-x, t_lit, f_lit],
                    ]);
                }
                if polarity.wants_negative() {
                    self.add_clauses([
                        vec![x, -c_lit, -t_lit],
                        vec![x, c_lit, -f_lit],
                        vec![x, -t_lit, -f_lit],
                    ]);
                }
                Value::Lit(x)
            }
        }
    }

    /// Conjunction over an arbitrary number of values, folding duplicate and
    /// complementary literals and constants away.
    pub fn all(&mut self, values: impl IntoIterator<Item = Value>, polarity: Polarity) -> Value {
        let mut lits: Vec<Lit> = Vec::new();
        for value in values {
            match value {
                Value::True => continue,
                Value::False => return Value::False,
                Value::Lit(l) => {
                    if lits.contains(&-l) {
                        return Value::False;
                    }
                    if !lits.contains(&l) {
                        lits.push(l);
                    }
                }
            }
        }
        match lits.len() {
            0 => Value::True,
            1 => Value::Lit(lits[0]),
            _ => {
                let x = self.new_var();
                if polarity.wants_positive() {
                    self.add_clauses(lits.iter().map(|&l| vec![-x, l]));
                }
                if polarity.wants_negative() {
                    self.add_clauses([lits.iter().map(|&l| -l).collect()]);
                }
                Value::Lit(x)
            }
        }
    }

    /// Disjunction over an arbitrary number of values.
    pub fn any(&mut self, values: impl IntoIterator<Item = Value>, polarity: Polarity) -> Value {
        let mut lits: Vec<Lit> = Vec::new();
        for value in values {
            match value {
                Value::False => continue,
                Value::True => return Value::True,
                Value::Lit(l) => {
                    if lits.contains(&-l) {
                        return Value::True;
                    }
                    if !lits.contains(&l) {
                        lits.push(l);
                    }
                }
            }
        }
        match lits.len() {
            0 => Value::False,
            1 => Value::Lit(lits[0]),
            _ => {
                let x = self.new_var();
                if polarity.wants_positive() {
                    let mut clause = vec![-x];
                    clause.extend(lits.iter().copied());
                    self.add_clauses([clause]);
                }
                if polarity.wants_negative() {
                    self.add_clauses(lits.iter().map(|&l| vec![x, -l]));
                }
                Value::Lit(x)
            }
        }
    }

    /// Naive pairwise encoding of "at most one of `vals` is true": forbid
    /// every pair simultaneously. Quadratic in the number of values, so only
    /// worth it for small inputs.
    fn at_most_one_nsq(&mut self, vals: &[Value], polarity: Polarity) -> Value {
        let mut pairwise = Vec::new();
        for i in 0..vals.len() {
            for j in (i + 1)..vals.len() {
                let not_i = self.not(vals[i]);
                let not_j = self.not(vals[j]);
                pairwise.push(self.or(not_i, not_j, polarity));
            }
        }
        self.all(pairwise, polarity)
    }

    /// "At most one of `vals`", dispatching to the naive pairwise encoding
    /// for small inputs (`< 5`, tightened to `< 4` if polarity isn't known
    /// to be positive-only) and the BDD-based `LinearBound` otherwise.
    pub fn at_most_one(&mut self, vals: impl IntoIterator<Item = Value>, polarity: Polarity) -> Value {
        let vals: Vec<Value> = vals.into_iter().collect();
        let threshold = if matches!(polarity, Polarity::Positive) {
            5
        } else {
            4
        };
        if vals.len() < threshold {
            self.at_most_one_nsq(&vals, polarity)
        } else {
            let terms = vals.into_iter().map(|v| (1, v)).collect();
            self.linear_bound_values(terms, 0, 1, polarity)
        }
    }

    /// "Exactly one of `vals`", dispatching between the naive and BDD
    /// encodings at a threshold of 2 candidates.
    pub fn exactly_one(&mut self, vals: impl IntoIterator<Item = Value>, polarity: Polarity) -> Value {
        let vals: Vec<Value> = vals.into_iter().collect();
        if vals.len() < 2 {
            let at_most = self.at_most_one_nsq(&vals, polarity);
            let any = self.any(vals, polarity);
            self.and(at_most, any, polarity)
        } else {
            let terms = vals.into_iter().map(|v| (1, v)).collect();
            self.linear_bound_values(terms, 1, 1, polarity)
        }
    }

    /// Calculates a SAT solution for the current clause set using `backend`.
    /// `additional` clauses are asserted for the duration of this call only
    /// (checkpoint/restore) unless `include_if` is set and a solution was
    /// found, in which case they're kept.
    pub fn sat(
        &mut self,
        backend: &dyn SatBackend,
        additional: &[Vec<Lit>],
        include_if: bool,
        limit: usize,
    ) -> Option<Model> {
        if self.unsat {
            return None;
        }
        if self.m == 0 {
            return Some(Vec::new());
        }
        let checkpoint = self.checkpoint();
        if !additional.is_empty() {
            self.add_clauses(additional.iter().cloned());
        }
        let solution = backend.run(self.store.as_slice(), self.m, limit);
        if !additional.is_empty() && (solution.is_none() || !include_if) {
            self.restore(checkpoint);
        }
        solution
    }

    /// Same as [`Clauses::sat`] but returns the set of *named* literals true
    /// in the model (negated names, i.e. those prefixed `!`, are excluded),
    /// mirroring the original's `names=True` mode.
    pub fn sat_named(
        &mut self,
        backend: &dyn SatBackend,
        additional: &[Vec<Lit>],
    ) -> Option<Vec<String>> {
        let model = self.sat(backend, additional, false, 0)?;
        Some(
            model
                .iter()
                .enumerate()
                .filter(|(_, &v)| *v)
                .filter_map(|(i, _)| self.from_index((i + 1) as Lit))
                .map(String::from)
                .collect(),
        )
    }

    /// Resolves a name to its literal, erroring if unbound. Exposed for
    /// callers (e.g. the resolver) that build objectives from variable
    /// names rather than raw literals.
    pub fn literal_for_name(&self, name: &str) -> Result<Lit, ClausesError> {
        self.resolve(name)
    }

    /// Forces the unsat flag, used by the minimiser when a bisection
    /// attempt's constant-folded combinators detect a contradiction.
    pub(crate) fn set_unsat(&mut self, value: bool) {
        self.unsat = value;
    }

    /// Rolls back variable allocation to `m`, discarding any variables (and
    /// their names) allocated after that point. Used by the minimiser to
    /// undo a failed bisection step's auxiliary variables in lockstep with
    /// restoring the clause store.
    pub(crate) fn truncate_vars(&mut self, m: i32) {
        self.names.retain(|_, lit| lit.unsigned_abs() as i32 <= m);
        self.indices.retain(|lit, _| lit.unsigned_abs() as i32 <= m);
        self.m = m;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DpllBackend;

    #[test]
    fn and_constant_folds() {
        let mut c = Clauses::new();
        let x = Value::Lit(c.new_var());
        assert_eq!(c.and(x, Value::True, Polarity::Both), x);
        assert_eq!(c.and(x, Value::False, Polarity::Both), Value::False);
    }

    #[test]
    fn or_of_complementary_literals_is_true() {
        let mut c = Clauses::new();
        let x = c.new_var();
        assert_eq!(
            c.or(Value::Lit(x), Value::Lit(-x), Polarity::Both),
            Value::True
        );
    }

    #[test]
    fn at_most_one_forbids_two_simultaneously_true() {
        let mut c = Clauses::new();
        let vars: Vec<Lit> = (0..3).map(|_| c.new_var()).collect();
        let gate = c.at_most_one(vars.iter().map(|&v| Value::Lit(v)), Polarity::Both);
        c.require(gate);
        // Force the first two true: must be unsatisfiable.
        let additional = vec![vec![vars[0]], vec![vars[1]]];
        assert!(c.sat(&DpllBackend, &additional, false, 0).is_none());
    }

    #[test]
    fn exactly_one_of_three_is_satisfiable_with_exactly_one_true() {
        let mut c = Clauses::new();
        let vars: Vec<Lit> = (0..3).map(|_| c.new_var()).collect();
        let gate = c.exactly_one(vars.iter().map(|&v| Value::Lit(v)), Polarity::Both);
        c.require(gate);
        let model = c.sat(&DpllBackend, &[], false, 0).expect("satisfiable");
        let true_count = vars.iter().filter(|&&v| model[v as usize - 1]).count();
        assert_eq!(true_count, 1);
    }
}
