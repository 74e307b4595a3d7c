#![deny(missing_docs)]

//! A small CNF clause store, logical-combinator frontend, and bisection
//! minimiser, used to encode dependency resolution as a SAT instance.
//!
//! [`Clauses`] is the entry point: allocate variables, combine them with
//! [`Clauses::and`]/[`Clauses::or`]/[`Clauses::ite`]/etc (which constant-fold
//! eagerly and otherwise Tseitin-encode into the underlying [`ClauseStore`]),
//! then hand the result to a [`SatBackend`] via [`Clauses::sat`]. Once a
//! solution exists, [`Clauses::minimize`] searches for one that also
//! minimises a given objective, and [`unsat_core::minimal_unsatisfiable_subset`]
//! explains why no solution exists at all.

mod backend;
mod clause_store;
mod clauses;
mod minimize;
mod pseudo_boolean;
pub mod unsat_core;

pub use backend::{DpllBackend, Model, SatBackend};
pub use clause_store::{Checkpoint, ClauseStore};
pub use clauses::{Clauses, ClausesError, Lit, Polarity, Value};
pub use minimize::{MinimizeResult, ObjectiveTerm};
