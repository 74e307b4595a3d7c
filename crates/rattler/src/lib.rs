//! The link/unlink transaction engine: applies a solver's chosen package
//! set to a prefix (an installed environment) as an atomic, reversible
//! sequence of filesystem actions.
//!
//! This crate owns the part of a conda-compatible implementation that
//! actually mutates a prefix: the tagged [`install::Action`] model, the
//! [`install::UnlinkLinkTransaction`] engine that groups, verifies and
//! executes those actions in the strict bucket order the design calls for,
//! and the [`error::CondaError`] kinds every caller needs to distinguish.
//! It depends on [`rattler_conda_types`] for the record and prefix-data
//! model and on [`rattler_cache`] for resolving a [`rattler_conda_types::PackageRecord`]
//! to its extracted, on-disk location, but knows nothing about the solver
//! that produced the package set in the first place — that's
//! `rattler_solve`.

pub mod error;
pub mod install;

pub use error::{CondaError, ConflictingSpec};
