//! The link/unlink transaction engine: turns a solver's chosen package set
//! into an atomic, reversible sequence of filesystem actions applied to a
//! prefix (spec §4.7, §4.8).
//!
//! [`action`] defines the tagged [`Action`] enum and its verify/execute/
//! reverse/cleanup contract. [`transaction`] diffs two package sets into a
//! [`Transaction`] and drives the bucketed [`UnlinkLinkTransaction`] built
//! from it. [`driver`] owns the thread pools the engine fans verify/execute
//! work out across. The remaining modules implement one action variant
//! each: [`clobber`] backs transaction-level path-collision detection,
//! [`change_report`] renders the pre-execute summary, and [`entry_point`],
//! [`environments_txt`], [`history`], [`link_script`], [`menu`], [`python`]
//! each implement the mechanics behind one or more [`Action`] variants.

mod action;
mod change_report;
mod clobber;
mod driver;
mod entry_point;
mod environments_txt;
mod history;
mod link_script;
mod menu;
mod python;
mod transaction;

pub use action::{
    Action, ActionContext, ActionError, CompilePycAction, CreatePrefixRecordAction,
    EntryPointAction, EnvironmentsTxtAction, LinkKind, LinkPathAction, MenuAction,
    PrefixReplaceLinkAction, RemoveLinkedPackageRecordAction, UnlinkAction, UpdateHistoryAction,
};
pub use change_report::{ChangeKind, ChangeReport, PackageChange};
pub use driver::{InstallDriver, InstallDriverBuilder, InstallDriverError};
pub use link_script::{LinkScriptOutcome, LinkScriptType};
pub use python::{PythonInfo, PythonInfoError};
pub use transaction::{
    PrefixSetup, Transaction, TransactionError, TransactionOperation, UnlinkLinkTransaction,
};
