#![deny(missing_docs)]

//! Compiles match-specs and available package records into clauses for
//! [`rattler_sat`], solves the resulting instance, and minimises the
//! solution against a tiered objective to pick the best-scoring package set.

mod objective;
mod resolver;

pub use resolver::Solver;

use rattler_conda_types::{GenericVirtualPackage, MatchSpec, RepoDataRecord};
use std::fmt;

/// An error produced while resolving a [`SolverTask`].
#[derive(Debug, thiserror::Error)]
pub enum SolveError {
    /// There is no set of package records that satisfies every requested
    /// spec. Carries the subset of requested specs that, together, cannot be
    /// jointly satisfied — see [`rattler_sat::unsat_core`].
    #[error("cannot solve the request because of: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))]
    Unsolvable(Vec<MatchSpec>),

    /// A requested spec could not be parsed as a valid match-spec.
    #[error("invalid match spec: {0}")]
    InvalidMatchSpec(String),
}

/// How strictly channel priority is enforced when multiple channels offer
/// candidates for the same package name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelPriority {
    /// Candidates from a lower-priority channel may only be selected when no
    /// candidate from a higher-priority channel is selectable at all.
    #[default]
    Strict,
    /// All candidates compete purely on their own merits (version, build
    /// number); channel order only breaks ties.
    Disabled,
}

/// Controls how aggressively already-installed packages may be changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateModifier {
    /// Installed packages may be updated only if a requested spec requires
    /// it; everything else is frozen in place.
    #[default]
    UpdateSpecs,
    /// Every package already installed is frozen; only new packages may be
    /// added to satisfy the request.
    FreezeInstalled,
    /// Every currently installed package is allowed to move to its latest
    /// matching version, not just the ones a spec names.
    UpdateAll,
    /// If every requested spec already matches some locked package, return
    /// the locked set unchanged without invoking the SAT solver at all.
    SpecsSatisfiedSkipSolve,
}

/// Controls whether transitive dependencies are resolved at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DepsModifier {
    /// Normal resolution: dependencies are resolved transitively.
    #[default]
    NotSet,
    /// Only the requested specs themselves are resolved; their dependencies
    /// are assumed already satisfied.
    NoDeps,
    /// Only the dependencies of the requested specs are resolved; the specs
    /// themselves are not added to the result.
    OnlyDeps,
}

/// A dependency resolution task to be solved by [`Solver::solve`].
pub struct SolverTask<TAvailablePackagesIterator> {
    /// An iterator over all packages that could be selected, across every
    /// configured channel, in channel-priority order (highest priority
    /// first).
    pub available_packages: TAvailablePackagesIterator,

    /// Records of packages already present in the target prefix. The solver
    /// prefers to keep these selected unless a spec or modifier forces a
    /// change, to minimise environment churn.
    pub locked_packages: Vec<RepoDataRecord>,

    /// Records of packages that must be selected exactly as given, with no
    /// substitution, even if that forces other packages to change.
    pub pinned_packages: Vec<RepoDataRecord>,

    /// Virtual packages considered present on the host (e.g. `__glibc`,
    /// `__cuda`) that dependencies may reference but which are never
    /// themselves installed.
    pub virtual_packages: Vec<GenericVirtualPackage>,

    /// The specs the user explicitly asked for.
    pub specs: Vec<MatchSpec>,

    /// How strictly to enforce channel priority between candidates of the
    /// same name.
    pub channel_priority: ChannelPriority,

    /// How aggressively already-installed packages may be changed.
    pub update_modifier: UpdateModifier,

    /// Whether dependencies are resolved at all.
    pub deps_modifier: DepsModifier,
}

impl<I> fmt::Debug for SolverTask<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolverTask")
            .field("specs", &self.specs)
            .field("locked_packages", &self.locked_packages.len())
            .field("pinned_packages", &self.pinned_packages.len())
            .field("virtual_packages", &self.virtual_packages.len())
            .field("channel_priority", &self.channel_priority)
            .field("update_modifier", &self.update_modifier)
            .field("deps_modifier", &self.deps_modifier)
            .finish()
    }
}
