//! Top-level error kinds surfaced to callers of this crate.
//!
//! Every variant here corresponds to one of the named error kinds a conda
//! implementation must distinguish: callers match on the kind to decide an
//! exit code or a user-facing message, not on the error's rendered text.

use std::path::PathBuf;

use rattler_conda_types::{PackageName, PrefixRecord};

use crate::install::{ActionError, TransactionError};

/// A single conflicting user-requested spec named by an unsatisfiable
/// solver run, reported as part of [`CondaError::SolverUnsatisfiable`].
pub type ConflictingSpec = String;

/// The umbrella error type for this crate. Each variant is one of the error
/// kinds a conda-compatible tool must be able to distinguish (see the
/// design's error-handling section): callers should match on the variant,
/// not parse the `Display` text.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CondaError {
    /// The caller passed arguments that don't make sense together.
    #[error("invalid argument: {0}")]
    ArgumentError(String),

    /// An environment directory named by the caller does not exist.
    #[error("environment location not found: {0}")]
    EnvironmentLocationNotFound(PathBuf),

    /// The target prefix exists but is not writable by the current user.
    #[error("environment not writable: {0}")]
    EnvironmentNotWritable(PathBuf),

    /// A path that was required to exist (an archive, a cache entry, a
    /// `conda-meta` record) was not found.
    #[error("path not found: {0}")]
    PathNotFound(PathBuf),

    /// A path that was required to be writable (a cache directory, a
    /// `conda-meta/history` file) is not.
    #[error("not writable: {0}")]
    NotWritable(PathBuf),

    /// `--dry-run` completed successfully after printing the change report;
    /// no filesystem mutation was performed.
    #[error("dry run complete, no changes were made")]
    DryRunExit,

    /// `--download-only` completed fetch/extract successfully and is
    /// short-circuiting before the link/unlink transaction runs. Distinct
    /// from [`CondaError::DryRunExit`]: the cache was mutated, the prefix
    /// was not.
    #[error("download only, no changes were made to the prefix")]
    CondaExitZero,

    /// A caller-requested early exit that is not itself an error (e.g. a
    /// `--help` or `--version` style short-circuit surfaced through the
    /// same error channel so it can carry a process exit code).
    #[error("exiting with code {0}")]
    CondaSystemExit(i32),

    /// A network request for a package or repodata artifact failed.
    #[error("HTTP error fetching {url}: {source}")]
    CondaHTTPError {
        /// The URL that could not be fetched.
        url: String,
        /// The underlying transport error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A TLS handshake or certificate verification failed while fetching a
    /// package or repodata artifact.
    #[error("TLS error fetching {url}: {source}")]
    CondaSSLError {
        /// The URL whose connection could not be secured.
        url: String,
        /// The underlying TLS error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The channel a package came from is not in the caller's allow-list.
    #[error("channel is not allowed: {0}")]
    ChannelDenied(String),

    /// The resolved set contains a package the caller has explicitly
    /// disallowed.
    #[error("package is disallowed: {0}")]
    DisallowedPackage(PackageName),

    /// Linking would overwrite a path already owned by another installed
    /// package.
    #[error("{new_package} would clobber {path} which is owned by {owner}")]
    KnownPackageClobber {
        /// The path that would be overwritten.
        path: PathBuf,
        /// The package about to be linked.
        new_package: PackageName,
        /// The package that currently owns the path.
        owner: PackageName,
    },

    /// Linking would overwrite a path that exists in the prefix but is not
    /// tracked by any installed package record.
    #[error("{new_package} would clobber untracked path {path}")]
    UnknownPackageClobber {
        /// The path that would be overwritten.
        path: PathBuf,
        /// The package about to be linked.
        new_package: PackageName,
    },

    /// Two packages being linked in the same transaction both declare the
    /// same destination path.
    #[error("{a} and {b} both declare {path}")]
    SharedLinkPathClobber {
        /// The path both packages declare.
        path: PathBuf,
        /// The first package declaring the path.
        a: PackageName,
        /// The second package declaring the path.
        b: PackageName,
    },

    /// The transaction would remove conda's own installation from the
    /// prefix it is currently running out of, without installing a
    /// replacement.
    #[error("the transaction would remove conda without providing a replacement")]
    RemoveSelf,

    /// A `pre-link` or `post-link` script exited with a non-zero status.
    #[error("link script for {package} failed with exit code {exit_code:?}")]
    LinkError {
        /// The package whose script failed.
        package: PackageName,
        /// The script's exit code, if the process could report one.
        exit_code: Option<i32>,
    },

    /// A file's checksum did not match the value recorded in the package
    /// manifest.
    #[error("checksum mismatch for {path}")]
    SafetyError {
        /// The file whose checksum was wrong.
        path: PathBuf,
    },

    /// A file the package manifest lists as part of the package was not
    /// found where it was expected.
    #[error("missing file listed in package manifest: {path}")]
    CondaVerificationError {
        /// The path that was declared but missing.
        path: PathBuf,
    },

    /// The prefix path is longer than the prefix placeholder baked into a
    /// relocatable binary file, so the placeholder can't be rewritten in
    /// place without growing the file.
    #[error("prefix placeholder too short to hold target prefix for {path}")]
    PaddingError {
        /// The file whose placeholder is too short.
        path: PathBuf,
    },

    /// No set of package records satisfies every requested spec. Carries
    /// the minimal set of user-requested specs that jointly conflict.
    #[error("could not satisfy: {}", .0.join(", "))]
    SolverUnsatisfiable(Vec<ConflictingSpec>),

    /// A path action failed during `verify`, `execute`, or `reverse`.
    #[error(transparent)]
    Action(#[from] ActionError),

    /// The transaction engine failed to prepare, verify, or execute.
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// More than one of the above occurred; every failure the caller should
    /// see is carried here rather than only the first one encountered.
    #[error("{} errors occurred:\n{}", .0.len(), format_multi(.0))]
    CondaMultiError(Vec<CondaError>),
}

fn format_multi(errors: &[CondaError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

impl CondaError {
    /// Builds a [`CondaError::KnownPackageClobber`] naming the owning record.
    pub fn known_clobber(path: PathBuf, new_package: PackageName, owner: &PrefixRecord) -> Self {
        CondaError::KnownPackageClobber {
            path,
            new_package,
            owner: owner.repodata_record.package_record.name.clone(),
        }
    }
}
