//! Path-collision detection, run as part of a transaction's `verify` phase.
//!
//! Three distinct conflicts are possible when linking a set of packages into
//! a prefix: two packages in the *same* transaction both declare the same
//! destination path ([`CondaError::SharedLinkPathClobber`]), a package would
//! overwrite a path owned by an already-installed package
//! ([`CondaError::KnownPackageClobber`]), or a package would overwrite a path
//! that exists in the prefix but isn't tracked by any `conda-meta` record
//! ([`CondaError::UnknownPackageClobber`]).
//!
//! Unlike the teacher crate's `clobber_registry`, which renames clobbered
//! files aside and grafts them back in on removal, this implementation fails
//! the transaction outright: the specification calls for every clobber to
//! surface as a named error before any file is touched, not for silent
//! rename-and-restore bookkeeping.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use rattler_conda_types::{PackageName, PrefixData};

use crate::error::CondaError;

/// Whether paths on this platform are compared case-insensitively, matching
/// the filesystem conda actually runs on (NTFS, APFS in its default mode).
fn case_insensitive() -> bool {
    cfg!(windows) || cfg!(target_os = "macos")
}

fn normalize_key(path: &Path) -> String {
    let s = path.to_string_lossy().replace('\\', "/");
    if case_insensitive() {
        s.to_lowercase()
    } else {
        s
    }
}

fn owning_package(prefix_data: &PrefixData, relative_path: &Path) -> Option<PackageName> {
    let key = normalize_key(relative_path);
    prefix_data.all_records().find_map(|(name, record)| {
        let record = record.ok()?;
        record
            .paths_data
            .paths
            .iter()
            .any(|entry| normalize_key(&entry.relative_path) == key)
            .then(|| name.clone())
    })
}

/// Checks `planned` — the `(package, relative path)` pairs every
/// link-producing action in this transaction will write to — against each
/// other and against `prefix_data`'s existing records. Returns every
/// conflict found, not just the first.
pub fn check_clobbers(
    prefix_data: &PrefixData,
    target_prefix: &Path,
    planned: &[(PackageName, PathBuf)],
) -> Vec<CondaError> {
    let mut claimed: HashMap<String, (PathBuf, PackageName)> = HashMap::new();
    let mut conflicts = Vec::new();

    for (package, relative_path) in planned {
        let key = normalize_key(relative_path);

        if let Some((existing_path, existing_package)) = claimed.get(&key) {
            if existing_package != package {
                conflicts.push(CondaError::SharedLinkPathClobber {
                    path: existing_path.clone(),
                    a: existing_package.clone(),
                    b: package.clone(),
                });
            }
            continue;
        }
        claimed.insert(key, (relative_path.clone(), package.clone()));

        if let Some(owner) = owning_package(prefix_data, relative_path) {
            if &owner != package {
                if let Some(Ok(record)) = prefix_data.get(&owner) {
                    conflicts.push(CondaError::known_clobber(
                        relative_path.clone(),
                        package.clone(),
                        record,
                    ));
                }
            }
            continue;
        }

        if target_prefix.join(relative_path).exists() {
            conflicts.push(CondaError::UnknownPackageClobber {
                path: relative_path.clone(),
                new_package: package.clone(),
            });
        }
    }

    conflicts
}
