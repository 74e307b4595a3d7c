//! Builds the human-facing summary of what a transaction will do, rendered
//! to the user before `execute` runs (and the only output of a `--dry-run`).
//!
//! Classification compares `unlink_precs` to `link_precs` by package name:
//! a name present in only one side is `new`/`removed`; a name present in
//! both is classified by comparing channel, subdir, version and build
//! number. Iteration is in a single deterministic order (package name,
//! byte-wise) so the same transaction always renders the same report.

use std::collections::BTreeMap;

use rattler_conda_types::{PackageName, PrefixRecord, RepoDataRecord};

/// How a named package's installed state changes across a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// The package is being installed where it wasn't present before.
    New,
    /// The package is being removed and nothing replaces it.
    Removed,
    /// Same channel and subdir, version or build number increased.
    Updated,
    /// Same channel and subdir, version or build number decreased.
    Downgraded,
    /// Same version, a different build variant (build string) of it.
    Revised,
    /// A different channel or subdir now provides this package.
    Superseded,
}

/// One named package's change, with enough of both records to render a
/// `from -> to` line.
#[derive(Debug, Clone)]
pub struct PackageChange {
    /// The package this entry describes.
    pub name: PackageName,
    /// The installed record, if the package was already present.
    pub before: Option<PrefixRecord>,
    /// The record that will be installed, if any.
    pub after: Option<RepoDataRecord>,
    /// How `before` relates to `after`.
    pub kind: ChangeKind,
}

/// The full set of per-package changes a transaction would make, in
/// deterministic (package name) order.
#[derive(Debug, Clone, Default)]
pub struct ChangeReport {
    /// Changes, sorted by package name.
    pub changes: Vec<PackageChange>,
}

impl ChangeReport {
    /// Computes the report for unlinking `unlink_precs` and linking
    /// `link_precs`.
    pub fn compute(unlink_precs: &[PrefixRecord], link_precs: &[RepoDataRecord]) -> Self {
        let mut before: BTreeMap<String, PrefixRecord> = unlink_precs
            .iter()
            .map(|r| {
                (
                    r.repodata_record.package_record.name.as_normalized().to_string(),
                    r.clone(),
                )
            })
            .collect();
        let mut after: BTreeMap<String, RepoDataRecord> = link_precs
            .iter()
            .map(|r| (r.package_record.name.as_normalized().to_string(), r.clone()))
            .collect();

        let mut names: Vec<String> = before.keys().chain(after.keys()).cloned().collect();
        names.sort();
        names.dedup();

        let changes = names
            .into_iter()
            .map(|name| {
                let before = before.remove(&name);
                let after = after.remove(&name);
                let kind = classify(before.as_ref(), after.as_ref());
                PackageChange {
                    name: before
                        .as_ref()
                        .map(|r| r.repodata_record.package_record.name.clone())
                        .or_else(|| after.as_ref().map(|r| r.package_record.name.clone()))
                        .expect("a change always has at least one side"),
                    before,
                    after,
                    kind,
                }
            })
            .collect();

        Self { changes }
    }

    /// Changes of a specific kind, in report order.
    pub fn of_kind(&self, kind: ChangeKind) -> impl Iterator<Item = &PackageChange> {
        self.changes.iter().filter(move |c| c.kind == kind)
    }
}

fn classify(before: Option<&PrefixRecord>, after: Option<&RepoDataRecord>) -> ChangeKind {
    match (before, after) {
        (None, Some(_)) => ChangeKind::New,
        (Some(_), None) => ChangeKind::Removed,
        (None, None) => unreachable!("a change always has at least one side"),
        (Some(before), Some(after)) => {
            let old_rdr = &before.repodata_record;
            let old = &old_rdr.package_record;
            let new = &after.package_record;

            let same_origin = old_rdr.channel == after.channel && old.subdir == new.subdir;
            if !same_origin {
                return ChangeKind::Superseded;
            }

            match new.version.as_ref().cmp(old.version.as_ref()) {
                std::cmp::Ordering::Greater => ChangeKind::Updated,
                std::cmp::Ordering::Less => ChangeKind::Downgraded,
                std::cmp::Ordering::Equal => match new.build_number.cmp(&old.build_number) {
                    std::cmp::Ordering::Greater => ChangeKind::Updated,
                    std::cmp::Ordering::Less => ChangeKind::Downgraded,
                    std::cmp::Ordering::Equal => ChangeKind::Revised,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, version: &str, build: &str, build_number: u64) -> RepoDataRecord {
        let mut record = rattler_conda_types::PackageRecord::new(
            PackageName::try_from(name).unwrap(),
            version.parse::<rattler_conda_types::Version>().unwrap(),
            build.to_string(),
        );
        record.build_number = build_number;
        RepoDataRecord {
            package_record: record,
            file_name: format!("{name}-{version}-{build}.conda"),
            url: "https://conda.anaconda.org/main/noarch/dummy.conda".parse().unwrap(),
            channel: "main".to_string(),
        }
    }

    #[test]
    fn new_and_removed_are_one_sided() {
        let added = record("numpy", "1.26.0", "h0", 0);
        let report = ChangeReport::compute(&[], std::slice::from_ref(&added));
        assert_eq!(report.changes.len(), 1);
        assert_eq!(report.changes[0].kind, ChangeKind::New);
    }
}
