//! Lazily populated view of the 'conda-meta' directory
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::OnceLock;

use itertools::Itertools;

use crate::package_name::PackageName;
use crate::PrefixRecord;

/// An error that can occur when loading a prefix record
#[derive(Debug, Clone, thiserror::Error)]
#[error("io error: {0}")]
pub struct PrefixDataError(pub Arc<std::io::Error>);

impl From<std::io::Error> for PrefixDataError {
    fn from(err: std::io::Error) -> Self {
        PrefixDataError(Arc::new(err))
    }
}

/// Internal state for a lazily loaded package record
struct LazyRecordEntry {
    path: PathBuf,
    record: OnceLock<Result<PrefixRecord, PrefixDataError>>,
}

/// A lazily populated view of the `conda-meta` directory in a prefix.
pub struct PrefixData {
    /// The path to the environment prefix
    prefix_path: PathBuf,
    /// A map of package names to their file path and a lazy lock for the parsed record
    records: HashMap<PackageName, LazyRecordEntry>,
}

impl PrefixData {
    /// Returns the path to the environment prefix
    pub fn prefix_path(&self) -> &Path {
        &self.prefix_path
    }

    /// Discovers all packages in the `conda-meta` directory but does not parse the JSON yet.
    pub fn new(prefix_path: impl Into<PathBuf>) -> Result<Self, std::io::Error> {
        let prefix_path = prefix_path.into();
        let meta_dir = prefix_path.join("conda-meta");
        let mut records = HashMap::new();

        if !meta_dir.exists() {
            return Ok(Self {
                prefix_path,
                records,
            });
        }

        for entry in fs::read_dir(meta_dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }

            if let Some(filename) = path.file_name().and_then(|s| s.to_str()) {
                if let Some(base_name) = filename.strip_suffix(".json") {
                    // conda-meta records are named `<name>-<version>-<build>.json`,
                    // the same scheme as archive filenames minus the extension.
                    if let Some((build_string, _version, name)) =
                        base_name.rsplitn(3, '-').collect_tuple()
                    {
                        let _ = build_string;
                        if let Ok(package_name) = PackageName::try_from(name.to_string()) {
                            records.insert(
                                package_name,
                                LazyRecordEntry {
                                    path,
                                    record: OnceLock::new(),
                                },
                            );
                        }
                    }
                }
            }
        }
        Ok(Self {
            prefix_path,
            records,
        })
    }

    /// Retrieves a record lazily. Parses the JSON only on the first call.
    pub fn get(
        &self,
        package_name: &PackageName,
    ) -> Option<Result<&PrefixRecord, &PrefixDataError>> {
        // 1. Check if the file path exists in our initial scan
        let entry = self.records.get(package_name)?;

        // 2. Parse the file if we haven't already.
        let record_result = entry
            .record
            .get_or_init(|| PrefixRecord::from_path(&entry.path).map_err(PrefixDataError::from));

        // 3. .as_ref() elegantly converts &Result<T, E> into Result<&T, &E>
        Some(record_result.as_ref())
    }

    /// Returns an iterator over all package names currently known in this
    /// `conda-meta` view, parsing each record along the way.
    pub fn all_records(
        &self,
    ) -> impl Iterator<Item = (&PackageName, Result<&PrefixRecord, &PrefixDataError>)> {
        self.records.keys().map(move |name| {
            let record = self.get(name).expect("package_name came from this map");
            (name, record)
        })
    }

    /// Inserts or overwrites the `conda-meta/<name-ver-bld>.json` record for a
    /// package, used by the `CreatePrefixRecord` path action once a package
    /// has been linked into the prefix.
    ///
    /// The record is written to disk at its canonical `conda-meta` path and
    /// immediately registered in the in-memory view so a subsequent `get`
    /// observes it without rereading the file.
    pub fn insert(&mut self, record: PrefixRecord) -> Result<(), PrefixDataError> {
        let meta_dir = self.prefix_path.join("conda-meta");
        fs::create_dir_all(&meta_dir).map_err(PrefixDataError::from)?;

        let package_name = record.repodata_record.package_record.name.clone();
        let path = meta_dir.join(record.file_name());
        record.write_to_path(&path, true).map_err(PrefixDataError::from)?;

        self.records.insert(
            package_name,
            LazyRecordEntry {
                path,
                record: OnceLock::from(Ok(record)),
            },
        );
        Ok(())
    }

    /// Removes the `conda-meta/<name-ver-bld>.json` record for a package, and
    /// drops it from the in-memory view. Used by `RemoveLinkedPackageRecord`.
    ///
    /// Returns `Ok(None)` if the package wasn't present at all.
    pub fn remove(&mut self, package_name: &PackageName) -> Result<Option<PathBuf>, PrefixDataError> {
        let Some(entry) = self.records.remove(package_name) else {
            return Ok(None);
        };
        if entry.path.exists() {
            fs::remove_file(&entry.path)?;
        }
        Ok(Some(entry.path))
    }
}
