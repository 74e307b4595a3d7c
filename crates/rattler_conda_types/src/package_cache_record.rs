//! Defines [`PackageCacheRecord`].

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use rattler_digest::Md5Hash;
use serde::{Deserialize, Serialize};

use crate::PackageRecord;

/// A [`PackageRecord`] together with the on-disk locations of the cached
/// tarball and its extracted directory. This is the record type the package
/// cache indexes its entries by; it never travels across a network boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageCacheRecord {
    /// The data stored in the extracted package's `info/index.json`.
    #[serde(flatten)]
    pub package_record: PackageRecord,

    /// Full path to the cached tarball (`.conda` or `.tar.bz2`) on disk.
    pub package_tarball_full_path: PathBuf,

    /// Full path to the directory the tarball has been extracted into.
    pub extracted_package_dir: PathBuf,

    #[serde(skip)]
    memoized_md5: OnceLock<Option<Md5Hash>>,
}

impl PackageCacheRecord {
    /// Constructs a new record for a package whose tarball lives at
    /// `package_tarball_full_path` and whose extracted contents (if any) live
    /// at `extracted_package_dir`.
    pub fn new(
        package_record: PackageRecord,
        package_tarball_full_path: impl Into<PathBuf>,
        extracted_package_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            package_record,
            package_tarball_full_path: package_tarball_full_path.into(),
            extracted_package_dir: extracted_package_dir.into(),
            memoized_md5: OnceLock::new(),
        }
    }

    /// Returns true if the tarball for this entry exists on disk.
    pub fn is_fetched(&self) -> bool {
        self.package_tarball_full_path.is_file()
    }

    /// Returns true if the package has been extracted, i.e. the extracted
    /// directory exists and contains an `info/index.json`.
    pub fn is_extracted(&self) -> bool {
        self.extracted_package_dir.is_dir()
            && self
                .extracted_package_dir
                .join("info")
                .join("index.json")
                .is_file()
    }

    /// The file name of the cached tarball, e.g. `numpy-1.24.3-py311h_0.conda`.
    pub fn tarball_basename(&self) -> Option<&str> {
        self.package_tarball_full_path
            .file_name()
            .and_then(|name| name.to_str())
    }

    /// Returns the md5 hash of the cached tarball, computing and memoizing it
    /// from disk on first access if the record itself has none. Returns
    /// `None` if the tarball isn't present on disk.
    pub fn md5(&self) -> Option<Md5Hash> {
        if let Some(md5) = self.package_record.md5 {
            return Some(md5);
        }
        *self.memoized_md5.get_or_init(|| self.compute_md5sum())
    }

    fn compute_md5sum(&self) -> Option<Md5Hash> {
        if !self.package_tarball_full_path.is_file() {
            return None;
        }
        rattler_digest::compute_file_digest::<rattler_digest::Md5>(&self.package_tarball_full_path)
            .ok()
    }

    /// The directory the tarball and extracted package live in.
    pub fn cache_dir(&self) -> Option<&Path> {
        self.extracted_package_dir.parent()
    }
}

impl AsRef<PackageRecord> for PackageCacheRecord {
    fn as_ref(&self) -> &PackageRecord {
        &self.package_record
    }
}

impl PartialEq for PackageCacheRecord {
    fn eq(&self, other: &Self) -> bool {
        self.package_tarball_full_path == other.package_tarball_full_path
            && self.extracted_package_dir == other.extracted_package_dir
    }
}

impl Eq for PackageCacheRecord {}

impl std::hash::Hash for PackageCacheRecord {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.package_tarball_full_path.hash(state);
        self.extracted_package_dir.hash(state);
    }
}
