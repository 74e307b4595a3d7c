//! A directory of cached package tarballs and their extracted contents
//! ([`PkgsDir`]), and a read-across/write-to-first-writable view over several
//! of them ([`PackageCache`]).

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use rattler_conda_types::{
    package::{ArchiveIdentifier, IndexJson, PackageFile},
    HasPKey, MatchSpec, Matches, PackageCacheRecord, PackageRecord,
};
use url::Url;

use crate::consts::write_cachedir_tag;

/// Errors returned while loading or writing to a package cache directory.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PackageCacheError {
    /// An io error occurred.
    #[error("an io error occurred")]
    Io(#[from] std::io::Error),

    /// No writable cache directory was configured.
    #[error("no writable package cache directory is configured")]
    NoWritableCache,
}

/// Newest-first record of which remote URL produced each cached file name,
/// persisted as `urls.txt` alongside the tarballs. Its presence (and
/// writability) is what makes a [`PkgsDir`] writable per spec.
#[derive(Debug, Default, Clone)]
pub struct UrlsFile {
    /// `file_name -> url`, first-seen (i.e. most recently recorded) entry wins.
    by_file_name: HashMap<String, Url>,
}

impl UrlsFile {
    fn path(pkgs_dir: &Path) -> PathBuf {
        pkgs_dir.join("urls.txt")
    }

    /// Reads `urls.txt` from `pkgs_dir`. Returns an empty file if it doesn't exist.
    pub fn read(pkgs_dir: &Path) -> std::io::Result<Self> {
        let path = Self::path(pkgs_dir);
        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e),
        };
        let mut by_file_name = HashMap::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Ok(url) = Url::parse(line) {
                if let Some(file_name) = url.path_segments().and_then(Iterator::last) {
                    by_file_name.entry(file_name.to_string()).or_insert(url);
                }
            }
        }
        Ok(Self { by_file_name })
    }

    /// Looks up the URL a given cached file name was downloaded from.
    pub fn url_for(&self, file_name: &str) -> Option<&Url> {
        self.by_file_name.get(file_name)
    }

    /// Prepends `url` to `urls.txt` in `pkgs_dir`, creating the file (and the
    /// directory) if needed. New entries go first, matching the newest-first
    /// convention `conda` itself uses.
    pub fn record(pkgs_dir: &Path, url: &Url) -> std::io::Result<()> {
        fs::create_dir_all(pkgs_dir)?;
        let path = Self::path(pkgs_dir);
        let existing = fs::read_to_string(&path).unwrap_or_default();
        let mut contents = format!("{url}\n");
        contents.push_str(&existing);
        fs::write(path, contents)
    }
}

/// A candidate package found while scanning a [`PkgsDir`]: its tarball, its
/// extracted directory, or both (describing the same package).
#[derive(Default, Debug)]
struct Candidate {
    tarball: Option<PathBuf>,
    extracted_dir: Option<PathBuf>,
}

/// A single `pkgs_dir` directory: tarballs and their extracted siblings.
#[derive(Debug, Clone)]
pub struct PkgsDir {
    path: PathBuf,
}

impl PkgsDir {
    /// Wraps an existing (or not-yet-existing) directory path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The directory's path on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A `pkgs_dir` is writable iff its `urls.txt` exists and is writable, or
    /// can be created (i.e. the directory itself is writable).
    pub fn is_writable(&self) -> bool {
        let urls_path = UrlsFile::path(&self.path);
        if urls_path.exists() {
            return fs::OpenOptions::new()
                .append(true)
                .open(&urls_path)
                .is_ok();
        }
        match fs::create_dir_all(&self.path) {
            Ok(()) => {
                write_cachedir_tag(&self.path);
                fs::File::create(&urls_path).is_ok()
            }
            Err(_) => false,
        }
    }

    /// The path a tarball with this file name would live at in this directory.
    pub fn tarball_path(&self, file_name: &str) -> PathBuf {
        self.path.join(file_name)
    }

    /// The path the extracted contents of `identifier` would live at.
    pub fn extracted_path(&self, identifier: &ArchiveIdentifier) -> PathBuf {
        self.path.join(format!(
            "{}-{}-{}",
            identifier.name, identifier.version, identifier.build_string
        ))
    }

    fn scan(&self) -> HashMap<String, Candidate> {
        let Ok(entries) = fs::read_dir(&self.path) else {
            return HashMap::new();
        };

        let mut by_stem: HashMap<String, Candidate> = HashMap::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if file_name == "urls.txt" || file_name == crate::consts::CACHEDIR_TAG_NAME {
                continue;
            }
            if path.is_dir() {
                if path.join("info").join("index.json").is_file() {
                    by_stem
                        .entry(file_name.to_string())
                        .or_default()
                        .extracted_dir = Some(path);
                }
            } else if let Some(identifier) = ArchiveIdentifier::try_from_path(&path) {
                let stem = format!(
                    "{}-{}-{}",
                    identifier.name, identifier.version, identifier.build_string
                );
                by_stem.entry(stem).or_default().tarball = Some(path);
            }
        }
        by_stem
    }

    /// Enumerates the directory, deduplicates tarball/extracted pairs that
    /// describe the same package, and attempts to materialise a
    /// [`PackageCacheRecord`] for each. Entries that are irrecoverably
    /// corrupt (no tarball and no readable metadata) are silently dropped.
    pub fn load(&self) -> Vec<PackageCacheRecord> {
        let urls = UrlsFile::read(&self.path).unwrap_or_default();
        self.scan()
            .into_values()
            .filter_map(|candidate| self.materialize(candidate, &urls))
            .collect()
    }

    fn materialize(&self, candidate: Candidate, urls: &UrlsFile) -> Option<PackageCacheRecord> {
        let Candidate {
            tarball,
            extracted_dir,
        } = candidate;

        if let Some(dir) = &extracted_dir {
            if let Some(record) = read_repodata_record(dir) {
                return Some(PackageCacheRecord::new(
                    record,
                    tarball.clone().unwrap_or_else(|| dir.clone()),
                    dir.clone(),
                ));
            }

            if let Ok(index) = IndexJson::from_package_directory(dir) {
                let package_record = index_to_package_record(index);
                return Some(PackageCacheRecord::new(
                    package_record,
                    tarball.clone().unwrap_or_else(|| dir.clone()),
                    dir.clone(),
                ));
            }
        }

        if let Some(tarball) = &tarball {
            let scratch = tempfile::tempdir().ok()?;
            if crate::extract::extract(tarball, scratch.path()).is_ok() {
                if let Ok(index) = IndexJson::from_package_directory(scratch.path()) {
                    let mut package_record = index_to_package_record(index);
                    if let Some(name) = tarball.file_name().and_then(|n| n.to_str()) {
                        if urls.url_for(name).is_some() {
                            package_record.size = fs::metadata(tarball).ok().map(|m| m.len());
                        }
                    }
                    let extracted_guess = extracted_dir.unwrap_or_else(|| {
                        self.path.join(
                            tarball
                                .file_stem()
                                .and_then(|s| s.to_str())
                                .unwrap_or_default(),
                        )
                    });
                    return Some(PackageCacheRecord::new(
                        package_record,
                        tarball.clone(),
                        extracted_guess,
                    ));
                }
            }
        }

        None
    }
}

fn read_repodata_record(dir: &Path) -> Option<PackageRecord> {
    let file = fs::File::open(dir.join("info").join("repodata_record.json")).ok()?;
    let record: rattler_conda_types::RepoDataRecord = serde_json::from_reader(file).ok()?;
    Some(record.package_record)
}

fn index_to_package_record(index: IndexJson) -> PackageRecord {
    PackageRecord {
        arch: index.arch,
        build: index.build,
        build_number: index.build_number,
        constrains: index.constrains,
        depends: index.depends,
        features: index.features,
        legacy_bz2_md5: None,
        legacy_bz2_size: None,
        license: index.license,
        license_family: index.license_family,
        md5: None,
        name: index.name,
        noarch: index.noarch,
        platform: index.platform,
        purls: None,
        python_site_packages_path: index.python_site_packages_path,
        run_exports: None,
        sha256: None,
        size: None,
        subdir: index.subdir.unwrap_or_default(),
        timestamp: index.timestamp,
        track_features: index.track_features,
        version: index.version,
    }
}

/// A search path of [`PkgsDir`]s: reads happen across all of them, writes go
/// to the first writable one.
#[derive(Debug, Clone)]
pub struct PackageCache {
    dirs: Vec<PkgsDir>,
}

impl PackageCache {
    /// Builds a cache from a search path, in priority order.
    pub fn new(dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            dirs: dirs.into_iter().map(PkgsDir::new).collect(),
        }
    }

    /// The configured search path.
    pub fn dirs(&self) -> &[PkgsDir] {
        &self.dirs
    }

    /// The first directory in the search path that is writable, if any.
    pub fn first_writable(&self) -> Option<&PkgsDir> {
        self.dirs.iter().find(|d| d.is_writable())
    }

    /// Records matching `spec` from this cache, across every configured
    /// directory regardless of writability.
    pub fn query(&self, spec: &MatchSpec) -> Vec<PackageCacheRecord> {
        self.dirs
            .iter()
            .flat_map(PkgsDir::load)
            .filter(|record| spec.matches(&record.package_record))
            .collect()
    }

    /// Like [`Self::query`] but flattens writable caches first, then
    /// read-only ones, matching the order `conda` itself prefers when
    /// resolving against the local cache.
    pub fn query_all(&self, spec: &MatchSpec) -> Vec<PackageCacheRecord> {
        let (writable, readonly): (Vec<_>, Vec<_>) =
            self.dirs.iter().partition(|d| d.is_writable());
        writable
            .into_iter()
            .chain(readonly)
            .flat_map(PkgsDir::load)
            .filter(|record| spec.matches(&record.package_record))
            .collect()
    }

    /// Finds an already-extracted, identity-matching cache entry for
    /// `target`, searching writable directories first. Returns `None` if the
    /// fetch/extract pipeline still needs to materialise one.
    pub fn entry_for_link(&self, target: &PackageRecord) -> Option<PackageCacheRecord> {
        let target_key = target.pkey();
        let (writable, readonly): (Vec<_>, Vec<_>) =
            self.dirs.iter().partition::<Vec<_>, _>(|d| d.is_writable());
        writable
            .into_iter()
            .chain(readonly)
            .flat_map(PkgsDir::load)
            .find(|r| r.is_extracted() && r.package_record.pkey() == target_key)
    }
}
