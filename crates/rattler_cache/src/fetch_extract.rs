//! Progressively fetches and extracts packages into the cache, choosing
//! among four strategies depending on what's already on disk, with bounded
//! concurrency for downloads and extraction and cooperative cancellation.

use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use rattler_conda_types::{package::ArchiveIdentifier, PackageRecord};
use rattler_digest::Sha256Hash;
use tokio::sync::Semaphore;
use url::Url;

use crate::{
    extract::{download_blocking, extract, CacheReporter, ExtractError},
    package_cache::{PkgsDir, UrlsFile},
    validation::validate_package_directory,
};

/// Signals that a running fetch/extract operation should stop as soon as
/// it reaches the next cooperative checkpoint. Cheap to clone and share
/// across tasks.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), ExtractError> {
        if self.is_cancelled() {
            Err(ExtractError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Bounds how many downloads and how many extractions run concurrently.
/// The two pools are independent: a download finishing frees a download
/// slot immediately, regardless of whether its extraction has started.
#[derive(Debug, Clone)]
pub struct FetchExtractPool {
    downloads: Arc<Semaphore>,
    extractions: Arc<Semaphore>,
}

impl FetchExtractPool {
    /// Creates a pool with the given number of concurrent downloads and
    /// extractions.
    pub fn new(max_concurrent_downloads: usize, max_concurrent_extractions: usize) -> Self {
        Self {
            downloads: Arc::new(Semaphore::new(max_concurrent_downloads.max(1))),
            extractions: Arc::new(Semaphore::new(max_concurrent_extractions.max(1))),
        }
    }
}

impl Default for FetchExtractPool {
    fn default() -> Self {
        Self::new(5, num_cpus_fallback())
    }
}

fn num_cpus_fallback() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(4)
}

/// What needs to happen to get `target`'s contents present and valid in
/// `pkgs_dir`.
#[derive(Debug)]
enum Plan {
    /// Already extracted with matching contents; nothing to do.
    AlreadyPresent,
    /// A tarball is already sitting in a writable cache; just extract it.
    ExtractOnly { tarball: PathBuf },
    /// A tarball is in a read-only cache; hardlink (or copy) it into the
    /// writable cache first, then extract.
    CopyThenExtract { source_tarball: PathBuf },
    /// Nothing usable on disk; download then extract.
    DownloadThenExtract,
}

/// A single failed fetch/extract attempt, as part of a [`FetchExtractErrors`]
/// aggregate.
#[derive(Debug, thiserror::Error)]
#[error("failed to fetch/extract {package}: {source}")]
pub struct FetchExtractFailure {
    /// The package that failed.
    pub package: String,
    /// The underlying error.
    #[source]
    pub source: ExtractError,
}

/// Aggregates every failure encountered across a batch of fetch/extract
/// operations, so a caller driving many packages concurrently can report
/// all of them rather than just the first.
#[derive(Debug, thiserror::Error)]
#[error("{} package(s) failed to fetch or extract", .0.len())]
pub struct FetchExtractErrors(pub Vec<FetchExtractFailure>);

/// Fetches (if needed) and extracts `target` into `writable_dir`, consulting
/// `readonly_dirs` for an already-downloaded tarball before reaching for the
/// network. Progress/cancellation is driven by `token`, which is polled
/// between each major step. `reporter`, if given, receives byte-granularity
/// download progress.
#[allow(clippy::too_many_arguments)]
pub async fn fetch_extract(
    pool: &FetchExtractPool,
    client: &reqwest::blocking::Client,
    writable_dir: &PkgsDir,
    readonly_dirs: &[PkgsDir],
    target: &PackageRecord,
    url: &Url,
    token: &CancellationToken,
    reporter: Option<Arc<dyn CacheReporter>>,
) -> Result<PathBuf, ExtractError> {
    token.check()?;

    let identifier = ArchiveIdentifier::try_from_url(url).unwrap_or_else(|| ArchiveIdentifier {
        name: target.name.as_normalized().to_string(),
        version: target.version.to_string(),
        build_string: target.build.clone(),
        archive_type: rattler_conda_types::package::ArchiveType::Conda(
            rattler_conda_types::package::CondaArchiveType::Conda,
        ),
    });
    let file_name = identifier.to_file_name();
    let destination_dir = writable_dir.extracted_path(&identifier);
    let destination_tarball = writable_dir.tarball_path(&file_name);

    let plan = plan_for(
        &destination_dir,
        &destination_tarball,
        readonly_dirs,
        &file_name,
    );

    token.check()?;

    match plan {
        Plan::AlreadyPresent => Ok(destination_dir),
        Plan::ExtractOnly { tarball } => {
            extract_with_permit(pool, token, &tarball, &destination_dir).await?;
            Ok(destination_dir)
        }
        Plan::CopyThenExtract { source_tarball } => {
            copy_into_writable(&source_tarball, &destination_tarball)?;
            UrlsFile::record(writable_dir.path(), url)?;
            extract_with_permit(pool, token, &destination_tarball, &destination_dir).await?;
            Ok(destination_dir)
        }
        Plan::DownloadThenExtract => {
            download_with_permit(
                pool,
                token,
                client,
                url,
                &destination_tarball,
                &destination_dir,
                target.sha256,
                reporter,
            )
            .await?;
            UrlsFile::record(writable_dir.path(), url)?;
            Ok(destination_dir)
        }
    }
}

/// Decides which of the four cases in `§4.6` applies to `destination_dir` /
/// `destination_tarball`: already extracted with valid contents, a writable
/// tarball waiting to be extracted, a read-only tarball that must be copied
/// in first, or nothing at all.
fn plan_for(
    destination_dir: &Path,
    destination_tarball: &Path,
    readonly_dirs: &[PkgsDir],
    file_name: &str,
) -> Plan {
    if destination_dir.join("info").join("index.json").is_file()
        && validate_package_directory(destination_dir).is_ok()
    {
        return Plan::AlreadyPresent;
    }
    if destination_tarball.is_file() {
        return Plan::ExtractOnly {
            tarball: destination_tarball.to_path_buf(),
        };
    }
    for dir in readonly_dirs {
        let candidate = dir.tarball_path(file_name);
        if candidate.is_file() {
            return Plan::CopyThenExtract {
                source_tarball: candidate,
            };
        }
    }
    Plan::DownloadThenExtract
}

fn copy_into_writable(source: &Path, destination: &Path) -> Result<(), ExtractError> {
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent).map_err(ExtractError::CouldNotCreateDestination)?;
    }
    match std::fs::hard_link(source, destination) {
        Ok(()) => Ok(()),
        Err(_) => {
            std::fs::copy(source, destination)?;
            Ok(())
        }
    }
}

async fn extract_with_permit(
    pool: &FetchExtractPool,
    token: &CancellationToken,
    tarball: &Path,
    destination: &Path,
) -> Result<(), ExtractError> {
    let _permit = pool
        .extractions
        .acquire()
        .await
        .map_err(|_| ExtractError::Cancelled)?;
    token.check()?;

    let tarball = tarball.to_path_buf();
    let destination = destination.to_path_buf();
    let result = tokio::task::spawn_blocking(move || extract(&tarball, &destination))
        .await
        .map_err(|_| ExtractError::Cancelled)?;

    if result.is_err() {
        let _ = std::fs::remove_dir_all(&destination);
    }
    result
}

/// Downloads `url` under a download-pool permit, then extracts under a
/// separate extraction-pool permit. The two permits are never held at the
/// same time: a download releases its permit as soon as the bytes are on
/// disk, so a saturated extraction pool cannot throttle new downloads below
/// their own concurrency cap (the two pools must stay independently sized).
#[allow(clippy::too_many_arguments)]
async fn download_with_permit(
    pool: &FetchExtractPool,
    token: &CancellationToken,
    client: &reqwest::blocking::Client,
    url: &Url,
    destination_tarball: &Path,
    destination_dir: &Path,
    expected_sha256: Option<Sha256Hash>,
    reporter: Option<Arc<dyn CacheReporter>>,
) -> Result<(), ExtractError> {
    let download_index = reporter.as_ref().map(|r| r.on_download_start());

    let download_result = {
        let _download_permit = pool
            .downloads
            .acquire()
            .await
            .map_err(|_| ExtractError::Cancelled)?;
        token.check()?;

        let client = client.clone();
        let url = url.clone();
        let destination_tarball_owned = destination_tarball.to_path_buf();
        let progress_reporter = reporter.clone().zip(download_index);
        tokio::task::spawn_blocking(move || {
            download_blocking(
                &client,
                &url,
                &destination_tarball_owned,
                expected_sha256,
                progress_reporter,
            )
        })
        .await
        .map_err(|_| ExtractError::Cancelled)?
        // `_download_permit` is dropped here, before any extraction permit
        // is requested.
    };

    if let (Some(reporter), Some(index)) = (reporter, download_index) {
        reporter.on_download_completed(index);
    }

    if let Err(e) = download_result {
        let _ = std::fs::remove_file(destination_tarball);
        return Err(e);
    }

    if let Err(e) = extract_with_permit(pool, token, destination_tarball, destination_dir).await {
        let _ = std::fs::remove_file(destination_tarball);
        return Err(e);
    }

    Ok(())
}

/// Runs [`fetch_extract`] for every `(target, url)` pair, bounded by `pool`,
/// and collects every failure instead of bailing out on the first one.
#[allow(clippy::too_many_arguments)]
pub async fn fetch_extract_all(
    pool: &FetchExtractPool,
    client: &reqwest::blocking::Client,
    writable_dir: &PkgsDir,
    readonly_dirs: &[PkgsDir],
    targets: &[(PackageRecord, Url)],
    token: &CancellationToken,
    reporter: Option<Arc<dyn CacheReporter>>,
) -> Result<Vec<PathBuf>, FetchExtractErrors> {
    let mut tasks = Vec::with_capacity(targets.len());
    for (target, url) in targets {
        tasks.push(fetch_extract(
            pool,
            client,
            writable_dir,
            readonly_dirs,
            target,
            url,
            token,
            reporter.clone(),
        ));
    }

    let results = futures::future::join_all(tasks).await;

    let mut paths = Vec::with_capacity(results.len());
    let mut failures = Vec::new();
    for (result, (target, _)) in results.into_iter().zip(targets) {
        match result {
            Ok(path) => paths.push(path),
            Err(source) => failures.push(FetchExtractFailure {
                package: target.to_string(),
                source,
            }),
        }
    }

    if failures.is_empty() {
        Ok(paths)
    } else {
        token.cancel();
        Err(FetchExtractErrors(failures))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_token_reports_cancelled() {
        let token = CancellationToken::default();
        assert!(token.check().is_ok());
        token.cancel();
        assert!(matches!(token.check(), Err(ExtractError::Cancelled)));
    }

    #[test]
    fn plan_prefers_extracted_then_tarball_then_readonly_then_download() {
        let dir = tempfile::tempdir().unwrap();
        let destination_dir = dir.path().join("extracted");
        let destination_tarball = dir.path().join("numpy-1.24.3-py311h_0.conda");

        assert!(matches!(
            plan_for(&destination_dir, &destination_tarball, &[], "numpy-1.24.3-py311h_0.conda"),
            Plan::DownloadThenExtract
        ));

        std::fs::write(&destination_tarball, b"fake").unwrap();
        assert!(matches!(
            plan_for(&destination_dir, &destination_tarball, &[], "numpy-1.24.3-py311h_0.conda"),
            Plan::ExtractOnly { .. }
        ));

        std::fs::create_dir_all(destination_dir.join("info")).unwrap();
        std::fs::write(
            destination_dir.join("info").join("index.json"),
            r#"{"name":"numpy","version":"1.24.3","build":"py311h_0","build_number":0,"subdir":"linux-64"}"#,
        )
        .unwrap();
        std::fs::write(
            destination_dir.join("info").join("paths.json"),
            r#"{"paths_version":1,"paths":[]}"#,
        )
        .unwrap();
        assert!(matches!(
            plan_for(&destination_dir, &destination_tarball, &[], "numpy-1.24.3-py311h_0.conda"),
            Plan::AlreadyPresent
        ));
    }
}
