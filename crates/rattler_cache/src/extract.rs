//! Progressive fetch/extract of Conda package archives (`.conda` and `.tar.bz2`)
//! into a destination directory, with optional sha256 verification of the
//! downloaded bytes against the package record.

use std::{
    fs::File,
    io::{Read, Write},
    path::Path,
    sync::Arc,
};

use rattler_conda_types::package::{ArchiveType, CondaArchiveType};
use rattler_digest::{HashingReader, Sha256, Sha256Hash};

/// Reports progress while a package archive is downloaded, byte by byte.
/// Implementations must be cheap to call frequently: one call per
/// `std::io::copy` buffer flush, not per network packet.
pub trait CacheReporter: Send + Sync {
    /// Called once a download starts, returning an index the caller should
    /// pass back on every subsequent call for the same download.
    fn on_download_start(&self) -> usize;
    /// Called with the running byte total downloaded so far. `total_bytes`
    /// is `None` when the server didn't send a `Content-Length`.
    fn on_download_progress(&self, index: usize, bytes_downloaded: u64, total_bytes: Option<u64>);
    /// Called once a download has finished, successfully or not.
    fn on_download_completed(&self, index: usize);
}

struct ProgressWriter<W> {
    inner: W,
    reporter: Arc<dyn CacheReporter>,
    index: usize,
    total_bytes: Option<u64>,
    downloaded: u64,
}

impl<W: Write> Write for ProgressWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.downloaded += n as u64;
        self.reporter
            .on_download_progress(self.index, self.downloaded, self.total_bytes);
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Errors that can occur while extracting or downloading a package archive.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ExtractError {
    /// An io error occurred.
    #[error("an io error occurred")]
    IoError(#[from] std::io::Error),

    /// Could not create the destination directory.
    #[error("could not create the destination path")]
    CouldNotCreateDestination(#[source] std::io::Error),

    /// The `.conda` zip container was invalid.
    #[error("invalid zip archive")]
    ZipError(#[from] zip::result::ZipError),

    /// The archive's extension was not `.conda` or `.tar.bz2`.
    #[error("unsupported package archive format")]
    UnsupportedArchiveType,

    /// The downloaded bytes did not match the expected sha256 hash.
    #[error("sha256 mismatch: expected {expected:x}, got {actual:x}")]
    Sha256Mismatch {
        /// The hash the caller expected.
        expected: Box<Sha256Hash>,
        /// The hash actually computed over the downloaded bytes.
        actual: Box<Sha256Hash>,
    },

    /// A network error occurred fetching the archive.
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    /// The operation was cancelled.
    #[error("the operation was cancelled")]
    Cancelled,
}

/// Extracts the contents of a `.tar.bz2` package archive read from `reader`.
pub fn extract_tar_bz2(reader: impl Read, destination: &Path) -> Result<(), ExtractError> {
    std::fs::create_dir_all(destination).map_err(ExtractError::CouldNotCreateDestination)?;
    tar::Archive::new(bzip2::read::BzDecoder::new(reader)).unpack(destination)?;
    Ok(())
}

/// Extracts the contents of a `.conda` package archive read from `reader`.
///
/// A `.conda` file is a zip container holding (among other things) a single
/// `pkg-*.tar.zst` member; that member is what actually holds the package
/// payload and is unpacked into `destination`.
pub fn extract_conda(reader: impl Read + std::io::Seek, destination: &Path) -> Result<(), ExtractError> {
    std::fs::create_dir_all(destination).map_err(ExtractError::CouldNotCreateDestination)?;
    let mut zip = zip::ZipArchive::new(reader)?;
    for i in 0..zip.len() {
        let file = zip.by_index(i)?;
        let is_payload = file
            .mangled_name()
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(".tar.zst"));
        if is_payload {
            let decoder = zstd::stream::read::Decoder::new(file)?;
            tar::Archive::new(decoder).unpack(destination)?;
        }
    }
    Ok(())
}

/// Extracts the package archive at `archive` (type determined by file
/// extension) into `destination`.
pub fn extract(archive: &Path, destination: &Path) -> Result<(), ExtractError> {
    match ArchiveType::try_from(archive).ok_or(ExtractError::UnsupportedArchiveType)? {
        ArchiveType::Conda(CondaArchiveType::TarBz2) => {
            extract_tar_bz2(File::open(archive)?, destination)
        }
        ArchiveType::Conda(CondaArchiveType::Conda) => {
            extract_conda(File::open(archive)?, destination)
        }
        ArchiveType::Dist(_) => Err(ExtractError::UnsupportedArchiveType),
    }
}

/// Downloads `url` to `destination_archive`, optionally verifying its sha256
/// hash. Runs entirely synchronously; callers on an async runtime should
/// wrap this in `tokio::task::spawn_blocking`, as `fetch_extract` does.
///
/// Deliberately stops short of extracting: `fetch_extract` holds a download
/// permit for only as long as this call runs, then releases it and acquires
/// a separate extraction permit before calling [`extract`], so a saturated
/// extraction pool never back-pressures new downloads.
///
/// `reporter`, if given, receives byte-granularity download progress through
/// [`CacheReporter::on_download_progress`] between the start and completion
/// calls it's responsible for making itself (`fetch_extract` owns those, so
/// that an index is assigned once per logical download regardless of how
/// many times this function is called).
pub fn download_blocking(
    client: &reqwest::blocking::Client,
    url: &url::Url,
    destination_archive: &Path,
    expected_sha256: Option<Sha256Hash>,
    reporter: Option<(Arc<dyn CacheReporter>, usize)>,
) -> Result<(), ExtractError> {
    let response = client.get(url.clone()).send()?.error_for_status()?;
    let total_bytes = response.content_length();
    if let Some(parent) = destination_archive.parent() {
        std::fs::create_dir_all(parent).map_err(ExtractError::CouldNotCreateDestination)?;
    }
    let file = File::create(destination_archive)?;
    let hashing_writer = rattler_digest::HashingWriter::<_, Sha256>::new(file);
    let mut source = response;

    let (_file, actual_hash) = match reporter {
        Some((reporter, index)) => {
            let mut progress_writer = ProgressWriter {
                inner: hashing_writer,
                reporter,
                index,
                total_bytes,
                downloaded: 0,
            };
            std::io::copy(&mut source, &mut progress_writer)?;
            progress_writer.inner.finalize()
        }
        None => {
            let mut hashing_writer = hashing_writer;
            std::io::copy(&mut source, &mut hashing_writer)?;
            hashing_writer.finalize()
        }
    };

    if let Some(expected) = expected_sha256 {
        if expected != actual_hash {
            return Err(ExtractError::Sha256Mismatch {
                expected: Box::new(expected),
                actual: Box::new(actual_hash),
            });
        }
    }

    Ok(())
}

/// Computes the sha256 hash of a file already on disk, without extracting it.
pub fn file_sha256(path: &Path) -> Result<Sha256Hash, std::io::Error> {
    let file = File::open(path)?;
    let mut reader = HashingReader::<_, Sha256>::new(file);
    std::io::copy(&mut reader, &mut std::io::sink())?;
    let (_, hash) = reader.finalize();
    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn extract_tar_bz2_round_trip() {
        let src_dir = tempfile::tempdir().unwrap();
        std::fs::write(src_dir.path().join("info.txt"), b"hello").unwrap();

        let archive_path = tempfile::NamedTempFile::new().unwrap();
        {
            let encoder = bzip2::write::BzEncoder::new(
                File::create(archive_path.path()).unwrap(),
                bzip2::Compression::fast(),
            );
            let mut builder = tar::Builder::new(encoder);
            builder
                .append_dir_all(".", src_dir.path())
                .unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }

        let dest = tempfile::tempdir().unwrap();
        extract_tar_bz2(File::open(archive_path.path()).unwrap(), dest.path()).unwrap();
        assert_eq!(
            std::fs::read(dest.path().join("info.txt")).unwrap(),
            b"hello"
        );
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let dest = tempfile::tempdir().unwrap();
        let mut bogus = tempfile::NamedTempFile::with_suffix(".zip").unwrap();
        bogus.write_all(b"not a conda archive").unwrap();
        let err = extract(bogus.path(), dest.path()).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedArchiveType));
    }
}
