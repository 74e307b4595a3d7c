//! Validates that a directory actually contains what an extracted Conda
//! package is expected to contain, by cross-checking against `info/paths.json`
//! (falling back to the deprecated `info/files`/`info/has_prefix` scheme for
//! very old packages).

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use digest::Digest;
use rattler_conda_types::package::{IndexJson, PackageFile, PathType, PathsEntry, PathsJson};
use rattler_digest::Sha256;

/// An error returned by [`validate_package_directory`] when the contents of a
/// directory do not match what the package archive promised.
#[derive(Debug, thiserror::Error)]
pub enum PackageValidationError {
    /// Neither a `paths.json` nor a deprecated `files` file was found.
    #[error("neither a 'paths.json' or a deprecated 'files' file was found")]
    MetadataMissing,

    /// An error occurred while reading the `paths.json` file.
    #[error("failed to read 'paths.json' file")]
    ReadPathsJsonError(#[source] std::io::Error),

    /// An error occurred while reading deprecated path metadata.
    #[error("failed to read validation data from deprecated files")]
    ReadDeprecatedPathsJsonError(#[source] std::io::Error),

    /// A specific path in the package seems to be corrupted.
    #[error("the path '{0}' seems to be corrupted")]
    CorruptedEntry(PathBuf, #[source] PackageEntryValidationError),

    /// An error occurred while reading the `index.json` file.
    #[error("failed to read 'index.json'")]
    ReadIndexJsonError(#[source] std::io::Error),
}

/// An error that indicates a specific file in a package directory seems corrupted.
#[derive(Debug, thiserror::Error)]
pub enum PackageEntryValidationError {
    /// Failed to retrieve the file's metadata.
    #[error("failed to retrieve file metadata")]
    GetMetadataFailed(#[source] std::io::Error),

    /// The file does not exist.
    #[error("the file does not exist")]
    NotFound,

    /// The file is not a symbolic link as `paths.json` claims.
    #[error("expected a symbolic link")]
    ExpectedSymlink,

    /// The file is not a directory as `paths.json` claims.
    #[error("expected a directory")]
    ExpectedDirectory,

    /// The size of the file does not match what `paths.json` recorded.
    #[error("incorrect size, expected {0} but file on disk is {1}")]
    IncorrectSize(u64, u64),

    /// An IO error occurred while reading the file.
    #[error("an io error occurred")]
    IoError(#[from] std::io::Error),

    /// The SHA256 hash of the file does not match what `paths.json` recorded.
    #[error("sha256 hash mismatch, expected '{0}' but file on disk is '{1}'")]
    HashMismatch(String, String),
}

/// Validates that `package_dir` contains the files described by its
/// `info/paths.json` (or deprecated equivalent), returning the parsed
/// `index.json` and `paths.json` on success.
pub fn validate_package_directory(
    package_dir: &Path,
) -> Result<(IndexJson, PathsJson), PackageValidationError> {
    let index_json = IndexJson::from_package_directory(package_dir)
        .map_err(PackageValidationError::ReadIndexJsonError)?;

    let paths = match PathsJson::from_package_directory(package_dir) {
        Err(e) if e.kind() == ErrorKind::NotFound => {
            match PathsJson::from_deprecated_package_directory(package_dir) {
                Ok(paths) => paths,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return Err(PackageValidationError::MetadataMissing)
                }
                Err(e) => return Err(PackageValidationError::ReadDeprecatedPathsJsonError(e)),
            }
        }
        Err(e) => return Err(PackageValidationError::ReadPathsJsonError(e)),
        Ok(paths) => paths,
    };

    validate_package_directory_from_paths(package_dir, &paths)
        .map_err(|(path, err)| PackageValidationError::CorruptedEntry(path, err))?;

    Ok((index_json, paths))
}

/// Validates each entry in `paths` against the files actually present under `package_dir`.
pub fn validate_package_directory_from_paths(
    package_dir: &Path,
    paths: &PathsJson,
) -> Result<(), (PathBuf, PackageEntryValidationError)> {
    for entry in &paths.paths {
        validate_package_entry(package_dir, entry).map_err(|e| (entry.relative_path.clone(), e))?;
    }
    Ok(())
}

fn validate_package_entry(
    package_dir: &Path,
    entry: &PathsEntry,
) -> Result<(), PackageEntryValidationError> {
    let path = package_dir.join(&entry.relative_path);
    match entry.path_type {
        PathType::HardLink => validate_hard_link_entry(path, entry),
        PathType::SoftLink => validate_soft_link_entry(&path),
        PathType::Directory => validate_directory_entry(&path),
    }
}

fn validate_hard_link_entry(
    path: PathBuf,
    entry: &PathsEntry,
) -> Result<(), PackageEntryValidationError> {
    if entry.sha256.is_none() && entry.size_in_bytes.is_none() {
        return if path.is_file() {
            Ok(())
        } else {
            Err(PackageEntryValidationError::NotFound)
        };
    }

    let mut file = match std::fs::File::open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(PackageEntryValidationError::NotFound)
        }
        Err(e) => return Err(PackageEntryValidationError::IoError(e)),
    };

    if let Some(size_in_bytes) = entry.size_in_bytes {
        let actual_len = file
            .metadata()
            .map_err(PackageEntryValidationError::IoError)?
            .len();
        if size_in_bytes != actual_len {
            return Err(PackageEntryValidationError::IncorrectSize(
                size_in_bytes,
                actual_len,
            ));
        }
    }

    if let Some(expected_hex) = &entry.sha256 {
        let mut hasher = Sha256::default();
        std::io::copy(&mut file, &mut hasher)?;
        let actual_hex = format!("{:x}", hasher.finalize());
        if expected_hex != &actual_hex {
            return Err(PackageEntryValidationError::HashMismatch(
                expected_hex.clone(),
                actual_hex,
            ));
        }
    }

    Ok(())
}

fn validate_soft_link_entry(path: &Path) -> Result<(), PackageEntryValidationError> {
    if path.is_symlink() {
        Ok(())
    } else {
        Err(PackageEntryValidationError::ExpectedSymlink)
    }
}

fn validate_directory_entry(path: &Path) -> Result<(), PackageEntryValidationError> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(PackageEntryValidationError::ExpectedDirectory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rattler_conda_types::package::FileMode;

    fn entry(relative: &str, path_type: PathType) -> PathsEntry {
        PathsEntry {
            relative_path: PathBuf::from(relative),
            path_type,
            file_mode: FileMode::Binary,
            prefix_placeholder: None,
            no_link: false,
            sha256: None,
            size_in_bytes: None,
        }
    }

    #[test]
    fn missing_hard_link_without_hash_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let e = entry("bin/missing", PathType::HardLink);
        let err = validate_package_entry(dir.path(), &e).unwrap_err();
        assert!(matches!(err, PackageEntryValidationError::NotFound));
    }

    #[test]
    fn hard_link_with_mismatched_size_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a"), b"hello").unwrap();
        let mut e = entry("a", PathType::HardLink);
        e.size_in_bytes = Some(999);
        let err = validate_package_entry(dir.path(), &e).unwrap_err();
        assert!(matches!(
            err,
            PackageEntryValidationError::IncorrectSize(999, 5)
        ));
    }

    #[test]
    fn directory_entry_requires_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("not_a_dir"), b"x").unwrap();
        let e = entry("not_a_dir", PathType::Directory);
        let err = validate_package_entry(dir.path(), &e).unwrap_err();
        assert!(matches!(err, PackageEntryValidationError::ExpectedDirectory));
    }
}
