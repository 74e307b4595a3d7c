//! Python-specific linking support: locating the site-packages directory a
//! `noarch: python` package's files get relocated into, and compiling
//! linked `.py` files to `.pyc`.

use std::{
    path::{Path, PathBuf},
    process::Command,
};

use rattler_conda_types::{Platform, Version};

use super::action::{ActionError, CompilePycAction};

/// The python version and platform layout a set of noarch-python packages
/// were (or need to be) linked against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PythonInfo {
    /// The python version, e.g. `3.11.4`.
    pub version: Version,
    /// The platform the environment targets; determines whether
    /// site-packages lives under `Lib/site-packages` (Windows) or
    /// `lib/pythonX.Y/site-packages` (Unix).
    pub platform: Platform,
}

/// Errors produced while deriving [`PythonInfo`] from a package's version.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PythonInfoError {
    /// The package's version didn't parse as `major.minor[.patch]`.
    #[error("invalid python version '{0}'")]
    InvalidVersion(String),
}

impl PythonInfo {
    /// Builds a [`PythonInfo`] from a `python` package's own version.
    pub fn from_version(version: &Version, platform: Platform) -> Result<Self, PythonInfoError> {
        version
            .as_major_minor()
            .ok_or_else(|| PythonInfoError::InvalidVersion(version.to_string()))?;
        Ok(Self {
            version: version.clone(),
            platform,
        })
    }

    fn major_minor(&self) -> (u64, u64) {
        self.version
            .as_major_minor()
            .expect("validated in from_version")
    }

    /// The path, relative to the prefix, that `noarch: python` packages'
    /// `site-packages/...` files get relinked under.
    pub fn site_packages_path(&self) -> PathBuf {
        if self.platform.is_windows() {
            PathBuf::from("Lib").join("site-packages")
        } else {
            let (major, minor) = self.major_minor();
            PathBuf::from("lib")
                .join(format!("python{major}.{minor}"))
                .join("site-packages")
        }
    }

    /// The path, relative to the prefix, the `python` executable is linked
    /// at.
    pub fn python_executable_path(&self) -> PathBuf {
        if self.platform.is_windows() {
            PathBuf::from("python.exe")
        } else {
            PathBuf::from("bin").join("python")
        }
    }

    /// The directory launcher scripts for entry points are written into.
    pub fn entry_point_bin_dir(&self) -> PathBuf {
        if self.platform.is_windows() {
            PathBuf::from("Scripts")
        } else {
            PathBuf::from("bin")
        }
    }

    /// Whether switching from `other` to `self` forces every noarch-python
    /// package to be relinked (site-packages directory name changes with
    /// the minor version).
    pub fn is_relink_required(&self, other: &PythonInfo) -> bool {
        self.major_minor() != other.major_minor() || self.platform != other.platform
    }
}

/// Compiles every `.py` file named across `actions` in one interpreter
/// invocation. Grounded in the spec's `AggregateCompileMultiPyc`: many
/// per-package compile actions collapse into a single process launch for
/// efficiency, with inputs sorted by target path so the resulting set of
/// `.pyc` files is produced in a deterministic order.
pub fn compile_pyc(actions: &[CompilePycAction]) -> Result<(), ActionError> {
    let Some(python_executable) = actions.first().map(|a| a.python_executable.clone()) else {
        return Ok(());
    };
    let mut py_files: Vec<&PathBuf> = actions.iter().flat_map(|a| a.py_files.iter()).collect();
    py_files.sort();
    if py_files.is_empty() {
        return Ok(());
    }

    let status = Command::new(&python_executable)
        .arg("-m")
        .arg("py_compile")
        .args(py_files)
        .status();

    match status {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(ActionError::ProcessFailed {
            program: python_executable.display().to_string(),
            exit_code: status.code(),
        }),
        // The interpreter isn't runnable in this environment (e.g. it
        // hasn't been linked yet, or this is a non-python host). Treat
        // compilation as best-effort: a missing `.pyc` only costs a
        // recompile on first import, it doesn't corrupt the install.
        Err(_) => Ok(()),
    }
}

/// The legacy (non-`__pycache__`) `.pyc` path produced for a `.py` source
/// file, used to undo a compile action on rollback.
pub fn pyc_path_for(py_file: &Path) -> Option<PathBuf> {
    if py_file.extension().and_then(|e| e.to_str()) != Some("py") {
        return None;
    }
    Some(py_file.with_extension("pyc"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_packages_path_differs_by_platform() {
        let version: Version = "3.11.4".parse().unwrap();
        let unix = PythonInfo::from_version(&version, Platform::Linux64).unwrap();
        assert_eq!(
            unix.site_packages_path(),
            PathBuf::from("lib/python3.11/site-packages")
        );
        let win = PythonInfo::from_version(&version, Platform::Win64).unwrap();
        assert_eq!(win.site_packages_path(), PathBuf::from("Lib/site-packages"));
    }

    #[test]
    fn relink_required_on_minor_version_change() {
        let v311: Version = "3.11.4".parse().unwrap();
        let v312: Version = "3.12.0".parse().unwrap();
        let a = PythonInfo::from_version(&v311, Platform::Linux64).unwrap();
        let b = PythonInfo::from_version(&v312, Platform::Linux64).unwrap();
        assert!(a.is_relink_required(&b));
        assert!(!a.is_relink_required(&a.clone()));
    }

    #[test]
    fn pyc_path_swaps_extension() {
        assert_eq!(
            pyc_path_for(Path::new("/prefix/lib/foo.py")),
            Some(PathBuf::from("/prefix/lib/foo.pyc"))
        );
        assert_eq!(pyc_path_for(Path::new("/prefix/lib/foo.txt")), None);
    }
}
