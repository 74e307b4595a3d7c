//! Runs a package's `pre-unlink`/`post-link` shell scripts and captures any
//! `.messages.txt` it leaves behind.
//!
//! `pre-link` scripts are a different matter: they run before any of a
//! package's own files exist in the prefix and historically could rewrite
//! the package cache itself, which conda's own documentation flags as
//! deprecated. This crate rejects packages that ship one (see
//! [`check_no_pre_link_script`]) rather than silently running or silently
//! skipping it.

use std::{
    collections::HashMap,
    fmt, fs,
    path::{Path, PathBuf},
    process::Command,
};

use rattler_conda_types::{PackageName, Platform, PrefixRecord};

use super::action::ActionError;

/// Which link-lifecycle hook a script corresponds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkScriptType {
    /// Runs before a package's files are removed from the prefix.
    PreUnlink,
    /// Runs after a package's files have been removed from the prefix.
    PostUnlink,
    /// Runs after a package's files have been linked into the prefix.
    PostLink,
}

impl fmt::Display for LinkScriptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkScriptType::PreUnlink => write!(f, "pre-unlink"),
            LinkScriptType::PostUnlink => write!(f, "post-unlink"),
            LinkScriptType::PostLink => write!(f, "post-link"),
        }
    }
}

impl LinkScriptType {
    fn relative_path(self, name: &PackageName, platform: Platform) -> PathBuf {
        let name = name.as_normalized();
        if platform.is_windows() {
            PathBuf::from("Scripts").join(format!(".{name}-{self}.bat"))
        } else {
            PathBuf::from("bin").join(format!(".{name}-{self}.sh"))
        }
    }

    /// Whether a non-zero exit from this hook should fail the transaction.
    /// `pre-unlink` failures are logged but the package is unlinked anyway
    /// (the file is already gone, there's nothing left to roll back to).
    pub fn is_fatal(self) -> bool {
        matches!(self, LinkScriptType::PostLink)
    }
}

/// The path, relative to a package's own extracted directory, a pre-link
/// script would live at.
fn pre_link_relative_path(name: &PackageName, platform: Platform) -> PathBuf {
    let name = name.as_normalized();
    if platform.is_windows() {
        PathBuf::from("Scripts").join(format!(".{name}-pre-link.bat"))
    } else {
        PathBuf::from("bin").join(format!(".{name}-pre-link.sh"))
    }
}

/// Rejects a package that ships a `pre-link` script. Called during
/// transaction preparation, before any action derived from `extracted_dir`
/// is scheduled.
pub fn check_no_pre_link_script(
    extracted_dir: &Path,
    name: &PackageName,
    platform: Platform,
) -> Result<(), ActionError> {
    let path = extracted_dir.join(pre_link_relative_path(name, platform));
    if path.exists() {
        return Err(ActionError::PreLinkScriptPresent(path));
    }
    Ok(())
}

/// Messages captured from `.messages.txt` and the set of packages whose
/// script exited non-zero, keyed by the record that ran it.
#[derive(Debug, Clone, Default)]
pub struct LinkScriptOutcome {
    /// Contents of `.messages.txt`, keyed by package, for scripts that left
    /// one behind.
    pub messages: HashMap<PackageName, String>,
    /// Packages whose script exited with a non-zero status.
    pub failed_packages: Vec<PackageName>,
}

fn interpreter_command(script: &Path, platform: Platform) -> Command {
    if platform.is_windows() {
        let mut cmd = Command::new("cmd.exe");
        cmd.arg("/d").arg("/c").arg(script);
        cmd
    } else {
        let mut cmd = Command::new("bash");
        cmd.arg(script);
        cmd
    }
}

/// Runs `script_type`'s hook for every record in `prefix_records` that has
/// one, in iteration order (callers pass records in dependency order so a
/// package's scripts see its dependencies already linked).
pub fn run_link_scripts<'a>(
    script_type: LinkScriptType,
    prefix_records: impl Iterator<Item = &'a PrefixRecord>,
    target_prefix: &Path,
    root_prefix: &Path,
) -> Result<LinkScriptOutcome, ActionError> {
    let mut outcome = LinkScriptOutcome::default();

    for record in prefix_records {
        let prec = &record.repodata_record.package_record;
        let platform = Platform::current();
        let script_path = target_prefix.join(script_type.relative_path(&prec.name, platform));
        if !script_path.is_file() {
            continue;
        }

        let mut command = interpreter_command(&script_path, platform);
        command
            .env("PREFIX", target_prefix)
            .env("ROOT_PREFIX", root_prefix)
            .env("PKG_NAME", prec.name.as_normalized())
            .env("PKG_VERSION", prec.version.as_str())
            .env("PKG_BUILDNUM", prec.build_number.to_string());
        if let Some(parent) = script_path.parent() {
            let path_var = std::env::var_os("PATH").unwrap_or_default();
            let joined = std::env::join_paths(
                std::iter::once(parent.to_path_buf()).chain(std::env::split_paths(&path_var)),
            )
            .unwrap_or(path_var);
            command.env("PATH", joined);
        }

        tracing::info!(package = %prec.name.as_normalized(), hook = %script_type, "running link script");

        let status = command.status();
        match status {
            Ok(status) if status.success() => {}
            Ok(status) => {
                outcome.failed_packages.push(prec.name.clone());
                tracing::warn!(package = %prec.name.as_normalized(), ?status, "link script exited non-zero");
                if script_type.is_fatal() {
                    return Err(ActionError::ProcessFailed {
                        program: script_path.display().to_string(),
                        exit_code: status.code(),
                    });
                }
            }
            Err(source) => {
                outcome.failed_packages.push(prec.name.clone());
                if script_type.is_fatal() {
                    return Err(ActionError::Io {
                        path: script_path,
                        source,
                    });
                }
            }
        }

        let message_file = target_prefix.join(".messages.txt");
        if message_file.is_file() {
            if let Ok(message) = fs::read_to_string(&message_file) {
                outcome.messages.insert(prec.name.clone(), message);
            }
            let _ = fs::remove_file(&message_file);
        }
    }

    Ok(outcome)
}
