//! The path-action model: every mutation a transaction can make to a prefix
//! is one variant of [`Action`]. Each variant implements the same four
//! operations — `verify`, `execute`, `reverse`, `cleanup` — so the engine in
//! [`crate::install::transaction`] can drive a heterogeneous list of actions
//! uniformly, matching on the variant only for the handful of cases that
//! need it (pyc aggregation, directory skip on reverse).
//!
//! `execute` and `reverse` are written to be idempotent: calling either
//! twice with the same action and the same on-disk state is a no-op the
//! second time. Callers must not call `execute` before `verify` succeeded.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use rattler_conda_types::{
    package::EntryPoint, prefix_record::LinkType, PackageName, PrefixData, PrefixRecord,
};

/// Shared state every [`Action`] needs to resolve relative paths and, for
/// the handful of variants that mutate it, the in-memory view of
/// `conda-meta`.
pub struct ActionContext {
    /// The environment directory being mutated.
    pub target_prefix: PathBuf,
    /// The shared, process-wide view of this prefix's `conda-meta`
    /// directory. Mutated only by [`Action::CreatePrefixRecord`] and
    /// [`Action::RemoveLinkedPackageRecord`], and only from inside a
    /// transaction's execute phase (spec §5 shared-resource policy).
    pub prefix_data: Arc<Mutex<PrefixData>>,
}

impl ActionContext {
    /// Resolves a path relative to the target prefix to an absolute path.
    pub fn resolve(&self, relative: &Path) -> PathBuf {
        self.target_prefix.join(relative)
    }
}

/// Errors a path action can raise from `verify`, `execute`, or `reverse`.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ActionError {
    /// A filesystem operation failed.
    #[error("io error at {path}: {source}")]
    Io {
        /// The path the operation was performed on.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// The source file for a link action does not exist.
    #[error("source file does not exist: {0}")]
    SourceMissing(PathBuf),

    /// The destination's parent directory is not writable.
    #[error("destination is not writable: {0}")]
    DestinationNotWritable(PathBuf),

    /// A checksum recorded in the package manifest did not match the file
    /// actually present on disk.
    #[error("checksum mismatch for {0}")]
    ChecksumMismatch(PathBuf),

    /// The recorded size did not match the file actually present on disk.
    #[error("size mismatch for {0}")]
    SizeMismatch(PathBuf),

    /// The prefix placeholder baked into a relocatable file is shorter than
    /// the actual target prefix path, so in-place rewriting isn't possible.
    #[error("prefix placeholder is too short for {0}")]
    PaddingError(PathBuf),

    /// An external process (a link script, the python interpreter used to
    /// compile `.pyc` files) exited with a non-zero status.
    #[error("process {program} exited with {exit_code:?}")]
    ProcessFailed {
        /// The program that was run.
        program: String,
        /// Its exit code, if the OS reported one.
        exit_code: Option<i32>,
    },

    /// Failed to read or write a `conda-meta` record.
    #[error(transparent)]
    PrefixData(#[from] rattler_conda_types::prefix_data::PrefixDataError),

    /// A package ships a deprecated `pre-link` script. This crate refuses
    /// such packages outright (spec's open question on `pre-link`
    /// semantics: reject rather than silently run or silently skip).
    #[error("package ships a pre-link script at {0}, which this installer refuses to run")]
    PreLinkScriptPresent(PathBuf),
}

impl ActionError {
    fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ActionError::Io {
            path: path.into(),
            source,
        }
    }
}

/// How a file should be placed into the prefix.
pub use LinkType as LinkKind;

/// A single planned file placement (case 1 of the common path): the file is
/// placed byte-for-byte, with no prefix-placeholder rewriting.
#[derive(Debug, Clone)]
pub struct LinkPathAction {
    /// How to place the file (hardlink / softlink / copy / directory).
    pub kind: LinkKind,
    /// The file's location in the package cache's extracted directory.
    pub source: PathBuf,
    /// The destination, relative to the target prefix.
    pub relative_path: PathBuf,
    /// Expected sha256 of the source file, when known.
    pub sha256: Option<rattler_digest::Sha256Hash>,
    /// Expected size in bytes of the source file, when known.
    pub size_in_bytes: Option<u64>,
}

/// A file placement that additionally rewrites a baked-in prefix
/// placeholder to the real target prefix.
#[derive(Debug, Clone)]
pub struct PrefixReplaceLinkAction {
    /// The file's location in the package cache's extracted directory.
    pub source: PathBuf,
    /// The destination, relative to the target prefix.
    pub relative_path: PathBuf,
    /// Whether the placeholder bytes are surrounded by text or binary
    /// content; binary mode null-pads instead of reflowing text.
    pub text_mode: bool,
    /// The placeholder string baked into the cached file.
    pub placeholder: String,
    /// Expected size in bytes of the source file, when known.
    pub size_in_bytes: Option<u64>,
}

/// Registers (or unregisters) one desktop/start-menu shortcut described by
/// an `info/menu/*.json` file in the package's extracted directory.
#[derive(Debug, Clone)]
pub struct MenuAction {
    /// The package's extracted directory (holding `info/menu/*.json`).
    pub package_dir: PathBuf,
    /// The owning package, used to name the on-disk shortcut descriptor.
    pub package_name: PackageName,
}

/// Compiles one or more `.py` files to `.pyc` using the prefix's python.
#[derive(Debug, Clone)]
pub struct CompilePycAction {
    /// Absolute path to the python interpreter inside the prefix.
    pub python_executable: PathBuf,
    /// Absolute paths of the `.py` files to compile.
    pub py_files: Vec<PathBuf>,
}

/// Writes a launcher script (and, on Windows, a launcher executable) for a
/// `noarch: python` entry point.
#[derive(Debug, Clone)]
pub struct EntryPointAction {
    /// The command to generate a launcher for.
    pub entry_point: EntryPoint,
    /// Absolute path to the python interpreter the launcher should invoke.
    pub python_executable: PathBuf,
    /// Directory (relative to the prefix) launcher scripts are written
    /// into, typically `bin` or `Scripts`.
    pub bin_dir: PathBuf,
}

/// Writes `conda-meta/<name-ver-bld>.json` for a newly linked package and
/// registers it in the shared [`PrefixData`] view.
#[derive(Debug, Clone)]
pub struct CreatePrefixRecordAction {
    /// The fully populated record to persist.
    pub record: PrefixRecord,
}

/// Appends one revision to `conda-meta/history`.
#[derive(Debug, Clone)]
pub struct UpdateHistoryAction {
    /// The revision's header timestamp, `YYYY-MM-DD HH:MM:SS`.
    pub timestamp: String,
    /// The command line (or equivalent) that triggered this transaction.
    pub cmd: Option<String>,
    /// Distribution strings of packages linked in this revision.
    pub added: std::collections::BTreeSet<String>,
    /// Distribution strings of packages unlinked in this revision.
    pub removed: std::collections::BTreeSet<String>,
    /// Specs the user asked to be updated/installed in this revision.
    pub update_specs: Vec<String>,
    /// Specs the user asked to be removed in this revision.
    pub remove_specs: Vec<String>,
    /// Specs whose constraints were relaxed ("neutered") by the solver to
    /// make this revision satisfiable.
    pub neutered_specs: Vec<String>,
}

/// Moves a linked file aside so it can be restored if the transaction rolls
/// back, or permanently discarded on `cleanup`.
#[derive(Debug, Clone)]
pub struct UnlinkAction {
    /// The path to remove, relative to the prefix.
    pub relative_path: PathBuf,
}

/// Like [`UnlinkAction`], but for a `conda-meta/<name-ver-bld>.json` record:
/// also drops the package from the shared [`PrefixData`] view.
#[derive(Debug, Clone)]
pub struct RemoveLinkedPackageRecordAction {
    /// The package being removed.
    pub package_name: PackageName,
}

/// Adds or removes one line from `~/.conda/environments.txt`.
#[derive(Debug, Clone)]
pub struct EnvironmentsTxtAction {
    /// Path to the `environments.txt` file.
    pub environments_txt: PathBuf,
    /// The prefix path to add/remove.
    pub prefix: PathBuf,
}

const UNLINK_HOLD_SUFFIX: &str = ".c~";

/// One atomic filesystem mutation a transaction can schedule. See the
/// module docs for the verify/execute/reverse/cleanup contract every
/// variant upholds.
#[derive(Debug, Clone)]
pub enum Action {
    /// Place a file (or directory) from the package cache into the prefix.
    LinkPath(LinkPathAction),
    /// Like [`Action::LinkPath`], but rewrites a baked-in prefix
    /// placeholder.
    PrefixReplaceLink(PrefixReplaceLinkAction),
    /// Register a desktop/start-menu shortcut.
    MakeMenu(MenuAction),
    /// Unregister a desktop/start-menu shortcut.
    RemoveMenu(MenuAction),
    /// Compile `.py` files to `.pyc` for one package.
    CompileMultiPyc(CompilePycAction),
    /// The union of many [`Action::CompileMultiPyc`] actions, compiled in
    /// one process invocation. Inputs are sorted by target path so the
    /// produced set is deterministic regardless of scheduling order.
    AggregateCompileMultiPyc(Vec<CompilePycAction>),
    /// Write a launcher for a python entry point.
    CreatePythonEntryPoint(EntryPointAction),
    /// Write the `conda-meta` record for a newly linked package.
    CreatePrefixRecord(Box<CreatePrefixRecordAction>),
    /// Append a revision to `conda-meta/history`.
    UpdateHistory(UpdateHistoryAction),
    /// Move a linked file aside.
    Unlink(UnlinkAction),
    /// Move a `conda-meta` record aside and drop it from `PrefixData`.
    RemoveLinkedPackageRecord(RemoveLinkedPackageRecordAction),
    /// Add a prefix to `~/.conda/environments.txt`.
    RegisterEnvironmentLocation(EnvironmentsTxtAction),
    /// Remove a prefix from `~/.conda/environments.txt`.
    UnregisterEnvironmentLocation(EnvironmentsTxtAction),
}

impl Action {
    /// Checks the preconditions listed in spec §4.7 before any `execute` is
    /// attempted. Does not mutate the filesystem.
    pub fn verify(&self, ctx: &ActionContext) -> Result<(), ActionError> {
        match self {
            Action::LinkPath(a) => verify_link(ctx, &a.source, &a.sha256, a.size_in_bytes),
            Action::PrefixReplaceLink(a) => {
                verify_link(ctx, &a.source, &None, a.size_in_bytes)?;
                if ctx.target_prefix.as_os_str().len() >= a.placeholder.len() && !a.text_mode {
                    return Err(ActionError::PaddingError(a.relative_path.clone()));
                }
                Ok(())
            }
            Action::MakeMenu(_) | Action::RemoveMenu(_) => Ok(()),
            Action::CompileMultiPyc(a) => verify_files_exist(&a.py_files),
            Action::AggregateCompileMultiPyc(actions) => {
                for a in actions {
                    verify_files_exist(&a.py_files)?;
                }
                Ok(())
            }
            Action::CreatePythonEntryPoint(a) => {
                if !a.python_executable.is_file() {
                    return Err(ActionError::SourceMissing(a.python_executable.clone()));
                }
                Ok(())
            }
            Action::CreatePrefixRecord(_)
            | Action::UpdateHistory(_)
            | Action::Unlink(_)
            | Action::RemoveLinkedPackageRecord(_)
            | Action::RegisterEnvironmentLocation(_)
            | Action::UnregisterEnvironmentLocation(_) => Ok(()),
        }
    }

    /// Performs the mutation. Must only be called after `verify` succeeded.
    pub fn execute(&self, ctx: &ActionContext) -> Result<(), ActionError> {
        match self {
            Action::LinkPath(a) => {
                let dest = ctx.resolve(&a.relative_path);
                link_one(a.kind, &a.source, &dest)
            }
            Action::PrefixReplaceLink(a) => execute_prefix_replace(ctx, a),
            Action::MakeMenu(a) => crate::install::menu::make_menu(ctx, a),
            Action::RemoveMenu(a) => crate::install::menu::remove_menu(ctx, a),
            Action::CompileMultiPyc(a) => crate::install::python::compile_pyc(&[a.clone()]),
            Action::AggregateCompileMultiPyc(actions) => {
                crate::install::python::compile_pyc(actions)
            }
            Action::CreatePythonEntryPoint(a) => {
                crate::install::entry_point::create_entry_point(ctx, a)
            }
            Action::CreatePrefixRecord(a) => {
                ctx.prefix_data
                    .lock()
                    .unwrap()
                    .insert(a.record.clone())
                    .map_err(ActionError::from)
            }
            Action::UpdateHistory(a) => crate::install::history::append_revision(ctx, a),
            Action::Unlink(a) => execute_unlink(ctx, &a.relative_path),
            Action::RemoveLinkedPackageRecord(a) => execute_remove_record(ctx, a),
            Action::RegisterEnvironmentLocation(a) => {
                crate::install::environments_txt::register(a)
            }
            Action::UnregisterEnvironmentLocation(a) => {
                crate::install::environments_txt::unregister(a)
            }
        }
    }

    /// Undoes `execute`. Called, in reverse action order, when a
    /// transaction rolls back.
    pub fn reverse(&self, ctx: &ActionContext) -> Result<(), ActionError> {
        match self {
            Action::LinkPath(a) => remove_if_exists(&ctx.resolve(&a.relative_path)),
            Action::PrefixReplaceLink(a) => remove_if_exists(&ctx.resolve(&a.relative_path)),
            Action::MakeMenu(a) => crate::install::menu::remove_menu(ctx, a),
            Action::RemoveMenu(a) => crate::install::menu::make_menu(ctx, a),
            Action::CompileMultiPyc(a) => remove_pyc_for(&a.py_files),
            Action::AggregateCompileMultiPyc(actions) => {
                for a in actions {
                    remove_pyc_for(&a.py_files)?;
                }
                Ok(())
            }
            Action::CreatePythonEntryPoint(a) => {
                remove_if_exists(&ctx.resolve(&a.bin_dir.join(&a.entry_point.command)))
            }
            Action::CreatePrefixRecord(a) => {
                let name = a.record.repodata_record.package_record.name.clone();
                ctx.prefix_data
                    .lock()
                    .unwrap()
                    .remove(&name)
                    .map(|_| ())
                    .map_err(ActionError::from)
            }
            Action::UpdateHistory(_) => Ok(()),
            Action::Unlink(a) => reverse_unlink(ctx, &a.relative_path),
            Action::RemoveLinkedPackageRecord(a) => reverse_remove_record(ctx, a),
            Action::RegisterEnvironmentLocation(a) => {
                crate::install::environments_txt::unregister(a)
            }
            Action::UnregisterEnvironmentLocation(a) => {
                crate::install::environments_txt::register(a)
            }
        }
    }

    /// Discards any temporary state left over from a successful `execute`
    /// (hold files from [`Action::Unlink`]). A no-op for most variants.
    pub fn cleanup(&self, ctx: &ActionContext) {
        match self {
            Action::Unlink(a) => {
                let hold = hold_path(ctx, &a.relative_path);
                let _ = fs::remove_file(&hold);
            }
            Action::RemoveLinkedPackageRecord(a) => {
                let hold = record_hold_path(ctx, a);
                let _ = fs::remove_file(&hold);
            }
            _ => {}
        }
    }
}

fn verify_files_exist(paths: &[PathBuf]) -> Result<(), ActionError> {
    for p in paths {
        if !p.is_file() {
            return Err(ActionError::SourceMissing(p.clone()));
        }
    }
    Ok(())
}

fn verify_link(
    _ctx: &ActionContext,
    source: &Path,
    sha256: &Option<rattler_digest::Sha256Hash>,
    size_in_bytes: Option<u64>,
) -> Result<(), ActionError> {
    if !source.exists() {
        return Err(ActionError::SourceMissing(source.to_path_buf()));
    }
    if let Some(expected_size) = size_in_bytes {
        if source.is_file() {
            let actual = fs::metadata(source)
                .map_err(|e| ActionError::io(source, e))?
                .len();
            if actual != expected_size {
                return Err(ActionError::SizeMismatch(source.to_path_buf()));
            }
        }
    }
    if let Some(expected) = sha256 {
        if source.is_file() {
            let actual = rattler_digest::compute_file_digest::<rattler_digest::Sha256>(source)
                .map_err(|e| ActionError::io(source, e))?;
            if &actual != expected {
                return Err(ActionError::ChecksumMismatch(source.to_path_buf()));
            }
        }
    }
    Ok(())
}

/// Places `source` at `dest` using `kind`, falling back from hardlink to
/// copy when the filesystem doesn't support hardlinks across the source and
/// destination (e.g. different mount points).
fn link_one(kind: LinkKind, source: &Path, dest: &Path) -> Result<(), ActionError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| ActionError::io(parent, e))?;
    }
    if dest.exists() || dest.is_symlink() {
        remove_if_exists(dest)?;
    }
    match kind {
        LinkType::Directory => {
            fs::create_dir_all(dest).map_err(|e| ActionError::io(dest, e))?;
        }
        LinkType::HardLink => {
            if fs::hard_link(source, dest).is_err() {
                fs::copy(source, dest).map_err(|e| ActionError::io(dest, e))?;
            }
        }
        LinkType::Copy => {
            fs::copy(source, dest).map_err(|e| ActionError::io(dest, e))?;
        }
        LinkType::SoftLink => {
            #[cfg(unix)]
            std::os::unix::fs::symlink(source, dest).map_err(|e| ActionError::io(dest, e))?;
            #[cfg(not(unix))]
            fs::copy(source, dest).map_err(|e| ActionError::io(dest, e))?;
        }
    }
    Ok(())
}

fn execute_prefix_replace(
    ctx: &ActionContext,
    a: &PrefixReplaceLinkAction,
) -> Result<(), ActionError> {
    let dest = ctx.resolve(&a.relative_path);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| ActionError::io(parent, e))?;
    }
    let contents = fs::read(&a.source).map_err(|e| ActionError::io(&a.source, e))?;
    let new_prefix = ctx.target_prefix.to_string_lossy();
    let rewritten = if a.text_mode {
        let text =
            String::from_utf8_lossy(&contents).replace(a.placeholder.as_str(), &new_prefix);
        text.into_bytes()
    } else {
        replace_binary_placeholder(&contents, a.placeholder.as_bytes(), new_prefix.as_bytes())
    };
    let mut file = fs::File::create(&dest).map_err(|e| ActionError::io(&dest, e))?;
    file.write_all(&rewritten)
        .map_err(|e| ActionError::io(&dest, e))?;
    Ok(())
}

/// Replaces every occurrence of `placeholder` with `replacement` in a
/// binary file, null-padding the tail of the match so the file's total
/// length (and therefore every offset after it) doesn't shift.
fn replace_binary_placeholder(contents: &[u8], placeholder: &[u8], replacement: &[u8]) -> Vec<u8> {
    assert!(
        replacement.len() <= placeholder.len(),
        "prefix placeholder padding was already checked in verify"
    );
    let mut out = Vec::with_capacity(contents.len());
    let mut rest = contents;
    while let Some(pos) = find_subslice(rest, placeholder) {
        out.extend_from_slice(&rest[..pos]);
        out.extend_from_slice(replacement);
        out.resize(out.len() + (placeholder.len() - replacement.len()), 0u8);
        rest = &rest[pos + placeholder.len()..];
    }
    out.extend_from_slice(rest);
    out
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn remove_if_exists(path: &Path) -> Result<(), ActionError> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(ActionError::io(path, e)),
    };
    let result = if meta.is_dir() && !meta.is_symlink() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Ok(()) | Err(_) if !path.exists() => Ok(()),
        Err(e) => Err(ActionError::io(path, e)),
    }
}

fn remove_pyc_for(py_files: &[PathBuf]) -> Result<(), ActionError> {
    for py in py_files {
        if let Some(pyc) = crate::install::python::pyc_path_for(py) {
            let _ = fs::remove_file(pyc);
        }
    }
    Ok(())
}

fn hold_path(ctx: &ActionContext, relative_path: &Path) -> PathBuf {
    let mut name = ctx.resolve(relative_path).into_os_string();
    name.push(UNLINK_HOLD_SUFFIX);
    PathBuf::from(name)
}

fn execute_unlink(ctx: &ActionContext, relative_path: &Path) -> Result<(), ActionError> {
    let path = ctx.resolve(relative_path);
    let hold = hold_path(ctx, relative_path);
    if !path.exists() {
        return Ok(());
    }
    fs::rename(&path, &hold).map_err(|e| ActionError::io(&path, e))
}

fn reverse_unlink(ctx: &ActionContext, relative_path: &Path) -> Result<(), ActionError> {
    let path = ctx.resolve(relative_path);
    let hold = hold_path(ctx, relative_path);
    if hold.exists() {
        fs::rename(&hold, &path).map_err(|e| ActionError::io(&path, e))?;
    }
    Ok(())
}

fn record_hold_path(ctx: &ActionContext, a: &RemoveLinkedPackageRecordAction) -> PathBuf {
    let meta_dir = ctx.target_prefix.join("conda-meta");
    let mut name = meta_dir
        .join(format!("{}.json", a.package_name.as_normalized()))
        .into_os_string();
    name.push(UNLINK_HOLD_SUFFIX);
    PathBuf::from(name)
}

fn execute_remove_record(
    ctx: &ActionContext,
    a: &RemoveLinkedPackageRecordAction,
) -> Result<(), ActionError> {
    let mut data = ctx.prefix_data.lock().unwrap();
    if let Some(record) = data.get(&a.package_name) {
        let record = record.map_err(|e| e.clone())?.clone();
        let hold = record_hold_path(ctx, a);
        let json_path = ctx
            .target_prefix
            .join("conda-meta")
            .join(record.file_name());
        if json_path.exists() {
            fs::rename(&json_path, &hold).map_err(|e| ActionError::io(&json_path, e))?;
        }
    }
    data.remove(&a.package_name)?;
    Ok(())
}

fn reverse_remove_record(
    ctx: &ActionContext,
    a: &RemoveLinkedPackageRecordAction,
) -> Result<(), ActionError> {
    let hold = record_hold_path(ctx, a);
    if !hold.exists() {
        return Ok(());
    }
    let record = PrefixRecord::from_path(&hold).map_err(|e| ActionError::io(&hold, e))?;
    let json_path = ctx
        .target_prefix
        .join("conda-meta")
        .join(record.file_name());
    fs::rename(&hold, &json_path).map_err(|e| ActionError::io(&json_path, e))?;
    ctx.prefix_data.lock().unwrap().insert(record)?;
    Ok(())
}
