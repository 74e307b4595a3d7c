//! Diffs two package sets into a [`Transaction`], and drives the bucketed
//! [`UnlinkLinkTransaction`] that turns a [`PrefixSetup`] into a sequence of
//! [`Action`]s run through an [`InstallDriver`].
//!
//! The diff model (`TransactionOperation`/`Transaction`) is independent of
//! the filesystem: it only compares records. Building the actual [`Action`]s
//! — reading `info/paths.json`, deciding hardlink vs. copy, relocating
//! `noarch: python` files — happens in [`UnlinkLinkTransaction::prepare`].

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    fs::OpenOptions,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use rattler_cache::package_cache::PackageCache;
use rattler_conda_types::{
    package::{LinkJson, NoArchLinks, PackageFile, PathsJson},
    prefix_record, MatchSpec, PackageName, PackageNameMatcher, PackageRecord, ParseStrictness,
    Platform, PrefixData, PrefixRecord, RepoDataRecord,
};

use crate::error::CondaError;

use super::{
    action::{
        Action, ActionContext, ActionError, CompilePycAction, CreatePrefixRecordAction,
        EntryPointAction, EnvironmentsTxtAction, LinkKind, LinkPathAction, MenuAction,
        PrefixReplaceLinkAction, RemoveLinkedPackageRecordAction, UnlinkAction,
        UpdateHistoryAction,
    },
    change_report::ChangeReport,
    clobber,
    driver::{InstallDriver, SigintGuard},
    link_script::{self, LinkScriptType},
    python::{PythonInfo, PythonInfoError},
};

/// The package name conda itself ships under; a transaction that would
/// remove this package from the prefix conda is running out of, without
/// linking a replacement, is rejected at verify time (§4.8).
const CONDA_PACKAGE_NAME: &str = "conda";

/// Errors raised while diffing two package sets into a [`Transaction`].
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    /// The python version of one of the two states could not be parsed.
    #[error(transparent)]
    PythonInfoError(#[from] PythonInfoError),
}

/// Describes a single operation needed to bring an environment from one
/// state into another.
#[derive(Debug, Clone)]
pub enum TransactionOperation<Old, New> {
    /// Install a package that wasn't present before.
    Install(New),
    /// Remove `old` and install `new` in its place.
    Change {
        /// The record to unlink.
        old: Old,
        /// The record to link.
        new: New,
    },
    /// Unlink and relink the same record (forced by a python version change
    /// affecting `noarch: python` layout).
    Reinstall(Old),
    /// Remove a package entirely, installing nothing in its place.
    Remove(Old),
}

impl<Old: AsRef<New>, New> TransactionOperation<Old, New> {
    /// The record this operation would install, if any.
    pub fn record_to_install(&self) -> Option<&New> {
        match self {
            TransactionOperation::Install(record) => Some(record),
            TransactionOperation::Change { new, .. } => Some(new),
            TransactionOperation::Reinstall(old) => Some(old.as_ref()),
            TransactionOperation::Remove(_) => None,
        }
    }
}

impl<Old, New> TransactionOperation<Old, New> {
    /// The record this operation would remove, if any.
    pub fn record_to_remove(&self) -> Option<&Old> {
        match self {
            TransactionOperation::Install(_) => None,
            TransactionOperation::Change { old, .. } => Some(old),
            TransactionOperation::Reinstall(old) => Some(old),
            TransactionOperation::Remove(old) => Some(old),
        }
    }
}

/// The operations needed to bring an environment from one set of records
/// into another.
#[derive(Debug)]
pub struct Transaction<Old, New> {
    /// The operations to perform, in no particular order.
    pub operations: Vec<TransactionOperation<Old, New>>,
    /// The python installation of the target state, if any.
    pub python_info: Option<PythonInfo>,
    /// The platform this transaction targets.
    pub platform: Platform,
}

impl<Old: AsRef<PackageRecord>, New: AsRef<PackageRecord>> Transaction<Old, New> {
    /// Builds a [`Transaction`] by diffing `current` against `desired`.
    pub fn from_current_and_desired<
        CurIter: IntoIterator<Item = Old>,
        NewIter: IntoIterator<Item = New>,
    >(
        current: CurIter,
        desired: NewIter,
        platform: Platform,
    ) -> Result<Self, TransactionError>
    where
        CurIter::IntoIter: Clone,
        NewIter::IntoIter: Clone,
    {
        let current = current.into_iter();
        let desired = desired.into_iter();

        let current_python_info = find_python_info(current.clone(), platform)?;
        let desired_python_info = find_python_info(desired.clone(), platform)?;
        let needs_python_relink = match (&current_python_info, &desired_python_info) {
            (Some(current), Some(desired)) => desired.is_relink_required(current),
            _ => false,
        };

        let mut desired: HashMap<PackageName, New> = desired
            .into_iter()
            .map(|record| (record.as_ref().name.clone(), record))
            .collect();

        let mut operations = Vec::new();

        for record in current {
            match desired.remove(&record.as_ref().name) {
                None => operations.push(TransactionOperation::Remove(record)),
                Some(desired) => {
                    if desired.as_ref() != record.as_ref() {
                        operations.push(TransactionOperation::Change {
                            old: record,
                            new: desired,
                        });
                    } else if desired.as_ref().noarch.is_python() && needs_python_relink {
                        operations.push(TransactionOperation::Reinstall(record));
                    }
                }
            }
        }

        for record in desired.into_values() {
            operations.push(TransactionOperation::Install(record));
        }

        Ok(Self {
            operations,
            python_info: desired_python_info,
            platform,
        })
    }
}

impl Transaction<PrefixRecord, RepoDataRecord> {
    /// Splits this transaction's operations into the `unlink_precs`/
    /// `link_precs` lists a [`PrefixSetup`] bundles, so the bucketed engine
    /// never has to reason about `Change`/`Reinstall` itself.
    pub fn to_prefix_setup(
        &self,
        target_prefix: impl Into<PathBuf>,
        remove_specs: Vec<String>,
        update_specs: Vec<String>,
        neutered_specs: Vec<String>,
    ) -> PrefixSetup {
        let mut unlink_precs = Vec::new();
        let mut link_precs = Vec::new();
        for op in &self.operations {
            match op {
                TransactionOperation::Install(new) => link_precs.push(new.clone()),
                TransactionOperation::Change { old, new } => {
                    unlink_precs.push(old.clone());
                    link_precs.push(new.clone());
                }
                TransactionOperation::Reinstall(old) => {
                    unlink_precs.push(old.clone());
                    link_precs.push(old.repodata_record.clone());
                }
                TransactionOperation::Remove(old) => unlink_precs.push(old.clone()),
            }
        }
        PrefixSetup {
            target_prefix: target_prefix.into(),
            unlink_precs,
            link_precs,
            remove_specs,
            update_specs,
            neutered_specs,
        }
    }
}

fn find_python_info(
    records: impl IntoIterator<Item = impl AsRef<PackageRecord>>,
    platform: Platform,
) -> Result<Option<PythonInfo>, PythonInfoError> {
    records
        .into_iter()
        .find(|r| is_python_record(r.as_ref()))
        .map(|record| PythonInfo::from_version(&record.as_ref().version, platform))
        .map_or(Ok(None), |info| info.map(Some))
}

fn is_python_record(record: &PackageRecord) -> bool {
    record.name.as_normalized() == "python"
}

/// What should change in a single prefix: the packages to unlink, the
/// packages to link, and the specs the caller asked for (recorded into
/// `conda-meta/history`).
#[derive(Debug, Clone)]
pub struct PrefixSetup {
    /// The environment directory this setup mutates.
    pub target_prefix: PathBuf,
    /// Installed records to remove.
    pub unlink_precs: Vec<PrefixRecord>,
    /// Records to link into the prefix.
    pub link_precs: Vec<RepoDataRecord>,
    /// Specs the caller asked to remove, recorded in history.
    pub remove_specs: Vec<String>,
    /// Specs the caller asked to install/update, recorded in history.
    pub update_specs: Vec<String>,
    /// Specs the solver relaxed to make the transaction satisfiable.
    pub neutered_specs: Vec<String>,
}

fn dist_string(record: &PackageRecord) -> String {
    format!("{}-{}-{}", record.name.as_normalized(), record.version, record.build)
}

/// One prefix's action buckets, in the strict order §4.8 defines.
struct Buckets {
    remove_menus: Vec<Action>,
    unlink: Vec<Action>,
    unregister: Vec<Action>,
    link: Vec<Action>,
    entry_point: Vec<Action>,
    record_and_compile: Vec<Action>,
    register: Vec<Action>,
    make_menus: Vec<Action>,
}

struct PreparedPrefix {
    setup: PrefixSetup,
    ctx: ActionContext,
    buckets: Buckets,
    unlink_records_for_scripts: Vec<PrefixRecord>,
    link_records_for_scripts: Vec<PrefixRecord>,
    /// `(owning package, relative path)` for every path the `link` bucket
    /// will write, in the order the paths were planned. Kept separate from
    /// `buckets.link` because not every `link` action maps 1:1 to a single
    /// relative path (and `no_link` entries map to none at all), so this is
    /// built alongside the actions rather than reconstructed from them.
    planned_link_paths: Vec<(PackageName, PathBuf)>,
    root_prefix: PathBuf,
}

/// Builds and runs the bucketed link/unlink plan for one or more prefixes.
///
/// Lifecycle: [`UnlinkLinkTransaction::prepare`] → [`UnlinkLinkTransaction::verify`]
/// → [`UnlinkLinkTransaction::execute`]. Buckets of different setups are
/// processed in lockstep (bucket N of every setup completes before bucket
/// N+1 of any setup), matching the spec's cross-setup ordering guarantee.
pub struct UnlinkLinkTransaction {
    prepared: Vec<PreparedPrefix>,
    link_script_outcomes: Mutex<Vec<link_script::LinkScriptOutcome>>,
}

/// Index into [`PreparedPrefix::all_buckets`] after which `pre-unlink`
/// (and `post-unlink`) scripts run, per §4.8's "unlink actions in
/// parallel, then pre-unlink scripts serially, then unregister".
const UNLINK_BUCKET: usize = 1;
/// Index after which `post-link` scripts run, per §4.8's "entry_point
/// actions, then post-link scripts serially, then record and compile".
const ENTRY_POINT_BUCKET: usize = 4;
/// Number of buckets in [`PreparedPrefix::all_buckets`].
const NUM_BUCKETS: usize = 8;

impl UnlinkLinkTransaction {
    /// Builds the action plan for every setup: ensures the prefix exists,
    /// loads its `PrefixData`, resolves each link record's cache entry and
    /// `info/paths.json`, and groups the resulting actions into ordered
    /// buckets.
    pub fn prepare(
        setups: Vec<PrefixSetup>,
        cache: &PackageCache,
        root_prefix: impl Into<PathBuf>,
    ) -> Result<Self, CondaError> {
        let root_prefix = root_prefix.into();
        let mut prepared = Vec::with_capacity(setups.len());
        for setup in setups {
            prepared.push(prepare_one(setup, cache, &root_prefix)?);
        }
        Ok(Self {
            prepared,
            link_script_outcomes: Mutex::new(Vec::new()),
        })
    }

    /// Runs every layer of verification (§4.8): transaction-level, clobber
    /// detection, and per-action. Every failure is collected rather than
    /// returned at the first one.
    pub fn verify(&self, driver: &InstallDriver) -> Result<(), CondaError> {
        let mut errors: Vec<CondaError> = Vec::new();

        for prepared in &self.prepared {
            errors.extend(transaction_level_checks(prepared, driver.disallowed_packages()));

            let data = prepared.ctx.prefix_data.lock().unwrap();
            errors.extend(
                clobber::check_clobbers(
                    &data,
                    &prepared.setup.target_prefix,
                    &prepared.planned_link_paths,
                )
                .into_iter(),
            );
            drop(data);

            for bucket in prepared.all_buckets() {
                errors.extend(
                    driver
                        .verify_all(&prepared.ctx, bucket)
                        .into_iter()
                        .map(CondaError::from),
                );
            }
        }

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.into_iter().next().expect("len checked above"))
        } else {
            Err(CondaError::CondaMultiError(errors))
        }
    }

    /// Runs every bucket, in order, across all setups, interleaving
    /// `pre-unlink`/`post-unlink` and `post-link` scripts at the positions
    /// §4.8 specifies (after `unlink`, and after `entry_point`,
    /// respectively) when `driver.execute_link_scripts()` is enabled.
    /// Buckets are processed in lockstep across setups: bucket N of every
    /// setup runs before bucket N+1 of any setup, so a failure in one
    /// setup's bucket rolls back every other setup's same-numbered bucket
    /// too, not whatever later buckets that setup happened to reach first.
    ///
    /// A SIGINT received while this runs is converted into the same
    /// composite-error rollback path as a failing action.
    ///
    /// On the first failing action, fatal script, or SIGINT, every action
    /// executed so far (across every setup, in reverse order) is reversed
    /// and a composite error is raised.
    pub fn execute(&self, driver: &InstallDriver) -> Result<(), CondaError> {
        let sigint = SigintGuard::install();
        let mut executed: Vec<(&ActionContext, &Action)> = Vec::new();

        for idx in 0..NUM_BUCKETS {
            for prepared in &self.prepared {
                if sigint.tripped() {
                    return rollback(CondaError::CondaSystemExit(130), executed);
                }

                let bucket = prepared.all_buckets()[idx];
                if let Err(first_error) = run_bucket(driver, &prepared.ctx, bucket, &mut executed) {
                    return rollback(first_error, executed);
                }

                if !driver.execute_link_scripts() {
                    continue;
                }
                if idx == UNLINK_BUCKET {
                    if let Err(e) = self.run_unlink_scripts(prepared) {
                        return rollback(e, executed);
                    }
                } else if idx == ENTRY_POINT_BUCKET {
                    if let Err(e) = self.run_post_link_scripts(prepared) {
                        return rollback(e, executed);
                    }
                }
            }
        }

        if sigint.tripped() {
            return rollback(CondaError::CondaSystemExit(130), executed);
        }

        for (ctx, action) in &executed {
            action.cleanup(ctx);
        }

        Ok(())
    }

    fn run_unlink_scripts(&self, prepared: &PreparedPrefix) -> Result<(), CondaError> {
        let outcome = link_script::run_link_scripts(
            LinkScriptType::PreUnlink,
            prepared.unlink_records_for_scripts.iter(),
            &prepared.setup.target_prefix,
            &prepared.root_prefix,
        )?;
        self.link_script_outcomes.lock().unwrap().push(outcome);
        let outcome = link_script::run_link_scripts(
            LinkScriptType::PostUnlink,
            prepared.unlink_records_for_scripts.iter(),
            &prepared.setup.target_prefix,
            &prepared.root_prefix,
        )?;
        self.link_script_outcomes.lock().unwrap().push(outcome);
        Ok(())
    }

    fn run_post_link_scripts(&self, prepared: &PreparedPrefix) -> Result<(), CondaError> {
        let outcome = link_script::run_link_scripts(
            LinkScriptType::PostLink,
            prepared.link_records_for_scripts.iter(),
            &prepared.setup.target_prefix,
            &prepared.root_prefix,
        )?;
        self.link_script_outcomes.lock().unwrap().push(outcome);
        Ok(())
    }

    /// The per-package change report for every setup, in setup order.
    pub fn change_reports(&self) -> Vec<ChangeReport> {
        self.prepared
            .iter()
            .map(|p| ChangeReport::compute(&p.setup.unlink_precs, &p.setup.link_precs))
            .collect()
    }

    /// `.messages.txt` contents and failed-script bookkeeping collected
    /// from every link-script invocation during `execute`. Empty if
    /// `execute` hasn't run yet or `InstallDriver::execute_link_scripts`
    /// was disabled.
    pub fn link_script_outcomes(&self) -> Vec<link_script::LinkScriptOutcome> {
        self.link_script_outcomes.lock().unwrap().clone()
    }
}

fn rollback(
    first_error: CondaError,
    executed: Vec<(&ActionContext, &Action)>,
) -> Result<(), CondaError> {
    let mut errors = vec![first_error];
    for (ctx, action) in executed.into_iter().rev() {
        if let Err(e) = action.reverse(ctx) {
            errors.push(CondaError::from(e));
        }
    }
    Err(CondaError::CondaMultiError(errors))
}

/// The four transaction-level checks §4.8 requires before any clobber or
/// per-action verification runs: conda must not remove itself without a
/// replacement, a dependency of conda must not go missing from conda's own
/// prefix, no linked package may be on the disallow-list, and
/// `conda-meta/history` must be writable.
fn transaction_level_checks(
    prepared: &PreparedPrefix,
    disallowed_packages: &[PackageName],
) -> Vec<CondaError> {
    let mut errors = Vec::new();

    if prepared.setup.target_prefix == prepared.root_prefix {
        errors.extend(check_conda_self(prepared));
    }

    for new in &prepared.setup.link_precs {
        if disallowed_packages.contains(&new.package_record.name) {
            errors.push(CondaError::DisallowedPackage(new.package_record.name.clone()));
        }
    }

    if !is_history_writable(&prepared.setup.target_prefix) {
        errors.push(CondaError::NotWritable(
            prepared.setup.target_prefix.join("conda-meta").join("history"),
        ));
    }

    errors
}

/// Checks that this setup, which targets conda's own prefix, neither
/// removes conda's own package record without replacing it nor leaves one
/// of conda's own dependencies missing from the prefix afterwards.
fn check_conda_self(prepared: &PreparedPrefix) -> Option<CondaError> {
    let unlinking_conda = prepared
        .setup
        .unlink_precs
        .iter()
        .any(|r| r.repodata_record.package_record.name.as_normalized() == CONDA_PACKAGE_NAME);
    let conda_replacement = prepared
        .setup
        .link_precs
        .iter()
        .find(|r| r.package_record.name.as_normalized() == CONDA_PACKAGE_NAME);

    if unlinking_conda && conda_replacement.is_none() {
        return Some(CondaError::RemoveSelf);
    }

    let depends: Vec<String> = match conda_replacement {
        Some(record) => record.package_record.depends.clone(),
        None => {
            let data = prepared.ctx.prefix_data.lock().unwrap();
            let name = PackageName::try_from(CONDA_PACKAGE_NAME).ok()?;
            data.get(&name)?.ok()?.repodata_record.package_record.depends.clone()
        }
    };

    let final_names = final_package_names(prepared);
    let missing = depends.iter().any(|dep| {
        let Ok(spec) = MatchSpec::from_str(dep, ParseStrictness::Lenient) else {
            return false;
        };
        match spec.name {
            PackageNameMatcher::Exact(name) => !final_names.contains(&name),
            _ => false,
        }
    });

    missing.then_some(CondaError::RemoveSelf)
}

/// The set of package names that would be present in `prepared`'s prefix
/// once its unlink/link actions have both applied.
fn final_package_names(prepared: &PreparedPrefix) -> HashSet<PackageName> {
    let data = prepared.ctx.prefix_data.lock().unwrap();
    let mut names: HashSet<PackageName> = data.all_records().map(|(name, _)| name.clone()).collect();
    drop(data);
    for old in &prepared.setup.unlink_precs {
        names.remove(&old.repodata_record.package_record.name);
    }
    for new in &prepared.setup.link_precs {
        names.insert(new.package_record.name.clone());
    }
    names
}

/// Mirrors `PkgsDir::is_writable`'s probe in `rattler_cache`: try an
/// append-open on the file if it exists, otherwise try to create its parent
/// directory and the file itself.
fn is_history_writable(target_prefix: &Path) -> bool {
    let meta_dir = target_prefix.join("conda-meta");
    let history_path = meta_dir.join("history");
    if history_path.exists() {
        return OpenOptions::new().append(true).open(&history_path).is_ok();
    }
    match std::fs::create_dir_all(&meta_dir) {
        Ok(()) => std::fs::File::create(&history_path).is_ok(),
        Err(_) => false,
    }
}

impl PreparedPrefix {
    fn all_buckets(&self) -> [&[Action]; 8] {
        [
            &self.buckets.remove_menus,
            &self.buckets.unlink,
            &self.buckets.unregister,
            &self.buckets.link,
            &self.buckets.entry_point,
            &self.buckets.record_and_compile,
            &self.buckets.register,
            &self.buckets.make_menus,
        ]
    }
}

fn run_bucket<'a>(
    driver: &InstallDriver,
    ctx: &'a ActionContext,
    bucket: &'a [Action],
    executed: &mut Vec<(&'a ActionContext, &'a Action)>,
) -> Result<(), CondaError> {
    let failures = driver.execute_bucket(ctx, bucket);
    for (i, action) in bucket.iter().enumerate() {
        if !failures.iter().any(|(failed, _)| *failed == i) {
            executed.push((ctx, action));
        }
    }
    if let Some((_, error)) = failures.into_iter().next() {
        return Err(CondaError::from(error));
    }
    Ok(())
}

fn prepare_one(
    setup: PrefixSetup,
    cache: &PackageCache,
    root_prefix: &Path,
) -> Result<PreparedPrefix, CondaError> {
    std::fs::create_dir_all(&setup.target_prefix).map_err(|e| {
        CondaError::from(ActionError::Io {
            path: setup.target_prefix.clone(),
            source: e,
        })
    })?;
    let prefix_data = PrefixData::new(&setup.target_prefix).map_err(|e| {
        CondaError::from(ActionError::Io {
            path: setup.target_prefix.clone(),
            source: e,
        })
    })?;

    let platform = Platform::current();
    let python_info = resolve_python_info(&setup.link_precs, &prefix_data, platform)
        .map_err(TransactionError::from)?;

    let ctx = ActionContext {
        target_prefix: setup.target_prefix.clone(),
        prefix_data: Arc::new(Mutex::new(prefix_data)),
    };

    let mut remove_menus = Vec::new();
    let mut unlink = Vec::new();
    let mut unregister = Vec::new();
    let mut link = Vec::new();
    let mut entry_point = Vec::new();
    let mut record_and_compile = Vec::new();
    let mut register = Vec::new();
    let mut make_menus = Vec::new();
    let mut compile_actions: Vec<CompilePycAction> = Vec::new();
    let mut planned_link_paths: Vec<(PackageName, PathBuf)> = Vec::new();

    for old in &setup.unlink_precs {
        remove_menus.push(Action::RemoveMenu(MenuAction {
            package_dir: old.extracted_package_dir.clone().unwrap_or_default(),
            package_name: old.repodata_record.package_record.name.clone(),
        }));
        for entry in &old.paths_data.paths {
            unlink.push(Action::Unlink(UnlinkAction {
                relative_path: entry.relative_path.clone(),
            }));
        }
        unlink.push(Action::RemoveLinkedPackageRecord(
            RemoveLinkedPackageRecordAction {
                package_name: old.repodata_record.package_record.name.clone(),
            },
        ));
    }

    if setup.link_precs.is_empty() && !setup.unlink_precs.is_empty() {
        unregister.push(Action::UnregisterEnvironmentLocation(
            EnvironmentsTxtAction {
                environments_txt: environments_txt_path(),
                prefix: setup.target_prefix.clone(),
            },
        ));
    }

    for new in &setup.link_precs {
        let package_record = &new.package_record;
        let cache_entry = cache.entry_for_link(package_record).ok_or_else(|| {
            CondaError::PathNotFound(setup.target_prefix.join(dist_string(package_record)))
        })?;
        let extracted_dir = cache_entry.extracted_package_dir.clone();

        link_script::check_no_pre_link_script(
            &extracted_dir,
            &package_record.name,
            platform,
        )?;

        let paths = PathsJson::from_package_directory_with_deprecated_fallback(&extracted_dir)
            .map_err(|e| ActionError::Io {
                path: extracted_dir.join("info").join("paths.json"),
                source: e,
            })?;

        let is_noarch_python = package_record.noarch.is_python();
        if is_noarch_python && python_info.is_none() {
            return Err(CondaError::ArgumentError(format!(
                "{} is noarch: python but no python interpreter is linked into the prefix",
                package_record.name.as_normalized()
            )));
        }

        let mut record_paths = Vec::with_capacity(paths.paths.len());
        let mut py_files = Vec::new();

        for entry in &paths.paths {
            let relative_path = relocate(is_noarch_python, &python_info, &entry.relative_path);
            let source = extracted_dir.join(&entry.relative_path);
            let sha256 = entry
                .sha256
                .as_deref()
                .and_then(rattler_digest::parse_digest_from_hex::<rattler_digest::Sha256>);

            if !entry.no_link {
                if let Some(placeholder) = &entry.prefix_placeholder {
                    link.push(Action::PrefixReplaceLink(PrefixReplaceLinkAction {
                        source: source.clone(),
                        relative_path: relative_path.clone(),
                        text_mode: entry.file_mode == rattler_conda_types::package::FileMode::Text,
                        placeholder: placeholder.clone(),
                        size_in_bytes: entry.size_in_bytes,
                    }));
                } else {
                    link.push(Action::LinkPath(LinkPathAction {
                        kind: path_type_to_link_kind(entry.path_type),
                        source: source.clone(),
                        relative_path: relative_path.clone(),
                        sha256,
                        size_in_bytes: entry.size_in_bytes,
                    }));
                }
                planned_link_paths.push((package_record.name.clone(), relative_path.clone()));
            }

            if is_noarch_python
                && relative_path.extension().and_then(|e| e.to_str()) == Some("py")
            {
                py_files.push(setup.target_prefix.join(&relative_path));
            }

            record_paths.push(prefix_record::PathsEntry {
                relative_path,
                original_path: None,
                path_type: entry.path_type.into(),
                no_link: entry.no_link,
                sha256,
                sha256_in_prefix: None,
                size_in_bytes: entry.size_in_bytes,
                file_mode: Some(entry.file_mode),
                prefix_placeholder: entry.prefix_placeholder.clone(),
            });
        }

        if is_noarch_python {
            if let Some(info) = &python_info {
                if !py_files.is_empty() {
                    compile_actions.push(CompilePycAction {
                        python_executable: setup.target_prefix.join(info.python_executable_path()),
                        py_files,
                    });
                }

                match LinkJson::from_package_directory(&extracted_dir) {
                    Ok(link_json) => {
                        if let NoArchLinks::Python(entry_points) = link_json.noarch {
                            for ep in entry_points.entry_points {
                                entry_point.push(Action::CreatePythonEntryPoint(EntryPointAction {
                                    entry_point: ep,
                                    python_executable: setup
                                        .target_prefix
                                        .join(info.python_executable_path()),
                                    bin_dir: setup.target_prefix.join(info.entry_point_bin_dir()),
                                }));
                            }
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        return Err(ActionError::Io {
                            path: extracted_dir.join("info").join("link.json"),
                            source: e,
                        }
                        .into())
                    }
                }
            }
        }

        let record = PrefixRecord::from_repodata_record(
            new.clone(),
            Some(cache_entry.package_tarball_full_path.clone()),
            Some(extracted_dir.clone()),
            record_paths,
            None,
            Some(prefix_record::Link {
                source: extracted_dir.clone(),
                link_type: Some(rattler_conda_types::prefix_record::LinkType::HardLink),
            }),
        );
        record_and_compile.push(Action::CreatePrefixRecord(Box::new(
            CreatePrefixRecordAction { record },
        )));

        make_menus.push(Action::MakeMenu(MenuAction {
            package_dir: extracted_dir,
            package_name: package_record.name.clone(),
        }));
    }

    if !compile_actions.is_empty() {
        record_and_compile.push(Action::AggregateCompileMultiPyc(compile_actions));
    }

    if !setup.link_precs.is_empty() {
        register.push(Action::RegisterEnvironmentLocation(
            EnvironmentsTxtAction {
                environments_txt: environments_txt_path(),
                prefix: setup.target_prefix.clone(),
            },
        ));
    }

    // `UpdateHistory` lands in the same bucket as `CreatePrefixRecord`: both
    // are metadata writes that accompany the link step rather than the link
    // step itself, and neither conflicts with any path the `link` bucket
    // touches.
    record_and_compile.push(Action::UpdateHistory(UpdateHistoryAction {
        timestamp: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        cmd: None,
        added: setup
            .link_precs
            .iter()
            .map(|r| dist_string(&r.package_record))
            .collect::<BTreeSet<_>>(),
        removed: setup
            .unlink_precs
            .iter()
            .map(|r| dist_string(&r.repodata_record.package_record))
            .collect::<BTreeSet<_>>(),
        update_specs: setup.update_specs.clone(),
        remove_specs: setup.remove_specs.clone(),
        neutered_specs: setup.neutered_specs.clone(),
    }));

    let unlink_records_for_scripts = setup.unlink_precs.clone();
    let link_records_for_scripts: Vec<PrefixRecord> = record_and_compile
        .iter()
        .filter_map(|a| match a {
            Action::CreatePrefixRecord(a) => Some(a.record.clone()),
            _ => None,
        })
        .collect();

    Ok(PreparedPrefix {
        setup,
        ctx,
        buckets: Buckets {
            remove_menus,
            unlink,
            unregister,
            link,
            entry_point,
            record_and_compile,
            register,
            make_menus,
        },
        unlink_records_for_scripts,
        link_records_for_scripts,
        planned_link_paths,
        root_prefix: root_prefix.to_path_buf(),
    })
}

fn resolve_python_info(
    link_precs: &[RepoDataRecord],
    prefix_data: &PrefixData,
    platform: Platform,
) -> Result<Option<PythonInfo>, PythonInfoError> {
    if let Some(rec) = link_precs.iter().find(|r| is_python_record(&r.package_record)) {
        return PythonInfo::from_version(&rec.package_record.version, platform).map(Some);
    }
    if let Ok(python_name) = PackageName::try_from("python") {
        if let Some(Ok(rec)) = prefix_data.get(&python_name) {
            return PythonInfo::from_version(&rec.repodata_record.package_record.version, platform)
                .map(Some);
        }
    }
    Ok(None)
}

fn relocate(is_noarch_python: bool, python_info: &Option<PythonInfo>, path: &Path) -> PathBuf {
    if !is_noarch_python {
        return path.to_path_buf();
    }
    let Some(info) = python_info else {
        return path.to_path_buf();
    };
    match path.strip_prefix("site-packages") {
        Ok(rest) => info.site_packages_path().join(rest),
        Err(_) => path.to_path_buf(),
    }
}

fn path_type_to_link_kind(path_type: rattler_conda_types::package::PathType) -> LinkKind {
    match path_type {
        rattler_conda_types::package::PathType::HardLink => LinkKind::HardLink,
        rattler_conda_types::package::PathType::SoftLink => LinkKind::SoftLink,
        rattler_conda_types::package::PathType::Directory => LinkKind::Directory,
    }
}

fn environments_txt_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".conda")
        .join("environments.txt")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rattler_conda_types::Version;

    fn package_record(name: &str, version: &str) -> PackageRecord {
        PackageRecord::new(
            PackageName::try_from(name).unwrap(),
            version.parse::<Version>().unwrap(),
            "0".to_string(),
        )
    }

    fn repo_data_record(name: &str, version: &str) -> RepoDataRecord {
        RepoDataRecord {
            package_record: package_record(name, version),
            file_name: format!("{name}-{version}-0.conda"),
            url: "https://conda.anaconda.org/main/noarch/dummy.conda".parse().unwrap(),
            channel: "main".to_string(),
        }
    }

    #[test]
    fn install_only_desired_packages_produce_install_ops() {
        let desired = vec![repo_data_record("numpy", "1.26.0")];
        let txn: Transaction<RepoDataRecord, RepoDataRecord> =
            Transaction::from_current_and_desired(vec![], desired, Platform::Linux64).unwrap();
        assert_eq!(txn.operations.len(), 1);
        assert!(matches!(
            txn.operations[0],
            TransactionOperation::Install(_)
        ));
    }

    #[test]
    fn removed_packages_produce_remove_ops() {
        let current = vec![repo_data_record("numpy", "1.26.0")];
        let txn: Transaction<RepoDataRecord, RepoDataRecord> =
            Transaction::from_current_and_desired(current, vec![], Platform::Linux64).unwrap();
        assert_eq!(txn.operations.len(), 1);
        assert!(matches!(txn.operations[0], TransactionOperation::Remove(_)));
    }

    #[test]
    fn unchanged_packages_produce_no_ops() {
        let record = repo_data_record("numpy", "1.26.0");
        let txn: Transaction<RepoDataRecord, RepoDataRecord> =
            Transaction::from_current_and_desired(
                vec![record.clone()],
                vec![record],
                Platform::Linux64,
            )
            .unwrap();
        assert!(txn.operations.is_empty());
    }
}
