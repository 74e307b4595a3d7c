//! Resource pools shared across a transaction's verify and execute phases.
//!
//! Packages can mostly be verified and linked in isolation, so both phases
//! fan out across a dedicated [`rayon::ThreadPool`]. Two separate pools
//! (rather than the global rayon pool) let a caller size IO-bound verify
//! work independently from execute work, and keep a runaway transaction
//! from starving the rest of the process's rayon usage.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use rattler_conda_types::PackageName;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};

use super::action::{Action, ActionContext, ActionError};

/// Coordinates the parallel verify/execute passes of an
/// [`crate::install::UnlinkLinkTransaction`].
pub struct InstallDriver {
    verify_pool: ThreadPool,
    execute_pool: ThreadPool,
    execute_link_scripts: bool,
    disallowed_packages: Vec<PackageName>,
}

impl InstallDriver {
    /// Starts building a driver with defaults overridden incrementally.
    pub fn builder() -> InstallDriverBuilder {
        InstallDriverBuilder::default()
    }

    /// Whether `pre-unlink`/`post-link` scripts should be executed. Off by
    /// default: running arbitrary shell/batch scripts from a package is a
    /// meaningful trust boundary a caller should opt into explicitly.
    pub fn execute_link_scripts(&self) -> bool {
        self.execute_link_scripts
    }

    /// Packages a transaction must refuse to link, by name. Checked at
    /// transaction-level verification time.
    pub fn disallowed_packages(&self) -> &[PackageName] {
        &self.disallowed_packages
    }

    /// Runs `verify` for every action in `actions` in parallel, returning
    /// every failure rather than stopping at the first one so a caller can
    /// report every clobber/checksum problem in one pass.
    pub fn verify_all(&self, ctx: &ActionContext, actions: &[Action]) -> Vec<ActionError> {
        use rayon::prelude::*;
        self.verify_pool
            .install(|| actions.par_iter().filter_map(|a| a.verify(ctx).err()).collect())
    }

    /// Executes every action in `bucket` in parallel. Returns the index (into
    /// `bucket`) and error of every action that failed; callers use the
    /// indices to know which of the bucket's actions actually mutated the
    /// filesystem and therefore need reversing.
    pub fn execute_bucket(
        &self,
        ctx: &ActionContext,
        bucket: &[Action],
    ) -> Vec<(usize, ActionError)> {
        use rayon::prelude::*;
        self.execute_pool.install(|| {
            bucket
                .par_iter()
                .enumerate()
                .filter_map(|(i, a)| a.execute(ctx).err().map(|e| (i, e)))
                .collect()
        })
    }
}

impl Default for InstallDriver {
    fn default() -> Self {
        Self::builder()
            .finish()
            .expect("default thread pool sizes are always buildable")
    }
}

/// Builds an [`InstallDriver`], sizing its thread pools and toggling script
/// execution.
#[derive(Debug, Default)]
pub struct InstallDriverBuilder {
    verify_threads: Option<usize>,
    execute_threads: Option<usize>,
    execute_link_scripts: bool,
    disallowed_packages: Vec<PackageName>,
}

/// Failure while constructing the driver's thread pools.
#[derive(Debug, thiserror::Error)]
#[error("failed to build install driver thread pool")]
pub struct InstallDriverError(#[from] ThreadPoolBuildError);

impl InstallDriverBuilder {
    /// Caps the number of threads used to verify actions. Defaults to the
    /// number of logical CPUs.
    pub fn with_verify_threads(mut self, threads: usize) -> Self {
        self.verify_threads = Some(threads);
        self
    }

    /// Caps the number of threads used to execute actions. Defaults to the
    /// number of logical CPUs.
    pub fn with_execute_threads(mut self, threads: usize) -> Self {
        self.execute_threads = Some(threads);
        self
    }

    /// Enables or disables `pre-unlink`/`post-link` script execution.
    pub fn execute_link_scripts(mut self, enabled: bool) -> Self {
        self.execute_link_scripts = enabled;
        self
    }

    /// Sets the list of packages a transaction must refuse to link.
    pub fn with_disallowed_packages(mut self, packages: Vec<PackageName>) -> Self {
        self.disallowed_packages = packages;
        self
    }

    /// Builds the driver, constructing its thread pools.
    pub fn finish(self) -> Result<InstallDriver, InstallDriverError> {
        let mut verify = ThreadPoolBuilder::new();
        if let Some(n) = self.verify_threads {
            verify = verify.num_threads(n);
        }
        let mut execute = ThreadPoolBuilder::new();
        if let Some(n) = self.execute_threads {
            execute = execute.num_threads(n);
        }
        Ok(InstallDriver {
            verify_pool: verify.build()?,
            execute_pool: execute.build()?,
            execute_link_scripts: self.execute_link_scripts,
            disallowed_packages: self.disallowed_packages,
        })
    }
}

/// Converts SIGINT into a flag [`UnlinkLinkTransaction::execute`] polls
/// between buckets, so an interrupted transaction rolls back through the
/// same composite-error path as a failed action rather than leaving the
/// prefix half-mutated.
///
/// Spawns a background thread running a minimal current-thread tokio
/// runtime for the lifetime of the guard; the runtime's only job is to wait
/// on [`tokio::signal::ctrl_c`] and flip [`SigintGuard::tripped`].
pub struct SigintGuard {
    tripped: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
}

impl SigintGuard {
    /// Installs the handler. Cheap: the background thread is idle (blocked
    /// on a signal future) until either SIGINT arrives or the guard drops.
    pub fn install() -> Self {
        let tripped = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(AtomicBool::new(false));

        let thread_tripped = tripped.clone();
        let thread_shutdown = shutdown.clone();
        std::thread::spawn(move || {
            let Ok(runtime) = tokio::runtime::Builder::new_current_thread()
                .enable_io()
                .enable_time()
                .build()
            else {
                return;
            };
            // Poll ctrl_c with a short timeout rather than awaiting it
            // directly, so this task also wakes up on `shutdown` once the
            // guard is dropped (a successful transaction, say) instead of
            // leaking the background thread for the rest of the process.
            runtime.block_on(async {
                while !thread_shutdown.load(Ordering::SeqCst) {
                    let wait = tokio::time::timeout(
                        std::time::Duration::from_millis(50),
                        tokio::signal::ctrl_c(),
                    )
                    .await;
                    match wait {
                        Ok(Ok(())) => {
                            thread_tripped.store(true, Ordering::SeqCst);
                            return;
                        }
                        Ok(Err(_)) => return,
                        Err(_) => continue,
                    }
                }
            });
        });

        Self { tripped, shutdown }
    }

    /// Whether SIGINT has arrived since this guard was installed.
    pub fn tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }
}

impl Drop for SigintGuard {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}
