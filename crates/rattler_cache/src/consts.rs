/// The location in the main cache folder where the conda package cache is stored.
pub const PACKAGE_CACHE_DIR: &str = "pkgs";

/// The location in the main cache folder where the repodata cache is stored.
pub const REPODATA_CACHE_DIR: &str = "cache";

/// Name of the file that marks a cache directory as safe to exclude from
/// backup tools (Time Machine, etc). See <https://bford.info/cachedir/>.
pub const CACHEDIR_TAG_NAME: &str = "CACHEDIR.TAG";

/// Contents written to `CACHEDIR.TAG` when a package cache directory is created.
pub const CACHEDIR_TAG_CONTENTS: &str = "Signature: 8a477f597d28d172789f06886806bc55\n\
Comment: This file is a cache directory tag created by rattler.\n\
For information about cache directory tags see https://bford.info/cachedir/\n";

/// Writes a `CACHEDIR.TAG` into `dir` if it does not already exist, so backup
/// tools know to skip the directory. Best-effort: failures are not fatal to
/// callers since the cache itself still works without the tag.
pub fn write_cachedir_tag(dir: &std::path::Path) {
    let tag_path = dir.join(CACHEDIR_TAG_NAME);
    if tag_path.exists() {
        return;
    }
    if let Err(e) = std::fs::write(&tag_path, CACHEDIR_TAG_CONTENTS) {
        tracing::debug!("failed to write CACHEDIR.TAG in {}: {e}", dir.display());
    }
}
