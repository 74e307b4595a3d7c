//! Manages the on-disk cache of downloaded and extracted Conda packages:
//! layered [`package_cache::PackageCache`] directories, the
//! [`fetch_extract`] pipeline that populates them, and the
//! [`validation`] routines used to tell a good cache entry from a stale one.

use std::path::PathBuf;

pub mod cache_key;
pub mod consts;
pub mod extract;
pub mod fetch_extract;
pub mod package_cache;
pub mod validation;

pub use cache_key::CacheKey;
pub use consts::{PACKAGE_CACHE_DIR, REPODATA_CACHE_DIR};
pub use extract::{CacheReporter, ExtractError};
pub use fetch_extract::{CancellationToken, FetchExtractErrors, FetchExtractPool};
pub use package_cache::{PackageCache, PkgsDir};

/// Determines the default cache directory for rattler.
///
/// Checks the `RATTLER_CACHE_DIR` environment variable first; falls back to
/// `dirs::cache_dir()/rattler/cache`.
pub fn default_cache_dir() -> anyhow::Result<PathBuf> {
    std::env::var("RATTLER_CACHE_DIR")
        .map(PathBuf::from)
        .or_else(|_| {
            dirs::cache_dir()
                .ok_or_else(|| {
                    anyhow::anyhow!("could not determine cache directory for current platform")
                })
                .map(|mut p| {
                    p.push("rattler");
                    p.push("cache");
                    p
                })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cache_dir_honors_env_override() {
        std::env::set_var("RATTLER_CACHE_DIR", "/tmp/my-rattler-cache");
        assert_eq!(
            default_cache_dir().unwrap(),
            PathBuf::from("/tmp/my-rattler-cache")
        );
        std::env::remove_var("RATTLER_CACHE_DIR");
    }
}
