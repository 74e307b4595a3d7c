//! `_pkey`: the tuple conda uses to decide whether two records describe "the
//! same package" for cache and transaction purposes — channel, subdir, name,
//! version, build number and build string — deliberately excluding fields
//! like `timestamp`, `url` or `sha256` that can legitimately differ between
//! two fetches of what is otherwise the same artifact.
//!
//! [`PackageRecord`], [`PackageCacheRecord`] and [`PrefixRecord`] all derive
//! (or implement) `Eq`/`Hash` over their *entire* set of fields, which is the
//! right behaviour for using them as plain map/set keys in general-purpose
//! code. Call sites that specifically need `_pkey` semantics — cache lookup,
//! transaction diffing — compare via [`HasPKey::pkey`] instead of relying on
//! the type's own `Eq` impl.

use crate::{PackageCacheRecord, PackageRecord, PrefixRecord, RepoDataRecord};

/// The `_pkey` identity tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PKey {
    /// The canonical name of the channel the record came from, if known.
    pub channel: Option<String>,
    /// The subdir (platform) the record belongs to.
    pub subdir: String,
    /// The normalized package name.
    pub name: String,
    /// The package version, rendered the way it was sourced.
    pub version: String,
    /// The build number.
    pub build_number: u64,
    /// The build string.
    pub build: String,
}

/// Implemented by every record type that carries enough information to
/// compute a [`PKey`].
pub trait HasPKey {
    /// Returns this record's `_pkey`.
    fn pkey(&self) -> PKey;
}

impl HasPKey for PackageRecord {
    fn pkey(&self) -> PKey {
        PKey {
            channel: None,
            subdir: self.subdir.clone(),
            name: self.name.as_normalized().to_string(),
            version: self.version.to_string(),
            build_number: self.build_number,
            build: self.build.clone(),
        }
    }
}

impl HasPKey for RepoDataRecord {
    fn pkey(&self) -> PKey {
        let mut key = self.package_record.pkey();
        key.channel = Some(self.channel.clone());
        key
    }
}

impl HasPKey for PrefixRecord {
    fn pkey(&self) -> PKey {
        self.repodata_record.pkey()
    }
}

impl HasPKey for PackageCacheRecord {
    fn pkey(&self) -> PKey {
        self.package_record.pkey()
    }
}
