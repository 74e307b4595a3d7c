#![deny(missing_docs)]
//! `rattler-conda-types` contains data models for types commonly found within
//! the Conda ecosystem. The library itself doesnt provide any functionality
//! besides parsing the data types.

mod build_spec;
mod channel;
mod match_spec;
mod minimal_prefix_record;
mod no_arch_type;
mod parse_mode;
mod platform;
mod prefix;
pub mod prefix_data;
mod repo_data;
mod repo_data_record;
mod run_export;
mod utils;
mod version;
pub mod version_spec;

mod generic_virtual_package;
pub mod history;
mod identity;
pub mod package;
mod package_cache_record;
mod package_name;
pub mod prefix_record;
mod record_traits;

#[cfg(test)]
use std::path::{Path, PathBuf};

pub use build_spec::{BuildNumber, BuildNumberSpec, ParseBuildNumberSpecError};
pub use channel::{Channel, ChannelConfig, NamedChannelOrUrl, ParseChannelError};
pub use generic_virtual_package::GenericVirtualPackage;
pub use identity::{HasPKey, PKey};
pub use match_spec::{
    matcher::{StringMatcher, StringMatcherParseError},
    package_name_matcher::PackageNameMatcher,
    parse::ParseMatchSpecError,
    MatchSpec, Matches, NamelessMatchSpec,
};
pub use minimal_prefix_record::{
    collect_minimal_prefix_records, MinimalPrefixCollection, MinimalPrefixRecord,
};
pub use no_arch_type::{NoArchKind, NoArchType};
pub use package_name::{InvalidPackageNameError, PackageName};
pub use parse_mode::ParseStrictness;
pub use platform::{Arch, ParseArchError, ParsePlatformError, Platform};
pub use prefix_data::{PrefixData, PrefixDataError};
pub use prefix_record::PrefixRecord;
pub use package_cache_record::PackageCacheRecord;
pub use record_traits::HasArtifactIdentificationRefs;
pub use repo_data::{
    compute_package_url, ChannelInfo, ConvertSubdirError, PackageRecord, RepoData,
    ValidatePackageRecordsError,
};
pub use repo_data_record::RepoDataRecord;
pub use run_export::RunExportKind;
pub use version::{
    Component, ParseVersionError, ParseVersionErrorKind, StrictVersion, Version, VersionBumpError,
    VersionBumpType, VersionExtendError, VersionWithSource,
};
pub use version_spec::VersionSpec;

/// An package identifier that can be used to identify packages across package
/// ecosystems.
pub type PackageUrl = purl::GenericPurl<String>;

#[cfg(test)]
pub(crate) fn get_test_data_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../test-data")
}

/// Extracts a `.conda` or `.tar.bz2` package archive into `destination`.
/// A self-contained stand-in for `rattler_package_streaming::fs::extract`
/// (that crate lives above this one in the dependency graph) used only by
/// fixture-downloading tests.
#[cfg(test)]
pub(crate) fn extract_test_archive(archive: &std::path::Path, destination: &Path) {
    use std::fs::File;

    std::fs::create_dir_all(destination).unwrap();
    if archive
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("bz2"))
    {
        tar::Archive::new(bzip2::read::BzDecoder::new(File::open(archive).unwrap()))
            .unpack(destination)
            .unwrap();
        return;
    }

    let mut zip = zip::ZipArchive::new(File::open(archive).unwrap()).unwrap();
    for i in 0..zip.len() {
        let file = zip.by_index(i).unwrap();
        let is_payload = file
            .mangled_name()
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(".tar.zst"));
        if is_payload {
            let decoder = zstd::stream::read::Decoder::new(file).unwrap();
            tar::Archive::new(decoder).unpack(destination).unwrap();
        }
    }
}
