mod test_files;

pub use test_files::{
    download_and_cache_file, download_and_cache_file_async, fetch_test_conda_forge_repodata,
    fetch_test_conda_forge_repodata_async, test_data_dir,
};

use std::path::{Path, PathBuf};

/// Returns the path to the Cargo manifest directory (or the root of the workspace).
pub fn project_root() -> PathBuf {
    Path::new(&env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .unwrap()
        .to_path_buf()
}
