//! Maintains `~/.conda/environments.txt`, the flat registry of known prefix
//! locations that tools like `conda env list` read.
//!
//! Entries are plain absolute prefix paths, one per line. Registration is
//! idempotent (re-adding an already-registered prefix is a no-op) and
//! unregistration tolerates a missing file or a missing entry, since both
//! are reachable states (e.g. the registry was deleted by hand).

use std::{
    fs,
    io::Write,
};

use super::action::{ActionError, EnvironmentsTxtAction};

fn read_entries(path: &std::path::Path) -> Vec<String> {
    fs::read_to_string(path)
        .map(|contents| {
            contents
                .lines()
                .map(str::to_string)
                .filter(|l| !l.trim().is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn write_entries(path: &std::path::Path, entries: &[String]) -> Result<(), ActionError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let mut file = fs::File::create(path).map_err(|e| io_err(path, e))?;
    for entry in entries {
        writeln!(file, "{entry}").map_err(|e| io_err(path, e))?;
    }
    Ok(())
}

/// Adds `action.prefix` to the registry, unless it's already present.
pub fn register(action: &EnvironmentsTxtAction) -> Result<(), ActionError> {
    let mut entries = read_entries(&action.environments_txt);
    let prefix = action.prefix.display().to_string();
    if !entries.iter().any(|e| e == &prefix) {
        entries.push(prefix);
        write_entries(&action.environments_txt, &entries)?;
    }
    Ok(())
}

/// Removes `action.prefix` from the registry, if present.
pub fn unregister(action: &EnvironmentsTxtAction) -> Result<(), ActionError> {
    let mut entries = read_entries(&action.environments_txt);
    let prefix = action.prefix.display().to_string();
    let before = entries.len();
    entries.retain(|e| e != &prefix);
    if entries.len() != before {
        write_entries(&action.environments_txt, &entries)?;
    }
    Ok(())
}

fn io_err(path: &std::path::Path, source: std::io::Error) -> ActionError {
    ActionError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let registry = dir.path().join("environments.txt");
        let action = EnvironmentsTxtAction {
            environments_txt: registry.clone(),
            prefix: dir.path().join("envs").join("foo"),
        };

        register(&action).unwrap();
        register(&action).unwrap();

        let contents = fs::read_to_string(&registry).unwrap();
        assert_eq!(contents.lines().count(), 1);
    }

    #[test]
    fn unregister_removes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let registry = dir.path().join("environments.txt");
        let action = EnvironmentsTxtAction {
            environments_txt: registry.clone(),
            prefix: dir.path().join("envs").join("foo"),
        };

        register(&action).unwrap();
        unregister(&action).unwrap();

        let contents = fs::read_to_string(&registry).unwrap();
        assert!(contents.trim().is_empty());
    }

    #[test]
    fn unregister_missing_file_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let action = EnvironmentsTxtAction {
            environments_txt: dir.path().join("does-not-exist.txt"),
            prefix: dir.path().join("envs").join("foo"),
        };
        unregister(&action).unwrap();
    }
}
