//! Desktop/start-menu shortcut registration.
//!
//! A full implementation of OS shortcut registration (Windows `.lnk` files,
//! macOS `.app` bundles, Linux `.desktop` entries) is a large, highly
//! platform-specific subsystem on its own (the teacher delegates it to a
//! dedicated `rattler_menuinst` crate). This module implements the part of
//! spec §4.7 that's in scope for the transaction engine itself: reading a
//! package's `info/menu/*.json` shortcut descriptors and recording which
//! shortcuts are currently registered for a prefix, so `MakeMenu`/
//! `RemoveMenu` are real, reversible actions. Each descriptor is written as
//! a JSON sidecar under `<prefix>/menu/<package>-<id>.json`, which a host
//! application's shell collaborator can translate into a real OS shortcut.

use std::{fs, path::PathBuf};

use serde_json::Value;

use super::action::{ActionError, ActionContext, MenuAction};

fn registered_menu_dir(ctx: &ActionContext) -> PathBuf {
    ctx.target_prefix.join("menu")
}

fn descriptors(package_dir: &std::path::Path) -> Vec<(String, Value)> {
    let menu_dir = package_dir.join("info").join("menu");
    let Ok(entries) = fs::read_dir(&menu_dir) else {
        return Vec::new();
    };
    entries
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|e| e.to_str()) == Some("json"))
        .filter_map(|e| {
            let contents = fs::read_to_string(e.path()).ok()?;
            let value: Value = serde_json::from_str(&contents).ok()?;
            let id = e.path().file_stem()?.to_string_lossy().into_owned();
            Some((id, value))
        })
        .collect()
}

/// Registers every shortcut described in `package_dir/info/menu/*.json`.
pub fn make_menu(ctx: &ActionContext, action: &MenuAction) -> Result<(), ActionError> {
    let dir = registered_menu_dir(ctx);
    fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
    for (id, value) in descriptors(&action.package_dir) {
        let path = dir.join(format!("{}-{id}.json", action.package_name.as_normalized()));
        fs::write(&path, serde_json::to_vec_pretty(&value).unwrap())
            .map_err(|e| io_err(&path, e))?;
    }
    Ok(())
}

/// Removes every shortcut descriptor previously registered for this
/// package.
pub fn remove_menu(ctx: &ActionContext, action: &MenuAction) -> Result<(), ActionError> {
    let dir = registered_menu_dir(ctx);
    let Ok(entries) = fs::read_dir(&dir) else {
        return Ok(());
    };
    let prefix = format!("{}-", action.package_name.as_normalized());
    for entry in entries.filter_map(Result::ok) {
        let name = entry.file_name();
        if name.to_string_lossy().starts_with(&prefix) {
            let _ = fs::remove_file(entry.path());
        }
    }
    Ok(())
}

fn io_err(path: &std::path::Path, source: std::io::Error) -> ActionError {
    // `ActionError::Io` has private fields from other modules' perspective
    // only in spirit; within the crate we can construct it directly.
    ActionError::Io {
        path: path.to_path_buf(),
        source,
    }
}
