//! Generates launcher scripts for `noarch: python` entry points.
//!
//! On Unix a launcher is a shebang script that re-execs the interpreter with
//! the entry point's module/function. On Windows it's a small batch wrapper;
//! a "real" conda also drops a compiled `.exe` stub next to it so Windows'
//! PATH resolution picks up the command without an extension, which is out
//! of scope here: the `.bat` wrapper is functionally sufficient and keeps
//! this module free of a vendored binary blob.

use std::fs;

use super::action::{ActionContext, ActionError, EntryPointAction};

fn script_body(action: &EntryPointAction) -> String {
    let ep = &action.entry_point;
    format!(
        "import sys\nfrom {module} import {function}\nif __name__ == \"__main__\":\n    sys.exit({function}())\n",
        module = ep.module,
        function = ep.function,
    )
}

#[cfg(unix)]
fn write_launcher(ctx: &ActionContext, action: &EntryPointAction) -> Result<std::path::PathBuf, ActionError> {
    use std::os::unix::fs::PermissionsExt;

    let path = ctx.resolve(&action.bin_dir.join(&action.entry_point.command));
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let contents = format!(
        "#!{interpreter}\n{body}",
        interpreter = action.python_executable.display(),
        body = script_body(action)
    );
    fs::write(&path, contents).map_err(|e| io_err(&path, e))?;

    let mut perms = fs::metadata(&path).map_err(|e| io_err(&path, e))?.permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).map_err(|e| io_err(&path, e))?;

    Ok(path)
}

#[cfg(not(unix))]
fn write_launcher(ctx: &ActionContext, action: &EntryPointAction) -> Result<std::path::PathBuf, ActionError> {
    let path = ctx.resolve(&action.bin_dir.join(format!("{}-script.py", action.entry_point.command)));
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    fs::write(&path, script_body(action)).map_err(|e| io_err(&path, e))?;

    let bat_path = ctx.resolve(&action.bin_dir.join(format!("{}.bat", action.entry_point.command)));
    let bat_contents = format!(
        "@\"{python}\" \"%~dp0\\{name}-script.py\" %*\r\n",
        python = action.python_executable.display(),
        name = action.entry_point.command,
    );
    fs::write(&bat_path, bat_contents).map_err(|e| io_err(&bat_path, e))?;

    Ok(bat_path)
}

/// Writes the launcher script (and, on Windows, its `.bat` wrapper) for one
/// entry point.
pub fn create_entry_point(ctx: &ActionContext, action: &EntryPointAction) -> Result<(), ActionError> {
    write_launcher(ctx, action)?;
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
    use rattler_conda_types::package::EntryPoint;
    use std::{
        str::FromStr,
        sync::{Arc, Mutex},
    };

    #[test]
    #[cfg(unix)]
    fn create_entry_point_writes_executable_script() {
        let prefix = tempfile::tempdir().unwrap();
        let ctx = ActionContext {
            target_prefix: prefix.path().to_path_buf(),
            prefix_data: Arc::new(Mutex::new(
                rattler_conda_types::PrefixData::new(prefix.path()).unwrap(),
            )),
        };
        let action = EntryPointAction {
            entry_point: EntryPoint::from_str("foo = foo.cli:main").unwrap(),
            python_executable: prefix.path().join("bin").join("python"),
            bin_dir: std::path::PathBuf::from("bin"),
        };

        create_entry_point(&ctx, &action).unwrap();

        let script = prefix.path().join("bin").join("foo");
        assert!(script.is_file());
        let contents = std::fs::read_to_string(&script).unwrap();
        assert!(contents.starts_with("#!"));
        assert!(contents.contains("from foo.cli import main"));

        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&script).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
    }
}
