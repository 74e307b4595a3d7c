//! Appends a single revision entry to `conda-meta/history`.
//!
//! The heavy lifting (parsing, formatting, locating the file) lives in
//! [`rattler_conda_types::history`]; this module only adapts that API to the
//! path-action model's [`UpdateHistoryAction`] payload.

use rattler_conda_types::history::{History, Revision};

use super::action::{ActionContext, ActionError, UpdateHistoryAction};

/// Appends `action`'s revision to `<prefix>/conda-meta/history`.
pub fn append_revision(ctx: &ActionContext, action: &UpdateHistoryAction) -> Result<(), ActionError> {
    let history = History::new(&ctx.target_prefix);
    let revision = Revision {
        timestamp: action.timestamp.clone(),
        removed: action.removed.clone(),
        added: action.added.clone(),
    };

    let not_writable = || ActionError::DestinationNotWritable(history.path().to_path_buf());

    let mut writer = history.writer().map_err(|_| not_writable())?;

    if let Some(cmd) = &action.cmd {
        writer
            .write_comment(&format!("# cmd: {cmd}"))
            .map_err(|_| not_writable())?;
    }
    if !action.update_specs.is_empty() {
        writer
            .write_comment(&format!("# update specs: {:?}", action.update_specs))
            .map_err(|_| not_writable())?;
    }
    if !action.remove_specs.is_empty() {
        writer
            .write_comment(&format!("# remove specs: {:?}", action.remove_specs))
            .map_err(|_| not_writable())?;
    }
    if !action.neutered_specs.is_empty() {
        writer
            .write_comment(&format!("# neutered specs: {:?}", action.neutered_specs))
            .map_err(|_| not_writable())?;
    }

    writer.write_revision(&revision).map_err(|_| not_writable())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        collections::BTreeSet,
        sync::{Arc, Mutex},
    };

    #[test]
    fn append_revision_writes_header_and_diff() {
        let prefix = tempfile::tempdir().unwrap();
        let ctx = ActionContext {
            target_prefix: prefix.path().to_path_buf(),
            prefix_data: Arc::new(Mutex::new(
                rattler_conda_types::PrefixData::new(prefix.path()).unwrap(),
            )),
        };
        let action = UpdateHistoryAction {
            timestamp: "2026-01-01 00:00:00".to_string(),
            cmd: Some("conda install numpy".to_string()),
            added: BTreeSet::from(["numpy-1.26.0-py311h1234567_0".to_string()]),
            removed: BTreeSet::new(),
            update_specs: vec!["numpy".to_string()],
            remove_specs: Vec::new(),
            neutered_specs: Vec::new(),
        };

        append_revision(&ctx, &action).unwrap();

        let contents =
            std::fs::read_to_string(prefix.path().join("conda-meta").join("history")).unwrap();
        assert!(contents.contains("==> 2026-01-01 00:00:00 <=="));
        assert!(contents.contains("+numpy-1.26.0-py311h1234567_0"));
        assert!(contents.contains("# cmd: conda install numpy"));
    }
}
