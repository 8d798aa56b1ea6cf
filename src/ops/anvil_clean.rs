//! Implementation of `anvil clean`.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::core::Workspace;
use crate::util::fs::remove_dir_all_if_exists;

/// What `clean` removed.
#[derive(Debug, Default)]
pub struct CleanResult {
    pub removed: Vec<PathBuf>,
}

/// Remove the output directory of the selected configuration and every
/// source cache recorded for it, whatever triple it was built for.
pub fn clean(ws: &Workspace) -> Result<CleanResult> {
    let mut removed = Vec::new();

    let output_dir = ws.output_dir();
    if output_dir.exists() {
        remove_dir_all_if_exists(&output_dir)?;
        removed.push(output_dir);
    }

    let cache_root = ws.anvil_dir().join("cache");
    if cache_root.is_dir() {
        let prefix = format!("{}_", ws.configuration().name);
        let entries = std::fs::read_dir(&cache_root)
            .with_context(|| format!("failed to read {}", cache_root.display()))?;
        for entry in entries {
            let entry = entry.with_context(|| format!("failed to read {}", cache_root.display()))?;
            let matches = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(&prefix));
            if matches && entry.path().is_dir() {
                remove_dir_all_if_exists(&entry.path())?;
                removed.push(entry.path());
            }
        }
    }

    tracing::debug!("removed {} path(s)", removed.len());
    Ok(CleanResult { removed })
}
