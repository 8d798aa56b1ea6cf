//! Command implementations

pub mod build;
pub mod clean;
pub mod commands;
pub mod detect;

use anyhow::Result;

use anvil::core::Workspace;
use anvil::GlobalContext;

/// Load the project around the working directory.
fn load_workspace(gctx: &GlobalContext, configuration: &str) -> Result<Workspace> {
    let manifest_path = gctx.find_manifest()?;
    Workspace::new(&manifest_path, configuration)
}
