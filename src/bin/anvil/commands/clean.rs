//! `anvil clean` command

use anyhow::Result;

use crate::cli::CleanArgs;
use anvil::ops::anvil_clean::clean;
use anvil::GlobalContext;

pub fn execute(args: CleanArgs, gctx: &GlobalContext) -> Result<()> {
    let ws = super::load_workspace(gctx, &args.configuration)?;
    let result = clean(&ws)?;

    if !gctx.is_quiet() {
        if result.removed.is_empty() {
            eprintln!("     Nothing to clean");
        }
        for path in &result.removed {
            eprintln!("     Removed {}", path.display());
        }
    }

    Ok(())
}
