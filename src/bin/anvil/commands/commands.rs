//! `anvil commands` command

use anyhow::Result;

use crate::cli::CommandsArgs;
use anvil::ops::commands::{commands, CommandsOptions};
use anvil::GlobalContext;

pub fn execute(args: CommandsArgs, gctx: &GlobalContext) -> Result<()> {
    let ws = super::load_workspace(gctx, &args.configuration)?;
    let opts = CommandsOptions {
        target: args.target,
        toolchain: args.toolchain,
        arch: args.arch,
    };

    let plans = commands(&ws, gctx, &opts)?;
    for (i, plan) in plans.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("# {}", plan.name);
        for cmd in plan.commands() {
            println!("{}", cmd.display());
        }
    }
    Ok(())
}
