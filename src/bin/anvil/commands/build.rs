//! `anvil build` command

use std::time::Instant;

use anyhow::Result;

use crate::cli::BuildArgs;
use anvil::ops::anvil_build::{build, BuildOptions};
use anvil::GlobalContext;

pub fn execute(args: BuildArgs, gctx: &GlobalContext) -> Result<()> {
    let ws = super::load_workspace(gctx, &args.configuration)?;
    let started = Instant::now();

    let opts = BuildOptions {
        jobs: args.jobs,
        keep_going: args.keep_going,
        dry_run: args.dry_run,
        toolchain: args.toolchain,
        arch: args.arch,
        quiet: gctx.is_quiet(),
        verbose: gctx.is_verbose(),
    };

    let summary = build(&ws, gctx, &opts)?;

    if !gctx.is_quiet() && !args.dry_run {
        if summary.up_to_date() {
            eprintln!("    Finished {} target(s) up to date", summary.targets);
        } else {
            for name in &summary.relinked {
                eprintln!("       Built {}", name);
            }
            eprintln!(
                "    Finished {} in {:.2}s",
                ws.configuration().name,
                started.elapsed().as_secs_f64()
            );
        }
    }

    Ok(())
}
