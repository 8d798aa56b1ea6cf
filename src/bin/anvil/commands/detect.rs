//! `anvil detect` command

use anyhow::Result;

use crate::cli::DetectArgs;
use anvil::ops::detect::{detect, format_detection, DetectOptions};
use anvil::GlobalContext;

pub fn execute(args: DetectArgs, gctx: &GlobalContext) -> Result<()> {
    let opts = DetectOptions {
        toolchain: args.toolchain,
        arch: args.arch,
    };
    let toolchain = detect(gctx, &opts)?;
    print!("{}", format_detection(&toolchain));
    Ok(())
}
