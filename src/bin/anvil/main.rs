//! Anvil CLI - a build orchestrator for C and C++

use std::io::IsTerminal;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use anvil::util::diagnostic::{emit, Diagnostic};
use anvil::GlobalContext;
use cli::{Cli, Commands};

fn main() {
    if let Err(e) = run() {
        emit(&Diagnostic::from_error(&e), std::io::stderr().is_terminal());
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    // Parse CLI
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("anvil=debug")
    } else if cli.quiet {
        EnvFilter::new("anvil=warn")
    } else {
        EnvFilter::new("anvil=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_ansi(!cli.no_color)
        .with_writer(std::io::stderr)
        .init();

    let mut gctx = match &cli.directory {
        Some(dir) => {
            let dir = dir
                .canonicalize()
                .with_context(|| format!("failed to change to directory {}", dir.display()))?;
            GlobalContext::with_cwd(dir)?
        }
        None => GlobalContext::new()?,
    };
    gctx.set_verbose(cli.verbose);
    gctx.set_quiet(cli.quiet);
    gctx.set_color(!cli.no_color);

    // Execute command
    match cli.command {
        Commands::Build(args) => commands::build::execute(args, &gctx),
        Commands::Detect(args) => commands::detect::execute(args, &gctx),
        Commands::Commands(args) => commands::commands::execute(args, &gctx),
        Commands::Clean(args) => commands::clean::execute(args, &gctx),
    }
}
