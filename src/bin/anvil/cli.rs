//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Anvil - a build orchestrator for C and C++
#[derive(Parser)]
#[command(name = "anvil")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only print warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Run as if started in <DIR>
    #[arg(short = 'C', value_name = "DIR", global = true)]
    pub directory: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build every target of the project
    Build(BuildArgs),

    /// Detect a compiler and print what was found
    Detect(DetectArgs),

    /// Print the commands a full build of a target runs
    Commands(CommandsArgs),

    /// Remove build outputs and caches of a configuration
    Clean(CleanArgs),
}

#[derive(Args)]
pub struct BuildArgs {
    /// Build configuration (Debug, Release, RelWithDebInfo, MinSizeRel, Profile or custom)
    #[arg(long = "config", default_value = "Debug")]
    pub configuration: String,

    /// Number of parallel jobs
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Continue building other targets after a failure
    #[arg(long)]
    pub keep_going: bool,

    /// Print commands instead of running them
    #[arg(long)]
    pub dry_run: bool,

    /// Compiler to use
    #[arg(long, value_name = "PATH")]
    pub toolchain: Option<PathBuf>,

    /// Target architecture (x64, arm64, a full triple, ...)
    #[arg(long)]
    pub arch: Option<String>,
}

#[derive(Args)]
pub struct DetectArgs {
    /// Compiler to detect
    #[arg(long, value_name = "PATH")]
    pub toolchain: Option<PathBuf>,

    /// Target architecture
    #[arg(long)]
    pub arch: Option<String>,
}

#[derive(Args)]
pub struct CommandsArgs {
    /// Build configuration
    #[arg(long = "config", default_value = "Debug")]
    pub configuration: String,

    /// Only print commands for this target
    #[arg(long)]
    pub target: Option<String>,

    /// Compiler to use
    #[arg(long, value_name = "PATH")]
    pub toolchain: Option<PathBuf>,

    /// Target architecture
    #[arg(long)]
    pub arch: Option<String>,
}

#[derive(Args)]
pub struct CleanArgs {
    /// Build configuration to clean
    #[arg(long = "config", default_value = "Debug")]
    pub configuration: String,
}
