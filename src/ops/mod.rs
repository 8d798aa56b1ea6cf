//! High-level operations.
//!
//! This module contains the implementation of Anvil commands.

pub mod anvil_build;
pub mod anvil_clean;
pub mod commands;
pub mod detect;

pub use anvil_build::{build, build_with_state, BuildOptions, BuildSummary};
pub use anvil_clean::{clean, CleanResult};
pub use commands::{commands, select_targets, target_commands, CommandsOptions};
pub use detect::{detect, format_detection, DetectOptions};
