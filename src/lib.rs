//! Anvil - a build orchestrator for C and C++
//!
//! This crate provides the core library functionality for Anvil:
//! toolchain detection and classification, per-toolchain command
//! generation, incremental change detection, C++ module scheduling and
//! a parallel command pool.

pub mod builder;
pub mod core;
pub mod ops;
pub mod util;

/// Test utilities for Anvil unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests. It provides project fixtures and a canned-output probe
/// for toolchain detection.
#[cfg(test)]
pub mod test_support;

pub use core::{manifest::Manifest, target::SourceTarget, workspace::Workspace};

pub use util::context::GlobalContext;
