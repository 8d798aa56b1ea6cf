//! Core data structures for Anvil.
//!
//! This module contains the foundational types used throughout Anvil:
//! - Host platform and target architectures
//! - Build configurations and source targets
//! - The manifest and workspace
//! - The build directory layout

pub mod arch;
pub mod configuration;
pub mod manifest;
pub mod paths;
pub mod source;
pub mod target;
pub mod workspace;

pub use arch::{Arch, Cpu, HostPlatform};
pub use configuration::{BuildConfiguration, OptimizationLevel, Sanitizer};
pub use manifest::{Manifest, MANIFEST_NAME};
pub use paths::{BuildPaths, OutputNaming, StrategyType};
pub use source::{SourceDataType, SourceFileGroup, SourceOutputs, SourceType};
pub use target::{SourceTarget, TargetKind};
pub use workspace::{find_manifest, Workspace};
