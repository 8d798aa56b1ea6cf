//! C/C++ build engine.
//!
//! Toolchain detection and command generation live in [`toolchain`], the
//! incremental source cache in [`cache`]. [`native`] and [`modules`] turn a
//! target into command-pool runs, and [`executor`] runs them.
//! [`compile_db`] writes `compile_commands.json` from the same commands.

pub mod cache;
pub mod compile_db;
pub mod context;
pub mod executor;
pub mod modules;
pub mod native;
pub mod plan;
pub mod toolchain;

pub use cache::SourceCache;
pub use context::{BuildRequest, BuildState};
pub use executor::{CommandPool, PoolSettings};
pub use modules::ModuleGenerator;
pub use native::{BuildSession, NativeGenerator};
pub use plan::{Cmd, Job, Target};
pub use toolchain::{CommandSpec, Controller, EnvSnapshot, ToolchainEnvironment, ToolchainType};
