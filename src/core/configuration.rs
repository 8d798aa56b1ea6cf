//! Build configurations (Debug, Release, ...).

use serde::{Deserialize, Serialize};

/// Requested optimization level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OptimizationLevel {
    #[serde(rename = "0", alias = "none")]
    None,
    #[serde(rename = "1")]
    L1,
    #[serde(rename = "2")]
    L2,
    #[serde(rename = "3")]
    L3,
    #[serde(rename = "debug", alias = "g")]
    Debug,
    #[serde(rename = "size", alias = "s")]
    Size,
    #[serde(rename = "fast")]
    Fast,
    #[default]
    #[serde(rename = "default")]
    CompilerDefault,
}

/// Runtime sanitizers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sanitizer {
    Address,
    #[serde(rename = "hwaddress")]
    HardwareAddress,
    Thread,
    Memory,
    Leak,
    #[serde(rename = "undefined")]
    UndefinedBehavior,
}

impl Sanitizer {
    /// Spelling used by `-fsanitize=`.
    pub fn as_flag(&self) -> &'static str {
        match self {
            Sanitizer::Address => "address",
            Sanitizer::HardwareAddress => "hwaddress",
            Sanitizer::Thread => "thread",
            Sanitizer::Memory => "memory",
            Sanitizer::Leak => "leak",
            Sanitizer::UndefinedBehavior => "undefined",
        }
    }
}

/// One named build configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BuildConfiguration {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub optimization_level: OptimizationLevel,
    #[serde(default)]
    pub debug_symbols: bool,
    #[serde(default)]
    pub enable_profiling: bool,
    #[serde(default, alias = "lto")]
    pub interprocedural_optimization: bool,
    #[serde(default)]
    pub sanitizers: Vec<Sanitizer>,
}

impl BuildConfiguration {
    fn preset(name: &str, level: OptimizationLevel, debug: bool) -> Self {
        BuildConfiguration {
            name: name.to_string(),
            optimization_level: level,
            debug_symbols: debug,
            enable_profiling: false,
            interprocedural_optimization: false,
            sanitizers: Vec::new(),
        }
    }

    /// Look up one of the built-in configurations by name.
    pub fn builtin(name: &str) -> Option<Self> {
        let config = match name {
            "Debug" => Self::preset(name, OptimizationLevel::None, true),
            "Release" => Self::preset(name, OptimizationLevel::L2, false),
            "RelWithDebInfo" => Self::preset(name, OptimizationLevel::L2, true),
            "MinSizeRel" => Self::preset(name, OptimizationLevel::Size, false),
            "Profile" => {
                let mut config = Self::preset(name, OptimizationLevel::None, true);
                config.enable_profiling = true;
                config
            }
            _ => return None,
        };
        Some(config)
    }

    /// Names of the built-in configurations.
    pub fn builtin_names() -> &'static [&'static str] {
        &["Debug", "Release", "RelWithDebInfo", "MinSizeRel", "Profile"]
    }

    pub fn enable_sanitizers(&self) -> bool {
        !self.sanitizers.is_empty()
    }

    pub fn sanitizes(&self, sanitizer: Sanitizer) -> bool {
        self.sanitizers.contains(&sanitizer)
    }

    /// Debug symbols with a level that would contradict them.
    ///
    /// Compilers must then be forced to `-O0` / `/Od`.
    pub fn debug_forces_no_optimization(&self) -> bool {
        self.debug_symbols
            && !matches!(
                self.optimization_level,
                OptimizationLevel::Debug | OptimizationLevel::None | OptimizationLevel::CompilerDefault
            )
    }
}
