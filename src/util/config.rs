//! Toolchain override files.
//!
//! Two locations are read and merged:
//! - Global: `<config dir>/anvil/toolchain.toml`
//! - Project: `.anvil/toolchain.toml`
//!
//! Project settings override global ones, and `CC`/`CXX`/`AR`/`LD`/`RC`
//! from the environment snapshot override both.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Contents of a `toolchain.toml` file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    pub toolchain: ToolchainSettings,
}

/// Executable overrides for one toolchain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ToolchainSettings {
    /// C compiler (e.g. /usr/bin/clang)
    pub cc: Option<PathBuf>,

    /// C++ compiler (e.g. /usr/bin/clang++)
    pub cxx: Option<PathBuf>,

    /// Archiver (ar, llvm-ar, libtool, lib)
    pub ar: Option<PathBuf>,

    /// Linker (ld, lld, link); empty means the compiler driver links
    pub linker: Option<PathBuf>,

    /// Windows resource compiler
    pub rc: Option<PathBuf>,

    /// Target architecture or triple
    pub arch: Option<String>,
}

impl ToolchainConfig {
    /// Load toolchain configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read toolchain config: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse toolchain config: {}", path.display()))
    }

    /// Load from a file, falling back to defaults when missing or broken.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!(
                    "Failed to load toolchain config from {}: {:#}",
                    path.display(),
                    e
                );
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Save to a file, creating the parent directory.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .with_context(|| "failed to serialize toolchain config")?;
        crate::util::fs::write_string(path, &contents)
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: ToolchainConfig) {
        let ours = &mut self.toolchain;
        let theirs = other.toolchain;
        if theirs.cc.is_some() {
            ours.cc = theirs.cc;
        }
        if theirs.cxx.is_some() {
            ours.cxx = theirs.cxx;
        }
        if theirs.ar.is_some() {
            ours.ar = theirs.ar;
        }
        if theirs.linker.is_some() {
            ours.linker = theirs.linker;
        }
        if theirs.rc.is_some() {
            ours.rc = theirs.rc;
        }
        if theirs.arch.is_some() {
            ours.arch = theirs.arch;
        }
    }

    /// Apply `CC`, `CXX`, `AR`, `LD` and `RC` from an environment map.
    pub fn apply_env(&mut self, vars: &BTreeMap<String, String>) {
        let pick = |key: &str| {
            vars.get(key)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
        };
        if let Some(cc) = pick("CC") {
            self.toolchain.cc = Some(cc);
        }
        if let Some(cxx) = pick("CXX") {
            self.toolchain.cxx = Some(cxx);
        }
        if let Some(ar) = pick("AR") {
            self.toolchain.ar = Some(ar);
        }
        if let Some(ld) = pick("LD") {
            self.toolchain.linker = Some(ld);
        }
        if let Some(rc) = pick("RC") {
            self.toolchain.rc = Some(rc);
        }
    }

    /// Check if any toolchain settings are configured.
    pub fn has_overrides(&self) -> bool {
        self.toolchain != ToolchainSettings::default()
    }
}

/// Load merged toolchain configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.anvil/toolchain.toml)
/// 2. Global config
/// 3. Defaults
pub fn load_toolchain_config(global_path: Option<&Path>, project_path: &Path) -> ToolchainConfig {
    let mut config = ToolchainConfig::default();

    if let Some(global_path) = global_path {
        config.merge(ToolchainConfig::load_or_default(global_path));
    }
    config.merge(ToolchainConfig::load_or_default(project_path));

    config
}

/// Global anvil config directory.
pub fn global_config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "anvil").map(|d| d.config_dir().to_path_buf())
}

/// Global toolchain config path.
pub fn global_toolchain_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("toolchain.toml"))
}

/// Project toolchain config path (.anvil/toolchain.toml).
pub fn project_toolchain_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".anvil").join("toolchain.toml")
}
