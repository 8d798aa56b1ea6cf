//! Anvil.toml manifest parsing and schema.
//!
//! ```toml
//! [workspace]
//! name = "demo"
//!
//! [toolchain]
//! cxx = "clang++"
//! max-jobs = 8
//!
//! [configuration.Fastest]
//! optimization-level = "fast"
//!
//! [[target]]
//! name = "app"
//! files = ["src/**/*.cpp"]
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::configuration::BuildConfiguration;
use crate::core::paths::StrategyType;
use crate::core::target::SourceTarget;

/// Canonical manifest filename.
pub const MANIFEST_NAME: &str = "Anvil.toml";

/// `[workspace]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WorkspaceConfig {
    #[serde(default)]
    pub name: String,

    /// Build directory relative to the workspace root (default `build`)
    #[serde(default)]
    pub build_dir: Option<PathBuf>,
}

/// `[toolchain]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ToolchainSection {
    #[serde(default)]
    pub cc: Option<PathBuf>,
    #[serde(default)]
    pub cxx: Option<PathBuf>,
    #[serde(default)]
    pub ar: Option<PathBuf>,
    #[serde(default)]
    pub linker: Option<PathBuf>,
    #[serde(default)]
    pub rc: Option<PathBuf>,
    #[serde(default)]
    pub arch: Option<String>,
    #[serde(default)]
    pub strategy: StrategyType,
    #[serde(default)]
    pub max_jobs: Option<usize>,
    #[serde(default)]
    pub keep_going: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawManifest {
    #[serde(default)]
    workspace: WorkspaceConfig,
    #[serde(default)]
    toolchain: ToolchainSection,
    #[serde(default)]
    configuration: BTreeMap<String, BuildConfiguration>,
    #[serde(default)]
    target: Vec<SourceTarget>,
}

/// A parsed and validated project manifest.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub workspace: WorkspaceConfig,
    pub toolchain: ToolchainSection,
    configurations: BTreeMap<String, BuildConfiguration>,
    targets: Vec<SourceTarget>,
}

impl Manifest {
    /// Load a manifest from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest: {}", path.display()))?;

        Self::parse(&content, path)
    }

    /// Parse manifest content.
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let raw: RawManifest = toml::from_str(content)
            .with_context(|| format!("failed to parse {}", path.display()))?;

        if raw.target.is_empty() {
            bail!("manifest at {} declares no [[target]]", path.display());
        }
        if raw.toolchain.strategy != StrategyType::Native {
            bail!(
                "unsupported strategy '{}' in {}: only 'native' builds can be run",
                raw.toolchain.strategy.as_str(),
                path.display()
            );
        }

        let mut configurations = raw.configuration;
        for (name, config) in configurations.iter_mut() {
            if config.name.is_empty() {
                config.name = name.clone();
            }
        }

        let mut targets = raw.target;
        Self::resolve_targets(&mut targets)?;

        Ok(Manifest {
            workspace: raw.workspace,
            toolchain: raw.toolchain,
            configurations,
            targets,
        })
    }

    /// Validate targets and split their links into project and external ones.
    ///
    /// Targets are built in declaration order, so a target may only link
    /// against targets declared before it.
    fn resolve_targets(targets: &mut [SourceTarget]) -> Result<()> {
        let mut seen = BTreeSet::new();
        let mut static_targets = BTreeSet::new();
        let mut shared_targets = BTreeSet::new();

        let all_names: BTreeSet<String> = targets.iter().map(|t| t.name.clone()).collect();

        for target in targets.iter_mut() {
            target.validate()?;
            if !seen.insert(target.name.clone()) {
                bail!("duplicate target name '{}'", target.name);
            }

            for link in target.links.iter().chain(target.static_links.iter()) {
                if all_names.contains(link)
                    && !static_targets.contains(link)
                    && !shared_targets.contains(link)
                {
                    bail!(
                        "target '{}' links against '{}', which is declared after it",
                        target.name,
                        link
                    );
                }
            }

            target.resolve_project_links(&static_targets, &shared_targets)?;

            if target.is_static_library() {
                static_targets.insert(target.name.clone());
            } else if target.is_shared_library() {
                shared_targets.insert(target.name.clone());
            }
        }
        Ok(())
    }

    /// Targets in declaration order.
    pub fn targets(&self) -> &[SourceTarget] {
        &self.targets
    }

    pub fn target(&self, name: &str) -> Option<&SourceTarget> {
        self.targets.iter().find(|t| t.name == name)
    }

    /// Look up a configuration: custom ones shadow the built-in set.
    pub fn configuration(&self, name: &str) -> Result<BuildConfiguration> {
        if let Some(config) = self.configurations.get(name) {
            return Ok(config.clone());
        }
        match BuildConfiguration::builtin(name) {
            Some(config) => Ok(config),
            None => {
                let mut known: Vec<&str> = BuildConfiguration::builtin_names().to_vec();
                known.extend(self.configurations.keys().map(String::as_str));
                bail!(
                    "unknown build configuration '{}' (available: {})",
                    name,
                    known.join(", ")
                )
            }
        }
    }

    /// Names of every configuration this manifest can build.
    pub fn configuration_names(&self) -> Vec<String> {
        let mut names: Vec<String> = BuildConfiguration::builtin_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        for name in self.configurations.keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }
}
