//! Workspace - the project root and where its state lives.
//!
//! A Workspace ties a parsed manifest to its root directory and answers
//! every "where does this go" question outside the per-target layout in
//! [`BuildPaths`](crate::core::paths::BuildPaths).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

use crate::core::configuration::BuildConfiguration;
use crate::core::manifest::{Manifest, MANIFEST_NAME};

/// Errors locating a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("could not find `{}` in `{}` or any parent directory", MANIFEST_NAME, dir.display())]
    NotFound { dir: PathBuf },
}

/// Look for `Anvil.toml` in one directory.
pub fn find_manifest(dir: &Path) -> Result<PathBuf, ManifestError> {
    let path = dir.join(MANIFEST_NAME);
    if path.is_file() {
        Ok(path)
    } else {
        Err(ManifestError::NotFound {
            dir: dir.to_path_buf(),
        })
    }
}

/// A loaded project.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    manifest: Manifest,
    configuration: BuildConfiguration,
}

impl Workspace {
    /// Load the manifest at `manifest_path` and select a configuration.
    pub fn new(manifest_path: &Path, configuration: &str) -> Result<Self> {
        let manifest = Manifest::load(manifest_path)?;
        let root = manifest_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf();
        let root = root
            .canonicalize()
            .with_context(|| format!("failed to resolve {}", root.display()))?;

        let configuration = manifest.configuration(configuration)?;

        Ok(Workspace {
            root,
            manifest,
            configuration,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn configuration(&self) -> &BuildConfiguration {
        &self.configuration
    }

    /// Build directory relative to the root (`build` unless overridden).
    pub fn build_dir_name(&self) -> String {
        self.manifest
            .workspace
            .build_dir
            .as_deref()
            .map(crate::util::fs::unix_path)
            .unwrap_or_else(|| "build".to_string())
    }

    /// Absolute build directory.
    pub fn build_dir(&self) -> PathBuf {
        self.root.join(self.build_dir_name())
    }

    /// Absolute output directory of the selected configuration.
    pub fn output_dir(&self) -> PathBuf {
        self.build_dir().join(&self.configuration.name)
    }

    /// The `.anvil` state directory.
    pub fn anvil_dir(&self) -> PathBuf {
        self.root.join(".anvil")
    }

    /// Cache directory for one configuration and target triple.
    pub fn cache_dir(&self, triple: &str) -> PathBuf {
        self.anvil_dir()
            .join("cache")
            .join(format!("{}_{}", self.configuration.name, triple))
    }

    /// Directory for toolchain probe results (macro dumps, flag lists,
    /// environment deltas). Shared by every configuration.
    pub fn toolchain_cache_dir(&self) -> PathBuf {
        self.anvil_dir().join("toolchains")
    }
}
