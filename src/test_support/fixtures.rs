//! Test fixtures for common test scenarios.
//!
//! This module provides pre-built project layouts and a canned-output
//! [`Probe`] for exercising toolchain detection without real compilers.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Result};

use crate::builder::toolchain::Probe;

/// Fixture for a complete project structure.
#[derive(Debug, Clone)]
pub struct ProjectFixture {
    /// Anvil.toml content.
    pub manifest: String,
    /// Files (path relative to project root -> content).
    pub files: BTreeMap<PathBuf, String>,
}

impl ProjectFixture {
    /// Create a new empty project fixture.
    pub fn new(manifest: impl Into<String>) -> Self {
        ProjectFixture {
            manifest: manifest.into(),
            files: BTreeMap::new(),
        }
    }

    /// An executable with two sources.
    pub fn executable(name: &str) -> Self {
        Self::new(format!(
            r#"[workspace]
name = "{name}"

[[target]]
name = "{name}"
files = ["src/*.cpp"]
"#
        ))
        .with_file("src/main.cpp", sources::MAIN_CPP)
        .with_file("src/util.cpp", sources::UTIL_CPP)
        .with_file("src/util.hpp", sources::UTIL_HPP)
    }

    /// A static library plus an executable linking it.
    pub fn library_and_app() -> Self {
        Self::new(
            r#"[workspace]
name = "libapp"

[[target]]
name = "core"
kind = "static-library"
files = ["core/*.cpp"]

[[target]]
name = "app"
files = ["app/*.cpp"]
include-dirs = ["core"]
static-links = ["core"]
"#,
        )
        .with_file("core/core.cpp", sources::UTIL_CPP)
        .with_file("core/util.hpp", sources::UTIL_HPP)
        .with_file("app/main.cpp", sources::MAIN_CPP)
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }

    /// Write the project to disk. Returns the manifest path.
    pub fn write_to(&self, base_path: &Path) -> std::io::Result<PathBuf> {
        let manifest_path = base_path.join("Anvil.toml");
        std::fs::write(&manifest_path, &self.manifest)?;
        for (path, content) in &self.files {
            let full = base_path.join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(full, content)?;
        }
        Ok(manifest_path)
    }
}

/// Source file contents.
pub mod sources {
    pub const MAIN_CPP: &str = "#include \"util.hpp\"\nint main() { return util(); }\n";
    pub const UTIL_CPP: &str = "#include \"util.hpp\"\nint util() { return 0; }\n";
    pub const UTIL_HPP: &str = "#pragma once\nint util();\n";
}

/// A [`Probe`] answering from a table of canned outputs.
///
/// Commands are keyed by their argv joined with single spaces. A command
/// without a canned answer fails, like a missing executable would.
#[derive(Debug, Default)]
pub struct FakeProbe {
    outputs: BTreeMap<String, String>,
    paths: BTreeSet<PathBuf>,
    calls: Mutex<Vec<String>>,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, command: &str, output: &str) -> Self {
        self.outputs.insert(command.to_string(), output.to_string());
        self
    }

    /// Mark a path (and so every parent) as existing.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths.insert(path.into());
        self
    }

    /// Commands run so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Probe for FakeProbe {
    fn output(&self, argv: &[String], _cwd: Option<&Path>) -> Result<String> {
        let key = argv.join(" ");
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(key.clone());
        }
        match self.outputs.get(&key) {
            Some(output) => Ok(output.clone()),
            None => bail!("failed to spawn `{}`", key),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        self.paths.iter().any(|p| p.starts_with(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_project_fixture_write() {
        let tmp = TempDir::new().unwrap();
        let manifest = ProjectFixture::executable("demo")
            .write_to(tmp.path())
            .unwrap();
        assert!(manifest.exists());
        assert!(tmp.path().join("src/main.cpp").exists());
    }

    #[test]
    fn test_fake_probe() {
        let probe = FakeProbe::new()
            .with_output("gcc -dumpmachine", "x86_64-linux-gnu")
            .with_path("/usr/lib/gcc/x86_64-linux-gnu/13");

        let argv = vec!["gcc".to_string(), "-dumpmachine".to_string()];
        assert_eq!(probe.output(&argv, None).unwrap(), "x86_64-linux-gnu");
        assert!(probe.output(&["clang".to_string()], None).is_err());
        assert!(probe.exists(Path::new("/usr/lib/gcc/x86_64-linux-gnu")));
        assert!(!probe.exists(Path::new("/usr/lib/gcc-cross")));
        assert_eq!(probe.calls().len(), 2);
    }
}
