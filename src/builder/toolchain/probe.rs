//! Running toolchain executables for information.
//!
//! Everything the environment layer learns from the outside world goes
//! through [`Probe`], so detection logic can be tested with canned output.

use std::path::Path;

use anyhow::Result;

use super::env::EnvSnapshot;
use crate::util::process::ProcessBuilder;

/// Source of subprocess output and filesystem facts.
pub trait Probe: Send + Sync {
    /// Run `argv` and return stdout followed by stderr. A non-zero exit is
    /// not an error; compilers print version banners on failing runs.
    fn output(&self, argv: &[String], cwd: Option<&Path>) -> Result<String>;

    /// Run `argv` with an explicit environment instead of the probe's own.
    fn output_in(&self, argv: &[String], cwd: Option<&Path>, _env: &EnvSnapshot) -> Result<String> {
        self.output(argv, cwd)
    }

    /// Whether a file or directory exists.
    fn exists(&self, path: &Path) -> bool;
}

/// A probe whose commands run in a toolchain's prepared environment.
pub struct ScopedProbe<'a> {
    inner: &'a dyn Probe,
    env: &'a EnvSnapshot,
}

impl<'a> ScopedProbe<'a> {
    pub fn new(inner: &'a dyn Probe, env: &'a EnvSnapshot) -> Self {
        ScopedProbe { inner, env }
    }
}

impl Probe for ScopedProbe<'_> {
    fn output(&self, argv: &[String], cwd: Option<&Path>) -> Result<String> {
        self.inner.output_in(argv, cwd, self.env)
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }
}

/// Probe backed by real processes and the real filesystem.
#[derive(Debug, Clone)]
pub struct SystemProbe {
    env: EnvSnapshot,
}

impl SystemProbe {
    pub fn new(env: EnvSnapshot) -> Self {
        SystemProbe { env }
    }
}

impl Probe for SystemProbe {
    fn output(&self, argv: &[String], cwd: Option<&Path>) -> Result<String> {
        self.output_in(argv, cwd, &self.env)
    }

    fn output_in(&self, argv: &[String], cwd: Option<&Path>, env: &EnvSnapshot) -> Result<String> {
        let mut process = ProcessBuilder::from_argv(argv)?
            .clear_env()
            .envs(env.vars().iter());
        if let Some(cwd) = cwd {
            process = process.cwd(cwd);
        }
        tracing::debug!("probe: {}", process.display_command());
        process.exec_to_string()
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}
