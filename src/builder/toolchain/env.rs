//! Environment snapshots.
//!
//! The process environment is captured once at startup. Toolchain setup
//! scripts (vcvarsall, Intel setvars, emsdk_env) are run against that
//! snapshot and their effect is stored as an [`EnvDelta`]; every subprocess
//! is then spawned from `snapshot + delta`. The live process environment is
//! never modified.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::util::fs::{read_to_string, write_string};

fn is_path_key(key: &str) -> bool {
    key.eq_ignore_ascii_case("PATH")
}

/// An ordered copy of environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
}

impl EnvSnapshot {
    /// Capture the current process environment.
    pub fn capture() -> Self {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        EnvSnapshot {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Parse `KEY=VALUE` lines, as printed by `env` or `set`.
    pub fn parse(text: &str) -> Self {
        let mut vars = BTreeMap::new();
        for line in text.lines() {
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                if !key.is_empty() && !key.contains(' ') {
                    vars.insert(key.to_string(), value.trim_end_matches('\r').to_string());
                }
            }
        }
        EnvSnapshot { vars }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .or_else(|| {
                self.vars
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(key))
                    .map(|(_, v)| v)
            })
            .map(String::as_str)
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    pub fn path_var(&self) -> Option<&str> {
        self.get("PATH")
    }

    fn path_key(&self) -> String {
        self.vars
            .keys()
            .find(|k| is_path_key(k))
            .cloned()
            .unwrap_or_else(|| "PATH".to_string())
    }

    /// Apply a delta. A delta `PATH` is prepended to the existing `PATH`.
    pub fn with_delta(&self, delta: &EnvDelta, separator: char) -> EnvSnapshot {
        let mut vars = self.vars.clone();
        for (key, value) in &delta.vars {
            if is_path_key(key) {
                let path_key = self.path_key();
                let merged = match self.path_var() {
                    Some(existing) if !existing.is_empty() => {
                        format!("{}{}{}", value, separator, existing)
                    }
                    _ => value.clone(),
                };
                vars.insert(path_key, merged);
            } else {
                vars.insert(key.clone(), value.clone());
            }
        }
        EnvSnapshot { vars }
    }

    /// Resolve an executable name against this snapshot's `PATH`.
    pub fn find_executable(&self, name: &str, cwd: &Path) -> Option<PathBuf> {
        let candidate = Path::new(name);
        if candidate.is_absolute() || name.contains('/') || name.contains('\\') {
            return candidate.is_file().then(|| candidate.to_path_buf());
        }
        let path = self.path_var()?;
        which::which_in(name, Some(path), cwd).ok()
    }
}

/// Variables a setup script added or changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvDelta {
    vars: BTreeMap<String, String>,
}

impl EnvDelta {
    /// Compute what changed from `before` to `after`.
    ///
    /// For `PATH` only the entries added in front of the original value are
    /// kept, so the delta can be re-applied to a different snapshot.
    pub fn between(before: &EnvSnapshot, after: &EnvSnapshot, separator: char) -> Self {
        let mut vars = BTreeMap::new();
        for (key, value) in &after.vars {
            if before.get(key) == Some(value.as_str()) {
                continue;
            }
            if is_path_key(key) {
                let added = match before.path_var() {
                    Some(old) if !old.is_empty() => value
                        .strip_suffix(old)
                        .map(|p| p.trim_end_matches(separator).to_string())
                        .unwrap_or_else(|| value.clone()),
                    _ => value.clone(),
                };
                if !added.is_empty() {
                    vars.insert("PATH".to_string(), added);
                }
            } else {
                vars.insert(key.clone(), value.clone());
            }
        }
        EnvDelta { vars }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        EnvDelta {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Serialize as newline-delimited `KEY=VALUE`.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.vars {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        out
    }

    pub fn parse(text: &str) -> Self {
        EnvDelta {
            vars: EnvSnapshot::parse(text).vars,
        }
    }

    /// Load a cached delta. A missing file yields `None`.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(Self::parse(&read_to_string(path)?)))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_string(path, &self.to_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn snapshot(pairs: &[(&str, &str)]) -> EnvSnapshot {
        EnvSnapshot::from_vars(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())))
    }

    #[test]
    fn test_delta_between() {
        let before = snapshot(&[("PATH", "/usr/bin"), ("HOME", "/home/me")]);
        let after = snapshot(&[
            ("PATH", "/opt/intel/bin:/usr/bin"),
            ("HOME", "/home/me"),
            ("ONEAPI_ROOT", "/opt/intel"),
        ]);

        let delta = EnvDelta::between(&before, &after, ':');
        assert_eq!(delta.get("PATH"), Some("/opt/intel/bin"));
        assert_eq!(delta.get("ONEAPI_ROOT"), Some("/opt/intel"));
        assert_eq!(delta.get("HOME"), None);
    }

    #[test]
    fn test_with_delta_prepends_path() {
        let base = snapshot(&[("Path", "C:\\Windows")]);
        let delta = EnvDelta::from_pairs([("PATH", "C:\\VS\\bin"), ("INCLUDE", "C:\\VS\\include")]);

        let merged = base.with_delta(&delta, ';');
        assert_eq!(merged.get("PATH"), Some("C:\\VS\\bin;C:\\Windows"));
        assert_eq!(merged.get("INCLUDE"), Some("C:\\VS\\include"));
        assert_eq!(merged.vars().len(), 2);
        // the original is untouched
        assert_eq!(base.get("PATH"), Some("C:\\Windows"));
    }

    #[test]
    fn test_delta_file_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("vs_x64_x86_64-pc-windows-msvc_abc.env");
        assert!(EnvDelta::load(&path).unwrap().is_none());

        let delta = EnvDelta::from_pairs([("VCToolsInstallDir", "C:\\VS\\Tools\\MSVC\\14.38")]);
        delta.save(&path).unwrap();
        assert_eq!(EnvDelta::load(&path).unwrap(), Some(delta));
    }

    #[test]
    fn test_parse_env_output() {
        let env = EnvSnapshot::parse("A=1\r\nB=x=y\nnot a var\n=C:=C:\\\n");
        assert_eq!(env.get("A"), Some("1"));
        assert_eq!(env.get("B"), Some("x=y"));
        assert_eq!(env.vars().len(), 2);
    }
}
