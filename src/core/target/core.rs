//! Source targets.
//!
//! A `SourceTarget` is one compiled artifact (executable, shared library or
//! static library) with its own source list and link requirements. It is
//! read from `[[target]]` in `Anvil.toml` and treated as read-only input by
//! the command generators.

use std::collections::BTreeSet;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use super::language::{is_valid_standard, Language};
use super::warnings::WarningsPreset;
use super::windows::{WindowsEntryPoint, WindowsSubSystem};

/// The kind of artifact a target produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TargetKind {
    /// Executable binary
    #[default]
    #[serde(alias = "exe", alias = "bin")]
    Executable,

    /// Shared/dynamic library (.so / .dylib / .dll)
    #[serde(alias = "shared", alias = "dylib")]
    SharedLibrary,

    /// Static library (.a / .lib)
    #[serde(alias = "static", alias = "lib")]
    StaticLibrary,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Executable => "executable",
            TargetKind::SharedLibrary => "shared-library",
            TargetKind::StaticLibrary => "static-library",
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cpp_standard() -> String {
    "c++17".to_string()
}

fn default_c_standard() -> String {
    "c17".to_string()
}

fn default_charset() -> String {
    "UTF-8".to_string()
}

/// A buildable source target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourceTarget {
    pub name: String,

    #[serde(default)]
    pub kind: TargetKind,

    #[serde(default)]
    pub language: Language,

    /// Source files, globs or directories relative to the project root
    #[serde(default)]
    pub files: Vec<String>,

    #[serde(default = "default_cpp_standard")]
    pub cpp_standard: String,

    #[serde(default = "default_c_standard")]
    pub c_standard: String,

    #[serde(default)]
    pub warnings_preset: WarningsPreset,

    /// Custom warnings (without the `-W` prefix); replaces the preset
    #[serde(default)]
    pub warnings: Vec<String>,

    #[serde(default)]
    pub treat_warnings_as_errors: bool,

    #[serde(default)]
    pub defines: Vec<String>,

    #[serde(default)]
    pub include_dirs: Vec<String>,

    #[serde(default)]
    pub lib_dirs: Vec<String>,

    /// Dynamically linked libraries, system or in-project shared targets
    #[serde(default)]
    pub links: Vec<String>,

    /// Statically linked libraries, in-project static targets or archives
    #[serde(default)]
    pub static_links: Vec<String>,

    #[serde(default)]
    pub compile_options: Vec<String>,

    #[serde(default)]
    pub linker_options: Vec<String>,

    #[serde(default)]
    pub precompiled_header: Option<String>,

    #[serde(default)]
    pub cpp_modules: bool,

    #[serde(default = "default_true")]
    pub rtti: bool,

    #[serde(default = "default_true")]
    pub exceptions: bool,

    #[serde(default)]
    pub fast_math: bool,

    #[serde(default = "default_true")]
    pub threads: bool,

    #[serde(default)]
    pub static_runtime_library: bool,

    #[serde(default)]
    pub position_independent_code: bool,

    #[serde(default)]
    pub windows_sub_system: WindowsSubSystem,

    #[serde(default)]
    pub windows_entry_point: WindowsEntryPoint,

    /// Emit a `.def` file next to Windows DLLs
    #[serde(default)]
    pub windows_output_def: bool,

    #[serde(default = "default_charset")]
    pub input_charset: String,

    #[serde(default = "default_charset")]
    pub execution_charset: String,

    /// Appended to the intermediate directory names (`obj.<name><suffix>`)
    #[serde(default)]
    pub build_suffix: String,

    #[serde(skip)]
    project_static_links: Vec<String>,

    #[serde(skip)]
    project_shared_links: Vec<String>,
}

impl SourceTarget {
    /// Create an executable target with default settings.
    pub fn new(name: impl Into<String>, kind: TargetKind) -> Self {
        SourceTarget {
            name: name.into(),
            kind,
            language: Language::default(),
            files: Vec::new(),
            cpp_standard: default_cpp_standard(),
            c_standard: default_c_standard(),
            warnings_preset: WarningsPreset::default(),
            warnings: Vec::new(),
            treat_warnings_as_errors: false,
            defines: Vec::new(),
            include_dirs: Vec::new(),
            lib_dirs: Vec::new(),
            links: Vec::new(),
            static_links: Vec::new(),
            compile_options: Vec::new(),
            linker_options: Vec::new(),
            precompiled_header: None,
            cpp_modules: false,
            rtti: true,
            exceptions: true,
            fast_math: false,
            threads: true,
            static_runtime_library: false,
            position_independent_code: false,
            windows_sub_system: WindowsSubSystem::default(),
            windows_entry_point: WindowsEntryPoint::default(),
            windows_output_def: false,
            input_charset: default_charset(),
            execution_charset: default_charset(),
            build_suffix: String::new(),
            project_static_links: Vec::new(),
            project_shared_links: Vec::new(),
        }
    }

    pub fn is_executable(&self) -> bool {
        self.kind == TargetKind::Executable
    }

    pub fn is_shared_library(&self) -> bool {
        self.kind == TargetKind::SharedLibrary
    }

    pub fn is_static_library(&self) -> bool {
        self.kind == TargetKind::StaticLibrary
    }

    pub fn uses_precompiled_header(&self) -> bool {
        self.precompiled_header
            .as_deref()
            .is_some_and(|pch| !pch.is_empty())
    }

    /// Resolved warning list: custom warnings when given, else the preset.
    pub fn resolved_warnings(&self) -> Vec<String> {
        if !self.warnings.is_empty() {
            return self.warnings.clone();
        }
        self.warnings_preset
            .flags()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Links that name other shared-library targets of this build.
    pub fn project_shared_links(&self) -> &[String] {
        &self.project_shared_links
    }

    /// Static links that name other static-library targets of this build.
    pub fn project_static_links(&self) -> &[String] {
        &self.project_static_links
    }

    /// Every project target this one links against.
    pub fn project_links(&self) -> impl Iterator<Item = &String> {
        self.project_static_links
            .iter()
            .chain(self.project_shared_links.iter())
    }

    /// Split `links` / `static_links` into project and external entries.
    ///
    /// Fails when a static library target appears in `links`.
    pub fn resolve_project_links(
        &mut self,
        static_targets: &BTreeSet<String>,
        shared_targets: &BTreeSet<String>,
    ) -> Result<()> {
        for link in &self.links {
            if static_targets.contains(link) {
                bail!(
                    "static library target '{}' found in links for target '{}' (move it to static-links)",
                    link,
                    self.name
                );
            }
        }

        let mut static_links = Vec::new();
        for link in &self.static_links {
            if static_targets.contains(link) && !static_links.contains(link) {
                static_links.push(link.clone());
            }
        }

        let mut shared_links = Vec::new();
        for link in &self.links {
            if shared_targets.contains(link) && !shared_links.contains(link) {
                shared_links.push(link.clone());
            }
        }

        self.project_static_links = static_links;
        self.project_shared_links = shared_links;
        Ok(())
    }

    /// Validate target fields that cannot be expressed through serde.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            bail!("target name cannot be empty");
        }
        if self.name.contains(['/', '\\']) {
            bail!("target name '{}' cannot contain path separators", self.name);
        }
        if self.files.is_empty() {
            bail!("target '{}' has no source files", self.name);
        }
        if !is_valid_standard(&self.cpp_standard) {
            bail!(
                "target '{}': invalid cpp-standard '{}'",
                self.name,
                self.cpp_standard
            );
        }
        if !is_valid_standard(&self.c_standard) {
            bail!(
                "target '{}': invalid c-standard '{}'",
                self.name,
                self.c_standard
            );
        }
        if self.links.contains(&self.name) || self.static_links.contains(&self.name) {
            bail!("target '{}' cannot link against itself", self.name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_deserialize_defaults() {
        let target: SourceTarget = toml::from_str(
            r#"
            name = "app"
            files = ["src/*.cpp"]
            "#,
        )
        .unwrap();

        assert!(target.is_executable());
        assert_eq!(target.language, Language::Cpp);
        assert_eq!(target.cpp_standard, "c++17");
        assert!(target.rtti);
        assert!(target.exceptions);
        assert!(target.threads);
        assert!(!target.uses_precompiled_header());
        assert_eq!(target.input_charset, "UTF-8");
    }

    #[test]
    fn test_deserialize_full() {
        let target: SourceTarget = toml::from_str(
            r#"
            name = "core"
            kind = "static-library"
            language = "c"
            files = ["src/core"]
            c-standard = "gnu11"
            warnings-preset = "strict"
            treat-warnings-as-errors = true
            precompiled-header = "src/pch.h"
            windows-sub-system = "windows"
            windows-entry-point = "wWinMain"
            "#,
        )
        .unwrap();

        assert!(target.is_static_library());
        assert_eq!(target.language, Language::C);
        assert_eq!(target.warnings_preset, WarningsPreset::Strict);
        assert!(target.uses_precompiled_header());
        assert_eq!(target.windows_sub_system, WindowsSubSystem::Windows);
        assert_eq!(target.windows_entry_point, WindowsEntryPoint::WinMainUnicode);
        target.validate().unwrap();
    }

    #[test]
    fn test_resolve_project_links() {
        let mut app = SourceTarget::new("app", TargetKind::Executable);
        app.links = vec!["engine".into(), "pthread".into()];
        app.static_links = vec!["core".into(), "libz.a".into()];

        app.resolve_project_links(&names(&["core"]), &names(&["engine"]))
            .unwrap();

        assert_eq!(app.project_static_links(), ["core".to_string()]);
        assert_eq!(app.project_shared_links(), ["engine".to_string()]);
        assert_eq!(app.project_links().count(), 2);
    }

    #[test]
    fn test_static_target_in_links_is_rejected() {
        let mut app = SourceTarget::new("app", TargetKind::Executable);
        app.links = vec!["core".into()];

        let err = app
            .resolve_project_links(&names(&["core"]), &BTreeSet::new())
            .unwrap_err();
        assert!(err.to_string().contains("move it to static-links"));
    }

    #[test]
    fn test_validate() {
        let mut target = SourceTarget::new("app", TargetKind::Executable);
        assert!(target.validate().is_err());

        target.files.push("main.cpp".into());
        target.validate().unwrap();

        target.cpp_standard = "c++".into();
        assert!(target.validate().is_err());

        target.cpp_standard = "c++20".into();
        target.links.push("app".into());
        assert!(target.validate().is_err());
    }

    #[test]
    fn test_custom_warnings_replace_preset() {
        let mut target = SourceTarget::new("app", TargetKind::Executable);
        target.warnings_preset = WarningsPreset::Extra;
        assert_eq!(target.resolved_warnings(), vec!["all", "extra"]);

        target.warnings = vec!["shadow".into()];
        assert_eq!(target.resolved_warnings(), vec!["shadow"]);
    }
}
