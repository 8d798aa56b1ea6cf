//! Build directory layout and output file naming.
//!
//! All paths produced here are strings relative to the project root with `/`
//! separators, because they end up verbatim in command lines:
//!
//! ```text
//! build/<config>/                    output directory (targets land here)
//! build/<config>/obj.<target>/       objects
//! build/<config>/dep.<target>/       dependency files
//! build/<config>/int.<target>/       intermediates (precompiled headers)
//! ```

use std::path::Path;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::core::source::{SourceDataType, SourceFileGroup, SourceOutputs, SourceType};
use crate::core::target::SourceTarget;
use crate::util::fs::{glob_files, relative_path, unix_path};

/// How generated commands are consumed.
///
/// Native execution passes argv straight to the OS; the file-based
/// strategies write command lines into a generated build file, where paths
/// must be quoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StrategyType {
    #[default]
    Native,
    Makefile,
    Ninja,
}

impl StrategyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyType::Native => "native",
            StrategyType::Makefile => "makefile",
            StrategyType::Ninja => "ninja",
        }
    }

    /// Quote a path for this strategy.
    pub fn quoted(&self, path: &str) -> String {
        match self {
            StrategyType::Native => path.to_string(),
            _ => format!("\"{}\"", path),
        }
    }
}

/// File extensions and prefixes chosen by the toolchain environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputNaming {
    pub object_ext: &'static str,
    pub resource_ext: &'static str,
    pub dependency_ext: &'static str,
    /// Dependency output of a module scan
    pub module_dependency_ext: &'static str,
    /// Binary module interface (`.ifc`, `.pcm`, `.gcm`)
    pub module_interface_ext: &'static str,
    pub pch_ext: &'static str,
    pub static_lib_ext: &'static str,
    pub shared_lib_ext: &'static str,
    pub executable_ext: &'static str,
    pub lib_prefix: &'static str,
}

impl OutputNaming {
    /// Naming used by GNU-style toolchains on a Unix host.
    pub fn gnu() -> Self {
        OutputNaming {
            object_ext: ".o",
            resource_ext: ".res",
            dependency_ext: ".d",
            module_dependency_ext: ".d.json",
            module_interface_ext: ".gcm",
            pch_ext: ".gch",
            static_lib_ext: ".a",
            shared_lib_ext: ".so",
            executable_ext: "",
            lib_prefix: "lib",
        }
    }

    /// Naming used by the Visual Studio toolchain.
    pub fn msvc() -> Self {
        OutputNaming {
            object_ext: ".obj",
            resource_ext: ".res",
            dependency_ext: ".d.json",
            module_dependency_ext: ".module.json",
            module_interface_ext: ".ifc",
            pch_ext: ".pch",
            static_lib_ext: ".lib",
            shared_lib_ext: ".dll",
            executable_ext: ".exe",
            lib_prefix: "",
        }
    }
}

impl Default for OutputNaming {
    fn default() -> Self {
        OutputNaming::gnu()
    }
}

/// Directory layout of one build configuration.
#[derive(Debug, Clone)]
pub struct BuildPaths {
    build_dir: String,
    output_dir: String,
    naming: OutputNaming,
}

impl BuildPaths {
    /// `build_dir` is relative to the project root, usually `build`.
    pub fn new(build_dir: &str, configuration: &str, naming: OutputNaming) -> Self {
        let build_dir = build_dir.trim_end_matches('/').to_string();
        let output_dir = format!("{}/{}", build_dir, configuration);
        BuildPaths {
            build_dir,
            output_dir,
            naming,
        }
    }

    pub fn build_dir(&self) -> &str {
        &self.build_dir
    }

    /// `build/<config>`: where targets are written.
    pub fn output_dir(&self) -> &str {
        &self.output_dir
    }

    pub fn naming(&self) -> &OutputNaming {
        &self.naming
    }

    fn target_dir(&self, kind: &str, target: &SourceTarget) -> String {
        format!(
            "{}/{}.{}{}",
            self.output_dir, kind, target.name, target.build_suffix
        )
    }

    pub fn obj_dir(&self, target: &SourceTarget) -> String {
        self.target_dir("obj", target)
    }

    pub fn dep_dir(&self, target: &SourceTarget) -> String {
        self.target_dir("dep", target)
    }

    pub fn int_dir(&self, target: &SourceTarget) -> String {
        self.target_dir("int", target)
    }

    /// Map an input path to a location that stays inside a build directory.
    ///
    /// `../` components become `p/`, absolute roots lose their leading
    /// separator (and drive colon), and `./` is dropped.
    pub fn normalized(&self, path: &str) -> String {
        let mut out = path.replace('\\', "/");
        while let Some(rest) = out.strip_prefix("./") {
            out = rest.to_string();
        }
        if let Some(rest) = out.strip_prefix(&format!("{}/", self.output_dir)) {
            out = rest.to_string();
        }

        while out.contains("/../") {
            out = out.replace("/../", "/p/");
        }
        if let Some(rest) = out.strip_prefix("../") {
            out = format!("p/{}", rest);
        }

        if out.len() > 1 && out.as_bytes()[1] == b':' {
            out.remove(1);
        }
        out.trim_start_matches('/').to_string()
    }

    pub fn object_file(&self, target: &SourceTarget, source: &str) -> String {
        format!(
            "{}/{}{}",
            self.obj_dir(target),
            self.normalized(source),
            self.naming.object_ext
        )
    }

    pub fn resource_object_file(&self, target: &SourceTarget, source: &str) -> String {
        format!(
            "{}/{}{}",
            self.obj_dir(target),
            self.normalized(source),
            self.naming.resource_ext
        )
    }

    pub fn dependency_file(&self, target: &SourceTarget, source: &str) -> String {
        format!(
            "{}/{}{}",
            self.dep_dir(target),
            self.normalized(source),
            self.naming.dependency_ext
        )
    }

    pub fn module_dependency_file(&self, target: &SourceTarget, source: &str) -> String {
        format!(
            "{}/{}{}",
            self.dep_dir(target),
            self.normalized(source),
            self.naming.module_dependency_ext
        )
    }

    pub fn module_interface_file(&self, target: &SourceTarget, source: &str) -> String {
        format!(
            "{}/{}{}",
            self.obj_dir(target),
            self.normalized(source),
            self.naming.module_interface_ext
        )
    }

    /// Dependency scan output for a header unit.
    pub fn module_interface_dependency_file(&self, target: &SourceTarget, source: &str) -> String {
        format!(
            "{}/{}{}{}",
            self.dep_dir(target),
            self.normalized(source),
            self.naming.module_interface_ext,
            self.naming.module_dependency_ext
        )
    }

    /// Header path consumers force-include, without the PCH extension.
    pub fn pch_include(&self, target: &SourceTarget) -> Option<String> {
        let pch = target.precompiled_header.as_deref().filter(|p| !p.is_empty())?;
        Some(format!("{}/{}", self.int_dir(target), self.normalized(pch)))
    }

    /// The compiled precompiled header: `{int}/{pch}.gch|.pch`.
    pub fn pch_target(&self, target: &SourceTarget) -> Option<String> {
        self.pch_include(target)
            .map(|base| format!("{}{}", base, self.naming.pch_ext))
    }

    /// Object emitted next to an MSVC precompiled header.
    pub fn pch_object(&self, pch_target: &str) -> String {
        let base = pch_target
            .strip_suffix(self.naming.pch_ext)
            .unwrap_or(pch_target);
        format!("{}{}", base, self.naming.object_ext)
    }

    /// Translation unit synthesized for compilers that build a PCH from a
    /// source file rather than from the header itself.
    pub fn pch_source_stub(&self, target: &SourceTarget) -> Option<String> {
        let pch = target.precompiled_header.as_deref().filter(|p| !p.is_empty())?;
        Some(format!("{}/{}.cpp", self.obj_dir(target), self.normalized(pch)))
    }

    /// Output file name without its directory.
    pub fn output_filename(&self, target: &SourceTarget) -> String {
        let n = &self.naming;
        if target.is_executable() {
            format!("{}{}", target.name, n.executable_ext)
        } else if target.is_shared_library() {
            format!("{}{}{}", n.lib_prefix, target.name, n.shared_lib_ext)
        } else {
            format!("{}{}{}", n.lib_prefix, target.name, n.static_lib_ext)
        }
    }

    /// `build/<config>/<file>`
    pub fn output_file(&self, target: &SourceTarget) -> String {
        format!("{}/{}", self.output_dir, self.output_filename(target))
    }

    /// Output file without extension, used for side outputs (`.pdb`,
    /// `.ilk`, import libraries, `.def` files).
    pub fn output_base(&self, target: &SourceTarget) -> String {
        let file = self.output_file(target);
        let ext = if target.is_executable() {
            self.naming.executable_ext
        } else if target.is_shared_library() {
            self.naming.shared_lib_ext
        } else {
            self.naming.static_lib_ext
        };
        file.strip_suffix(ext).unwrap_or(&file).to_string()
    }

    /// Expand a target's file patterns into root-relative paths.
    pub fn resolve_files(&self, root: &Path, target: &SourceTarget) -> Result<Vec<String>> {
        let files = glob_files(root, &target.files)?;
        if files.is_empty() {
            bail!(
                "target '{}' matched no source files ({})",
                target.name,
                target.files.join(", ")
            );
        }
        Ok(files
            .iter()
            .map(|f| unix_path(&relative_path(root, f)))
            .collect())
    }

    /// Build the file groups and object list for a target.
    ///
    /// Resource scripts are dropped when the toolchain cannot compile them.
    /// The precompiled header, if any, comes last.
    pub fn outputs(
        &self,
        target: &SourceTarget,
        files: &[String],
        compiles_resources: bool,
    ) -> SourceOutputs {
        let mut groups = Vec::new();
        for file in files {
            if file.is_empty() {
                continue;
            }
            let kind = SourceType::from_path(file);
            match kind {
                SourceType::Unknown | SourceType::CxxPrecompiledHeader => continue,
                SourceType::WindowsResource if !compiles_resources => continue,
                _ => {}
            }

            let object_file = if kind == SourceType::WindowsResource {
                self.resource_object_file(target, file)
            } else {
                self.object_file(target, file)
            };
            let dependency_file = if kind == SourceType::Cpp && target.cpp_modules {
                self.module_dependency_file(target, file)
            } else {
                self.dependency_file(target, file)
            };

            groups.push(SourceFileGroup {
                source_file: file.clone(),
                object_file,
                dependency_file,
                other_file: String::new(),
                kind,
                data_type: SourceDataType::Normal,
            });
        }

        let mut objects: Vec<String> = groups.iter().map(|g| g.object_file.clone()).collect();

        if let (Some(pch), Some(pch_target)) =
            (target.precompiled_header.as_deref(), self.pch_target(target))
        {
            if self.naming.pch_ext == ".pch" && self.naming.object_ext == ".obj" {
                objects.push(self.pch_object(&pch_target));
            }
            groups.push(SourceFileGroup {
                source_file: pch.to_string(),
                object_file: pch_target,
                dependency_file: self.dependency_file(target, pch),
                other_file: self.pch_source_stub(target).unwrap_or_default(),
                kind: SourceType::CxxPrecompiledHeader,
                data_type: SourceDataType::Normal,
            });
        }

        let mut directories = vec![
            self.output_dir.clone(),
            self.obj_dir(target),
            self.dep_dir(target),
        ];
        if target.uses_precompiled_header() {
            directories.push(self.int_dir(target));
        }
        for group in &groups {
            for file in [&group.object_file, &group.dependency_file] {
                if let Some((dir, _)) = file.rsplit_once('/') {
                    if !directories.iter().any(|d| d == dir) {
                        directories.push(dir.to_string());
                    }
                }
            }
        }

        SourceOutputs {
            groups,
            objects,
            directories,
            target: self.output_file(target),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::target::TargetKind;

    fn paths() -> BuildPaths {
        BuildPaths::new("build", "Debug", OutputNaming::gnu())
    }

    fn target(name: &str, kind: TargetKind) -> SourceTarget {
        let mut t = SourceTarget::new(name, kind);
        t.files.push("src".into());
        t
    }

    #[test]
    fn test_quoted() {
        assert_eq!(StrategyType::Native.quoted("a b.c"), "a b.c");
        assert_eq!(StrategyType::Ninja.quoted("a b.c"), "\"a b.c\"");
    }

    #[test]
    fn test_directories() {
        let mut app = target("app", TargetKind::Executable);
        let paths = paths();
        assert_eq!(paths.output_dir(), "build/Debug");
        assert_eq!(paths.obj_dir(&app), "build/Debug/obj.app");
        assert_eq!(paths.dep_dir(&app), "build/Debug/dep.app");
        app.build_suffix = "_x".into();
        assert_eq!(paths.int_dir(&app), "build/Debug/int.app_x");
    }

    #[test]
    fn test_normalized_keeps_outputs_in_build_dir() {
        let paths = paths();
        assert_eq!(paths.normalized("src/main.cpp"), "src/main.cpp");
        assert_eq!(paths.normalized("./src/main.cpp"), "src/main.cpp");
        assert_eq!(paths.normalized("../shared/a.cpp"), "p/shared/a.cpp");
        assert_eq!(paths.normalized("src/../../b.cpp"), "src/p/p/b.cpp");
        assert_eq!(paths.normalized("/usr/include/x.h"), "usr/include/x.h");
        assert_eq!(paths.normalized("C:/dev/x.cpp"), "C/dev/x.cpp");
    }

    #[test]
    fn test_file_names() {
        let app = target("app", TargetKind::Executable);
        let paths = paths();
        assert_eq!(
            paths.object_file(&app, "src/main.cpp"),
            "build/Debug/obj.app/src/main.cpp.o"
        );
        assert_eq!(
            paths.dependency_file(&app, "src/main.cpp"),
            "build/Debug/dep.app/src/main.cpp.d"
        );
        assert_eq!(paths.output_file(&app), "build/Debug/app");

        let core = target("core", TargetKind::StaticLibrary);
        assert_eq!(paths.output_file(&core), "build/Debug/libcore.a");
        assert_eq!(paths.output_base(&core), "build/Debug/libcore");

        let msvc = BuildPaths::new("build", "Release", OutputNaming::msvc());
        let engine = target("engine", TargetKind::SharedLibrary);
        assert_eq!(msvc.output_file(&engine), "build/Release/engine.dll");
        assert_eq!(msvc.output_base(&engine), "build/Release/engine");
        assert_eq!(msvc.output_file(&app), "build/Release/app.exe");
    }

    #[test]
    fn test_pch_paths() {
        let mut app = target("app", TargetKind::Executable);
        let paths = paths();
        assert!(paths.pch_target(&app).is_none());

        app.precompiled_header = Some("src/pch.hpp".into());
        assert_eq!(
            paths.pch_target(&app).unwrap(),
            "build/Debug/int.app/src/pch.hpp.gch"
        );
        assert_eq!(paths.pch_include(&app).unwrap(), "build/Debug/int.app/src/pch.hpp");

        let msvc = BuildPaths::new("build", "Debug", OutputNaming::msvc());
        let pch = msvc.pch_target(&app).unwrap();
        assert_eq!(msvc.pch_object(&pch), "build/Debug/int.app/src/pch.hpp.obj");
        assert_eq!(
            msvc.pch_source_stub(&app).unwrap(),
            "build/Debug/obj.app/src/pch.hpp.cpp"
        );
    }

    #[test]
    fn test_outputs() {
        let mut app = target("app", TargetKind::Executable);
        app.precompiled_header = Some("src/pch.hpp".into());
        let files = vec![
            "src/main.cpp".to_string(),
            "src/util.c".to_string(),
            "src/pch.hpp".to_string(),
            "res/app.rc".to_string(),
            "README.md".to_string(),
        ];

        let outputs = paths().outputs(&app, &files, false);
        let kinds: Vec<SourceType> = outputs.groups.iter().map(|g| g.kind).collect();
        assert_eq!(
            kinds,
            vec![SourceType::Cpp, SourceType::C, SourceType::CxxPrecompiledHeader]
        );
        assert_eq!(outputs.objects.len(), 2);
        assert_eq!(outputs.target, "build/Debug/app");
        assert!(outputs
            .directories
            .contains(&"build/Debug/obj.app/src".to_string()));

        let with_rc = paths().outputs(&app, &files, true);
        let rc = with_rc
            .groups
            .iter()
            .find(|g| g.kind == SourceType::WindowsResource)
            .unwrap();
        assert_eq!(rc.object_file, "build/Debug/obj.app/res/app.rc.res");
    }

    #[test]
    fn test_module_dependency_files() {
        let mut app = target("app", TargetKind::Executable);
        app.cpp_modules = true;
        let outputs = paths().outputs(&app, &["src/main.cpp".to_string()], false);
        assert_eq!(
            outputs.groups[0].dependency_file,
            "build/Debug/dep.app/src/main.cpp.d.json"
        );
    }
}
