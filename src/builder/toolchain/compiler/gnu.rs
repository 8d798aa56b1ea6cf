//! GNU-style compiler drivers: GCC, Clang and the drivers built on them.

use super::{
    driver_for, gnu_optimization, gnu_sanitizers, gnu_standard_year, gnu_warnings, pch_source_type,
    standard_for, uses_pch, Compiler, ModuleCompile, ModulePhase,
};
use crate::builder::toolchain::{CommandContext, CommandSpec};
use crate::core::source::{SourceDataType, SourceFileGroup, SourceType};
use crate::core::Cpu;
use crate::util::diagnostic::ToolchainError;

/// Architectures of a universal macOS binary.
pub const UNIVERSAL_ARCHS: [&str; 2] = ["x86_64", "arm64"];

/// Members of the GNU driver family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GnuVariant {
    Gcc,
    Clang,
    /// Clang targeting the MSVC ABI
    MsvcClang,
    AppleClang,
    Emscripten,
    /// `icc`/`icpc`
    IntelClassic,
}

/// Compiler for GCC-compatible drivers.
#[derive(Debug, Clone)]
pub struct GnuCompiler {
    variant: GnuVariant,
}

fn language_name(kind: SourceType) -> &'static str {
    match kind {
        SourceType::C => "c",
        SourceType::ObjectiveC => "objective-c",
        SourceType::ObjectiveCpp => "objective-c++",
        _ => "c++",
    }
}

impl GnuCompiler {
    pub fn new(variant: GnuVariant) -> Self {
        GnuCompiler { variant }
    }

    pub fn variant(&self) -> GnuVariant {
        self.variant
    }

    fn is_clang(&self) -> bool {
        !matches!(self.variant, GnuVariant::Gcc | GnuVariant::IntelClassic)
    }

    fn dependency_flags(&self, ctx: &CommandContext<'_>, object: &str, dependency: &str) -> Vec<String> {
        vec![
            "-MT".to_string(),
            ctx.quoted(object),
            "-MMD".to_string(),
            "-MP".to_string(),
            "-MF".to_string(),
            ctx.quoted(dependency),
        ]
    }

    fn standard_flag(&self, ctx: &CommandContext<'_>, kind: SourceType) -> Option<String> {
        let standard = standard_for(ctx.target, kind)?;
        let compiler = &ctx.toolchain.compiler;
        let year = gnu_standard_year(ctx.kind(), (compiler.major(), compiler.minor()), &standard);
        Some(format!("-std={}{}", standard.prefix, year))
    }

    fn color_flag(&self, ctx: &CommandContext<'_>) -> Option<&'static str> {
        if !ctx.color {
            return None;
        }
        let flag = if self.is_clang() {
            "-fcolor-diagnostics"
        } else {
            "-fdiagnostics-color"
        };
        if !ctx.toolchain.is_flag_supported(flag) {
            return None;
        }
        Some(if self.is_clang() {
            "-fcolor-diagnostics"
        } else {
            "-fdiagnostics-color=always"
        })
    }

    fn thread_flag(&self, ctx: &CommandContext<'_>) -> bool {
        ctx.target.threads
            && !ctx.toolchain.is_embedded_target()
            && !ctx.kind().is_mingw_clang()
            && !matches!(self.variant, GnuVariant::MsvcClang | GnuVariant::Emscripten)
    }

    fn debug_flags(&self) -> &'static [&'static str] {
        match self.variant {
            GnuVariant::MsvcClang => &["-g", "-gcodeview"],
            GnuVariant::Emscripten => &["-g"],
            _ => &["-g3"],
        }
    }

    /// `-arch` values for Apple Clang.
    fn apple_archs(&self, ctx: &CommandContext<'_>) -> Vec<&'static str> {
        match ctx.toolchain.arch.cpu {
            Cpu::UniversalMacOS => UNIVERSAL_ARCHS.to_vec(),
            Cpu::Arm64 => vec!["arm64"],
            Cpu::X64 => vec!["x86_64"],
            Cpu::X86 => vec!["i386"],
            _ => Vec::new(),
        }
    }

    fn apple_flags(&self, ctx: &CommandContext<'_>, kind: SourceType, only_arch: Option<&str>) -> Vec<String> {
        let mut flags = Vec::new();
        if kind.is_cpp() {
            flags.push("-stdlib=libc++".to_string());
        }
        if let Some(sdk) = ctx.toolchain.env.get("SDKROOT").filter(|s| !s.is_empty()) {
            flags.push("-isysroot".to_string());
            flags.push(ctx.quoted(sdk));
        }
        if let Some(min) = ctx.toolchain.env.get("MACOSX_DEPLOYMENT_TARGET").filter(|s| !s.is_empty()) {
            flags.push(format!("-mmacosx-version-min={}", min));
        }
        let archs = match only_arch {
            Some(arch) => vec![arch.to_string()],
            None => self.apple_archs(ctx).into_iter().map(str::to_string).collect(),
        };
        for arch in archs {
            flags.push("-arch".to_string());
            flags.push(arch);
        }
        flags
    }

    /// Flags between the dependency flags and the defines: optimization
    /// through target selection.
    fn common_flags(&self, ctx: &CommandContext<'_>, kind: SourceType, only_arch: Option<&str>) -> Vec<String> {
        let target = ctx.target;
        let config = ctx.configuration;
        let language = if kind == SourceType::CxxPrecompiledHeader {
            pch_source_type(target)
        } else {
            kind
        };
        let mut flags: Vec<String> = Vec::new();

        if let Some(opt) = gnu_optimization(config) {
            flags.push(opt.to_string());
        }
        if let Some(std) = self.standard_flag(ctx, kind) {
            flags.push(std);
        }

        flags.extend(gnu_warnings(target, ctx.kind()));
        if uses_pch(target, kind) || kind == SourceType::CxxPrecompiledHeader {
            flags.push("-Winvalid-pch".to_string());
        }

        if !ctx.toolchain.is_windows_target()
            && (target.is_shared_library() || target.position_independent_code)
        {
            flags.push("-fPIC".to_string());
        }

        flags.extend(target.compile_options.iter().cloned());

        if let Some(color) = self.color_flag(ctx) {
            flags.push(color.to_string());
        }

        if language.is_cpp() {
            if !target.rtti {
                flags.push("-fno-rtti".to_string());
            }
            if !target.exceptions {
                flags.push("-fno-exceptions".to_string());
            }
        }
        if target.fast_math {
            flags.push("-ffast-math".to_string());
        }

        if self.thread_flag(ctx) {
            flags.push("-pthread".to_string());
        }

        if config.debug_symbols {
            flags.extend(self.debug_flags().iter().map(|f| f.to_string()));
        }
        if config.enable_profiling
            && !target.is_shared_library()
            && !matches!(self.variant, GnuVariant::MsvcClang | GnuVariant::Emscripten)
        {
            flags.push("-pg".to_string());
        }

        if let Some(sanitize) = gnu_sanitizers(config, ctx.kind()) {
            flags.push(sanitize);
            if self.is_clang() {
                flags.push("-fno-omit-frame-pointer".to_string());
            }
        }

        match self.variant {
            GnuVariant::Clang | GnuVariant::MsvcClang => {
                let triple = ctx.toolchain.triple();
                if !triple.is_empty() {
                    flags.push("-target".to_string());
                    flags.push(triple.to_string());
                }
            }
            GnuVariant::AppleClang => flags.extend(self.apple_flags(ctx, language, only_arch)),
            _ => {}
        }
        flags
    }

    fn define_and_include_flags(&self, ctx: &CommandContext<'_>) -> Vec<String> {
        let mut flags = Vec::new();
        for define in &ctx.target.defines {
            flags.push(format!("-D{}", define));
        }
        for dir in &ctx.target.include_dirs {
            flags.push(format!("-I{}", ctx.quoted(dir)));
        }
        if ctx.toolchain.sysroot.is_some() {
            for dir in &ctx.toolchain.system_includes {
                flags.push("-isystem".to_string());
                flags.push(ctx.quoted(dir));
            }
        }
        flags
    }

    /// `{int}_{arch}/{pch}`, the per-architecture PCH of a universal build.
    fn universal_pch_include(&self, ctx: &CommandContext<'_>, arch: &str) -> Option<String> {
        let int_dir = ctx.paths.int_dir(ctx.target);
        ctx.paths
            .pch_include(ctx.target)
            .map(|include| include.replacen(&int_dir, &format!("{}_{}", int_dir, arch), 1))
    }

    fn is_universal(&self, ctx: &CommandContext<'_>) -> bool {
        self.variant == GnuVariant::AppleClang && ctx.toolchain.arch.cpu == Cpu::UniversalMacOS
    }

    fn pch_flags(&self, ctx: &CommandContext<'_>, kind: SourceType) -> Vec<String> {
        if !uses_pch(ctx.target, kind) {
            return Vec::new();
        }
        let mut flags = Vec::new();
        if self.variant == GnuVariant::IntelClassic {
            if let (Some(target), Some(header)) = (
                ctx.paths.pch_target(ctx.target),
                ctx.target.precompiled_header.as_deref(),
            ) {
                flags.push("-pch-use".to_string());
                flags.push(ctx.quoted(&target));
                flags.push("-include".to_string());
                flags.push(ctx.quoted(header));
            }
        } else if self.is_universal(ctx) {
            for arch in UNIVERSAL_ARCHS {
                if let Some(include) = self.universal_pch_include(ctx, arch) {
                    flags.push(format!("-Xarch_{}", arch));
                    flags.push(format!("-include{}", ctx.quoted(&include)));
                }
            }
        } else if let Some(include) = ctx.paths.pch_include(ctx.target) {
            flags.push("-include".to_string());
            flags.push(ctx.quoted(&include));
        }
        flags
    }

    fn objective_flags(&self, kind: SourceType) -> Vec<String> {
        match kind {
            SourceType::ObjectiveC | SourceType::ObjectiveCpp => {
                vec!["-x".to_string(), language_name(kind).to_string()]
            }
            _ => Vec::new(),
        }
    }

    fn header_pch(&self, ctx: &CommandContext<'_>, group: &SourceFileGroup, output: &str, only_arch: Option<&str>) -> CommandSpec {
        let kind = pch_source_type(ctx.target);
        let exe = driver_for(ctx, kind);
        if exe.is_empty() {
            return CommandSpec::empty();
        }
        CommandSpec::new(exe)
            .arg("-x")
            .arg(format!("{}-header", language_name(kind)))
            .args(self.dependency_flags(ctx, output, &group.dependency_file))
            .args(self.common_flags(ctx, SourceType::CxxPrecompiledHeader, only_arch))
            .args(self.define_and_include_flags(ctx))
            .arg("-o")
            .arg(ctx.quoted(output))
            .arg("-c")
            .arg(ctx.quoted(&group.source_file))
    }

    /// `icpc -pch-create`: the PCH comes out of compiling the stub source.
    fn intel_pch(&self, ctx: &CommandContext<'_>, group: &SourceFileGroup) -> CommandSpec {
        let kind = pch_source_type(ctx.target);
        let exe = driver_for(ctx, kind);
        if exe.is_empty() || group.other_file.is_empty() {
            return CommandSpec::empty();
        }
        let object = ctx.paths.pch_object(&group.object_file);
        CommandSpec::new(exe)
            .args(self.dependency_flags(ctx, &object, &group.dependency_file))
            .args(self.common_flags(ctx, SourceType::CxxPrecompiledHeader, None))
            .args(self.define_and_include_flags(ctx))
            .arg("-pch-create")
            .arg(ctx.quoted(&group.object_file))
            .arg("-o")
            .arg(ctx.quoted(&object))
            .arg("-c")
            .arg(ctx.quoted(&group.other_file))
    }

    fn module_references(&self, ctx: &CommandContext<'_>, request: &ModuleCompile<'_>) -> Vec<String> {
        let mut flags = Vec::new();
        for (name, interface) in request.modules {
            flags.push(format!("-fmodule-file={}={}", name, ctx.quoted(interface)));
        }
        for (_, interface) in request.header_units {
            flags.push(format!("-fmodule-file={}", ctx.quoted(interface)));
        }
        flags
    }

    fn gcc_module_command(&self, ctx: &CommandContext<'_>, request: &ModuleCompile<'_>) -> CommandSpec {
        let group = request.group;
        let exe = &ctx.tools.cxx;
        let Some(mapper) = request.mapper else {
            return CommandSpec::empty();
        };
        if exe.is_empty() {
            return CommandSpec::empty();
        }

        let cmd = CommandSpec::new(exe);
        match request.phase {
            ModulePhase::Scan | ModulePhase::HeaderUnitScan => CommandSpec::empty(),
            ModulePhase::HeaderUnit => {
                let language = if group.data_type == SourceDataType::SystemHeaderUnit {
                    "c++-system-header"
                } else {
                    "c++-header"
                };
                cmd.args(self.common_flags(ctx, SourceType::Cpp, None))
                    .args(self.define_and_include_flags(ctx))
                    .arg("-fmodules-ts")
                    .arg(format!("-fmodule-mapper={}", ctx.quoted(mapper)))
                    .arg("-x")
                    .arg(language)
                    .arg("-c")
                    .arg(ctx.quoted(&group.source_file))
            }
            ModulePhase::Interface | ModulePhase::Implementation => cmd
                .args(self.dependency_flags(ctx, &group.object_file, &group.dependency_file))
                .args(self.common_flags(ctx, SourceType::Cpp, None))
                .args(self.define_and_include_flags(ctx))
                .arg("-fmodules-ts")
                .arg(format!("-fmodule-mapper={}", ctx.quoted(mapper)))
                .arg("-x")
                .arg("c++")
                .arg("-o")
                .arg(ctx.quoted(&group.object_file))
                .arg("-c")
                .arg(ctx.quoted(&group.source_file)),
        }
    }

    fn clang_module_command(&self, ctx: &CommandContext<'_>, request: &ModuleCompile<'_>) -> CommandSpec {
        let group = request.group;
        let exe = &ctx.tools.cxx;
        if exe.is_empty() {
            return CommandSpec::empty();
        }

        let cmd = CommandSpec::new(exe);
        match request.phase {
            ModulePhase::Scan | ModulePhase::HeaderUnitScan => CommandSpec::empty(),
            ModulePhase::HeaderUnit => {
                let (header, language) = if group.data_type == SourceDataType::SystemHeaderUnit {
                    ("-fmodule-header=system", "c++-system-header")
                } else {
                    ("-fmodule-header=user", "c++-header")
                };
                cmd.args(self.common_flags(ctx, SourceType::Cpp, None))
                    .args(self.define_and_include_flags(ctx))
                    .args(self.module_references(ctx, request))
                    .arg(header)
                    .arg("-x")
                    .arg(language)
                    .arg(ctx.quoted(&group.source_file))
                    .arg("-o")
                    .arg(ctx.quoted(&group.other_file))
            }
            ModulePhase::Interface => cmd
                .args(self.dependency_flags(ctx, &group.object_file, &group.dependency_file))
                .args(self.common_flags(ctx, SourceType::Cpp, None))
                .args(self.define_and_include_flags(ctx))
                .args(self.module_references(ctx, request))
                .arg(format!("-fmodule-output={}", ctx.quoted(&group.other_file)))
                .arg("-x")
                .arg("c++-module")
                .arg("-o")
                .arg(ctx.quoted(&group.object_file))
                .arg("-c")
                .arg(ctx.quoted(&group.source_file)),
            ModulePhase::Implementation => cmd
                .args(self.dependency_flags(ctx, &group.object_file, &group.dependency_file))
                .args(self.common_flags(ctx, SourceType::Cpp, None))
                .args(self.define_and_include_flags(ctx))
                .args(self.module_references(ctx, request))
                .arg("-o")
                .arg(ctx.quoted(&group.object_file))
                .arg("-c")
                .arg(ctx.quoted(&group.source_file)),
        }
    }
}

impl Compiler for GnuCompiler {
    fn name(&self) -> &'static str {
        match self.variant {
            GnuVariant::Gcc => "gcc",
            GnuVariant::Clang => "clang",
            GnuVariant::MsvcClang => "clang-cl-abi",
            GnuVariant::AppleClang => "apple-clang",
            GnuVariant::Emscripten => "emscripten",
            GnuVariant::IntelClassic => "intel-classic",
        }
    }

    fn compile(&self, ctx: &CommandContext<'_>, group: &SourceFileGroup) -> CommandSpec {
        let exe = driver_for(ctx, group.kind);
        if exe.is_empty() || !group.kind.is_compiled() {
            return CommandSpec::empty();
        }

        CommandSpec::new(exe)
            .args(self.dependency_flags(ctx, &group.object_file, &group.dependency_file))
            .args(self.common_flags(ctx, group.kind, None))
            .args(self.define_and_include_flags(ctx))
            .args(self.pch_flags(ctx, group.kind))
            .args(self.objective_flags(group.kind))
            .arg("-o")
            .arg(ctx.quoted(&group.object_file))
            .arg("-c")
            .arg(ctx.quoted(&group.source_file))
    }

    fn precompiled_header(&self, ctx: &CommandContext<'_>, group: &SourceFileGroup) -> Vec<CommandSpec> {
        if self.variant == GnuVariant::IntelClassic {
            return vec![self.intel_pch(ctx, group)];
        }
        if self.is_universal(ctx) {
            let ext = ctx.paths.naming().pch_ext;
            return UNIVERSAL_ARCHS
                .iter()
                .filter_map(|arch| {
                    let include = self.universal_pch_include(ctx, arch)?;
                    let output = format!("{}{}", include, ext);
                    Some(self.header_pch(ctx, group, &output, Some(arch)))
                })
                .collect();
        }
        vec![self.header_pch(ctx, group, &group.object_file, None)]
    }

    fn needs_pch_stub(&self) -> bool {
        self.variant == GnuVariant::IntelClassic
    }

    fn module_command(
        &self,
        ctx: &CommandContext<'_>,
        request: &ModuleCompile<'_>,
    ) -> Result<CommandSpec, ToolchainError> {
        match self.variant {
            GnuVariant::Gcc => Ok(self.gcc_module_command(ctx, request)),
            GnuVariant::Clang | GnuVariant::MsvcClang | GnuVariant::AppleClang => {
                Ok(self.clang_module_command(ctx, request))
            }
            _ => Err(ToolchainError::ModuleStrategy {
                toolchain: ctx.kind().identifier().to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::toolchain::tests::Fixture;
    use crate::builder::toolchain::ToolchainType;
    use crate::core::configuration::Sanitizer;
    use crate::core::target::TargetKind;
    use crate::core::{Arch, OutputNaming, StrategyType};

    fn group(source: &str, kind: SourceType) -> SourceFileGroup {
        SourceFileGroup {
            source_file: source.to_string(),
            object_file: format!("build/Debug/obj.app/{}.o", source),
            dependency_file: format!("build/Debug/dep.app/{}.d", source),
            other_file: String::new(),
            kind,
            data_type: SourceDataType::Normal,
        }
    }

    #[test]
    fn test_gcc_compile_order() {
        let mut fixture = Fixture::gcc();
        fixture.target.cpp_standard = "c++20".into();
        fixture.target.defines.push("NDEBUG".into());
        fixture.target.include_dirs.push("include".into());
        let gcc = GnuCompiler::new(GnuVariant::Gcc);

        let argv = gcc.compile(&fixture.context(), &group("src/main.cpp", SourceType::Cpp)).to_argv();
        assert_eq!(
            argv,
            vec![
                "/usr/bin/g++",
                "-MT",
                "build/Debug/obj.app/src/main.cpp.o",
                "-MMD",
                "-MP",
                "-MF",
                "build/Debug/dep.app/src/main.cpp.d",
                "-O0",
                "-std=c++20",
                "-pthread",
                "-g3",
                "-DNDEBUG",
                "-Iinclude",
                "-o",
                "build/Debug/obj.app/src/main.cpp.o",
                "-c",
                "src/main.cpp",
            ]
        );
    }

    #[test]
    fn test_gcc_target_options() {
        let mut fixture = Fixture::gcc();
        fixture.target.kind = TargetKind::SharedLibrary;
        fixture.target.rtti = false;
        fixture.target.exceptions = false;
        fixture.target.threads = true;
        fixture.target.c_standard = "gnu17".into();
        fixture.configuration.enable_profiling = true;
        fixture.configuration.sanitizers = vec![Sanitizer::Address];
        let gcc = GnuCompiler::new(GnuVariant::Gcc);
        let ctx = fixture.context();

        let cpp = gcc.compile(&ctx, &group("src/lib.cpp", SourceType::Cpp)).args;
        for flag in ["-fPIC", "-fno-rtti", "-fno-exceptions", "-pthread", "-fsanitize=address"] {
            assert!(cpp.contains(&flag.to_string()), "{flag}");
        }
        assert!(!cpp.contains(&"-pg".to_string()));
        assert!(!cpp.contains(&"-fno-omit-frame-pointer".to_string()));

        let c = gcc.compile(&ctx, &group("src/util.c", SourceType::C));
        assert_eq!(c.program.to_string_lossy(), "/usr/bin/gcc");
        assert!(c.args.contains(&"-std=gnu17".to_string()));
        assert!(!c.args.contains(&"-fno-rtti".to_string()));
    }

    #[test]
    fn test_quoting_follows_strategy() {
        let mut fixture = Fixture::gcc();
        fixture.strategy = StrategyType::Ninja;
        let gcc = GnuCompiler::new(GnuVariant::Gcc);
        let argv = gcc.compile(&fixture.context(), &group("src/main.cpp", SourceType::Cpp)).to_argv();
        assert_eq!(argv.last().unwrap(), "\"src/main.cpp\"");
    }

    #[test]
    fn test_empty_driver_gives_empty_command() {
        let mut fixture = Fixture::gcc();
        fixture.tools.cc.clear();
        let gcc = GnuCompiler::new(GnuVariant::Gcc);
        assert!(gcc.compile(&fixture.context(), &group("a.c", SourceType::C)).is_empty());
        assert!(gcc
            .compile(&fixture.context(), &group("a.rc", SourceType::WindowsResource))
            .is_empty());
    }

    #[test]
    fn test_gcc_pch() {
        let mut fixture = Fixture::gcc();
        fixture.target.precompiled_header = Some("src/pch.hpp".into());
        let gcc = GnuCompiler::new(GnuVariant::Gcc);
        let ctx = fixture.context();

        let pch = SourceFileGroup {
            source_file: "src/pch.hpp".into(),
            object_file: "build/Debug/int.app/src/pch.hpp.gch".into(),
            dependency_file: "build/Debug/dep.app/src/pch.hpp.d".into(),
            other_file: String::new(),
            kind: SourceType::CxxPrecompiledHeader,
            data_type: SourceDataType::Normal,
        };
        let build = gcc.precompiled_header(&ctx, &pch);
        assert_eq!(build.len(), 1);
        let argv = build[0].to_argv();
        assert_eq!(&argv[..3], &["/usr/bin/g++", "-x", "c++-header"]);
        assert!(argv.contains(&"-Winvalid-pch".to_string()));
        assert_eq!(
            &argv[argv.len() - 4..],
            &["-o", "build/Debug/int.app/src/pch.hpp.gch", "-c", "src/pch.hpp"]
        );

        let consumer = gcc.compile(&ctx, &group("src/main.cpp", SourceType::Cpp)).args;
        let at = consumer.iter().position(|a| a == "-include").unwrap();
        assert_eq!(consumer[at + 1], "build/Debug/int.app/src/pch.hpp");

        let c = gcc.compile(&ctx, &group("src/util.c", SourceType::C)).args;
        assert!(!c.contains(&"-include".to_string()));
    }

    #[test]
    fn test_clang_target_and_standard() {
        let mut fixture = Fixture::gcc();
        fixture.toolchain.kind = ToolchainType::Llvm;
        fixture.toolchain.compiler.version = "16.0.6".into();
        fixture.target.cpp_standard = "c++23".into();
        fixture.configuration.sanitizers = vec![Sanitizer::UndefinedBehavior];
        let clang = GnuCompiler::new(GnuVariant::Clang);
        let args = clang.compile(&fixture.context(), &group("a.cpp", SourceType::Cpp)).args;
        assert!(args.contains(&"-std=c++2b".to_string()));
        assert!(args.contains(&"-fno-omit-frame-pointer".to_string()));
        let at = args.iter().position(|a| a == "-target").unwrap();
        assert_eq!(args[at + 1], "x86_64-linux-gnu");
    }

    #[test]
    fn test_apple_universal() {
        let mut fixture = Fixture::gcc();
        fixture.toolchain.kind = ToolchainType::AppleLlvm;
        fixture.toolchain.arch = Arch::from("universal-apple-darwin");
        fixture.target.precompiled_header = Some("src/pch.hpp".into());
        fixture.paths = crate::core::BuildPaths::new("build", "Debug", {
            let mut naming = OutputNaming::gnu();
            naming.pch_ext = ".pch";
            naming
        });
        let apple = GnuCompiler::new(GnuVariant::AppleClang);
        let ctx = fixture.context();

        let args = apple.compile(&ctx, &group("a.cpp", SourceType::Cpp)).args;
        let joined = args.join(" ");
        assert!(joined.contains("-stdlib=libc++"));
        assert!(joined.contains("-arch x86_64 -arch arm64"));
        assert!(joined.contains("-Xarch_x86_64 -includebuild/Debug/int.app_x86_64/src/pch.hpp"));
        assert!(joined.contains("-Xarch_arm64 -includebuild/Debug/int.app_arm64/src/pch.hpp"));
        assert!(!joined.contains("-target"));

        let pch = SourceFileGroup {
            source_file: "src/pch.hpp".into(),
            object_file: "build/Debug/int.app/src/pch.hpp.pch".into(),
            dependency_file: "build/Debug/dep.app/src/pch.hpp.d".into(),
            other_file: String::new(),
            kind: SourceType::CxxPrecompiledHeader,
            data_type: SourceDataType::Normal,
        };
        let builds = apple.precompiled_header(&ctx, &pch);
        assert_eq!(builds.len(), 2);
        assert!(builds[1]
            .args
            .contains(&"build/Debug/int.app_arm64/src/pch.hpp.pch".to_string()));
        assert_eq!(builds[1].args.iter().filter(|a| *a == "-arch").count(), 1);
    }

    #[test]
    fn test_objective_c() {
        let mut fixture = Fixture::gcc();
        fixture.toolchain.kind = ToolchainType::AppleLlvm;
        fixture.toolchain.arch = Arch::from("arm64-apple-darwin");
        let apple = GnuCompiler::new(GnuVariant::AppleClang);
        let args = apple.compile(&fixture.context(), &group("a.mm", SourceType::ObjectiveCpp)).args;
        let at = args.iter().position(|a| a == "-x").unwrap();
        assert_eq!(args[at + 1], "objective-c++");
        assert_eq!(args[at + 2], "-o");
    }

    #[test]
    fn test_module_commands() {
        let mut fixture = Fixture::gcc();
        fixture.target.cpp_modules = true;
        let gcc = GnuCompiler::new(GnuVariant::Gcc);
        let ctx = fixture.context();
        let mut unit = group("src/math.cppm", SourceType::Cpp);
        unit.other_file = "build/Debug/obj.app/src/math.cppm.gcm".into();

        let request = ModuleCompile {
            phase: ModulePhase::Interface,
            group: &unit,
            modules: &[],
            header_units: &[],
            mapper: Some("build/Debug/int.app/module.map"),
        };
        let args = gcc.module_command(&ctx, &request).unwrap().args;
        assert!(args.contains(&"-fmodules-ts".to_string()));
        assert!(args.contains(&"-fmodule-mapper=build/Debug/int.app/module.map".to_string()));

        let clang = GnuCompiler::new(GnuVariant::Clang);
        let modules = vec![("util".to_string(), "build/Debug/obj.app/src/util.cppm.pcm".to_string())];
        let request = ModuleCompile {
            phase: ModulePhase::Interface,
            group: &unit,
            modules: &modules,
            header_units: &[],
            mapper: None,
        };
        let args = clang.module_command(&ctx, &request).unwrap().args;
        assert!(args.contains(&"-fmodule-file=util=build/Debug/obj.app/src/util.cppm.pcm".to_string()));
        assert!(args.contains(&"-fmodule-output=build/Debug/obj.app/src/math.cppm.gcm".to_string()));
        assert!(args.contains(&"c++-module".to_string()));

        let intel = GnuCompiler::new(GnuVariant::IntelClassic);
        assert!(intel.module_command(&ctx, &request).is_err());
    }
}
