//! Compiler command lines.
//!
//! Two families of command lines exist: GNU-style drivers (`gcc`, `clang`,
//! `icpc`, `em++`) and `cl`-style drivers (`cl`, `icl`). Each family is one
//! type; the differences between its members are read from the
//! [`ToolchainType`] of the command context.

mod gnu;
mod msvc;

pub use gnu::{GnuCompiler, GnuVariant};
pub use msvc::ClCompiler;

use super::{tool_basename, CommandContext, CommandSpec, ToolchainType};
use crate::core::configuration::{BuildConfiguration, OptimizationLevel, Sanitizer};
use crate::core::source::{SourceFileGroup, SourceType};
use crate::core::target::{Language, LanguageStandard, SourceTarget, GCC_ONLY_WARNINGS};
use crate::core::HostPlatform;
use crate::util::diagnostic::ToolchainError;

/// Phase of a C++ module build a command belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModulePhase {
    /// Write the module dependency JSON of a source
    Scan,
    /// Write the module dependency JSON of a header unit
    HeaderUnitScan,
    /// Build a header unit's interface
    HeaderUnit,
    /// Build a module interface unit (interface file + object)
    Interface,
    /// Build a plain source or module implementation unit
    Implementation,
}

/// Inputs of one module-phase compile.
#[derive(Debug, Clone, Copy)]
pub struct ModuleCompile<'a> {
    pub phase: ModulePhase,
    /// Source, object, dependency JSON and (in `other_file`) the interface
    pub group: &'a SourceFileGroup,
    /// Named modules this source imports: `(name, interface file)`
    pub modules: &'a [(String, String)],
    /// Header units this source imports: `(header, interface file)`
    pub header_units: &'a [(String, String)],
    /// GCC module mapper file
    pub mapper: Option<&'a str>,
}

/// Generates compile commands for one toolchain family.
pub trait Compiler: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Compile one source file into an object.
    fn compile(&self, ctx: &CommandContext<'_>, group: &SourceFileGroup) -> CommandSpec;

    /// Build the target's precompiled header. Universal macOS builds need
    /// one command per architecture.
    fn precompiled_header(&self, ctx: &CommandContext<'_>, group: &SourceFileGroup) -> Vec<CommandSpec>;

    /// Whether the PCH is built from a synthesized translation unit.
    fn needs_pch_stub(&self) -> bool {
        false
    }

    /// A compile inside a C++ module build.
    fn module_command(
        &self,
        ctx: &CommandContext<'_>,
        _request: &ModuleCompile<'_>,
    ) -> Result<CommandSpec, ToolchainError> {
        Err(ToolchainError::ModuleStrategy {
            toolchain: ctx.kind().identifier().to_string(),
        })
    }
}

/// Choose the compiler implementation for a toolchain.
///
/// A `clang` executable under a non-LLVM toolchain type is rejected, as is
/// `cl` outside Visual Studio.
pub fn select_compiler(kind: ToolchainType, executable: &str, host: HostPlatform) -> Result<Box<dyn Compiler>, ToolchainError> {
    let basename = tool_basename(executable);
    if basename.contains("clang") && !kind.is_clang() {
        return Err(ToolchainError::WrongFamily {
            executable: basename,
            expected: "LLVM".to_string(),
        });
    }
    if basename == "cl" && !kind.is_msvc() {
        return Err(ToolchainError::WrongFamily {
            executable: basename,
            expected: "Visual Studio".to_string(),
        });
    }

    let compiler: Box<dyn Compiler> = match kind {
        ToolchainType::VisualStudio => Box::new(ClCompiler::new(false)),
        ToolchainType::IntelClassic if host == HostPlatform::Windows => Box::new(ClCompiler::new(true)),
        ToolchainType::IntelClassic => Box::new(GnuCompiler::new(GnuVariant::IntelClassic)),
        ToolchainType::AppleLlvm => Box::new(GnuCompiler::new(GnuVariant::AppleClang)),
        ToolchainType::VisualStudioLlvm => Box::new(GnuCompiler::new(GnuVariant::MsvcClang)),
        ToolchainType::Emscripten => Box::new(GnuCompiler::new(GnuVariant::Emscripten)),
        k if k.is_windows_clang(host) => Box::new(GnuCompiler::new(GnuVariant::MsvcClang)),
        ToolchainType::Llvm | ToolchainType::MingwLlvm | ToolchainType::IntelLlvm => {
            Box::new(GnuCompiler::new(GnuVariant::Clang))
        }
        ToolchainType::Unknown => {
            return Err(ToolchainError::Unknown {
                path: executable.to_string(),
            })
        }
        _ => Box::new(GnuCompiler::new(GnuVariant::Gcc)),
    };
    tracing::debug!("using the {} compiler for {}", compiler.name(), kind);
    Ok(compiler)
}

/// The driver for a source: the C driver for C and Objective-C.
pub fn driver_for<'a>(ctx: &'a CommandContext<'_>, kind: SourceType) -> &'a str {
    match kind {
        SourceType::C | SourceType::ObjectiveC => &ctx.tools.cc,
        _ => &ctx.tools.cxx,
    }
}

/// Source type the target's precompiled header is compiled as.
pub fn pch_source_type(target: &SourceTarget) -> SourceType {
    match target.language {
        Language::C => SourceType::C,
        Language::Cpp => SourceType::Cpp,
        Language::ObjectiveC => SourceType::ObjectiveC,
        Language::ObjectiveCpp => SourceType::ObjectiveCpp,
    }
}

/// Whether sources of `kind` force-include the target's PCH.
pub fn uses_pch(target: &SourceTarget, kind: SourceType) -> bool {
    target.uses_precompiled_header() && kind == pch_source_type(target)
}

/// The standard a source is compiled with, if the target sets one.
pub fn standard_for(target: &SourceTarget, kind: SourceType) -> Option<LanguageStandard> {
    let kind = if kind == SourceType::CxxPrecompiledHeader {
        pch_source_type(target)
    } else {
        kind
    };
    let standard = match kind {
        SourceType::C | SourceType::ObjectiveC => &target.c_standard,
        SourceType::WindowsResource | SourceType::Unknown => return None,
        _ => &target.cpp_standard,
    };
    if standard.is_empty() {
        return None;
    }
    let parsed = LanguageStandard::parse(standard);
    if parsed.is_none() {
        tracing::debug!("ignoring invalid language standard '{}'", standard);
    }
    parsed
}

/// Year spelling a GNU-style driver accepts, given its version.
///
/// Older drivers only know the draft names (`c++2a`, `c++1z`, ...).
pub fn gnu_standard_year(
    kind: ToolchainType,
    version: (u32, u32),
    standard: &LanguageStandard,
) -> String {
    let year = standard.year.as_str();
    if standard.prefix == "iso9899:" {
        return year.to_string();
    }

    let clang = kind.is_clang();
    if !standard.is_cpp() {
        let gate = if clang { (16, 0) } else { (14, 0) };
        return match year {
            "23" if version < gate => "2x".to_string(),
            _ => year.to_string(),
        };
    }

    if kind.is_intel_classic() {
        return year.to_string();
    }
    let Some(numeric) = standard.cpp_year() else {
        return year.to_string();
    };
    let gates: [(u32, (u32, u32), &str); 5] = if clang {
        [
            (26, (u32::MAX, 0), "2c"),
            (23, (17, 0), "2b"),
            (20, (10, 0), "2a"),
            (17, (5, 0), "1z"),
            (14, (3, 5), "1y"),
        ]
    } else {
        [
            (26, (14, 0), "2c"),
            (23, (11, 0), "2b"),
            (20, (10, 0), "2a"),
            (17, (5, 0), "1z"),
            (14, (4, 9), "1y"),
        ]
    };
    for (gated, minimum, draft) in gates {
        if numeric == gated {
            return if version < minimum {
                draft.to_string()
            } else {
                gated.to_string()
            };
        }
    }
    year.to_string()
}

/// `-O` flag for a configuration. Debug symbols force `-O0`.
pub fn gnu_optimization(configuration: &BuildConfiguration) -> Option<&'static str> {
    if configuration.debug_forces_no_optimization() {
        return Some("-O0");
    }
    match configuration.optimization_level {
        OptimizationLevel::None => Some("-O0"),
        OptimizationLevel::L1 => Some("-O1"),
        OptimizationLevel::L2 => Some("-O2"),
        OptimizationLevel::L3 => Some("-O3"),
        OptimizationLevel::Debug => Some("-Og"),
        OptimizationLevel::Size => Some("-Os"),
        OptimizationLevel::Fast => Some("-Ofast"),
        OptimizationLevel::CompilerDefault => None,
    }
}

/// `-W` flags of a target. Clang drops the GCC-only names.
pub fn gnu_warnings(target: &SourceTarget, kind: ToolchainType) -> Vec<String> {
    let mut flags = Vec::new();
    for warning in target.resolved_warnings() {
        if kind.is_clang() && GCC_ONLY_WARNINGS.contains(&warning.as_str()) {
            continue;
        }
        let flag = if warning == "pedantic-errors" {
            "-pedantic-errors".to_string()
        } else {
            format!("-W{}", warning)
        };
        if !flags.contains(&flag) {
            flags.push(flag);
        }
    }
    if target.treat_warnings_as_errors {
        flags.push("-Werror".to_string());
    }
    flags
}

/// `-fsanitize=` list for a configuration.
///
/// Apple Clang ships neither the memory nor the leak sanitizer.
pub fn gnu_sanitizers(configuration: &BuildConfiguration, kind: ToolchainType) -> Option<String> {
    let names: Vec<&str> = configuration
        .sanitizers
        .iter()
        .filter(|s| !(kind.is_apple_clang() && matches!(s, Sanitizer::Memory | Sanitizer::Leak)))
        .map(|s| s.as_flag())
        .collect();
    if names.is_empty() {
        return None;
    }
    Some(format!("-fsanitize={}", names.join(",")))
}

/// Contents of the translation unit that builds a PCH from a header.
pub fn pch_stub_contents(pch: &str) -> String {
    format!("#include \"{}\"\n", pch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::target::{TargetKind, WarningsPreset};

    fn std(s: &str) -> LanguageStandard {
        LanguageStandard::parse(s).unwrap()
    }

    #[test]
    fn test_select_compiler() {
        use HostPlatform::*;
        assert_eq!(select_compiler(ToolchainType::Gnu, "/usr/bin/g++", Linux).unwrap().name(), "gcc");
        assert_eq!(select_compiler(ToolchainType::Llvm, "clang++", Linux).unwrap().name(), "clang");
        assert_eq!(select_compiler(ToolchainType::Llvm, "clang++.exe", Windows).unwrap().name(), "clang-cl-abi");
        assert_eq!(select_compiler(ToolchainType::AppleLlvm, "clang++", MacOS).unwrap().name(), "apple-clang");
        assert_eq!(select_compiler(ToolchainType::VisualStudio, "cl.exe", Windows).unwrap().name(), "cl");
        assert_eq!(select_compiler(ToolchainType::IntelClassic, "icl.exe", Windows).unwrap().name(), "icl");
        assert_eq!(select_compiler(ToolchainType::IntelClassic, "icpc", Linux).unwrap().name(), "intel-classic");
        assert_eq!(select_compiler(ToolchainType::Emscripten, "em++", Linux).unwrap().name(), "emscripten");
    }

    #[test]
    fn test_select_rejects_wrong_family() {
        let err = select_compiler(ToolchainType::Gnu, "/usr/bin/clang++", HostPlatform::Linux)
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "Found 'clang++' in a toolchain other than LLVM");
        assert!(select_compiler(ToolchainType::MingwGnu, "cl.exe", HostPlatform::Windows).is_err());
        assert!(select_compiler(ToolchainType::Unknown, "tcc", HostPlatform::Linux).is_err());
    }

    #[test]
    fn test_clang_standard_gates() {
        let llvm = ToolchainType::Llvm;
        assert_eq!(gnu_standard_year(llvm, (16, 0), &std("c++23")), "2b");
        assert_eq!(gnu_standard_year(llvm, (17, 0), &std("c++23")), "23");
        assert_eq!(gnu_standard_year(llvm, (18, 1), &std("c++26")), "2c");
        assert_eq!(gnu_standard_year(llvm, (9, 0), &std("gnu++20")), "2a");
        assert_eq!(gnu_standard_year(llvm, (4, 0), &std("c++17")), "1z");
        assert_eq!(gnu_standard_year(llvm, (3, 4), &std("c++14")), "1y");
        assert_eq!(gnu_standard_year(llvm, (15, 0), &std("c23")), "2x");
        assert_eq!(gnu_standard_year(llvm, (16, 0), &std("c23")), "23");
        assert_eq!(gnu_standard_year(llvm, (16, 0), &std("c++11")), "11");
    }

    #[test]
    fn test_gcc_standard_gates() {
        let gcc = ToolchainType::Gnu;
        assert_eq!(gnu_standard_year(gcc, (10, 2), &std("c++23")), "2b");
        assert_eq!(gnu_standard_year(gcc, (13, 2), &std("c++23")), "23");
        assert_eq!(gnu_standard_year(gcc, (13, 2), &std("c++26")), "2c");
        assert_eq!(gnu_standard_year(gcc, (13, 2), &std("c++2a")), "20");
        assert_eq!(gnu_standard_year(gcc, (13, 2), &std("iso9899:2011")), "2011");
    }

    #[test]
    fn test_debug_symbols_force_o0() {
        let mut config = BuildConfiguration::builtin("Release").unwrap();
        assert_eq!(gnu_optimization(&config), Some("-O2"));
        config.debug_symbols = true;
        assert_eq!(gnu_optimization(&config), Some("-O0"));
        config.optimization_level = OptimizationLevel::Debug;
        assert_eq!(gnu_optimization(&config), Some("-Og"));
        config.optimization_level = OptimizationLevel::CompilerDefault;
        assert_eq!(gnu_optimization(&config), None);
    }

    #[test]
    fn test_warnings() {
        let mut target = SourceTarget::new("app", TargetKind::Executable);
        target.warnings_preset = WarningsPreset::VeryStrict;
        let gcc = gnu_warnings(&target, ToolchainType::Gnu);
        assert!(gcc.contains(&"-Wnoexcept".to_string()));
        let clang = gnu_warnings(&target, ToolchainType::Llvm);
        assert!(!clang.contains(&"-Wnoexcept".to_string()));
        assert!(!clang.contains(&"-Wstrict-null-sentinel".to_string()));
        assert_eq!(clang[0], "-Wall");

        target.warnings = vec!["all".into(), "pedantic-errors".into()];
        target.treat_warnings_as_errors = true;
        assert_eq!(
            gnu_warnings(&target, ToolchainType::Gnu),
            vec!["-Wall", "-pedantic-errors", "-Werror"]
        );
    }

    #[test]
    fn test_sanitizers() {
        let mut config = BuildConfiguration::builtin("Debug").unwrap();
        assert!(gnu_sanitizers(&config, ToolchainType::Gnu).is_none());
        config.sanitizers = vec![Sanitizer::Address, Sanitizer::Leak, Sanitizer::UndefinedBehavior];
        assert_eq!(
            gnu_sanitizers(&config, ToolchainType::Gnu).unwrap(),
            "-fsanitize=address,leak,undefined"
        );
        assert_eq!(
            gnu_sanitizers(&config, ToolchainType::AppleLlvm).unwrap(),
            "-fsanitize=address,undefined"
        );
    }

    #[test]
    fn test_pch_stub() {
        assert_eq!(pch_stub_contents("src/pch.hpp"), "#include \"src/pch.hpp\"\n");
    }
}
