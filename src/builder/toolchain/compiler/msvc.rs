//! `cl.exe` and Intel's `icl.exe`.

use super::{driver_for, standard_for, uses_pch, Compiler, ModuleCompile, ModulePhase};
use crate::builder::toolchain::{CommandContext, CommandSpec};
use crate::core::configuration::{OptimizationLevel, Sanitizer};
use crate::core::source::{SourceDataType, SourceFileGroup, SourceType};
use crate::core::target::MsvcWarningLevel;
use crate::util::diagnostic::ToolchainError;

/// Compiler for `cl`-style drivers.
#[derive(Debug, Clone)]
pub struct ClCompiler {
    intel: bool,
}

fn is_utf8(charset: &str) -> bool {
    matches!(charset.to_ascii_lowercase().as_str(), "utf-8" | "utf8")
}

impl ClCompiler {
    pub fn new(intel: bool) -> Self {
        ClCompiler { intel }
    }

    /// `/std:` value for the source, honouring the minimum compiler
    /// version each value needs.
    fn standard_flag(&self, ctx: &CommandContext<'_>, kind: SourceType) -> Option<String> {
        let standard = standard_for(ctx.target, kind)?;
        let compiler = &ctx.toolchain.compiler;
        let version = compiler.version_major_minor();
        let flag = if self.intel { "/Qstd:" } else { "/std:" };

        let value = if standard.is_cpp() {
            let year = standard.cpp_year()?;
            if year > 20 {
                (version >= 1929).then_some("c++latest")
            } else if year == 20 {
                (version >= 1929).then_some("c++20")
            } else if year == 17 {
                (version >= 1911).then_some("c++17")
            } else if year == 14 {
                (version > 1900 || (version == 1900 && compiler.version_patch() >= 24210))
                    .then_some("c++14")
            } else {
                None
            }
        } else {
            match standard.year.as_str() {
                "11" | "1x" => (version >= 1928).then_some("c11"),
                "17" | "18" => (version >= 1928).then_some("c17"),
                _ => None,
            }
        };
        value.map(|v| format!("{}{}", flag, v))
    }

    fn charset_flags(&self, ctx: &CommandContext<'_>) -> Vec<String> {
        let target = ctx.target;
        if self.intel {
            return Vec::new();
        }
        if is_utf8(&target.input_charset) && is_utf8(&target.execution_charset) {
            return vec!["/utf-8".to_string()];
        }
        vec![
            format!("/source-charset:{}", target.input_charset),
            format!("/execution-charset:{}", target.execution_charset),
        ]
    }

    fn optimization_flags(&self, ctx: &CommandContext<'_>) -> Vec<&'static str> {
        let config = ctx.configuration;
        if config.debug_forces_no_optimization() {
            return vec!["/Od", "/Ob0"];
        }
        let inline_all = if ctx.toolchain.compiler.version_major_minor() >= 1928 {
            "/Ob3"
        } else {
            "/Ob2"
        };
        match config.optimization_level {
            OptimizationLevel::None | OptimizationLevel::Debug => vec!["/Od", "/Ob0"],
            OptimizationLevel::L1 => vec!["/O1", "/Ob1"],
            OptimizationLevel::L2 => vec!["/O2", "/Ob2"],
            OptimizationLevel::L3 => vec!["/O2", inline_all],
            OptimizationLevel::Size => vec!["/Os", "/Ob1"],
            OptimizationLevel::Fast => vec!["/Ot", "/Ob2"],
            OptimizationLevel::CompilerDefault => Vec::new(),
        }
    }

    fn runtime_flag(&self, ctx: &CommandContext<'_>) -> &'static str {
        let debug = ctx.configuration.debug_symbols;
        match (ctx.target.static_runtime_library, debug) {
            (true, true) => "/MTd",
            (true, false) => "/MT",
            (false, true) => "/MDd",
            (false, false) => "/MD",
        }
    }

    /// Everything between the driver and the defines.
    fn common_flags(&self, ctx: &CommandContext<'_>, kind: SourceType) -> Vec<String> {
        let target = ctx.target;
        let config = ctx.configuration;
        let mut flags = vec!["/nologo".to_string()];
        flags.extend(self.charset_flags(ctx));

        let level = MsvcWarningLevel::classify(target.warnings_preset, &target.warnings);
        if let Some(level) = level.flag() {
            flags.push(format!("/{}", level));
        }
        if target.treat_warnings_as_errors {
            flags.push("/WX".to_string());
        }

        let cpp = kind.is_cpp();
        flags.push(if cpp { "/TP" } else { "/TC" }.to_string());
        if let Some(std) = self.standard_flag(ctx, kind) {
            flags.push(std);
        }

        if cpp {
            if target.exceptions {
                flags.push("/EHsc".to_string());
            }
            if !target.rtti {
                flags.push("/GR-".to_string());
            }
        }
        if target.fast_math {
            flags.push("/fp:fast".to_string());
        }

        flags.extend(target.compile_options.iter().cloned());
        flags.extend(self.optimization_flags(ctx).into_iter().map(str::to_string));

        if config.debug_symbols {
            flags.push("/Zi".to_string());
            flags.push("/FS".to_string());
        }
        if config.sanitizes(Sanitizer::Address) && ctx.toolchain.compiler.version_major_minor() >= 1928 {
            flags.push("/fsanitize=address".to_string());
        }
        if config.interprocedural_optimization {
            flags.push(if self.intel { "/Qipo" } else { "/GL" }.to_string());
        }
        flags.push(self.runtime_flag(ctx).to_string());
        flags
    }

    fn define_and_include_flags(&self, ctx: &CommandContext<'_>) -> Vec<String> {
        let mut flags = Vec::new();
        for define in &ctx.target.defines {
            flags.push(format!("/D{}", define));
        }
        for dir in &ctx.target.include_dirs {
            flags.push(format!("/I{}", ctx.quoted(dir)));
        }
        flags
    }

    fn pch_use_flags(&self, ctx: &CommandContext<'_>, kind: SourceType) -> Vec<String> {
        if !uses_pch(ctx.target, kind) {
            return Vec::new();
        }
        let (Some(header), Some(pch)) = (
            ctx.target.precompiled_header.as_deref(),
            ctx.paths.pch_target(ctx.target),
        ) else {
            return Vec::new();
        };
        vec![
            format!("/Yu{}", header),
            format!("/Fp{}", ctx.quoted(&pch)),
            format!("/FI{}", header),
            "/I.".to_string(),
        ]
    }

    fn dependency_flags(&self, ctx: &CommandContext<'_>, dependency: &str) -> Vec<String> {
        if self.intel {
            return vec!["/QMMD".to_string(), format!("/QMF{}", ctx.quoted(dependency))];
        }
        vec!["/sourceDependencies".to_string(), ctx.quoted(dependency)]
    }

    fn module_references(&self, ctx: &CommandContext<'_>, request: &ModuleCompile<'_>) -> Vec<String> {
        let mut flags = Vec::new();
        for (name, interface) in request.modules {
            flags.push("/reference".to_string());
            flags.push(format!("{}={}", name, ctx.quoted(interface)));
        }
        for (header, interface) in request.header_units {
            flags.push("/headerUnit".to_string());
            flags.push(format!("{}={}", header, ctx.quoted(interface)));
        }
        flags
    }
}

impl Compiler for ClCompiler {
    fn name(&self) -> &'static str {
        if self.intel {
            "icl"
        } else {
            "cl"
        }
    }

    fn compile(&self, ctx: &CommandContext<'_>, group: &SourceFileGroup) -> CommandSpec {
        let exe = driver_for(ctx, group.kind);
        if exe.is_empty() || !group.kind.is_compiled() {
            return CommandSpec::empty();
        }
        CommandSpec::new(exe)
            .args(self.common_flags(ctx, group.kind))
            .args(self.define_and_include_flags(ctx))
            .args(self.pch_use_flags(ctx, group.kind))
            .args(self.dependency_flags(ctx, &group.dependency_file))
            .arg(format!("/Fo{}", ctx.quoted(&group.object_file)))
            .arg("/c")
            .arg(ctx.quoted(&group.source_file))
    }

    fn precompiled_header(&self, ctx: &CommandContext<'_>, group: &SourceFileGroup) -> Vec<CommandSpec> {
        let exe = &ctx.tools.cxx;
        let Some(header) = ctx.target.precompiled_header.as_deref() else {
            return Vec::new();
        };
        if exe.is_empty() || group.other_file.is_empty() {
            return vec![CommandSpec::empty()];
        }
        let object = ctx.paths.pch_object(&group.object_file);
        let kind = super::pch_source_type(ctx.target);
        vec![CommandSpec::new(exe)
            .args(self.common_flags(ctx, kind))
            .args(self.define_and_include_flags(ctx))
            .arg("/I.")
            .args(self.dependency_flags(ctx, &group.dependency_file))
            .arg(format!("/Yc{}", header))
            .arg(format!("/Fp{}", ctx.quoted(&group.object_file)))
            .arg(format!("/Fo{}", ctx.quoted(&object)))
            .arg("/c")
            .arg(ctx.quoted(&group.other_file))]
    }

    fn needs_pch_stub(&self) -> bool {
        true
    }

    fn module_command(
        &self,
        ctx: &CommandContext<'_>,
        request: &ModuleCompile<'_>,
    ) -> Result<CommandSpec, ToolchainError> {
        if self.intel {
            return Err(ToolchainError::ModuleStrategy {
                toolchain: ctx.kind().identifier().to_string(),
            });
        }
        let group = request.group;
        let exe = &ctx.tools.cxx;
        if exe.is_empty() {
            return Ok(CommandSpec::empty());
        }

        let cmd = CommandSpec::new(exe)
            .args(self.common_flags(ctx, SourceType::Cpp))
            .args(self.define_and_include_flags(ctx));

        let header_name = match group.data_type {
            SourceDataType::SystemHeaderUnit => "/headerName:angle",
            _ => "/headerName:quote",
        };

        let cmd = match request.phase {
            ModulePhase::Scan => cmd
                .arg("/sourceDependencies:directives")
                .arg(ctx.quoted(&group.dependency_file))
                .arg("/c")
                .arg(ctx.quoted(&group.source_file)),
            ModulePhase::HeaderUnitScan => cmd
                .arg("/sourceDependencies")
                .arg(ctx.quoted(&group.dependency_file))
                .arg("/exportHeader")
                .arg(header_name)
                .arg(ctx.quoted(&group.source_file))
                .arg("/Zs"),
            ModulePhase::HeaderUnit => {
                // System units land in a folder and are renamed afterwards
                let output = if group.data_type == SourceDataType::SystemHeaderUnit {
                    match group.other_file.rsplit_once('/') {
                        Some((dir, _)) => format!("{}/", dir),
                        None => group.other_file.clone(),
                    }
                } else {
                    group.other_file.clone()
                };
                cmd.args(self.module_references(ctx, request))
                    .arg("/exportHeader")
                    .arg(header_name)
                    .arg(ctx.quoted(&group.source_file))
                    .arg("/ifcOutput")
                    .arg(ctx.quoted(&output))
                    .arg(format!("/Fo{}", ctx.quoted(&group.object_file)))
                    .arg("/c")
            }
            ModulePhase::Interface => cmd
                .args(self.module_references(ctx, request))
                .arg("/interface")
                .arg("/ifcOutput")
                .arg(ctx.quoted(&group.other_file))
                .arg(format!("/Fo{}", ctx.quoted(&group.object_file)))
                .arg("/c")
                .arg(ctx.quoted(&group.source_file)),
            ModulePhase::Implementation => cmd
                .args(self.module_references(ctx, request))
                .arg(format!("/Fo{}", ctx.quoted(&group.object_file)))
                .arg("/c")
                .arg(ctx.quoted(&group.source_file)),
        };
        Ok(cmd)
    }
}
