//! Linkers for executables and shared libraries.
//!
//! GNU-style toolchains link through the compiler driver; a dedicated
//! `ld.lld`/`ld.gold`/`mold` executable is passed on as `-fuse-ld=`.
//! Visual Studio links with `link.exe`.

use super::archiver::msvc_machine;
use super::compiler::GnuVariant;
use super::{tool_basename, CommandContext, CommandSpec, ToolchainType};
use crate::core::configuration::Sanitizer;
use crate::core::target::{Language, WindowsSubSystem, WIN32_CORE_LIBRARIES};
use crate::core::{Cpu, HostPlatform, StrategyType};

/// Generates the command that produces an executable or shared library.
pub trait Linker: Send + Sync {
    fn name(&self) -> &'static str;

    /// `output_base` is the output file without extension; side outputs
    /// (import libraries, PDBs) are named after it.
    fn link(&self, ctx: &CommandContext<'_>, output: &str, objects: &[String], output_base: &str) -> CommandSpec;
}

/// Linking through `gcc`/`clang`/`em++`.
#[derive(Debug, Clone)]
pub struct DriverLinker {
    variant: GnuVariant,
}

/// `-fuse-ld=` value for a dedicated linker executable.
fn fuse_ld(linker: &str) -> Option<&'static str> {
    if linker.is_empty() {
        return None;
    }
    let name = tool_basename(linker);
    ["mold", "gold", "bfd", "lld"]
        .into_iter()
        .find(|ld| name.ends_with(ld))
}

impl DriverLinker {
    pub fn new(variant: GnuVariant) -> Self {
        DriverLinker { variant }
    }

    fn driver<'a>(&self, ctx: &'a CommandContext<'_>) -> &'a str {
        match ctx.target.language {
            Language::C | Language::ObjectiveC => &ctx.tools.cc,
            _ => &ctx.tools.cxx,
        }
    }

    fn is_apple(&self) -> bool {
        self.variant == GnuVariant::AppleClang
    }

    fn is_emscripten(&self) -> bool {
        self.variant == GnuVariant::Emscripten
    }

    fn shared_flags(&self, ctx: &CommandContext<'_>, output: &str, output_base: &str) -> Vec<String> {
        if !ctx.target.is_shared_library() {
            return Vec::new();
        }
        if self.is_apple() {
            let file = output.rsplit('/').next().unwrap_or(output);
            return vec![
                "-dynamiclib".to_string(),
                "-install_name".to_string(),
                format!("@rpath/{}", file),
            ];
        }
        if self.is_emscripten() {
            return vec!["-sSIDE_MODULE=1".to_string()];
        }
        let mut flags = vec!["-shared".to_string()];
        if ctx.kind().is_mingw() {
            flags.push(format!("-Wl,--out-implib={}", ctx.quoted(&format!("{}.dll.a", output_base))));
            if ctx.target.windows_output_def {
                flags.push(format!("-Wl,--output-def={}", ctx.quoted(&format!("{}.def", output_base))));
            }
        }
        flags
    }

    fn static_runtime_flags(&self, ctx: &CommandContext<'_>) -> Vec<String> {
        let target = ctx.target;
        if !target.static_runtime_library || self.is_apple() || self.is_emscripten() {
            return Vec::new();
        }
        let mut flags = Vec::new();
        if self.variant == GnuVariant::Gcc {
            flags.push("-static-libgcc".to_string());
            if target.language.is_cpp() {
                flags.push("-static-libstdc++".to_string());
            }
            for (sanitizer, flag) in [
                (Sanitizer::Address, "-static-libasan"),
                (Sanitizer::Thread, "-static-libtsan"),
                (Sanitizer::Leak, "-static-liblsan"),
                (Sanitizer::UndefinedBehavior, "-static-libubsan"),
            ] {
                if ctx.configuration.sanitizes(sanitizer) {
                    flags.push(flag.to_string());
                }
            }
        } else {
            if ctx.kind().is_mingw() {
                flags.push("-static-libgcc".to_string());
                flags.push("-static-libstdc++".to_string());
            }
            if ctx.configuration.enable_sanitizers() {
                flags.push("-static-libsan".to_string());
            }
        }
        flags
    }

    fn windows_flags(&self, ctx: &CommandContext<'_>) -> Vec<String> {
        let target = ctx.target;
        if !ctx.kind().is_mingw() || !target.is_executable() {
            return Vec::new();
        }
        let mut flags = vec![match target.windows_sub_system {
            WindowsSubSystem::Windows => "-mwindows".to_string(),
            _ => "-mconsole".to_string(),
        }];
        if target.windows_entry_point.is_unicode() {
            flags.push("-municode".to_string());
        }
        flags
    }

    fn rpath_flags(&self, ctx: &CommandContext<'_>) -> Vec<String> {
        if ctx.toolchain.is_windows_target() || self.is_emscripten() || ctx.target.is_static_library() {
            return Vec::new();
        }
        if ctx.toolchain.is_macos_target() || self.is_apple() {
            return vec!["-Wl,-rpath,@executable_path".to_string()];
        }
        match ctx.strategy {
            StrategyType::Native => vec!["-Wl,-rpath=$ORIGIN".to_string()],
            _ => vec!["-Wl,-rpath,'$$ORIGIN'".to_string()],
        }
    }

    fn arch_flags(&self, ctx: &CommandContext<'_>) -> Vec<String> {
        match self.variant {
            GnuVariant::Clang | GnuVariant::MsvcClang => {
                let triple = ctx.toolchain.triple();
                if triple.is_empty() {
                    Vec::new()
                } else {
                    vec!["-target".to_string(), triple.to_string()]
                }
            }
            GnuVariant::AppleClang => {
                let archs: &[&str] = match ctx.toolchain.arch.cpu {
                    Cpu::UniversalMacOS => &["x86_64", "arm64"],
                    Cpu::Arm64 => &["arm64"],
                    Cpu::X64 => &["x86_64"],
                    _ => &[],
                };
                archs
                    .iter()
                    .flat_map(|a| ["-arch".to_string(), a.to_string()])
                    .collect()
            }
            _ => Vec::new(),
        }
    }

    fn static_link_flags(&self, ctx: &CommandContext<'_>) -> Vec<String> {
        let links = &ctx.target.static_links;
        if links.is_empty() {
            return Vec::new();
        }
        let libs = links.iter().map(|l| format!("-l{}", l));
        if self.is_apple() || self.is_emscripten() || ctx.toolchain.is_macos_target() {
            return libs.collect();
        }
        if self.variant != GnuVariant::Gcc {
            let mut flags = vec!["-Wl,-Bstatic".to_string()];
            flags.extend(libs);
            flags.push("-Wl,-Bdynamic".to_string());
            return flags;
        }
        let mut flags = vec![
            "-Wl,--copy-dt-needed-entries".to_string(),
            "-Wl,-Bstatic".to_string(),
            "-Wl,--start-group".to_string(),
        ];
        flags.extend(libs);
        flags.push("-Wl,--end-group".to_string());
        flags.push("-Wl,-Bdynamic".to_string());
        flags
    }

    fn needs_win32_libraries(&self, ctx: &CommandContext<'_>) -> bool {
        let kind = ctx.kind();
        ctx.toolchain.is_windows_target() && (kind.is_mingw() || kind.is_windows_clang(ctx.host()))
    }
}

impl Linker for DriverLinker {
    fn name(&self) -> &'static str {
        match self.variant {
            GnuVariant::Gcc | GnuVariant::IntelClassic => "gcc-driver",
            GnuVariant::Clang => "clang-driver",
            GnuVariant::MsvcClang => "clang-msvc-driver",
            GnuVariant::AppleClang => "apple-clang-driver",
            GnuVariant::Emscripten => "emcc",
        }
    }

    fn link(&self, ctx: &CommandContext<'_>, output: &str, objects: &[String], output_base: &str) -> CommandSpec {
        let exe = self.driver(ctx);
        if exe.is_empty() {
            return CommandSpec::empty();
        }
        let target = ctx.target;
        let config = ctx.configuration;
        let mut cmd = CommandSpec::new(exe)
            .args(self.shared_flags(ctx, output, output_base))
            .args(target.linker_options.iter().cloned());

        if let Some(ld) = fuse_ld(&ctx.tools.linker) {
            cmd = cmd.arg(format!("-fuse-ld={}", ld));
        }
        if !config.debug_symbols && !self.is_apple() && !self.is_emscripten() && !ctx.toolchain.is_macos_target() {
            cmd = cmd.arg("-s");
        }
        if config.enable_profiling && target.is_executable() && !self.is_emscripten() {
            cmd = cmd.arg("-pg");
        }
        if config.interprocedural_optimization {
            cmd = cmd.arg("-flto");
        }
        if target.threads
            && !ctx.toolchain.is_embedded_target()
            && !ctx.kind().is_mingw_clang()
            && !matches!(self.variant, GnuVariant::MsvcClang | GnuVariant::Emscripten)
        {
            cmd = cmd.arg("-pthread");
        }
        if let Some(sanitize) = super::compiler::gnu_sanitizers(config, ctx.kind()) {
            cmd = cmd.arg(sanitize);
        }
        cmd = cmd
            .args(self.static_runtime_flags(ctx))
            .args(self.windows_flags(ctx))
            .args(self.rpath_flags(ctx))
            .args(self.arch_flags(ctx));

        if self.is_emscripten() && target.is_executable() {
            if !target.project_shared_links().is_empty() {
                cmd = cmd.arg("-sMAIN_MODULE=1");
            }
            cmd = cmd.arg("--emit-symbol-map");
            if config.debug_symbols {
                cmd = cmd.arg("-gsource-map");
            }
        }

        for dir in &target.lib_dirs {
            cmd = cmd.arg(format!("-L{}", ctx.quoted(dir)));
        }
        cmd = cmd.arg(format!("-L{}", ctx.quoted(ctx.paths.output_dir())));
        if let Some(sysroot) = &ctx.toolchain.sysroot {
            cmd = cmd.arg(format!("--sysroot={}", ctx.quoted(sysroot)));
        }

        cmd = cmd
            .arg("-o")
            .arg(ctx.quoted(output))
            .args(objects.iter().map(|o| ctx.quoted(o)))
            .args(self.static_link_flags(ctx))
            .args(target.links.iter().map(|l| format!("-l{}", l)));

        if self.needs_win32_libraries(ctx) {
            cmd = cmd.args(WIN32_CORE_LIBRARIES.iter().map(|l| format!("-l{}", l)));
        }
        cmd
    }
}

/// `link.exe` and `xilink.exe`.
#[derive(Debug, Clone, Copy)]
pub struct MsvcLinker;

impl Linker for MsvcLinker {
    fn name(&self) -> &'static str {
        "link"
    }

    fn link(&self, ctx: &CommandContext<'_>, output: &str, objects: &[String], output_base: &str) -> CommandSpec {
        if ctx.tools.linker.is_empty() {
            return CommandSpec::empty();
        }
        let target = ctx.target;
        let config = ctx.configuration;
        let debug = config.debug_symbols;
        let mut cmd = CommandSpec::new(&ctx.tools.linker).arg("/nologo");
        if target.is_shared_library() {
            cmd = cmd.arg("/dll");
        }
        cmd = cmd.args(target.linker_options.iter().cloned());

        if debug && !config.interprocedural_optimization {
            cmd = cmd
                .arg("/incremental")
                .arg(format!("/ilk:{}", ctx.quoted(&format!("{}.ilk", output_base))));
        } else {
            cmd = cmd.arg("/incremental:NO");
        }

        for dir in &target.lib_dirs {
            cmd = cmd.arg(format!("/libpath:{}", ctx.quoted(dir)));
        }
        cmd = cmd.arg(format!("/libpath:{}", ctx.quoted(ctx.paths.output_dir())));
        for link in target.static_links.iter().chain(target.links.iter()) {
            cmd = cmd.arg(format!("{}.lib", link));
        }
        cmd = cmd.args(WIN32_CORE_LIBRARIES.iter().map(|l| format!("{}.lib", l)));

        if target.is_executable() {
            cmd = cmd.arg(format!("/subsystem:{}", target.windows_sub_system.msvc_name()));
        }
        if debug {
            cmd = cmd.args(["/opt:NOREF", "/opt:NOICF"]);
        } else {
            cmd = cmd.args(["/opt:REF", "/opt:ICF"]);
        }
        if matches!(ctx.toolchain.arch.cpu, Cpu::Arm | Cpu::ArmHf | Cpu::Arm64) {
            cmd = cmd.arg("/opt:LBR");
        }
        if debug {
            cmd = cmd
                .arg("/debug")
                .arg(format!("/pdb:{}", ctx.quoted(&format!("{}.pdb", output_base))));
        }
        cmd = cmd
            .args(["/dynamicbase", "/nxcompat"])
            .arg(format!("/machine:{}", msvc_machine(ctx.toolchain.arch.vs_arch())));
        if target.treat_warnings_as_errors {
            cmd = cmd.arg("/WX");
        }
        if let Some(entry) = target.windows_entry_point.msvc_entry(target.kind) {
            cmd = cmd.arg(format!("/entry:{}", entry));
        }
        if config.interprocedural_optimization {
            cmd = cmd.arg("/LTCG");
        }
        if target.is_shared_library() {
            cmd = cmd.arg(format!("/implib:{}", ctx.quoted(&format!("{}.lib", output_base))));
        }
        cmd.arg(format!("/out:{}", ctx.quoted(output)))
            .args(objects.iter().map(|o| ctx.quoted(o)))
    }
}

/// Pick the linker for a toolchain and its configured linker executable.
pub fn select_linker(kind: ToolchainType, linker: &str, host: HostPlatform) -> Box<dyn Linker> {
    let name = tool_basename(linker);
    if name == "link" || name == "xilink" {
        return Box::new(MsvcLinker);
    }
    if name == "wasm-ld" || kind == ToolchainType::Emscripten {
        return Box::new(DriverLinker::new(GnuVariant::Emscripten));
    }
    let variant = match kind {
        ToolchainType::AppleLlvm => GnuVariant::AppleClang,
        ToolchainType::VisualStudioLlvm => GnuVariant::MsvcClang,
        k if k.is_windows_clang(host) => GnuVariant::MsvcClang,
        k if k.is_clang() => GnuVariant::Clang,
        _ => GnuVariant::Gcc,
    };
    Box::new(DriverLinker::new(variant))
}
