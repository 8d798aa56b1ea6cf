//! Windows resource compilers.

use super::{tool_basename, CommandContext, CommandSpec};
use crate::core::source::SourceFileGroup;

/// Compiles `.rc` scripts into linkable resource objects.
pub trait ResourceCompiler: Send + Sync {
    fn name(&self) -> &'static str;

    fn compile(&self, ctx: &CommandContext<'_>, group: &SourceFileGroup) -> CommandSpec;
}

/// Which resource compiler an executable is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceFlavor {
    Windres,
    LlvmRc,
    Rc,
}

/// `windres`, `llvm-rc` or `rc.exe`.
#[derive(Debug, Clone)]
pub struct WindowsResourceCompiler {
    flavor: ResourceFlavor,
}

impl WindowsResourceCompiler {
    pub fn new(flavor: ResourceFlavor) -> Self {
        WindowsResourceCompiler { flavor }
    }

    pub fn from_executable(rc: &str) -> Self {
        let name = tool_basename(rc);
        let flavor = if name.ends_with("windres") {
            ResourceFlavor::Windres
        } else if name == "llvm-rc" {
            ResourceFlavor::LlvmRc
        } else {
            ResourceFlavor::Rc
        };
        WindowsResourceCompiler::new(flavor)
    }

    fn defines_and_includes(&self, ctx: &CommandContext<'_>, define: &str, include: &str) -> Vec<String> {
        let target = ctx.target;
        target
            .defines
            .iter()
            .map(|d| format!("{}{}", define, d))
            .chain(
                target
                    .include_dirs
                    .iter()
                    .map(|i| format!("{}{}", include, ctx.quoted(i))),
            )
            .collect()
    }
}

impl ResourceCompiler for WindowsResourceCompiler {
    fn name(&self) -> &'static str {
        match self.flavor {
            ResourceFlavor::Windres => "windres",
            ResourceFlavor::LlvmRc => "llvm-rc",
            ResourceFlavor::Rc => "rc",
        }
    }

    fn compile(&self, ctx: &CommandContext<'_>, group: &SourceFileGroup) -> CommandSpec {
        let exe = &ctx.tools.rc;
        if exe.is_empty() {
            return CommandSpec::empty();
        }
        let input = ctx.quoted(&group.source_file);
        let output = ctx.quoted(&group.object_file);
        let cmd = CommandSpec::new(exe);
        match self.flavor {
            ResourceFlavor::Windres => cmd
                .args(["-J", "rc", "-O", "coff"])
                .args(
                    [
                        "-MT".to_string(),
                        output.clone(),
                        "-MMD".to_string(),
                        "-MP".to_string(),
                        "-MF".to_string(),
                        ctx.quoted(&group.dependency_file),
                    ]
                    .into_iter()
                    .map(|a| format!("--preprocessor-arg={}", a)),
                )
                .args(self.defines_and_includes(ctx, "-D", "-I"))
                .arg("-i")
                .arg(input)
                .arg("-o")
                .arg(output),
            ResourceFlavor::LlvmRc => cmd
                .args(self.defines_and_includes(ctx, "-D", "-I"))
                .arg("-Fo")
                .arg(output)
                .arg(input),
            ResourceFlavor::Rc => cmd
                .arg("/nologo")
                .args(self.defines_and_includes(ctx, "/D", "/I"))
                .arg(format!("/Fo{}", output))
                .arg(input),
        }
    }
}
