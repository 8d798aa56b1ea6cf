//! One toolchain's command generators, bundled.

use super::archiver::{select_archiver, Archiver};
use super::compiler::{select_compiler, Compiler, ModuleCompile};
use super::linker::{select_linker, Linker};
use super::winres::{ResourceCompiler, WindowsResourceCompiler};
use super::{CommandContext, CommandSpec, ToolPaths, ToolchainEnvironment};
use crate::core::source::{SourceFileGroup, SourceType};
use crate::util::diagnostic::ToolchainError;

/// Compiler, archiver, linker and resource compiler for a toolchain.
pub struct Controller {
    compiler: Box<dyn Compiler>,
    archiver: Box<dyn Archiver>,
    linker: Box<dyn Linker>,
    resource: Option<Box<dyn ResourceCompiler>>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("compiler", &self.compiler.name())
            .field("archiver", &self.archiver.name())
            .field("linker", &self.linker.name())
            .field("resource", &self.resource.as_ref().map(|r| r.name()))
            .finish()
    }
}

impl Controller {
    /// Select every generator for the toolchain.
    ///
    /// Resources are only compiled for Windows targets with a resource
    /// compiler available.
    pub fn initialize(toolchain: &ToolchainEnvironment, tools: &ToolPaths) -> Result<Self, ToolchainError> {
        let compiler = select_compiler(toolchain.kind, &toolchain.compiler.path, toolchain.host)?;
        let archiver = select_archiver(&tools.ar);
        let linker = select_linker(toolchain.kind, &tools.linker, toolchain.host);
        let resource: Option<Box<dyn ResourceCompiler>> =
            if toolchain.is_windows_target() && !tools.rc.is_empty() {
                Some(Box::new(WindowsResourceCompiler::from_executable(&tools.rc)))
            } else {
                None
            };
        tracing::debug!(
            "toolchain commands: compiler={} archiver={} linker={} rc={}",
            compiler.name(),
            archiver.name(),
            linker.name(),
            resource.as_ref().map_or("none", |r| r.name())
        );
        Ok(Controller {
            compiler,
            archiver,
            linker,
            resource,
        })
    }

    pub fn compiler(&self) -> &dyn Compiler {
        self.compiler.as_ref()
    }

    pub fn compiles_resources(&self) -> bool {
        self.resource.is_some()
    }

    pub fn needs_pch_stub(&self) -> bool {
        self.compiler.needs_pch_stub()
    }

    /// Command for one source group. Resource scripts go to the resource
    /// compiler; an unavailable tool gives an empty command.
    pub fn compile(&self, ctx: &CommandContext<'_>, group: &SourceFileGroup) -> CommandSpec {
        match group.kind {
            SourceType::WindowsResource => match &self.resource {
                Some(rc) => rc.compile(ctx, group),
                None => CommandSpec::empty(),
            },
            SourceType::CxxPrecompiledHeader => self
                .compiler
                .precompiled_header(ctx, group)
                .into_iter()
                .next()
                .unwrap_or_default(),
            _ => self.compiler.compile(ctx, group),
        }
    }

    pub fn precompiled_header(&self, ctx: &CommandContext<'_>, group: &SourceFileGroup) -> Vec<CommandSpec> {
        self.compiler.precompiled_header(ctx, group)
    }

    pub fn module_command(
        &self,
        ctx: &CommandContext<'_>,
        request: &ModuleCompile<'_>,
    ) -> Result<CommandSpec, ToolchainError> {
        self.compiler.module_command(ctx, request)
    }

    /// Archive or link command producing the target's output file.
    pub fn output_command(
        &self,
        ctx: &CommandContext<'_>,
        output: &str,
        objects: &[String],
        output_base: &str,
    ) -> CommandSpec {
        if ctx.target.is_static_library() {
            self.archiver.archive(ctx, output, objects)
        } else {
            self.linker.link(ctx, output, objects, output_base)
        }
    }
}
