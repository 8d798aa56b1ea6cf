//! Implementation of `anvil build`.

use std::path::PathBuf;

use anyhow::{bail, Result};

use crate::builder::{
    BuildRequest, BuildSession, BuildState, CommandPool, ModuleGenerator, NativeGenerator, PoolSettings,
};
use crate::builder::compile_db::write_compile_commands;
use crate::builder::toolchain::SystemProbe;
use crate::core::{SourceTarget, Workspace};
use crate::util::context::GlobalContext;

/// Options for the build command.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Number of parallel jobs (`None` = manifest setting, else one per CPU)
    pub jobs: Option<usize>,

    /// Keep building independent targets after a failure
    pub keep_going: bool,

    /// Print commands instead of running them
    pub dry_run: bool,

    /// Explicit compiler from the command line
    pub toolchain: Option<PathBuf>,

    /// Requested architecture
    pub arch: Option<String>,

    /// Hide progress output
    pub quiet: bool,

    /// Print every command before running it
    pub verbose: bool,
}

/// Outcome of a successful build.
#[derive(Debug, Default)]
pub struct BuildSummary {
    /// Number of targets in the manifest
    pub targets: usize,

    /// Targets whose output was linked or archived
    pub relinked: Vec<String>,
}

impl BuildSummary {
    pub fn up_to_date(&self) -> bool {
        self.relinked.is_empty()
    }
}

/// Pool settings from the command line, falling back to the manifest.
pub fn pool_settings(ws: &Workspace, opts: &BuildOptions) -> PoolSettings {
    let section = &ws.manifest().toolchain;
    PoolSettings {
        max_jobs: opts.jobs.or(section.max_jobs).unwrap_or(0),
        keep_going: opts.keep_going || section.keep_going,
        dry_run: opts.dry_run,
        quiet: opts.quiet,
        verbose: opts.verbose,
    }
}

/// Detect the toolchain and build every target of the workspace.
pub fn build(ws: &Workspace, gctx: &GlobalContext, opts: &BuildOptions) -> Result<BuildSummary> {
    let probe = SystemProbe::new(gctx.env().clone());
    let request = BuildRequest {
        compiler: opts.toolchain.clone(),
        arch: opts.arch.clone(),
        color: gctx.color(),
    };
    let state = BuildState::new(ws, gctx, &request, &probe)?;
    tracing::info!(
        "building {} ({}) with {} {}",
        state.configuration.name,
        state.toolchain.triple(),
        state.toolchain.kind,
        state.toolchain.compiler.version
    );
    build_with_state(ws, &state, opts)
}

/// Build every target in manifest order with an already prepared state.
///
/// The source cache is only saved when every target succeeded and the
/// build was not a dry run.
pub fn build_with_state(ws: &Workspace, state: &BuildState, opts: &BuildOptions) -> Result<BuildSummary> {
    let targets = ws.manifest().targets();
    let settings = pool_settings(ws, opts);
    let keep_going = settings.keep_going;
    let pool = CommandPool::new(settings, state.env().clone(), &state.root)?;
    tracing::debug!("command pool: {} worker(s)", pool.workers());

    if !opts.dry_run {
        let path = write_compile_commands(state, targets)?;
        tracing::info!("wrote {}", path.display());
    }

    let mut session = BuildSession::new();
    let mut failed: Vec<String> = Vec::new();

    for target in targets {
        if let Some(link) = target.project_links().find(|link| failed.contains(link)) {
            tracing::warn!("skipping '{}': it links the failed target '{}'", target.name, link);
            failed.push(target.name.clone());
            continue;
        }

        if let Err(e) = build_target(state, &pool, target, targets, &mut session) {
            state.cache.disallow_save();
            if !keep_going {
                return Err(e);
            }
            tracing::error!("{:#}", e);
            failed.push(target.name.clone());
        }
    }

    if !failed.is_empty() {
        bail!("{} target(s) failed: {}", failed.len(), failed.join(", "));
    }

    state.finish()?;

    Ok(BuildSummary {
        targets: targets.len(),
        relinked: session.changed_targets().iter().cloned().collect(),
    })
}

/// Build one target with the generator its settings call for.
fn build_target(
    state: &BuildState,
    pool: &CommandPool,
    target: &SourceTarget,
    all: &[SourceTarget],
    session: &mut BuildSession,
) -> Result<()> {
    if target.cpp_modules {
        ModuleGenerator::new(state, pool)?.build(target, all, session)
    } else {
        NativeGenerator::new(state, pool).build(target, all, session)
    }
}
