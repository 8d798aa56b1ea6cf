//! Implementation of `anvil commands`.
//!
//! Prints what a full rebuild of a target would run. The source cache is
//! never consulted, so the output does not depend on earlier builds.

use anyhow::{bail, Result};

use crate::builder::native::output_job;
use crate::builder::{BuildRequest, BuildState, Cmd, Job, Target};
use crate::builder::toolchain::SystemProbe;
use crate::core::{SourceTarget, SourceType, Workspace};
use crate::util::context::GlobalContext;

/// Options for the commands command.
#[derive(Debug, Clone, Default)]
pub struct CommandsOptions {
    /// Only this target (empty = every target)
    pub target: Option<String>,

    pub toolchain: Option<std::path::PathBuf>,
    pub arch: Option<String>,
}

/// Every command a full build of `target` runs, in execution order.
pub fn target_commands(state: &BuildState, target: &SourceTarget) -> Result<Target> {
    let ctx = state.context(target);
    let files = state.paths.resolve_files(&state.root, target)?;
    let outputs = state
        .paths
        .outputs(target, &files, state.controller.compiles_resources());

    let mut plan = Target::new(target.name.clone());
    if let Some(pch) = outputs.pch() {
        let commands: Vec<Cmd> = state
            .controller
            .precompiled_header(&ctx, pch)
            .iter()
            .filter_map(|spec| Cmd::from_spec(pch.source_file.clone(), spec))
            .collect();
        if !commands.is_empty() {
            plan.pre = Some(Job::new(commands));
        }
    }
    for group in &outputs.groups {
        if group.kind == SourceType::CxxPrecompiledHeader {
            continue;
        }
        let spec = state.controller.compile(&ctx, group);
        if let Some(cmd) = Cmd::from_spec(group.source_file.clone(), &spec) {
            plan.list.push(Job::single(cmd.reference(group.object_file.clone())));
        }
    }
    plan.post = output_job(&state.controller, &ctx, &outputs);
    Ok(plan)
}

/// Select targets by name; an unknown name lists the available ones.
pub fn select_targets<'a>(ws: &'a Workspace, filter: Option<&str>) -> Result<Vec<&'a SourceTarget>> {
    let targets = ws.manifest().targets();
    let Some(name) = filter else {
        return Ok(targets.iter().collect());
    };
    match ws.manifest().target(name) {
        Some(target) => Ok(vec![target]),
        None => {
            let available: Vec<&str> = targets.iter().map(|t| t.name.as_str()).collect();
            bail!(
                "unknown target `{}`\n\
                 available targets: {}",
                name,
                if available.is_empty() {
                    "(none)".to_string()
                } else {
                    available.join(", ")
                }
            );
        }
    }
}

/// Detect the toolchain and plan full builds of the selected targets.
pub fn commands(ws: &Workspace, gctx: &GlobalContext, opts: &CommandsOptions) -> Result<Vec<Target>> {
    let selected = select_targets(ws, opts.target.as_deref())?;
    let probe = SystemProbe::new(gctx.env().clone());
    let request = BuildRequest {
        compiler: opts.toolchain.clone(),
        arch: opts.arch.clone(),
        color: gctx.color(),
    };
    let state = BuildState::new(ws, gctx, &request, &probe)?;
    selected
        .into_iter()
        .map(|target| target_commands(&state, target))
        .collect()
}
