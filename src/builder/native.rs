//! Native generator: plans and runs one target at a time.
//!
//! For each target the generator asks the source cache which files changed,
//! emits a precompiled-header job, compile jobs for the changed sources and
//! a link (or archive) job when anything the output depends on changed:
//!
//! ```text
//! pre:  precompiled header           (only when it changed)
//! list: compile a.cpp, compile b.c   (only changed sources, in parallel)
//! post: link or archive              (only when needed)
//! ```
//!
//! Targets are built in manifest order. A target whose link job ran is
//! added to the session's changed set, which later targets consult before
//! deciding whether to relink.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use anyhow::{Context, Result};

use crate::builder::cache::depfile::read_dependencies;
use crate::builder::context::BuildState;
use crate::builder::executor::CommandPool;
use crate::builder::plan::{Cmd, Job, Target};
use crate::builder::toolchain::compiler::{pch_stub_contents, uses_pch};
use crate::builder::toolchain::{CommandContext, Controller};
use crate::core::{SourceDataType, SourceFileGroup, SourceOutputs, SourceTarget, SourceType};
use crate::util::fs::{ensure_dir, remove_file_if_exists, write_string};
use crate::util::hash::hash_argv;

/// Targets whose output was rebuilt during this build.
#[derive(Debug, Clone, Default)]
pub struct BuildSession {
    targets_changed: BTreeSet<String>,
}

impl BuildSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_changed(&mut self, name: &str) {
        self.targets_changed.insert(name.to_string());
    }

    pub fn is_changed(&self, name: &str) -> bool {
        self.targets_changed.contains(name)
    }

    pub fn changed_targets(&self) -> &BTreeSet<String> {
        &self.targets_changed
    }
}

/// Placeholder source used to fingerprint the command line of a source type.
fn placeholder_group(kind: SourceType, object_ext: &str) -> SourceFileGroup {
    let (source, object) = match kind {
        SourceType::C => ("cmd.c".to_string(), format!("cmd.c{}", object_ext)),
        SourceType::ObjectiveC => ("cmd.m".to_string(), format!("cmd.m{}", object_ext)),
        SourceType::ObjectiveCpp => ("cmd.mm".to_string(), format!("cmd.mm{}", object_ext)),
        SourceType::WindowsResource => ("cmd.rc".to_string(), "cmd.res".to_string()),
        SourceType::CxxPrecompiledHeader => ("cmd.h".to_string(), "cmd.h.pch".to_string()),
        _ => ("cmd.cxx".to_string(), format!("cmd.cxx{}", object_ext)),
    };
    SourceFileGroup {
        dependency_file: format!("{}.d", source),
        other_file: format!("{}.cpp", source),
        source_file: source,
        object_file: object,
        kind,
        data_type: SourceDataType::Normal,
    }
}

/// Source types whose command line changed since the last build, and
/// whether the link/archive command changed.
///
/// The new hashes are stored immediately; they are only persisted when the
/// build succeeds.
pub fn command_changes(
    state: &BuildState,
    ctx: &CommandContext<'_>,
    outputs: &SourceOutputs,
) -> (BTreeSet<SourceType>, bool) {
    let target = ctx.target;
    let mut changed = BTreeSet::new();
    for kind in outputs.source_types() {
        let sample = placeholder_group(kind, ctx.paths.naming().object_ext);
        let argv = state.controller.compile(ctx, &sample).to_argv();
        let key = format!("{}_source_{}", target.name, kind.as_str());
        if state.cache.data_value_changed(&key, &hash_argv(&argv)) {
            tracing::debug!("{}: {} command line changed", target.name, kind.as_str());
            changed.insert(kind);
        }
    }

    let objects = vec![format!("cmd.cxx{}", ctx.paths.naming().object_ext)];
    let argv = state
        .controller
        .output_command(ctx, "cmd.out", &objects, "cmd")
        .to_argv();
    let link_changed = state
        .cache
        .data_value_changed(&format!("{}_target", target.name), &hash_argv(&argv));
    (changed, link_changed)
}

/// Whether a project target this one links against was rebuilt this session.
pub fn check_dependent_targets(target: &SourceTarget, session: &BuildSession) -> bool {
    target.project_links().any(|link| session.is_changed(link))
}

/// Whether the output of a project static link changed on disk since it
/// was recorded.
pub fn rebuild_required_from_links(state: &BuildState, target: &SourceTarget, all: &[SourceTarget]) -> bool {
    target.project_static_links().iter().any(|link| {
        all.iter()
            .find(|t| &t.name == link)
            .is_some_and(|dep| state.cache.file_changed(&state.paths.output_file(dep)))
    })
}

/// The job producing a target's output file.
pub fn output_job(controller: &Controller, ctx: &CommandContext<'_>, outputs: &SourceOutputs) -> Option<Job> {
    let base = ctx.paths.output_base(ctx.target);
    let spec = controller.output_command(ctx, &outputs.target, &outputs.objects, &base);
    Cmd::from_spec(ctx.target.name.clone(), &spec)
        .map(|cmd| Job::single(cmd.reference(outputs.target.clone())))
}

/// Create every directory a target writes into.
pub fn create_directories(root: &Path, outputs: &SourceOutputs) -> Result<()> {
    for dir in &outputs.directories {
        ensure_dir(&root.join(dir))?;
    }
    Ok(())
}

/// Record a source and everything its dependency file lists.
pub fn record_source(state: &BuildState, group: &SourceFileGroup, seen: &mut HashSet<String>) {
    if seen.insert(group.source_file.clone()) {
        state.cache.record(&group.source_file);
    }
    if group.dependency_file.is_empty() {
        return;
    }
    match read_dependencies(&state.root.join(&group.dependency_file)) {
        Ok(deps) => {
            for dep in deps {
                if seen.insert(dep.clone()) {
                    state.cache.record(&dep);
                }
            }
        }
        Err(e) => tracing::debug!("{:#}", e),
    }
}

/// Delete what failed commands left behind and keep the cache from being
/// saved.
pub fn discard_failed(state: &BuildState, failed: &[String]) {
    for reference in failed {
        if let Err(e) = remove_file_if_exists(&state.root.join(reference)) {
            tracing::debug!("{:#}", e);
        }
    }
    state.cache.disallow_save();
}

/// The planned work of one target.
#[derive(Debug, Clone)]
pub struct TargetPlan {
    pub plan: Target,
    pub outputs: SourceOutputs,
    /// Groups compiled by this plan, precompiled header included
    pub compiled: Vec<SourceFileGroup>,
    /// Whether the plan links or archives
    pub links: bool,
}

impl TargetPlan {
    pub fn compile_count(&self) -> usize {
        self.plan.list.len()
    }
}

/// Plans and runs targets with the native strategy.
pub struct NativeGenerator<'a> {
    state: &'a BuildState,
    pool: &'a CommandPool,
}

impl<'a> NativeGenerator<'a> {
    pub fn new(state: &'a BuildState, pool: &'a CommandPool) -> Self {
        NativeGenerator { state, pool }
    }

    /// Decide what to run for `target`. Nothing is written to disk.
    pub fn plan(&self, target: &SourceTarget, all: &[SourceTarget], session: &BuildSession) -> Result<TargetPlan> {
        let state = self.state;
        let ctx = state.context(target);
        let files = state.paths.resolve_files(&state.root, target)?;
        let outputs = state
            .paths
            .outputs(target, &files, state.controller.compiles_resources());
        let (changed_types, link_changed) = command_changes(state, &ctx, &outputs);
        let exists = |path: &str| state.root.join(path).exists();

        let mut plan = Target::new(target.name.clone());
        let mut compiled = Vec::new();

        let mut pch_changed = false;
        if let Some(pch) = outputs.pch() {
            pch_changed = changed_types.contains(&SourceType::CxxPrecompiledHeader)
                || state.cache.source_changed(&pch.source_file, &pch.dependency_file)
                || !exists(&pch.object_file);
            if pch_changed {
                let commands: Vec<Cmd> = state
                    .controller
                    .precompiled_header(&ctx, pch)
                    .iter()
                    .filter_map(|spec| Cmd::from_spec(pch.source_file.clone(), spec))
                    .map(|cmd| {
                        cmd.reference(pch.object_file.clone())
                            .dependency(pch.dependency_file.clone())
                    })
                    .collect();
                if !commands.is_empty() {
                    plan.pre = Some(Job::new(commands));
                    compiled.push(pch.clone());
                }
            }
        }

        for group in &outputs.groups {
            if group.kind == SourceType::CxxPrecompiledHeader {
                continue;
            }
            let needs = (pch_changed && uses_pch(target, group.kind))
                || changed_types.contains(&group.kind)
                || state.cache.source_changed(&group.source_file, &group.dependency_file)
                || !exists(&group.object_file);
            if !needs {
                continue;
            }
            let spec = state.controller.compile(&ctx, group);
            if let Some(cmd) = Cmd::from_spec(group.source_file.clone(), &spec) {
                let cmd = cmd
                    .reference(group.object_file.clone())
                    .dependency(group.dependency_file.clone());
                plan.list.push(Job::single(cmd));
                compiled.push(group.clone());
            }
        }

        let links = !compiled.is_empty()
            || link_changed
            || !exists(&outputs.target)
            || check_dependent_targets(target, session)
            || rebuild_required_from_links(state, target, all);
        if links {
            plan.post = output_job(&state.controller, &ctx, &outputs);
        }
        let links = plan.post.is_some();

        tracing::info!(
            "{}: {} compile job(s){}",
            target.name,
            plan.list.len() + usize::from(plan.pre.is_some()),
            if links { ", link" } else { "" }
        );

        Ok(TargetPlan {
            plan,
            outputs,
            compiled,
            links,
        })
    }

    /// Remove outputs about to be rebuilt, create directories and write
    /// precompiled-header stubs.
    fn prepare(&self, target: &SourceTarget, planned: &TargetPlan) -> Result<()> {
        let root = &self.state.root;
        create_directories(root, &planned.outputs)?;
        for group in &planned.compiled {
            remove_file_if_exists(&root.join(&group.object_file))?;
            if group.kind == SourceType::CxxPrecompiledHeader && self.state.controller.needs_pch_stub() {
                let stub = &group.other_file;
                if !stub.is_empty() {
                    write_string(&root.join(stub), &pch_stub_contents(&group.source_file))
                        .with_context(|| format!("failed to write the precompiled header stub for {}", target.name))?;
                }
            }
        }
        if planned.links {
            remove_file_if_exists(&root.join(&planned.outputs.target))?;
        }
        Ok(())
    }

    /// Plan, run and record one target.
    pub fn build(&self, target: &SourceTarget, all: &[SourceTarget], session: &mut BuildSession) -> Result<()> {
        let planned = self.plan(target, all, session)?;
        if planned.plan.is_empty() {
            tracing::debug!("{} is up to date", target.name);
            return Ok(());
        }

        if self.pool.settings().dry_run {
            self.state.cache.disallow_save();
            self.pool.run(&planned.plan)?;
            if planned.links {
                session.mark_changed(&target.name);
            }
            return Ok(());
        }

        self.prepare(target, &planned)?;
        if let Err(e) = self.pool.run(&planned.plan) {
            discard_failed(self.state, &e.failed);
            return Err(e).with_context(|| format!("failed to build target '{}'", target.name));
        }

        let mut seen = HashSet::new();
        for group in &planned.compiled {
            record_source(self.state, group, &mut seen);
        }
        if planned.links {
            self.state.cache.record(&planned.outputs.target);
            session.mark_changed(&target.name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::context::tests::gcc_state;
    use crate::builder::executor::PoolSettings;
    use crate::builder::toolchain::EnvSnapshot;
    use crate::core::Workspace;
    use tempfile::TempDir;

    const APP: &str = r#"
[[target]]
name = "app"
files = ["src/*.cpp"]
"#;

    const LIB_AND_APP: &str = r#"
[[target]]
name = "core"
kind = "static-library"
files = ["core/*.cpp"]

[[target]]
name = "app"
files = ["src/*.cpp"]
static-links = ["core"]
"#;

    fn write(root: &Path, name: &str, content: &str) {
        let path = root.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn pool(root: &Path) -> CommandPool {
        let env = EnvSnapshot::from_vars([("PATH", "/usr/bin:/bin")]);
        let settings = PoolSettings {
            quiet: true,
            ..Default::default()
        };
        CommandPool::new(settings, env, root).unwrap()
    }

    /// Pretend every planned command succeeded.
    fn fake_success(root: &Path, planned: &TargetPlan) {
        for cmd in planned.plan.commands() {
            write(root, &cmd.reference, "");
            if let Some(dep) = &cmd.dependency {
                write(root, dep, &format!("{}:\n", cmd.reference));
            }
        }
    }

    fn record(state: &BuildState, planned: &TargetPlan, session: &mut BuildSession) {
        let mut seen = HashSet::new();
        for group in &planned.compiled {
            record_source(state, group, &mut seen);
        }
        if planned.links {
            state.cache.record(&planned.outputs.target);
            session.mark_changed(&planned.plan.name);
        }
    }

    fn project(tmp: &TempDir, manifest: &str) -> (Workspace, BuildState) {
        write(tmp.path(), "src/main.cpp", "int main() { return 0; }\n");
        write(tmp.path(), "src/util.cpp", "int util() { return 1; }\n");
        write(tmp.path(), "core/core.cpp", "int core() { return 2; }\n");
        gcc_state(tmp.path(), manifest)
    }

    #[test]
    fn test_first_build_compiles_everything() {
        let tmp = TempDir::new().unwrap();
        let (ws, state) = project(&tmp, APP);
        let pool = pool(tmp.path());
        let generator = NativeGenerator::new(&state, &pool);
        let target = &ws.manifest().targets()[0];

        let planned = generator.plan(target, ws.manifest().targets(), &BuildSession::new()).unwrap();
        assert_eq!(planned.compile_count(), 2);
        assert!(planned.links);
        assert!(planned.plan.pre.is_none());
        let link = &planned.plan.post.as_ref().unwrap().commands[0];
        assert_eq!(link.reference, "build/Debug/app");
    }

    #[test]
    fn test_second_build_is_empty() {
        let tmp = TempDir::new().unwrap();
        let (ws, state) = project(&tmp, APP);
        let pool = pool(tmp.path());
        let generator = NativeGenerator::new(&state, &pool);
        let target = &ws.manifest().targets()[0];
        let mut session = BuildSession::new();

        let planned = generator.plan(target, ws.manifest().targets(), &session).unwrap();
        fake_success(tmp.path(), &planned);
        record(&state, &planned, &mut session);

        let again = generator
            .plan(target, ws.manifest().targets(), &BuildSession::new())
            .unwrap();
        assert!(again.plan.is_empty());
        assert!(!again.links);
    }

    #[test]
    fn test_only_changed_source_recompiles() {
        let tmp = TempDir::new().unwrap();
        let (ws, state) = project(&tmp, APP);
        let pool = pool(tmp.path());
        let generator = NativeGenerator::new(&state, &pool);
        let target = &ws.manifest().targets()[0];
        let mut session = BuildSession::new();

        let planned = generator.plan(target, ws.manifest().targets(), &session).unwrap();
        fake_success(tmp.path(), &planned);
        record(&state, &planned, &mut session);

        write(tmp.path(), "src/main.cpp", "int main() { return 3; }\n");
        let again = generator
            .plan(target, ws.manifest().targets(), &BuildSession::new())
            .unwrap();
        let labels: Vec<&str> = again.plan.list.iter().map(|j| j.commands[0].label.as_str()).collect();
        assert_eq!(labels, vec!["src/main.cpp"]);
        assert!(again.links);
    }

    #[test]
    fn test_header_change_propagates_through_depfile() {
        let tmp = TempDir::new().unwrap();
        let (ws, state) = project(&tmp, APP);
        write(tmp.path(), "src/util.hpp", "int util();\n");
        let pool = pool(tmp.path());
        let generator = NativeGenerator::new(&state, &pool);
        let target = &ws.manifest().targets()[0];
        let mut session = BuildSession::new();

        let planned = generator.plan(target, ws.manifest().targets(), &session).unwrap();
        fake_success(tmp.path(), &planned);
        write(
            tmp.path(),
            "build/Debug/dep.app/src/util.cpp.d",
            "build/Debug/obj.app/src/util.cpp.o: src/util.cpp src/util.hpp\nsrc/util.hpp:\n",
        );
        record(&state, &planned, &mut session);

        write(tmp.path(), "src/util.hpp", "int util(int);\n");
        let again = generator
            .plan(target, ws.manifest().targets(), &BuildSession::new())
            .unwrap();
        assert_eq!(again.compile_count(), 1);
        assert_eq!(again.plan.list[0].commands[0].label, "src/util.cpp");
    }

    #[test]
    fn test_missing_object_recompiles() {
        let tmp = TempDir::new().unwrap();
        let (ws, state) = project(&tmp, APP);
        let pool = pool(tmp.path());
        let generator = NativeGenerator::new(&state, &pool);
        let target = &ws.manifest().targets()[0];
        let mut session = BuildSession::new();

        let planned = generator.plan(target, ws.manifest().targets(), &session).unwrap();
        fake_success(tmp.path(), &planned);
        record(&state, &planned, &mut session);

        std::fs::remove_file(tmp.path().join("build/Debug/obj.app/src/util.cpp.o")).unwrap();
        let again = generator
            .plan(target, ws.manifest().targets(), &BuildSession::new())
            .unwrap();
        assert_eq!(again.compile_count(), 1);
    }

    #[test]
    fn test_changed_library_relinks_dependents() {
        let tmp = TempDir::new().unwrap();
        let (ws, state) = project(&tmp, LIB_AND_APP);
        let pool = pool(tmp.path());
        let generator = NativeGenerator::new(&state, &pool);
        let all = ws.manifest().targets();
        let (core, app) = (&all[0], &all[1]);

        let mut session = BuildSession::new();
        for target in [core, app] {
            let planned = generator.plan(target, all, &session).unwrap();
            fake_success(tmp.path(), &planned);
            record(&state, &planned, &mut session);
        }

        // Only the library's source changes
        write(tmp.path(), "core/core.cpp", "int core() { return 4; }\n");
        let mut session = BuildSession::new();
        let planned = generator.plan(core, all, &session).unwrap();
        assert_eq!(planned.compile_count(), 1);
        fake_success(tmp.path(), &planned);
        record(&state, &planned, &mut session);
        assert!(session.is_changed("core"));

        let planned = generator.plan(app, all, &session).unwrap();
        assert_eq!(planned.compile_count(), 0);
        assert!(planned.links);

        // Untouched session: nothing to do
        let planned = generator.plan(app, all, &BuildSession::new()).unwrap();
        assert!(planned.plan.is_empty());
    }

    #[test]
    fn test_library_replaced_on_disk_relinks() {
        let tmp = TempDir::new().unwrap();
        let (ws, state) = project(&tmp, LIB_AND_APP);
        let pool = pool(tmp.path());
        let generator = NativeGenerator::new(&state, &pool);
        let all = ws.manifest().targets();

        let mut session = BuildSession::new();
        for target in all {
            let planned = generator.plan(target, all, &session).unwrap();
            fake_success(tmp.path(), &planned);
            record(&state, &planned, &mut session);
        }

        write(tmp.path(), "build/Debug/libcore.a", "new archive");
        assert!(rebuild_required_from_links(&state, &all[1], all));
        let planned = generator.plan(&all[1], all, &BuildSession::new()).unwrap();
        assert!(planned.links);
    }

    #[test]
    fn test_command_line_change_rebuilds() {
        let tmp = TempDir::new().unwrap();
        let (ws, state) = project(&tmp, APP);
        let pool = pool(tmp.path());
        let target = &ws.manifest().targets()[0];
        let mut session = BuildSession::new();
        {
            let generator = NativeGenerator::new(&state, &pool);
            let planned = generator.plan(target, ws.manifest().targets(), &session).unwrap();
            fake_success(tmp.path(), &planned);
            record(&state, &planned, &mut session);
        }

        let mut changed = target.clone();
        changed.defines.push("NEW_FLAG".into());
        let generator = NativeGenerator::new(&state, &pool);
        let planned = generator
            .plan(&changed, ws.manifest().targets(), &BuildSession::new())
            .unwrap();
        assert_eq!(planned.compile_count(), 2);
    }

    #[test]
    fn test_pch_change_rebuilds_consumers() {
        let tmp = TempDir::new().unwrap();
        let manifest = format!("{}precompiled-header = \"src/pch.hpp\"\n", APP);
        let (ws, state) = project(&tmp, &manifest);
        write(tmp.path(), "src/pch.hpp", "#include <vector>\n");
        let pool = pool(tmp.path());
        let generator = NativeGenerator::new(&state, &pool);
        let target = &ws.manifest().targets()[0];
        let mut session = BuildSession::new();

        let planned = generator.plan(target, ws.manifest().targets(), &session).unwrap();
        let pre = planned.plan.pre.as_ref().unwrap();
        assert_eq!(pre.commands[0].reference, "build/Debug/int.app/src/pch.hpp.gch");
        fake_success(tmp.path(), &planned);
        record(&state, &planned, &mut session);

        write(tmp.path(), "src/pch.hpp", "#include <string>\n");
        let again = generator
            .plan(target, ws.manifest().targets(), &BuildSession::new())
            .unwrap();
        assert!(again.plan.pre.is_some());
        assert_eq!(again.compile_count(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_build_runs_and_records() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let (ws, mut state) = project(&tmp, APP);
        let stub = tmp.path().join("fake-g++");
        std::fs::write(
            &stub,
            "#!/bin/sh\nout=\"\"; dep=\"\"; prev=\"\"\nfor a in \"$@\"; do\n  case \"$prev\" in -o) out=\"$a\";; -MF) dep=\"$a\";; esac\n  prev=\"$a\"\ndone\n[ -n \"$dep\" ] && echo \"$out:\" > \"$dep\"\n[ -n \"$out\" ] && : > \"$out\"\nexit 0\n",
        )
        .unwrap();
        std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755)).unwrap();
        state.tools.cxx = stub.to_string_lossy().to_string();
        state.tools.cc = state.tools.cxx.clone();

        let pool = pool(tmp.path());
        let generator = NativeGenerator::new(&state, &pool);
        let target = &ws.manifest().targets()[0];
        let mut session = BuildSession::new();
        generator.build(target, ws.manifest().targets(), &mut session).unwrap();

        assert!(tmp.path().join("build/Debug/app").exists());
        assert!(tmp.path().join("build/Debug/obj.app/src/main.cpp.o").exists());
        assert!(session.is_changed("app"));

        let again = generator
            .plan(target, ws.manifest().targets(), &BuildSession::new())
            .unwrap();
        assert!(again.plan.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_build_discards_outputs() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let (ws, mut state) = project(&tmp, APP);
        let stub = tmp.path().join("broken-g++");
        std::fs::write(&stub, "#!/bin/sh\necho 'error: broken' >&2\nexit 1\n").unwrap();
        std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755)).unwrap();
        state.tools.cxx = stub.to_string_lossy().to_string();

        let pool = pool(tmp.path());
        let generator = NativeGenerator::new(&state, &pool);
        let target = &ws.manifest().targets()[0];
        let err = generator
            .build(target, ws.manifest().targets(), &mut BuildSession::new())
            .unwrap_err();
        assert!(format!("{:#}", err).contains("failed to build target 'app'"));
        assert!(state.cache.save_disallowed());
        assert!(!tmp.path().join("build/Debug/app").exists());
    }
}
