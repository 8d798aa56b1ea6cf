//! C++20 module builds.
//!
//! A module build runs five phases, each a separate command-pool run:
//!
//! ```text
//! 1. scan            dependency JSON per source (compiler or textual)
//! 2. header scan     dependency JSON per header unit (MSVC only)
//! 3. header units    interface (+ object) per imported header
//! 4. waves           interfaces and sources, in import order
//! 5. link
//! ```
//!
//! Sources are ordered by a graph over the modules they provide and
//! import. Wave `n` only imports modules built in waves `< n`. A source is
//! rebuilt when it changed, when a header unit it imports changed, or when
//! any module it imports is rebuilt.

pub mod clang;
pub mod deps;
pub mod gcc;
pub mod msvc;
pub mod scan;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::builder::context::BuildState;
use crate::builder::executor::CommandPool;
use crate::builder::native::{
    check_dependent_targets, command_changes, create_directories, discard_failed, output_job,
    rebuild_required_from_links, record_source, BuildSession,
};
use crate::builder::plan::{Cmd, Job, Target};
use crate::builder::toolchain::compiler::{pch_stub_contents, uses_pch, ModuleCompile, ModulePhase};
use crate::builder::toolchain::{CommandContext, ToolchainEnvironment, ToolchainType};
use crate::core::target::LanguageStandard;
use crate::core::{SourceDataType, SourceFileGroup, SourceOutputs, SourceTarget, SourceType};
use crate::util::diagnostic::{ModuleDependencyError, ToolchainError};
use crate::util::fs::{ensure_dir, remove_file_if_exists, write_string};
use crate::util::hash::{hash_argv, short_hash};

use self::clang::ClangStrategy;
use self::deps::{read_module_dependencies, ModuleDependencies};
use self::gcc::GccStrategy;
use self::msvc::MsvcStrategy;
use self::scan::scan_file;

/// What differs between compilers in a module build.
///
/// The command lines themselves come from the toolchain's compiler; a
/// strategy decides how dependencies are discovered and where outputs go.
pub trait ModuleStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Dependencies are written by the compiler rather than scanned here.
    fn scans_with_compiler(&self) -> bool {
        false
    }

    /// Object compiles also write a Makefile dependency file.
    fn writes_build_dependencies(&self) -> bool {
        false
    }

    /// Modules shipped with the toolchain: name to source path.
    fn system_modules(&self, _toolchain: &ToolchainEnvironment) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// Header unit objects are linked into the target.
    fn links_header_units(&self) -> bool {
        false
    }

    /// Interface file of a system header unit. Empty when the compiler
    /// chooses the location itself.
    fn system_header_interface(&self, modules_dir: &str, stem: &str, interface_ext: &str) -> String {
        format!("{}/{}{}", modules_dir, stem, interface_ext)
    }

    /// Source argument naming a system header unit.
    fn system_header_source(&self, header: &str) -> String {
        header.to_string()
    }

    /// Rename performed after a system header unit is built.
    fn system_header_rename(&self, _group: &SourceFileGroup, _header: &str) -> Option<(String, String)> {
        None
    }

    /// Module names are resolved through a mapper file.
    fn uses_mapper(&self) -> bool {
        false
    }

    /// Write the module mapper file.
    fn write_mapper(
        &self,
        _path: &Path,
        _modules: &[(String, String)],
        _header_units: &[(String, String)],
    ) -> Result<()> {
        Ok(())
    }
}

/// Pick the module strategy for a toolchain.
pub fn make_strategy(kind: ToolchainType) -> Result<Box<dyn ModuleStrategy>, ToolchainError> {
    match kind {
        ToolchainType::VisualStudio => Ok(Box::new(MsvcStrategy)),
        ToolchainType::Gnu | ToolchainType::MingwGnu => Ok(Box::new(GccStrategy)),
        ToolchainType::Llvm
        | ToolchainType::MingwLlvm
        | ToolchainType::AppleLlvm
        | ToolchainType::VisualStudioLlvm
        | ToolchainType::IntelLlvm => Ok(Box::new(ClangStrategy)),
        other => Err(ToolchainError::ModuleStrategy {
            toolchain: other.identifier().to_string(),
        }),
    }
}

/// Identifies the toolchain and configuration system header units were
/// built with, so they can be shared between targets.
pub fn module_id(state: &BuildState) -> String {
    let toolchain = &state.toolchain;
    short_hash(&format!(
        "{}_{}_{}_{}",
        toolchain.host_arch.token,
        toolchain.triple(),
        toolchain.toolchain_id(),
        state.configuration.name
    ))
}

/// Error unless the target's standard allows importing a standard library
/// module.
pub fn check_std_module(target: &SourceTarget, module: &str) -> Result<(), ModuleDependencyError> {
    let year = LanguageStandard::parse(&target.cpp_standard).and_then(|s| s.cpp_year());
    if year.is_some_and(|y| y >= 23) {
        Ok(())
    } else {
        Err(ModuleDependencyError::StdRequiresCpp23 {
            module: module.to_string(),
            standard: target.cpp_standard.clone(),
        })
    }
}

/// Group modules into build waves.
///
/// `imports[i]` lists the units unit `i` imports. A cycle is reported with
/// the module names along it.
pub fn build_waves(names: &[String], imports: &[Vec<usize>]) -> Result<Vec<Vec<usize>>, ModuleDependencyError> {
    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let nodes: Vec<NodeIndex> = (0..names.len()).map(|i| graph.add_node(i)).collect();
    for (unit, deps) in imports.iter().enumerate() {
        for &dep in deps {
            graph.add_edge(nodes[dep], nodes[unit], ());
        }
    }

    let order = toposort(&graph, None).map_err(|cycle| ModuleDependencyError::Cycle {
        chain: describe_cycle(graph[cycle.node_id()], names, imports),
    })?;

    let mut level = vec![0usize; names.len()];
    for node in order {
        let unit = graph[node];
        level[unit] = imports[unit].iter().map(|&d| level[d] + 1).max().unwrap_or(0);
    }

    let count = level.iter().max().map_or(0, |l| l + 1);
    let mut waves = vec![Vec::new(); count];
    for (unit, l) in level.iter().enumerate() {
        waves[*l].push(unit);
    }
    Ok(waves)
}

/// `A depends on B depends on A`, starting from a unit on a cycle.
fn describe_cycle(start: usize, names: &[String], imports: &[Vec<usize>]) -> String {
    fn walk(unit: usize, start: usize, imports: &[Vec<usize>], path: &mut Vec<usize>, seen: &mut HashSet<usize>) -> bool {
        for &dep in &imports[unit] {
            if dep == start {
                return true;
            }
            if seen.insert(dep) {
                path.push(dep);
                if walk(dep, start, imports, path, seen) {
                    return true;
                }
                path.pop();
            }
        }
        false
    }

    let mut path = vec![start];
    walk(start, start, imports, &mut path, &mut HashSet::new());
    path.push(start);
    path.iter()
        .map(|&u| names[u].as_str())
        .collect::<Vec<_>>()
        .join(" depends on ")
}

/// Mark every unit importing a changed unit as changed, until nothing
/// changes.
pub fn propagate_changes(changed: &mut [bool], imports: &[Vec<usize>]) {
    loop {
        let mut updated = false;
        for unit in 0..changed.len() {
            if !changed[unit] && imports[unit].iter().any(|&dep| changed[dep]) {
                changed[unit] = true;
                updated = true;
            }
        }
        if !updated {
            break;
        }
    }
}

/// Every unit reachable through imports, excluding `unit` itself.
fn transitive_imports(unit: usize, imports: &[Vec<usize>]) -> Vec<usize> {
    let mut seen = HashSet::new();
    let mut stack = imports[unit].clone();
    let mut out = Vec::new();
    while let Some(next) = stack.pop() {
        if next == unit || !seen.insert(next) {
            continue;
        }
        out.push(next);
        stack.extend(imports[next].iter().copied());
    }
    out.sort_unstable();
    out
}

fn phase_key(phase: ModulePhase) -> &'static str {
    match phase {
        ModulePhase::Scan => "scan",
        ModulePhase::HeaderUnitScan => "header_scan",
        ModulePhase::HeaderUnit => "header_unit",
        ModulePhase::Interface => "interface",
        ModulePhase::Implementation => "implementation",
    }
}

/// A translation unit taking part in the module graph.
#[derive(Debug, Clone)]
struct ModuleUnit {
    /// Provided module name, or `@{source}`
    name: String,
    /// Object, build dependency file and (for interfaces) the interface
    group: SourceFileGroup,
    /// Scan output the unit was read from; empty for system modules
    scan_file: String,
    deps: ModuleDependencies,
    system: bool,
    scanned: bool,
    changed: bool,
}

impl ModuleUnit {
    fn provides_module(&self) -> bool {
        self.system || self.deps.provides_module()
    }
}

/// A header imported as a header unit.
#[derive(Debug, Clone)]
struct HeaderUnit {
    /// Name the importers use on their command lines
    key: String,
    /// The header as written in the dependency file
    header: String,
    group: SourceFileGroup,
    changed: bool,
}

impl HeaderUnit {
    fn is_system(&self) -> bool {
        self.group.data_type == SourceDataType::SystemHeaderUnit
    }
}

/// Resolved module graph of one target.
#[derive(Debug, Default)]
struct ModuleGraph {
    units: Vec<ModuleUnit>,
    header_units: Vec<HeaderUnit>,
    imports: Vec<Vec<usize>>,
    unit_headers: Vec<Vec<usize>>,
}

impl ModuleGraph {
    /// `(name, interface)` of every module `unit` needs.
    fn module_references(&self, unit: usize) -> Vec<(String, String)> {
        transitive_imports(unit, &self.imports)
            .into_iter()
            .map(|dep| &self.units[dep])
            .filter(|dep| dep.provides_module() && !dep.group.other_file.is_empty())
            .map(|dep| (dep.name.clone(), dep.group.other_file.clone()))
            .collect()
    }

    /// `(key, interface)` of every header unit `unit` or its imports use.
    fn header_references(&self, unit: usize) -> Vec<(String, String)> {
        let mut indices: Vec<usize> = self.unit_headers[unit].clone();
        for dep in transitive_imports(unit, &self.imports) {
            indices.extend(self.unit_headers[dep].iter().copied());
        }
        let mut seen = HashSet::new();
        indices
            .into_iter()
            .filter(|h| seen.insert(*h))
            .map(|h| &self.header_units[h])
            .filter(|h| !h.group.other_file.is_empty())
            .map(|h| (h.key.clone(), h.group.other_file.clone()))
            .collect()
    }
}

/// Plans and runs targets that use C++ modules.
pub struct ModuleGenerator<'a> {
    state: &'a BuildState,
    pool: &'a CommandPool,
    strategy: Box<dyn ModuleStrategy>,
    module_id: String,
}

impl<'a> ModuleGenerator<'a> {
    /// Fails when the toolchain cannot build modules.
    pub fn new(state: &'a BuildState, pool: &'a CommandPool) -> Result<Self, ToolchainError> {
        state.toolchain.supports_cpp_modules()?;
        let strategy = make_strategy(state.toolchain.kind)?;
        tracing::debug!("using the {} module strategy", strategy.name());
        Ok(ModuleGenerator {
            state,
            pool,
            strategy,
            module_id: module_id(state),
        })
    }

    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    fn dry_run(&self) -> bool {
        self.pool.settings().dry_run
    }

    fn exists(&self, path: &str) -> bool {
        !path.is_empty() && self.state.root.join(path).exists()
    }

    /// Folder shared by system modules and system header units.
    fn modules_dir(&self) -> String {
        format!("{}/modules", self.state.paths.build_dir())
    }

    /// Whether any module command line changed since the last build.
    fn module_commands_changed(&self, ctx: &CommandContext<'_>) -> Result<bool, ToolchainError> {
        let naming = ctx.paths.naming();
        let sample = SourceFileGroup {
            source_file: "cmd.cxx".into(),
            object_file: format!("cmd.cxx{}", naming.object_ext),
            dependency_file: format!("cmd.cxx{}", naming.module_dependency_ext),
            other_file: format!("cmd.cxx{}", naming.module_interface_ext),
            kind: SourceType::Cpp,
            data_type: SourceDataType::Normal,
        };

        let mut changed = false;
        for phase in [
            ModulePhase::Scan,
            ModulePhase::HeaderUnitScan,
            ModulePhase::HeaderUnit,
            ModulePhase::Interface,
            ModulePhase::Implementation,
        ] {
            let request = ModuleCompile {
                phase,
                group: &sample,
                modules: &[],
                header_units: &[],
                mapper: Some("cmd.mapper"),
            };
            let argv = self.state.controller.module_command(ctx, &request)?.to_argv();
            let key = format!("{}_cxx_module_{}", ctx.target.name, phase_key(phase));
            changed |= self.state.cache.data_value_changed(&key, &hash_argv(&argv));
        }
        if changed {
            tracing::debug!("{}: module command lines changed", ctx.target.name);
        }
        Ok(changed)
    }

    /// Run one phase. Failed outputs are removed and the cache is not saved.
    fn run_phase(&self, target: &SourceTarget, plan: &Target) -> Result<()> {
        if plan.is_empty() {
            return Ok(());
        }
        if let Err(e) = self.pool.run(plan) {
            discard_failed(self.state, &e.failed);
            return Err(e).with_context(|| format!("failed to build target '{}'", target.name));
        }
        Ok(())
    }

    /// Remove objects about to be rebuilt.
    fn remove_outputs<'g>(&self, groups: impl IntoIterator<Item = &'g SourceFileGroup>) -> Result<()> {
        if self.dry_run() {
            return Ok(());
        }
        for group in groups {
            remove_file_if_exists(&self.state.root.join(&group.object_file))?;
        }
        Ok(())
    }

    /// Phase 1: dependency scan of every changed C++ source.
    ///
    /// Returns the units in source order. Textual scans happen here;
    /// compiler scans run through the pool.
    fn scan_sources(
        &self,
        ctx: &CommandContext<'_>,
        outputs: &SourceOutputs,
        force: bool,
    ) -> Result<Vec<ModuleUnit>> {
        let state = self.state;
        let target = ctx.target;
        let mut plan = Target::new(format!("{} (scan)", target.name));
        let mut units = Vec::new();

        for group in outputs.groups.iter().filter(|g| g.kind == SourceType::Cpp) {
            let build_dep = state.paths.dependency_file(target, &group.source_file);
            let changed = force
                || state.cache.source_changed(&group.source_file, &group.dependency_file)
                || (self.strategy.writes_build_dependencies()
                    && state.cache.source_changed(&group.source_file, &build_dep))
                || !self.exists(&group.object_file);

            let mut deps = None;
            if changed {
                if self.strategy.scans_with_compiler() {
                    let request = ModuleCompile {
                        phase: ModulePhase::Scan,
                        group,
                        modules: &[],
                        header_units: &[],
                        mapper: None,
                    };
                    let spec = state.controller.module_command(ctx, &request)?;
                    if let Some(cmd) = Cmd::from_spec(group.source_file.clone(), &spec) {
                        let cmd = cmd
                            .reference(group.dependency_file.clone())
                            .dependency(group.dependency_file.clone());
                        plan.list.push(Job::single(cmd));
                    }
                } else {
                    let scanned = scan_file(&state.root, &group.source_file)?;
                    if !self.dry_run() {
                        scanned.write(&state.root.join(&group.dependency_file))?;
                    }
                    deps = Some(scanned);
                }
            }

            units.push(ModuleUnit {
                name: String::new(),
                group: SourceFileGroup {
                    dependency_file: build_dep,
                    ..group.clone()
                },
                scan_file: group.dependency_file.clone(),
                deps: deps.unwrap_or_default(),
                system: false,
                scanned: changed,
                changed,
            });
        }

        self.run_phase(target, &plan)?;

        for unit in units.iter_mut() {
            let from_file = !unit.scanned || self.strategy.scans_with_compiler();
            if from_file {
                unit.deps = if self.dry_run() && !self.exists(&unit.scan_file) {
                    ModuleDependencies::new(&unit.group.source_file)
                } else {
                    read_module_dependencies(&state.root.join(&unit.scan_file), &unit.scan_file)?
                };
            }
            unit.deps.source = unit.group.source_file.clone();
            if unit.deps.claims_root() && self.strategy.scans_with_compiler() {
                // compiler scans do not say whether a unit implements a module
                unit.deps.implemented_module = scan_file(&state.root, &unit.group.source_file)?.implemented_module;
            }
            if unit.deps.provides_module() {
                unit.group.other_file = state.paths.module_interface_file(target, &unit.group.source_file);
            }
            unit.name = if unit.deps.provides_module() {
                unit.deps.provided_module.clone()
            } else {
                format!("@{}", unit.group.source_file)
            };
        }
        Ok(units)
    }

    /// Resolve imports into a graph, adding the system modules and header
    /// units the sources use.
    fn resolve(&self, target: &SourceTarget, units: Vec<ModuleUnit>, force: bool) -> Result<ModuleGraph> {
        let mut graph = ModuleGraph {
            units,
            ..Default::default()
        };

        let mut by_name: HashMap<String, usize> = HashMap::new();
        for (index, unit) in graph.units.iter().enumerate() {
            if let Some(&first) = by_name.get(&unit.name) {
                return Err(ModuleDependencyError::DuplicateModule {
                    module: unit.name.clone(),
                    first: graph.units[first].group.source_file.clone(),
                    second: unit.group.source_file.clone(),
                }
                .into());
            }
            by_name.insert(unit.name.clone(), index);
        }

        let mut roots = graph.units.iter().filter(|u| !u.system && u.deps.claims_root());
        if let (Some(first), Some(second)) = (roots.next(), roots.next()) {
            return Err(ModuleDependencyError::DuplicateRoot {
                first: first.group.source_file.clone(),
                second: second.group.source_file.clone(),
            }
            .into());
        }

        // Imports, adding toolchain modules on first use
        let system_modules = self.strategy.system_modules(&self.state.toolchain);
        let mut index = 0;
        while index < graph.units.len() {
            let mut resolved = Vec::new();
            for module in graph.units[index].deps.imported_modules.clone() {
                let dep = match by_name.get(&module) {
                    Some(&dep) => dep,
                    None => {
                        let Some(source) = system_modules.get(&module) else {
                            return Err(ModuleDependencyError::ModuleNotFound {
                                source_file: graph.units[index].group.source_file.clone(),
                                module,
                            }
                            .into());
                        };
                        check_std_module(target, &module)?;
                        let unit = self.system_module(&module, source, force);
                        graph.units.push(unit);
                        by_name.insert(module.clone(), graph.units.len() - 1);
                        graph.units.len() - 1
                    }
                };
                if dep != index && !resolved.contains(&dep) {
                    resolved.push(dep);
                }
            }
            graph.imports.push(resolved);
            index += 1;
        }

        // Header units, shared between importers
        let mut by_header: HashMap<String, usize> = HashMap::new();
        for unit in 0..graph.units.len() {
            let mut headers = Vec::new();
            for header in graph.units[unit].deps.imported_header_units.clone() {
                let header_unit = self.header_unit(target, &header);
                let index = match by_header.get(&header_unit.key) {
                    Some(&index) => index,
                    None => {
                        graph.header_units.push(header_unit);
                        let index = graph.header_units.len() - 1;
                        by_header.insert(graph.header_units[index].key.clone(), index);
                        index
                    }
                };
                if !headers.contains(&index) {
                    headers.push(index);
                }
            }
            graph.unit_headers.push(headers);
        }
        Ok(graph)
    }

    fn system_module(&self, name: &str, source: &str, force: bool) -> ModuleUnit {
        let naming = self.state.paths.naming();
        let base = format!("{}/{}_{}", self.modules_dir(), name, self.module_id);
        let group = SourceFileGroup {
            source_file: source.to_string(),
            object_file: format!("{}{}", base, naming.object_ext),
            dependency_file: String::new(),
            other_file: format!("{}{}", base, naming.module_interface_ext),
            kind: SourceType::Cpp,
            data_type: SourceDataType::SystemModule,
        };
        let mut deps = ModuleDependencies::new(source);
        deps.provided_module = name.to_string();
        if name == "std.compat" {
            deps.imported_modules.push("std".to_string());
        }
        let changed = force || !self.exists(&group.other_file) || !self.exists(&group.object_file);
        ModuleUnit {
            name: name.to_string(),
            group,
            scan_file: String::new(),
            deps,
            system: true,
            scanned: false,
            changed,
        }
    }

    /// Classify an imported header and name its outputs.
    fn header_unit(&self, target: &SourceTarget, header: &str) -> HeaderUnit {
        let root = self.state.root.to_string_lossy().replace('\\', "/");
        let naming = self.state.paths.naming();

        let system_name = if let Some(name) = header.strip_prefix('<').and_then(|h| h.strip_suffix('>')) {
            Some(name.to_string())
        } else if Path::new(header).is_absolute() || header.starts_with('/') {
            match header.strip_prefix(&format!("{}/", root)) {
                Some(_) => None,
                None => Some(header.to_string()),
            }
        } else {
            None
        };

        if let Some(name) = system_name {
            let file = name.rsplit('/').next().unwrap_or(&name).to_string();
            let stem = format!("{}_{}", file, self.module_id);
            let dir = self.modules_dir();
            let mut group = SourceFileGroup {
                source_file: self.strategy.system_header_source(&name),
                object_file: format!("{}/{}{}", dir, stem, naming.object_ext),
                dependency_file: format!(
                    "{}/{}{}{}",
                    dir, stem, naming.module_interface_ext, naming.module_dependency_ext
                ),
                other_file: String::new(),
                kind: SourceType::Cpp,
                data_type: SourceDataType::SystemHeaderUnit,
            };
            group.other_file = self
                .strategy
                .system_header_interface(&dir, &stem, naming.module_interface_ext);
            return HeaderUnit {
                key: header.to_string(),
                header: name,
                group,
                changed: false,
            };
        }

        let mut path = header
            .strip_prefix(&format!("{}/", root))
            .unwrap_or(header)
            .trim_start_matches("./")
            .to_string();
        if !self.state.root.join(&path).exists() {
            if let Some(dir) = target
                .include_dirs
                .iter()
                .find(|dir| self.state.root.join(dir).join(&path).exists())
            {
                path = format!("{}/{}", dir.trim_end_matches('/'), path);
            }
        }

        let paths = &self.state.paths;
        HeaderUnit {
            key: path.clone(),
            header: path.clone(),
            group: SourceFileGroup {
                object_file: paths.object_file(target, &path),
                dependency_file: paths.module_interface_dependency_file(target, &path),
                other_file: paths.module_interface_file(target, &path),
                source_file: path,
                kind: SourceType::Cpp,
                data_type: SourceDataType::UserHeaderUnit,
            },
            changed: false,
        }
    }

    /// Whether a header unit must be rebuilt.
    fn header_unit_changed(&self, target: &SourceTarget, unit: &HeaderUnit, force: bool) -> bool {
        let cache = &self.state.cache;
        // Built where the compiler chooses; rebuilt once per module id. The
        // id is stored even when forced so the next build sees it.
        let compiler_cached = unit.is_system() && unit.group.other_file.is_empty();
        let id_changed = compiler_cached
            && cache.data_value_changed(
                &format!("{}_header_unit_{}", target.name, unit.header),
                &self.module_id,
            );
        if force || id_changed {
            return true;
        }
        if self.strategy.links_header_units() && !self.exists(&unit.group.object_file) {
            return true;
        }
        if compiler_cached {
            return false;
        }
        if unit.is_system() {
            return !self.exists(&unit.group.other_file);
        }
        let source = &unit.group.source_file;
        let changed = if self.strategy.scans_with_compiler() {
            cache.source_changed(source, &unit.group.dependency_file)
        } else {
            cache.file_changed(source)
        };
        changed || !self.exists(&unit.group.other_file)
    }

    /// Plan, run and record one target.
    pub fn build(&self, target: &SourceTarget, all: &[SourceTarget], session: &mut BuildSession) -> Result<()> {
        let state = self.state;
        let ctx = state.context(target);
        let files = state.paths.resolve_files(&state.root, target)?;
        let outputs = state
            .paths
            .outputs(target, &files, state.controller.compiles_resources());
        let (changed_types, link_changed) = command_changes(state, &ctx, &outputs);
        let force = self.module_commands_changed(&ctx)? || changed_types.contains(&SourceType::Cpp);

        if self.dry_run() {
            state.cache.disallow_save();
        } else {
            create_directories(&state.root, &outputs)?;
            ensure_dir(&state.root.join(self.modules_dir()))?;
        }

        // 1. Source scan
        let units = self.scan_sources(&ctx, &outputs, force)?;
        let mut graph = self.resolve(target, units, force)?;

        // 2. Header unit scan
        for index in 0..graph.header_units.len() {
            let changed = self.header_unit_changed(target, &graph.header_units[index], force);
            graph.header_units[index].changed = changed;
        }
        if self.strategy.scans_with_compiler() {
            let mut plan = Target::new(format!("{} (header scan)", target.name));
            for unit in graph.header_units.iter().filter(|h| h.changed) {
                let request = ModuleCompile {
                    phase: ModulePhase::HeaderUnitScan,
                    group: &unit.group,
                    modules: &[],
                    header_units: &[],
                    mapper: None,
                };
                let spec = state.controller.module_command(&ctx, &request)?;
                if let Some(cmd) = Cmd::from_spec(unit.group.source_file.clone(), &spec) {
                    let file = unit.group.dependency_file.clone();
                    plan.list.push(Job::single(cmd.reference(file.clone()).dependency(file)));
                }
            }
            self.run_phase(target, &plan)?;
        }

        for unit in 0..graph.units.len() {
            if graph.unit_headers[unit].iter().any(|&h| graph.header_units[h].changed) {
                graph.units[unit].changed = true;
            }
        }

        // Cycles are fatal whether or not anything changed
        let names: Vec<String> = graph.units.iter().map(|u| u.name.clone()).collect();
        let waves = build_waves(&names, &graph.imports)?;

        // 3. Precompiled header and header units
        let mut compiled: Vec<SourceFileGroup> = Vec::new();
        let mut plan = Target::new(format!("{} (header units)", target.name));
        let mut pch_changed = false;
        if let Some(pch) = outputs.pch() {
            pch_changed = force
                || changed_types.contains(&SourceType::CxxPrecompiledHeader)
                || state.cache.source_changed(&pch.source_file, &pch.dependency_file)
                || !self.exists(&pch.object_file);
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
                    if state.controller.needs_pch_stub() && !pch.other_file.is_empty() && !self.dry_run() {
                        write_string(&state.root.join(&pch.other_file), &pch_stub_contents(&pch.source_file))?;
                    }
                }
            }
        }
        if pch_changed && uses_pch(target, SourceType::Cpp) {
            for unit in graph.units.iter_mut().filter(|u| !u.system) {
                unit.changed = true;
            }
        }
        let mut changed: Vec<bool> = graph.units.iter().map(|u| u.changed).collect();
        propagate_changes(&mut changed, &graph.imports);

        let mapper = if self.strategy.uses_mapper() {
            let modules: Vec<(String, String)> = graph
                .units
                .iter()
                .filter(|u| u.provides_module() && !u.group.other_file.is_empty())
                .map(|u| (u.name.clone(), u.group.other_file.clone()))
                .collect();
            let headers: Vec<(String, String)> = graph
                .header_units
                .iter()
                .filter(|h| !h.is_system())
                .map(|h| (h.key.clone(), h.group.other_file.clone()))
                .collect();
            let path = format!("{}/{}.mapper", state.paths.int_dir(target), target.name);
            if !self.dry_run() {
                self.strategy.write_mapper(&state.root.join(&path), &modules, &headers)?;
            }
            Some(path)
        } else {
            None
        };

        for unit in graph.header_units.iter().filter(|h| h.changed) {
            let request = ModuleCompile {
                phase: ModulePhase::HeaderUnit,
                group: &unit.group,
                modules: &[],
                header_units: &[],
                mapper: mapper.as_deref(),
            };
            let spec = state.controller.module_command(&ctx, &request)?;
            let Some(cmd) = Cmd::from_spec(unit.group.source_file.clone(), &spec) else {
                continue;
            };
            let reference = if unit.group.other_file.is_empty() {
                unit.group.object_file.clone()
            } else {
                unit.group.other_file.clone()
            };
            let mut cmd = cmd.reference(reference);
            if unit.is_system() {
                if let Some((from, to)) = self.strategy.system_header_rename(&unit.group, &unit.header) {
                    cmd = cmd.rename(from, to);
                }
            }
            plan.list.push(Job::single(cmd));
            compiled.push(unit.group.clone());
        }
        self.remove_outputs(graph.header_units.iter().filter(|h| h.changed).map(|h| &h.group))?;
        self.run_phase(target, &plan)?;

        // 4. Module waves, other sources in the last one
        let mut wave_plans: Vec<Target> = Vec::new();
        for (number, wave) in waves.iter().enumerate() {
            let mut plan = Target::new(format!("{} (wave {})", target.name, number + 1));
            for &unit in wave.iter().filter(|&&u| changed[u]) {
                let module = &graph.units[unit];
                let modules = graph.module_references(unit);
                let header_units = graph.header_references(unit);
                let phase = if module.provides_module() {
                    ModulePhase::Interface
                } else {
                    ModulePhase::Implementation
                };
                let request = ModuleCompile {
                    phase,
                    group: &module.group,
                    modules: &modules,
                    header_units: &header_units,
                    mapper: mapper.as_deref(),
                };
                let spec = state.controller.module_command(&ctx, &request)?;
                if let Some(cmd) = Cmd::from_spec(module.group.source_file.clone(), &spec) {
                    let cmd = cmd
                        .reference(module.group.object_file.clone())
                        .dependency(module.group.dependency_file.clone());
                    plan.list.push(Job::single(cmd));
                    compiled.push(module.group.clone());
                }
            }
            wave_plans.push(plan);
        }

        let mut others = Vec::new();
        for group in outputs
            .groups
            .iter()
            .filter(|g| g.kind != SourceType::Cpp && g.kind != SourceType::CxxPrecompiledHeader)
        {
            let needs = force
                || (pch_changed && uses_pch(target, group.kind))
                || changed_types.contains(&group.kind)
                || state.cache.source_changed(&group.source_file, &group.dependency_file)
                || !self.exists(&group.object_file);
            if !needs {
                continue;
            }
            let spec = state.controller.compile(&ctx, group);
            if let Some(cmd) = Cmd::from_spec(group.source_file.clone(), &spec) {
                let cmd = cmd
                    .reference(group.object_file.clone())
                    .dependency(group.dependency_file.clone());
                others.push(Job::single(cmd));
                compiled.push(group.clone());
            }
        }
        match wave_plans.last_mut() {
            Some(last) => last.list.extend(others),
            None => {
                let mut plan = Target::new(format!("{} (sources)", target.name));
                plan.list = others;
                wave_plans.push(plan);
            }
        }

        let compiled_units = graph
            .units
            .iter()
            .enumerate()
            .filter(|(i, _)| changed[*i])
            .map(|(_, u)| &u.group);
        self.remove_outputs(compiled_units)?;
        for plan in &wave_plans {
            self.run_phase(target, plan)?;
        }

        // 5. Link
        let mut link_outputs = outputs.clone();
        for unit in graph.units.iter().filter(|u| u.system) {
            link_outputs.objects.push(unit.group.object_file.clone());
        }
        if self.strategy.links_header_units() {
            for unit in &graph.header_units {
                if !link_outputs.objects.contains(&unit.group.object_file) {
                    link_outputs.objects.push(unit.group.object_file.clone());
                }
            }
        }
        let links = !compiled.is_empty()
            || force
            || link_changed
            || !self.exists(&outputs.target)
            || check_dependent_targets(target, session)
            || rebuild_required_from_links(state, target, all);
        let mut link_plan = Target::new(target.name.clone());
        if links {
            link_plan.post = output_job(&state.controller, &ctx, &link_outputs);
            if !self.dry_run() && link_plan.post.is_some() {
                remove_file_if_exists(&state.root.join(&outputs.target))?;
            }
        }
        self.run_phase(target, &link_plan)?;
        let links = link_plan.post.is_some();

        tracing::info!(
            "{}: {} module compile job(s){}",
            target.name,
            compiled.len(),
            if links { ", link" } else { "" }
        );

        if self.dry_run() {
            if links {
                session.mark_changed(&target.name);
            }
            return Ok(());
        }

        let mut seen = HashSet::new();
        for unit in graph.units.iter().filter(|u| u.scanned) {
            let scan = SourceFileGroup {
                dependency_file: unit.scan_file.clone(),
                ..unit.group.clone()
            };
            record_source(state, &scan, &mut seen);
        }
        for group in &compiled {
            record_source(state, group, &mut seen);
        }
        if links {
            state.cache.record(&outputs.target);
            session.mark_changed(&target.name);
        }
        Ok(())
    }
}
