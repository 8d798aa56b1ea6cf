//! Build state: everything resolved once per build invocation.
//!
//! The toolchain is detected once, the command generators are selected
//! once, and one source cache (per configuration and triple) is shared by
//! every target of the build.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::builder::cache::SourceCache;
use crate::builder::toolchain::{
    CommandContext, Controller, DetectRequest, EnvSnapshot, Probe, ToolPaths, ToolchainEnvironment,
};
use crate::core::{Arch, BuildConfiguration, BuildPaths, HostPlatform, SourceTarget, StrategyType, Workspace};
use crate::util::config::{
    global_toolchain_config_path, load_toolchain_config, project_toolchain_config_path, ToolchainConfig,
    ToolchainSettings,
};
use crate::util::context::GlobalContext;

/// Compilers tried, in order, when nothing selects one.
fn default_compilers(host: HostPlatform) -> &'static [&'static str] {
    match host {
        HostPlatform::Windows => &["cl", "clang++", "g++"],
        HostPlatform::MacOS => &["clang++", "g++"],
        HostPlatform::Linux => &["g++", "clang++", "c++"],
    }
}

/// Toolchain overrides in precedence order: the manifest's `[toolchain]`
/// section, then the global and project files, then the environment.
pub fn toolchain_settings(ws: &Workspace, env: &EnvSnapshot) -> ToolchainSettings {
    let section = &ws.manifest().toolchain;
    let mut config = ToolchainConfig {
        toolchain: ToolchainSettings {
            cc: section.cc.clone(),
            cxx: section.cxx.clone(),
            ar: section.ar.clone(),
            linker: section.linker.clone(),
            rc: section.rc.clone(),
            arch: section.arch.clone(),
        },
    };
    config.merge(load_toolchain_config(
        global_toolchain_config_path().as_deref(),
        &project_toolchain_config_path(ws.root()),
    ));
    config.apply_env(env.vars());
    config.toolchain
}

/// Find the compiler executable: an explicit path, else the first default
/// driver on `PATH`.
pub fn resolve_compiler(explicit: Option<&Path>, env: &EnvSnapshot, cwd: &Path, host: HostPlatform) -> Result<String> {
    if let Some(path) = explicit {
        let name = path.to_string_lossy();
        let found = env
            .find_executable(&name, cwd)
            .with_context(|| format!("compiler `{}` not found", name))?;
        return Ok(found.to_string_lossy().to_string());
    }
    for name in default_compilers(host) {
        if let Some(found) = env.find_executable(name, cwd) {
            return Ok(found.to_string_lossy().to_string());
        }
    }
    anyhow::bail!(
        "no C/C++ compiler found on PATH (tried {}); pass --toolchain <compiler>",
        default_compilers(host).join(", ")
    )
}

/// What the caller asked for.
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    /// Compiler from the command line; wins over every other setting
    pub compiler: Option<PathBuf>,
    pub arch: Option<String>,
    pub color: bool,
}

/// Detect the toolchain for a workspace.
///
/// Versions and triples are memoized in `.anvil/toolchains/toolchains.json`.
pub fn detect_toolchain(
    ws: &Workspace,
    gctx: &GlobalContext,
    request: &BuildRequest,
    probe: &dyn Probe,
) -> Result<(ToolchainEnvironment, ToolchainSettings)> {
    let settings = toolchain_settings(ws, gctx.env());
    let cache_dir = ws.toolchain_cache_dir();
    let memo = SourceCache::load(&cache_dir.join("toolchains.json"), ws.root());
    let detected = detect_with(gctx, request, settings, ws.root(), cache_dir, &memo, probe)?;
    if let Err(e) = memo.save() {
        tracing::warn!("failed to save toolchain memo: {:#}", e);
    }
    Ok(detected)
}

/// Detect a toolchain outside of any project.
///
/// Only the global toolchain file and the environment apply; probe results
/// are kept in memory and macro dumps go to a temporary directory.
pub fn detect_standalone(
    gctx: &GlobalContext,
    request: &BuildRequest,
    probe: &dyn Probe,
) -> Result<(ToolchainEnvironment, ToolchainSettings)> {
    let mut config = load_toolchain_config(
        global_toolchain_config_path().as_deref(),
        &project_toolchain_config_path(gctx.cwd()),
    );
    config.apply_env(gctx.env().vars());

    let scratch = tempfile::TempDir::new().context("failed to create a scratch directory")?;
    let memo = SourceCache::in_memory(gctx.cwd());
    detect_with(
        gctx,
        request,
        config.toolchain,
        gctx.cwd(),
        scratch.path().to_path_buf(),
        &memo,
        probe,
    )
}

fn detect_with(
    gctx: &GlobalContext,
    request: &BuildRequest,
    mut settings: ToolchainSettings,
    root: &Path,
    cache_dir: PathBuf,
    memo: &SourceCache,
    probe: &dyn Probe,
) -> Result<(ToolchainEnvironment, ToolchainSettings)> {
    let host = HostPlatform::current();
    if let Some(compiler) = &request.compiler {
        settings.cxx = Some(compiler.clone());
    }
    if let Some(arch) = &request.arch {
        settings.arch = Some(arch.clone());
    }

    let compiler = resolve_compiler(settings.cxx.as_deref(), gctx.env(), root, host)?;
    let detect = DetectRequest {
        compiler,
        arch: settings.arch.clone(),
        host,
        host_arch: Arch::host(),
        env: gctx.env(),
        cache_dir,
        cache: memo,
    };
    let toolchain = ToolchainEnvironment::detect(&detect, probe)?;
    tracing::debug!(
        "toolchain: {} ({}) targeting {}",
        toolchain.compiler.description,
        toolchain.kind,
        toolchain.triple()
    );
    Ok((toolchain, settings))
}

/// One build of one configuration.
pub struct BuildState {
    pub root: PathBuf,
    pub toolchain: ToolchainEnvironment,
    pub tools: ToolPaths,
    pub controller: Controller,
    pub configuration: BuildConfiguration,
    pub paths: BuildPaths,
    pub strategy: StrategyType,
    pub cache: SourceCache,
    pub color: bool,
}

impl fmt::Debug for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildState")
            .field("root", &self.root)
            .field("toolchain", &self.toolchain.kind)
            .field("triple", &self.toolchain.triple())
            .field("configuration", &self.configuration.name)
            .field("controller", &self.controller)
            .finish()
    }
}

impl BuildState {
    /// Detect the toolchain and load the source cache for `ws`.
    pub fn new(ws: &Workspace, gctx: &GlobalContext, request: &BuildRequest, probe: &dyn Probe) -> Result<Self> {
        let (toolchain, settings) = detect_toolchain(ws, gctx, request, probe)?;
        let tools = ToolPaths::resolve(&toolchain, &settings, probe);
        Self::from_parts(ws, toolchain, tools, request.color)
    }

    /// Assemble a state from an already detected toolchain.
    pub fn from_parts(ws: &Workspace, toolchain: ToolchainEnvironment, tools: ToolPaths, color: bool) -> Result<Self> {
        let controller = Controller::initialize(&toolchain, &tools)?;
        let configuration = ws.configuration().clone();
        let paths = BuildPaths::new(&ws.build_dir_name(), &configuration.name, toolchain.naming());
        let cache_file = ws.cache_dir(toolchain.triple()).join("sources.json");
        let cache = SourceCache::load(&cache_file, ws.root());

        Ok(BuildState {
            root: ws.root().to_path_buf(),
            toolchain,
            tools,
            controller,
            configuration,
            paths,
            strategy: ws.manifest().toolchain.strategy,
            cache,
            color,
        })
    }

    /// Command generation inputs for one target.
    pub fn context<'a>(&'a self, target: &'a SourceTarget) -> CommandContext<'a> {
        CommandContext {
            toolchain: &self.toolchain,
            tools: &self.tools,
            configuration: &self.configuration,
            paths: &self.paths,
            target,
            strategy: self.strategy,
            color: self.color,
        }
    }

    /// Environment every build command is spawned with.
    pub fn env(&self) -> &EnvSnapshot {
        &self.toolchain.env
    }

    /// Persist the source cache unless the build failed.
    pub fn finish(&self) -> Result<()> {
        self.cache
            .save()
            .with_context(|| format!("failed to save {}", self.cache.path().display()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::builder::toolchain::environment;
    use crate::core::MANIFEST_NAME;
    use tempfile::TempDir;

    /// A GCC build state over a project written to `dir`.
    pub(crate) fn gcc_state(dir: &Path, manifest: &str) -> (Workspace, BuildState) {
        let path = dir.join(MANIFEST_NAME);
        std::fs::write(&path, manifest).unwrap();
        let ws = Workspace::new(&path, "Debug").unwrap();
        let toolchain = environment::tests::gcc_environment();
        let tools = ToolPaths {
            cc: "/usr/bin/gcc".into(),
            cxx: toolchain.compiler.path.clone(),
            ar: "/usr/bin/ar".into(),
            linker: String::new(),
            rc: String::new(),
        };
        let state = BuildState::from_parts(&ws, toolchain, tools, false).unwrap();
        (ws, state)
    }

    #[test]
    fn test_state_layout() {
        let tmp = TempDir::new().unwrap();
        let (ws, state) = gcc_state(tmp.path(), "[[target]]\nname = \"app\"\nfiles = [\"main.cpp\"]\n");
        assert_eq!(state.paths.output_dir(), "build/Debug");
        assert_eq!(
            state.cache.path(),
            ws.anvil_dir()
                .join("cache/Debug_x86_64-linux-gnu/sources.json")
                .as_path()
        );
        let target = &ws.manifest().targets()[0];
        assert_eq!(state.context(target).target.name, "app");
    }

    #[test]
    fn test_settings_precedence() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(MANIFEST_NAME);
        std::fs::write(
            &path,
            "[toolchain]\ncxx = \"g++\"\nar = \"ar\"\n\n[[target]]\nname = \"app\"\nfiles = [\"main.cpp\"]\n",
        )
        .unwrap();
        std::fs::create_dir_all(tmp.path().join(".anvil")).unwrap();
        std::fs::write(
            tmp.path().join(".anvil/toolchain.toml"),
            "[toolchain]\ncxx = \"clang++\"\n",
        )
        .unwrap();
        let ws = Workspace::new(&path, "Debug").unwrap();

        let env = EnvSnapshot::from_vars([("AR", "llvm-ar")]);
        let settings = toolchain_settings(&ws, &env);
        assert_eq!(settings.cxx, Some(PathBuf::from("clang++")));
        assert_eq!(settings.ar, Some(PathBuf::from("llvm-ar")));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_compiler_on_path() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let bin = tmp.path().join("g++");
        std::fs::write(&bin, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();

        let env = EnvSnapshot::from_vars([("PATH", tmp.path().to_string_lossy().to_string())]);
        let found = resolve_compiler(None, &env, tmp.path(), HostPlatform::Linux).unwrap();
        assert!(found.ends_with("g++"));

        let empty = EnvSnapshot::from_vars([("PATH", "/nonexistent")]);
        assert!(resolve_compiler(None, &empty, tmp.path(), HostPlatform::Linux).is_err());
    }
}
