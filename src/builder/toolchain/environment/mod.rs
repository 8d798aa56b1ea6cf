//! The toolchain environment: everything anvil learns about a compiler
//! before generating a single command.
//!
//! Detection runs in a fixed order. The executable is classified, its
//! target triple resolved, its folder matched against the known layouts,
//! the vendor setup script applied, and finally version, predefined macros
//! and supported flags are queried. Each query result is cached so a warm
//! build spawns nothing.

pub mod flags;
pub mod layout;
pub mod setup;
pub mod sysroot;
pub mod triple;
pub mod version;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::Result;

use super::env::{EnvDelta, EnvSnapshot};
use super::identity::{classify, needs_macros, MacroSet, ToolchainType};
use super::probe::{Probe, ScopedProbe};
use crate::builder::cache::SourceCache;
use crate::core::{Arch, Cpu, HostPlatform, OutputNaming};
use crate::util::diagnostic::ToolchainError;
use crate::util::fs::{read_to_string, write_string};
use crate::util::hash::short_hash;

pub use layout::{CompilerDirectories, CompilerPathStructure};
pub use version::DescriptionContext;

/// Identity of the compiler executable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompilerInfo {
    pub path: String,
    pub version: String,
    pub description: String,
    pub bin_dir: String,
    pub lib_dir: String,
    pub include_dir: String,
}

impl CompilerInfo {
    fn version_part(&self, index: usize) -> u32 {
        self.version
            .split('.')
            .nth(index)
            .and_then(|p| p.parse().ok())
            .unwrap_or(0)
    }

    pub fn major(&self) -> u32 {
        self.version_part(0)
    }

    pub fn minor(&self) -> u32 {
        self.version_part(1)
    }

    /// `major * 100 + minor`: `19.38.33130` is 1938.
    pub fn version_major_minor(&self) -> u32 {
        self.major() * 100 + self.minor()
    }

    pub fn version_patch(&self) -> u32 {
        self.version_part(2)
    }
}

/// Inputs of toolchain detection.
#[derive(Debug, Clone)]
pub struct DetectRequest<'a> {
    /// Compiler executable, already resolved against `PATH`
    pub compiler: String,
    /// Requested architecture (`x64`, `arm64`, a full triple, ...)
    pub arch: Option<String>,
    pub host: HostPlatform,
    pub host_arch: Arch,
    /// Startup environment snapshot
    pub env: &'a EnvSnapshot,
    /// Folder for environment, macro and flag caches
    pub cache_dir: PathBuf,
    /// Memo of triples and versions
    pub cache: &'a SourceCache,
}

/// A fully detected toolchain.
#[derive(Debug, Clone)]
pub struct ToolchainEnvironment {
    pub kind: ToolchainType,
    pub host: HostPlatform,
    pub host_arch: Arch,
    /// Target architecture, carrying the resolved triple
    pub arch: Arch,
    pub compiler: CompilerInfo,
    pub macros: MacroSet,
    pub supported_flags: BTreeSet<String>,
    /// Cross sysroot, when one was found
    pub sysroot: Option<String>,
    pub system_includes: Vec<String>,
    /// Environment every toolchain process is spawned with
    pub env: EnvSnapshot,
    /// What the setup script changed
    pub delta: EnvDelta,
    pub vs_version: Option<String>,
    pub emcc_version: Option<String>,
}

fn null_device(host: HostPlatform) -> &'static str {
    match host {
        HostPlatform::Windows => "NUL",
        _ => "/dev/null",
    }
}

fn probe_error(path: &str, reason: impl Into<String>) -> ToolchainError {
    ToolchainError::Probe {
        path: path.to_string(),
        reason: reason.into(),
    }
}

/// Predefined macros of a compiler, cached as `macros_<hash>.env`.
pub fn macro_dump(
    executable: &str,
    host: HostPlatform,
    cache_dir: &Path,
    probe: &dyn Probe,
) -> Result<MacroSet> {
    let cache_file = cache_dir.join(format!("macros_{}.env", short_hash(executable)));
    if cache_file.is_file() {
        let dump = read_to_string(&cache_file)?;
        if !dump.trim().is_empty() {
            return Ok(MacroSet::parse(&dump));
        }
    }

    let argv: Vec<String> = [executable, "-x", "c", null_device(host), "-dM", "-E"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let cwd = Path::new(executable).parent().filter(|p| !p.as_os_str().is_empty());
    let dump = probe.output(&argv, cwd).unwrap_or_default();
    let macros = MacroSet::parse(&dump);
    if macros.is_empty() {
        return Err(probe_error(executable, "Failed to query compiler for details.").into());
    }

    write_string(&cache_file, &dump)?;
    Ok(macros)
}

/// Target architecture implied by an MSVC `bin/Host*/<arch>` folder.
fn msvc_target_from_path(executable: &str) -> Option<Arch> {
    let normalized = executable.replace('\\', "/");
    let folder = Path::new(&normalized).parent()?.file_name()?.to_str()?;
    let arch = Arch::from(folder);
    (arch.cpu != Cpu::Unknown).then_some(arch)
}

fn query_version(
    kind: ToolchainType,
    executable: &str,
    triple: &str,
    cache: &SourceCache,
    probe: &dyn Probe,
) -> Result<String, ToolchainError> {
    let mut cached = String::new();
    if !cache.version_requires_update(executable, &mut cached) {
        return Ok(cached);
    }

    let argv = version::version_command(kind, executable, triple);
    let output = probe
        .output(&argv, None)
        .map_err(|e| probe_error(executable, e.to_string()))?;
    let found = version::parse_version(kind, &output)
        .ok_or_else(|| probe_error(executable, "Failed to query compiler version."))?;
    cache.add_version(executable, &found);
    Ok(found)
}

impl ToolchainEnvironment {
    /// Detect and verify a toolchain.
    ///
    /// Configuration problems (unknown family, foreign folder layout,
    /// architecture mismatch) are returned as [`ToolchainError`]s.
    pub fn detect(request: &DetectRequest<'_>, probe: &dyn Probe) -> Result<Self> {
        let exe = request.compiler.as_str();
        let host = request.host;

        let mut macros = None;
        if needs_macros(exe, host) {
            macros = macro_dump(exe, host, &request.cache_dir, probe).ok();
        }
        let kind = classify(exe, macros.as_ref(), host);
        if !kind.is_known() {
            return Err(ToolchainError::Unknown {
                path: exe.to_string(),
            }
            .into());
        }
        tracing::debug!("{} classified as {}", exe, kind);

        let requested = match &request.arch {
            Some(arch) => Some(Arch::from(arch)),
            None if kind.is_msvc() => msvc_target_from_path(exe),
            None => None,
        };
        let triple = triple::resolve_triple(
            kind,
            exe,
            host,
            requested.as_ref(),
            probe,
            request.cache,
        )?;
        let arch = Arch::from(&triple);

        let structures =
            layout::valid_compiler_paths(kind, host, &triple, &arch, &request.host_arch);
        let dirs = layout::resolve_compiler_directories(exe, &structures, host, probe)
            .ok_or_else(|| ToolchainError::PathStructure {
                path: exe.to_string(),
                expected: layout::describe(&structures),
            })?;
        let host_arch = dirs
            .msvc_host
            .as_deref()
            .map(Arch::from)
            .unwrap_or_else(|| request.host_arch.clone());

        let delta = match setup::locate_setup_script(kind, host, &host_arch, &arch, request.env, probe)? {
            Some(script) => {
                let cache_file =
                    setup::delta_cache_file(&request.cache_dir, kind, &host_arch, &triple, &script);
                setup::load_or_run_setup(&script, &cache_file, host, request.env, probe)?
            }
            None => EnvDelta::default(),
        };
        let env = request.env.with_delta(&delta, host.path_separator());
        let scoped = ScopedProbe::new(probe, &env);

        let version = query_version(kind, exe, &triple, request.cache, &scoped)?;

        let macros = match macros {
            Some(m) => m,
            None if kind.uses_msvc_cli(host) => MacroSet::default(),
            None => macro_dump(exe, host, &request.cache_dir, &scoped)?,
        };

        let emcc_version = if kind.is_emscripten() {
            let argv = version::emcc_version_command(exe, env.get("EMSDK_PYTHON"));
            scoped
                .output(&argv, None)
                .ok()
                .and_then(|out| version::parse_emcc_version(&out))
        } else {
            None
        };
        let vs_version = env
            .get("VSCMD_VER")
            .or_else(|| env.get("VisualStudioVersion"))
            .map(str::to_string);

        let supported_flags =
            flags::supported_flags(kind, exe, host, &request.cache_dir, &scoped)?;

        let cross = if host == HostPlatform::Linux
            && kind.is_gcc(host)
            && arch.cpu != request.host_arch.cpu
        {
            sysroot::linux_cross_sysroot(&triple, &scoped)
        } else {
            None
        };

        let description = version::description(
            kind,
            exe,
            &version,
            &DescriptionContext {
                vs_version: vs_version.clone(),
                emcc_version: emcc_version.clone(),
            },
        );

        Ok(ToolchainEnvironment {
            kind,
            host,
            host_arch,
            arch,
            compiler: CompilerInfo {
                path: exe.to_string(),
                version,
                description,
                bin_dir: dirs.bin_dir,
                lib_dir: dirs.lib_dir,
                include_dir: dirs.include_dir,
            },
            macros,
            supported_flags,
            sysroot: cross.as_ref().map(|c| c.sysroot.clone()),
            system_includes: cross.map(|c| c.system_includes).unwrap_or_default(),
            env,
            delta,
            vs_version,
            emcc_version,
        })
    }

    pub fn triple(&self) -> &str {
        &self.arch.triple
    }

    pub fn is_windows_target(&self) -> bool {
        triple::is_windows_target(self.triple(), self.kind, self.host)
    }

    pub fn is_embedded_target(&self) -> bool {
        triple::is_embedded_target(self.triple())
    }

    pub fn is_macos_target(&self) -> bool {
        self.triple().contains("apple-darwin") || self.kind.is_apple_clang()
    }

    /// True when the flag list is unknown or contains `flag`.
    pub fn is_flag_supported(&self, flag: &str) -> bool {
        self.supported_flags.is_empty() || self.supported_flags.contains(&flag.to_lowercase())
    }

    /// Error unless this compiler version can build C++ modules.
    pub fn supports_cpp_modules(&self) -> Result<(), ToolchainError> {
        let version = (self.compiler.major(), self.compiler.minor());
        let supported = match self.kind {
            ToolchainType::VisualStudio => version >= (19, 28),
            ToolchainType::Gnu | ToolchainType::MingwGnu => version >= (11, 0),
            ToolchainType::Llvm | ToolchainType::MingwLlvm | ToolchainType::VisualStudioLlvm => {
                version >= (16, 0)
            }
            ToolchainType::AppleLlvm => version >= (16, 0),
            ToolchainType::IntelLlvm => version >= (2023, 1),
            _ => false,
        };
        if supported {
            Ok(())
        } else {
            Err(ToolchainError::ModulesUnsupported {
                toolchain: self.kind.identifier().to_string(),
            })
        }
    }

    /// Output extensions and prefixes for this toolchain and target.
    pub fn naming(&self) -> OutputNaming {
        if self.kind.uses_msvc_cli(self.host) {
            return OutputNaming::msvc();
        }

        let windows = self.is_windows_target();
        let msvc_abi = self.kind.is_msvc_clang() || self.kind.is_windows_clang(self.host);
        let mut naming = OutputNaming::gnu();
        if self.kind.is_clang() || self.kind.is_intel_classic() {
            naming.pch_ext = ".pch";
        }
        if self.kind.is_clang() {
            naming.module_interface_ext = ".pcm";
        }
        if msvc_abi {
            naming.object_ext = ".obj";
            naming.static_lib_ext = ".lib";
        }
        if windows {
            naming.executable_ext = ".exe";
            naming.shared_lib_ext = ".dll";
            naming.lib_prefix = if self.kind.is_mingw() { "lib" } else { "" };
        } else if self.kind.is_emscripten() {
            naming.executable_ext = ".js";
            naming.shared_lib_ext = ".wasm";
        } else if self.is_macos_target() {
            naming.shared_lib_ext = ".dylib";
        }
        naming
    }

    /// Short id naming this toolchain's cache folder entries.
    pub fn toolchain_id(&self) -> String {
        format!("{}{}", self.kind.identifier(), self.compiler.version)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::test_support::FakeProbe;
    use tempfile::TempDir;

    const GCC_V: &str = "Target: x86_64-linux-gnu\ngcc version 13.2.0 (Ubuntu 13.2.0-4ubuntu3)\n";

    fn gcc_probe() -> FakeProbe {
        FakeProbe::new()
            .with_path("/usr/lib")
            .with_path("/usr/include")
            .with_output("/usr/bin/g++ -dumpmachine", "x86_64-linux-gnu\n")
            .with_output("/usr/bin/g++ -v", GCC_V)
            .with_output(
                "/usr/bin/g++ -x c /dev/null -dM -E",
                "#define __GNUC__ 13\n#define __x86_64__ 1\n",
            )
            .with_output(
                "/usr/bin/g++ -Q --help=common --help=optimizers --help=target --help=warnings --help=undocumented",
                "  -Wall    Enable most warnings.\n  -fmodules-ts   [disabled]\n",
            )
    }

    /// A detected GCC 13 environment for tests elsewhere in the crate.
    pub(crate) fn gcc_environment() -> ToolchainEnvironment {
        let tmp = TempDir::new().unwrap();
        let env = EnvSnapshot::from_vars([("PATH", "/usr/bin")]);
        let cache = SourceCache::in_memory(tmp.path());
        let request = DetectRequest {
            compiler: "/usr/bin/g++".into(),
            arch: None,
            host: HostPlatform::Linux,
            host_arch: Arch::from("x64"),
            env: &env,
            cache_dir: tmp.path().to_path_buf(),
            cache: &cache,
        };
        ToolchainEnvironment::detect(&request, &gcc_probe()).unwrap()
    }

    #[test]
    fn test_detect_gcc() {
        let toolchain = gcc_environment();
        assert_eq!(toolchain.kind, ToolchainType::Gnu);
        assert_eq!(toolchain.triple(), "x86_64-linux-gnu");
        assert_eq!(toolchain.compiler.version, "13.2.0");
        assert_eq!(toolchain.compiler.version_major_minor(), 1302);
        assert_eq!(toolchain.compiler.version_patch(), 0);
        assert_eq!(toolchain.compiler.description, "GNU Compiler Collection version 13.2.0");
        assert_eq!(toolchain.compiler.bin_dir, "/usr/bin");
        assert!(toolchain.macros.has("__GNUC__"));
        assert!(toolchain.is_flag_supported("-Wall"));
        assert!(!toolchain.is_flag_supported("-fno-such-flag"));
        assert!(toolchain.sysroot.is_none());
        assert!(toolchain.supports_cpp_modules().is_ok());
        assert!(!toolchain.is_windows_target());

        let naming = toolchain.naming();
        assert_eq!(naming.object_ext, ".o");
        assert_eq!(naming.pch_ext, ".gch");
        assert_eq!(naming.shared_lib_ext, ".so");
    }

    #[test]
    fn test_detect_rejects_foreign_layout() {
        let tmp = TempDir::new().unwrap();
        let env = EnvSnapshot::default();
        let cache = SourceCache::in_memory(tmp.path());
        let probe = FakeProbe::new().with_output("/home/me/g++ -dumpmachine", "x86_64-linux-gnu\n");
        let request = DetectRequest {
            compiler: "/home/me/g++".into(),
            arch: None,
            host: HostPlatform::Linux,
            host_arch: Arch::from("x64"),
            env: &env,
            cache_dir: tmp.path().to_path_buf(),
            cache: &cache,
        };
        let err = ToolchainEnvironment::detect(&request, &probe).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ToolchainError>(),
            Some(ToolchainError::PathStructure { .. })
        ));
    }

    #[test]
    fn test_detect_unknown_compiler() {
        let tmp = TempDir::new().unwrap();
        let env = EnvSnapshot::default();
        let cache = SourceCache::in_memory(tmp.path());
        let request = DetectRequest {
            compiler: "/usr/bin/tcc".into(),
            arch: None,
            host: HostPlatform::Linux,
            host_arch: Arch::from("x64"),
            env: &env,
            cache_dir: tmp.path().to_path_buf(),
            cache: &cache,
        };
        let err = ToolchainEnvironment::detect(&request, &FakeProbe::new()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ToolchainError>(),
            Some(ToolchainError::Unknown { .. })
        ));
    }

    #[test]
    fn test_module_gates() {
        let mut toolchain = gcc_environment();
        toolchain.compiler.version = "10.5.0".into();
        assert!(toolchain.supports_cpp_modules().is_err());

        toolchain.kind = ToolchainType::VisualStudio;
        toolchain.compiler.version = "19.28.29333".into();
        assert!(toolchain.supports_cpp_modules().is_ok());

        toolchain.kind = ToolchainType::IntelLlvm;
        toolchain.compiler.version = "2023.0.0".into();
        assert!(toolchain.supports_cpp_modules().is_err());
        toolchain.compiler.version = "2023.1.0".into();
        assert!(toolchain.supports_cpp_modules().is_ok());

        toolchain.kind = ToolchainType::IntelClassic;
        assert_eq!(
            toolchain.supports_cpp_modules().unwrap_err().to_string(),
            "C++ modules are not supported by this toolchain."
        );
    }

    #[test]
    fn test_naming_per_target() {
        let mut toolchain = gcc_environment();
        toolchain.kind = ToolchainType::MingwGnu;
        toolchain.arch = Arch::from("x86_64-w64-mingw32");
        let naming = toolchain.naming();
        assert_eq!(naming.executable_ext, ".exe");
        assert_eq!(naming.shared_lib_ext, ".dll");
        assert_eq!(naming.lib_prefix, "lib");
        assert_eq!(naming.static_lib_ext, ".a");

        toolchain.kind = ToolchainType::Emscripten;
        toolchain.arch = Arch::from("wasm32-unknown-emscripten");
        assert_eq!(toolchain.naming().executable_ext, ".js");

        toolchain.kind = ToolchainType::VisualStudio;
        toolchain.host = HostPlatform::Windows;
        assert_eq!(toolchain.naming(), OutputNaming::msvc());
    }

    #[test]
    fn test_macro_dump_cached_and_empty() {
        let tmp = TempDir::new().unwrap();
        let probe = FakeProbe::new().with_output("/usr/bin/cc -x c /dev/null -dM -E", "#define __GNUC__ 12\n");
        let first = macro_dump("/usr/bin/cc", HostPlatform::Linux, tmp.path(), &probe).unwrap();
        let second = macro_dump("/usr/bin/cc", HostPlatform::Linux, tmp.path(), &probe).unwrap();
        assert_eq!(first.get("__GNUC__"), second.get("__GNUC__"));
        assert_eq!(probe.calls().len(), 1);

        let err = macro_dump("/usr/bin/broken", HostPlatform::Linux, tmp.path(), &FakeProbe::new())
            .unwrap_err();
        assert!(err.to_string().contains("Failed to query compiler for details."));
    }
}
