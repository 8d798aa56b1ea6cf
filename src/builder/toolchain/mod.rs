//! Toolchain abstraction for C/C++ compilers.
//!
//! The toolchain is resolved once per build:
//! 1. [`identity`] classifies the compiler executable into a family.
//! 2. [`environment`] probes it (triple, layout, setup script, version,
//!    macros, supported flags).
//! 3. [`Controller`] picks a compiler, archiver, linker and resource
//!    compiler for one target and turns its files into command lines.
//!
//! Executable overrides come from, in order of precedence:
//! 1. `CC`/`CXX`/`AR`/`LD`/`RC` in the environment
//! 2. The toolchain config file (`.anvil/toolchain.toml` or the global one)
//! 3. The `[toolchain]` section of `Anvil.toml`
//! 4. Tools found next to the compiler

use std::path::{Path, PathBuf};

use crate::core::{BuildConfiguration, BuildPaths, SourceTarget, StrategyType};
use crate::util::config::ToolchainSettings;

pub mod archiver;
pub mod compiler;
pub mod controller;
pub mod env;
pub mod environment;
pub mod identity;
pub mod linker;
pub mod probe;
pub mod winres;

pub use controller::Controller;
pub use env::{EnvDelta, EnvSnapshot};
pub use environment::{CompilerInfo, DetectRequest, ToolchainEnvironment};
pub use identity::{classify, MacroSet, ToolchainType};
pub use probe::{Probe, ScopedProbe, SystemProbe};

/// A command to execute, with program, arguments, and environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    /// The program to run (e.g., "gcc", "cl.exe")
    pub program: PathBuf,
    /// Command arguments
    pub args: Vec<String>,
    /// Environment variables to set
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    /// Create a new command spec.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        CommandSpec {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// A command that must not run. Callers skip it.
    pub fn empty() -> Self {
        CommandSpec::default()
    }

    /// Add an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(|a| a.into()));
        self
    }

    /// Add an argument unless it is already present.
    pub fn arg_unique(mut self, arg: impl Into<String>) -> Self {
        let arg = arg.into();
        if !self.args.contains(&arg) {
            self.args.push(arg);
        }
        self
    }

    /// Add an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.program.as_os_str().is_empty()
    }

    /// Flatten into an argument vector. An empty command gives an empty vector.
    pub fn to_argv(&self) -> Vec<String> {
        if self.is_empty() {
            return Vec::new();
        }
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.program.to_string_lossy().to_string());
        argv.extend(self.args.iter().cloned());
        argv
    }
}

/// Executables used next to the compiler.
///
/// An empty string means "not available": commands that need it come back
/// empty and are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolPaths {
    pub cc: String,
    pub cxx: String,
    pub ar: String,
    /// Dedicated linker. Empty means the compiler driver links.
    pub linker: String,
    pub rc: String,
}

fn file_name(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    normalized
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// Executable name without directory and `.exe`.
pub fn tool_basename(path: &str) -> String {
    let name = file_name(path);
    name.strip_suffix(".exe").map(str::to_string).unwrap_or(name)
}

/// Cross prefix of a GNU driver: `aarch64-linux-gnu-g++` gives `aarch64-linux-gnu-`.
fn cross_prefix(basename: &str) -> &str {
    for driver in ["g++", "gcc", "c++", "cc"] {
        if let Some(prefix) = basename.strip_suffix(driver) {
            if prefix.is_empty() || prefix.ends_with('-') {
                return prefix;
            }
        }
    }
    ""
}

/// The C driver matching a C++ driver (`g++` -> `gcc`, `clang++` -> `clang`).
fn c_driver(cxx_basename: &str) -> Option<String> {
    let pairs = [
        ("clang++", "clang"),
        ("g++", "gcc"),
        ("c++", "cc"),
        ("em++", "emcc"),
        ("icpx", "icx"),
        ("icpc", "icc"),
    ];
    pairs.iter().find_map(|(cxx, cc)| {
        cxx_basename
            .strip_suffix(cxx)
            .map(|prefix| format!("{}{}", prefix, cc))
    })
}

impl ToolPaths {
    /// Fill in every tool: explicit settings first, then the tools
    /// installed next to the compiler.
    pub fn resolve(
        toolchain: &ToolchainEnvironment,
        settings: &ToolchainSettings,
        probe: &dyn Probe,
    ) -> Self {
        let kind = toolchain.kind;
        let host = toolchain.host;
        let compiler = toolchain.compiler.path.clone();
        let bin_dir = Path::new(&toolchain.compiler.bin_dir);
        let exe = if host == crate::core::HostPlatform::Windows {
            ".exe"
        } else {
            ""
        };
        let display = |p: &Path| p.to_string_lossy().to_string();

        // A tool in the compiler's folder, else on PATH, else nothing
        let locate = |name: &str| -> Option<String> {
            let file = format!("{}{}", name, exe);
            let beside = bin_dir.join(&file);
            if probe.exists(&beside) {
                return Some(display(&beside));
            }
            toolchain
                .env
                .find_executable(&file, bin_dir)
                .map(|p| display(&p))
        };
        let explicit = |value: &Option<PathBuf>| value.as_deref().map(display);

        let basename = tool_basename(&compiler);
        let cxx = explicit(&settings.cxx).unwrap_or_else(|| compiler.clone());
        let cc = explicit(&settings.cc).unwrap_or_else(|| {
            if kind.uses_msvc_cli(host) {
                return compiler.clone();
            }
            c_driver(&basename)
                .and_then(|name| locate(&name))
                .unwrap_or_else(|| compiler.clone())
        });

        let prefix = cross_prefix(&basename);
        let ar = explicit(&settings.ar).or_else(|| {
            if kind.uses_msvc_cli(host) {
                if kind.is_intel_classic() {
                    return locate("xilib").or_else(|| locate("lib"));
                }
                return locate("lib");
            }
            match kind {
                ToolchainType::AppleLlvm => locate("libtool"),
                ToolchainType::Emscripten => locate("emar"),
                ToolchainType::IntelClassic => locate("xiar").or_else(|| locate("ar")),
                k if k.is_clang() => locate("llvm-ar").or_else(|| locate("ar")),
                _ => locate(&format!("{}ar", prefix)).or_else(|| locate("ar")),
            }
        });

        let linker = explicit(&settings.linker).or_else(|| {
            if kind.uses_msvc_cli(host) {
                if kind.is_intel_classic() {
                    return locate("xilink").or_else(|| locate("link"));
                }
                return locate("link");
            }
            None
        });

        let rc = explicit(&settings.rc).or_else(|| {
            if !toolchain.is_windows_target() {
                return None;
            }
            if kind.uses_msvc_cli(host) || kind.is_msvc_clang() {
                return locate("rc").or_else(|| locate("llvm-rc"));
            }
            if kind.is_clang() {
                return locate("llvm-rc").or_else(|| locate("windres"));
            }
            locate(&format!("{}windres", prefix)).or_else(|| locate("windres"))
        });

        ToolPaths {
            cc,
            cxx,
            ar: ar.unwrap_or_default(),
            linker: linker.unwrap_or_default(),
            rc: rc.unwrap_or_default(),
        }
    }
}

/// Everything a command generator reads for one target.
#[derive(Debug, Clone, Copy)]
pub struct CommandContext<'a> {
    pub toolchain: &'a ToolchainEnvironment,
    pub tools: &'a ToolPaths,
    pub configuration: &'a BuildConfiguration,
    pub paths: &'a BuildPaths,
    pub target: &'a SourceTarget,
    pub strategy: StrategyType,
    /// Ask compilers for coloured diagnostics
    pub color: bool,
}

impl CommandContext<'_> {
    /// Quote a path for the active strategy.
    pub fn quoted(&self, path: &str) -> String {
        self.strategy.quoted(path)
    }

    pub fn host(&self) -> crate::core::HostPlatform {
        self.toolchain.host
    }

    pub fn kind(&self) -> ToolchainType {
        self.toolchain.kind
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::{OutputNaming, TargetKind};
    use crate::test_support::FakeProbe;

    /// Owned pieces of a [`CommandContext`] for generator tests.
    pub(crate) struct Fixture {
        pub toolchain: ToolchainEnvironment,
        pub tools: ToolPaths,
        pub configuration: BuildConfiguration,
        pub paths: BuildPaths,
        pub target: SourceTarget,
        pub strategy: StrategyType,
    }

    impl Fixture {
        /// GCC 13 on Linux building `app` in Debug.
        pub(crate) fn gcc() -> Self {
            let toolchain = environment::tests::gcc_environment();
            Fixture::with_toolchain(toolchain, OutputNaming::gnu())
        }

        pub(crate) fn with_toolchain(toolchain: ToolchainEnvironment, naming: OutputNaming) -> Self {
            let tools = ToolPaths {
                cc: "/usr/bin/gcc".into(),
                cxx: toolchain.compiler.path.clone(),
                ar: "/usr/bin/ar".into(),
                linker: String::new(),
                rc: String::new(),
            };
            let mut target = SourceTarget::new("app", TargetKind::Executable);
            target.files.push("src/*.cpp".into());
            Fixture {
                toolchain,
                tools,
                configuration: BuildConfiguration::builtin("Debug").unwrap(),
                paths: BuildPaths::new("build", "Debug", naming),
                target,
                strategy: StrategyType::Native,
            }
        }

        pub(crate) fn context(&self) -> CommandContext<'_> {
            CommandContext {
                toolchain: &self.toolchain,
                tools: &self.tools,
                configuration: &self.configuration,
                paths: &self.paths,
                target: &self.target,
                strategy: self.strategy,
                color: false,
            }
        }
    }

    #[test]
    fn test_command_spec_argv() {
        let cmd = CommandSpec::new("/usr/bin/gcc")
            .arg("-c")
            .args(["a.c", "-o"])
            .arg_unique("-c");
        assert_eq!(cmd.to_argv(), vec!["/usr/bin/gcc", "-c", "a.c", "-o"]);
        assert!(CommandSpec::empty().to_argv().is_empty());
        assert!(CommandSpec::new("").is_empty());
    }

    #[test]
    fn test_tool_names() {
        assert_eq!(tool_basename("C:\\VS\\bin\\Hostx64\\x64\\CL.EXE"), "cl");
        assert_eq!(cross_prefix("aarch64-linux-gnu-g++"), "aarch64-linux-gnu-");
        assert_eq!(cross_prefix("g++-13"), "");
        assert_eq!(c_driver("clang++").as_deref(), Some("clang"));
        assert_eq!(c_driver("x86_64-w64-mingw32-g++").as_deref(), Some("x86_64-w64-mingw32-gcc"));
    }

    #[test]
    fn test_resolve_tools_beside_compiler() {
        let toolchain = environment::tests::gcc_environment();
        let probe = FakeProbe::new()
            .with_path("/usr/bin/gcc")
            .with_path("/usr/bin/ar");
        let tools = ToolPaths::resolve(&toolchain, &ToolchainSettings::default(), &probe);
        assert_eq!(tools.cxx, "/usr/bin/g++");
        assert_eq!(tools.cc, "/usr/bin/gcc");
        assert_eq!(tools.ar, "/usr/bin/ar");
        assert!(tools.linker.is_empty());
        assert!(tools.rc.is_empty());

        let settings = ToolchainSettings {
            ar: Some(PathBuf::from("/opt/llvm/bin/llvm-ar")),
            linker: Some(PathBuf::from("/usr/bin/ld.lld")),
            ..Default::default()
        };
        let tools = ToolPaths::resolve(&toolchain, &settings, &probe);
        assert_eq!(tools.ar, "/opt/llvm/bin/llvm-ar");
        assert_eq!(tools.linker, "/usr/bin/ld.lld");
    }
}
