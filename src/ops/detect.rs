//! Implementation of `anvil detect`.

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::Result;

use crate::builder::context::{detect_standalone, detect_toolchain, BuildRequest};
use crate::builder::toolchain::{Probe, SystemProbe, ToolchainEnvironment};
use crate::core::Workspace;
use crate::util::context::GlobalContext;

/// Options for the detect command.
#[derive(Debug, Clone, Default)]
pub struct DetectOptions {
    /// Compiler to detect instead of the configured one
    pub toolchain: Option<PathBuf>,

    /// Requested architecture
    pub arch: Option<String>,
}

/// Classify and probe a compiler.
///
/// Inside a project the manifest and project overrides apply and probe
/// results are memoized under `.anvil/`. Elsewhere only the global file
/// and the environment are consulted.
pub fn detect(gctx: &GlobalContext, opts: &DetectOptions) -> Result<ToolchainEnvironment> {
    let probe = SystemProbe::new(gctx.env().clone());
    detect_with_probe(gctx, opts, &probe)
}

pub fn detect_with_probe(gctx: &GlobalContext, opts: &DetectOptions, probe: &dyn Probe) -> Result<ToolchainEnvironment> {
    let request = BuildRequest {
        compiler: opts.toolchain.clone(),
        arch: opts.arch.clone(),
        color: gctx.color(),
    };
    let (toolchain, _) = match gctx.find_manifest() {
        Ok(manifest) => {
            let ws = Workspace::new(&manifest, "Debug")?;
            detect_toolchain(&ws, gctx, &request, probe)?
        }
        Err(_) => detect_standalone(gctx, &request, probe)?,
    };
    Ok(toolchain)
}

/// Human readable report of a detected toolchain.
pub fn format_detection(toolchain: &ToolchainEnvironment) -> String {
    let compiler = &toolchain.compiler;
    let mut out = String::new();
    let mut line = |key: &str, value: &str| {
        let _ = writeln!(out, "{:>12}: {}", key, value);
    };
    line("toolchain", &toolchain.kind.to_string());
    line("id", &toolchain.toolchain_id());
    line("version", &compiler.version);
    line("description", &compiler.description);
    line("executable", &compiler.path);
    line("host", &toolchain.host_arch.triple);
    line("target", toolchain.triple());
    line("bin", &compiler.bin_dir);
    line("lib", &compiler.lib_dir);
    line("include", &compiler.include_dir);
    if let Some(sysroot) = &toolchain.sysroot {
        line("sysroot", sysroot);
    }
    if let Some(version) = &toolchain.vs_version {
        line("vs", version);
    }
    if let Some(version) = &toolchain.emcc_version {
        line("emscripten", version);
    }
    line(
        "modules",
        if toolchain.supports_cpp_modules().is_ok() {
            "supported"
        } else {
            "unsupported"
        },
    );
    out
}
