//! Toolchain setup scripts.
//!
//! Visual Studio, Intel oneAPI and Emscripten expect their environment
//! script to have been sourced. The script is run once in a child shell,
//! the resulting environment is diffed against the startup snapshot and
//! the delta is cached on disk.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::builder::toolchain::env::{EnvDelta, EnvSnapshot};
use crate::builder::toolchain::identity::ToolchainType;
use crate::builder::toolchain::probe::Probe;
use crate::core::{Arch, Cpu, HostPlatform};
use crate::util::diagnostic::ToolchainError;
use crate::util::hash::short_hash;

/// A setup script and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupScript {
    pub path: String,
    pub args: Vec<String>,
}

impl SetupScript {
    /// Distinguishes cache files of different installations.
    pub fn unique_id(&self) -> String {
        short_hash(&format!("{} {}", self.path, self.args.join(" ")))
    }
}

const VCVARS_ARCHES: &[&str] = &[
    "x86", "x86_x64", "x86_arm", "x86_arm64", "x64", "x64_x86", "x64_arm", "x64_arm64",
];
const VCVARS_ARM64_HOST_ARCHES: &[&str] = &["arm64", "arm64_x64", "arm64_x86"];

/// `vcvarsall.bat` argument for a host/target pair.
pub fn vcvars_arch(host_arch: &Arch, target: &Arch) -> Result<String, ToolchainError> {
    let host = host_arch.vs_arch();
    let target_name = target.vs_arch();
    let arch = if host == target_name {
        target_name.to_string()
    } else {
        format!("{}_{}", host, target_name)
    };

    let allowed = VCVARS_ARCHES.contains(&arch.as_str())
        || (host_arch.cpu == Cpu::Arm64 && VCVARS_ARM64_HOST_ARCHES.contains(&arch.as_str()));
    if allowed {
        Ok(arch)
    } else {
        Err(ToolchainError::UnsupportedArch {
            arch: arch.clone(),
            toolchain: ToolchainType::VisualStudio.identifier().to_string(),
        })
    }
}

fn find_vswhere(env: &EnvSnapshot, probe: &dyn Probe) -> Option<String> {
    let candidates = [
        env.get("ProgramFiles(x86)")
            .map(|p| format!("{}\\Microsoft Visual Studio\\Installer\\vswhere.exe", p)),
        env.get("ProgramData")
            .map(|p| format!("{}\\chocolatey\\lib\\vswhere\\tools\\vswhere.exe", p)),
    ];
    candidates
        .into_iter()
        .flatten()
        .find(|p| probe.exists(Path::new(p)))
        .or_else(|| {
            env.find_executable("vswhere.exe", Path::new("."))
                .map(|p| p.to_string_lossy().to_string())
        })
}

fn vswhere_command(vswhere: &str) -> Vec<String> {
    [
        vswhere,
        "-nologo",
        "-latest",
        "-products",
        "Microsoft.VisualStudio.Product.Enterprise",
        "Microsoft.VisualStudio.Product.Professional",
        "Microsoft.VisualStudio.Product.Community",
        "-property",
        "installationPath",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn visual_studio_script(
    host_arch: &Arch,
    target: &Arch,
    env: &EnvSnapshot,
    probe: &dyn Probe,
) -> Result<Option<SetupScript>, ToolchainError> {
    if env.get("VCToolsInstallDir").is_some() {
        return Ok(None);
    }
    let not_found = |reason: &str| ToolchainError::Probe {
        path: "vswhere".to_string(),
        reason: reason.to_string(),
    };

    let vswhere = find_vswhere(env, probe).ok_or_else(|| not_found("vswhere.exe was not found"))?;
    let output = probe
        .output(&vswhere_command(&vswhere), None)
        .map_err(|e| not_found(&e.to_string()))?;
    let install = output.lines().next().unwrap_or_default().trim();
    if install.is_empty() {
        return Err(not_found("no Visual Studio installation found"));
    }

    Ok(Some(SetupScript {
        path: format!("{}\\VC\\Auxiliary\\Build\\vcvarsall.bat", install),
        args: vec![vcvars_arch(host_arch, target)?],
    }))
}

fn intel_script(
    host: HostPlatform,
    target: &Arch,
    env: &EnvSnapshot,
    probe: &dyn Probe,
) -> Result<Option<SetupScript>, ToolchainError> {
    if env.get("SETVARS_COMPLETED").is_some() || env.get("ONEAPI_ROOT").is_some() {
        return Ok(None);
    }

    let candidates: Vec<(String, Vec<String>)> = if host == HostPlatform::Windows {
        let arch = if target.cpu == Cpu::X86 { "ia32" } else { "intel64" };
        env.get("ProgramFiles(x86)")
            .map(|p| {
                vec![(
                    format!("{}\\Intel\\oneAPI\\setvars.bat", p),
                    vec![arch.to_string()],
                )]
            })
            .unwrap_or_default()
    } else {
        let mut list = Vec::new();
        if let Some(home) = env.get("HOME") {
            list.push((format!("{}/intel/oneapi/setvars.sh", home), Vec::new()));
        }
        list.push(("/opt/intel/oneapi/setvars.sh".to_string(), Vec::new()));
        list
    };

    candidates
        .into_iter()
        .find(|(path, _)| probe.exists(Path::new(path)))
        .map(|(path, args)| Some(SetupScript { path, args }))
        .ok_or_else(|| ToolchainError::Probe {
            path: "setvars".to_string(),
            reason: "No suitable Intel C++ compiler installation found".to_string(),
        })
}

fn emscripten_script(
    host: HostPlatform,
    env: &EnvSnapshot,
) -> Result<Option<SetupScript>, ToolchainError> {
    if env.get("EMSDK_PYTHON").is_some() {
        return Ok(None);
    }
    let emsdk = env.get("EMSDK").ok_or_else(|| ToolchainError::Probe {
        path: "emsdk".to_string(),
        reason: "the EMSDK environment variable is not set".to_string(),
    })?;
    let name = if host == HostPlatform::Windows {
        "emsdk_env.bat"
    } else {
        "emsdk_env.sh"
    };
    Ok(Some(SetupScript {
        path: format!("{}/{}", emsdk.trim_end_matches(['/', '\\']), name),
        args: Vec::new(),
    }))
}

/// The setup script a toolchain needs, or `None` when the environment is
/// already prepared (or the toolchain needs none).
pub fn locate_setup_script(
    kind: ToolchainType,
    host: HostPlatform,
    host_arch: &Arch,
    target: &Arch,
    env: &EnvSnapshot,
    probe: &dyn Probe,
) -> Result<Option<SetupScript>, ToolchainError> {
    match kind {
        ToolchainType::VisualStudio | ToolchainType::VisualStudioLlvm
            if host == HostPlatform::Windows =>
        {
            visual_studio_script(host_arch, target, env, probe)
        }
        ToolchainType::IntelClassic | ToolchainType::IntelLlvm => {
            intel_script(host, target, env, probe)
        }
        ToolchainType::Emscripten => emscripten_script(host, env),
        _ => Ok(None),
    }
}

/// Shell command that runs `script` and prints the resulting environment.
pub fn setup_command(host: HostPlatform, script: &SetupScript) -> Vec<String> {
    let args = script.args.join(" ");
    if host == HostPlatform::Windows {
        vec![
            "cmd".into(),
            "/d".into(),
            "/c".into(),
            format!("\"{}\" {} > nul && set", script.path, args),
        ]
    } else {
        vec![
            "/bin/sh".into(),
            "-c".into(),
            format!(". \"{}\" {} > /dev/null && env", script.path, args),
        ]
    }
}

/// Cache file of a toolchain's environment delta.
pub fn delta_cache_file(
    cache_dir: &Path,
    kind: ToolchainType,
    host_arch: &Arch,
    triple: &str,
    script: &SetupScript,
) -> PathBuf {
    cache_dir.join(format!(
        "{}_{}_{}_{}.env",
        kind.identifier(),
        host_arch.token,
        triple,
        script.unique_id()
    ))
}

/// Load a cached delta or run the script to produce one.
pub fn load_or_run_setup(
    script: &SetupScript,
    cache_file: &Path,
    host: HostPlatform,
    base: &EnvSnapshot,
    probe: &dyn Probe,
) -> Result<EnvDelta> {
    if let Some(delta) = EnvDelta::load(cache_file)? {
        tracing::debug!("using cached environment {}", cache_file.display());
        return Ok(delta);
    }

    tracing::info!("running {}", script.path);
    let output = probe
        .output(&setup_command(host, script), None)
        .with_context(|| format!("failed to run {}", script.path))?;
    let after = EnvSnapshot::parse(&output);
    if after.vars().is_empty() {
        anyhow::bail!("{} produced no environment", script.path);
    }

    let delta = EnvDelta::between(base, &after, host.path_separator());
    delta.save(cache_file)?;
    Ok(delta)
}
