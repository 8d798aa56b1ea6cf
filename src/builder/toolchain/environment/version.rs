//! Version banners and human-readable descriptions.

use std::path::Path;

use crate::builder::toolchain::identity::ToolchainType;

/// Command printing a version banner for `executable`.
///
/// Clang variants are asked for a specific target so the banner matches
/// the triple being built for.
pub fn version_command(kind: ToolchainType, executable: &str, triple: &str) -> Vec<String> {
    let exe = executable.to_string();
    match kind {
        ToolchainType::VisualStudio => vec![exe],
        ToolchainType::IntelClassic => vec![exe, "-V".into()],
        ToolchainType::Llvm
        | ToolchainType::MingwLlvm
        | ToolchainType::AppleLlvm
        | ToolchainType::VisualStudioLlvm
        | ToolchainType::IntelLlvm
        | ToolchainType::Emscripten
            if !triple.is_empty() =>
        {
            vec![exe, "-target".into(), triple.to_string(), "-v".into()]
        }
        _ => vec![exe, "-v".into()],
    }
}

/// Command printing the emcc banner.
///
/// `emcc.py` is run through the SDK's Python, anything else directly.
pub fn emcc_version_command(emcc: &str, python: Option<&str>) -> Vec<String> {
    if emcc.ends_with("emcc.py") {
        let python = python.unwrap_or("python3");
        vec![python.to_string(), emcc.to_string(), "--version".into()]
    } else {
        vec![emcc.to_string(), "--version".into()]
    }
}

fn numeric_prefix(text: &str) -> &str {
    let end = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    text[..end].trim_end_matches('.')
}

/// GNU-style banners: `gcc version 13.2.0 (...)`, `clang version 17.0.6`.
pub fn parse_gnu_version(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let start = line.find("version ")? + "version ".len();
        let version = numeric_prefix(line[start..].trim());
        (!version.is_empty()).then(|| version.to_string())
    })
}

/// `Microsoft (R) C/C++ Optimizing Compiler Version 19.38.33130 for x64`,
/// on whichever line of `cl`'s output carries it.
pub fn parse_msvc_version(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let start = line.find("Version ")? + "Version ".len();
        let rest = line.get(start..)?;
        let end = rest.find(" for ").unwrap_or(rest.len());
        let version = numeric_prefix(rest.get(..end)?.trim());
        (!version.is_empty()).then(|| version.to_string())
    })
}

/// Intel banners carry `Version X` (classic) or `Compiler X` (oneAPI).
pub fn parse_intel_version(output: &str) -> Option<String> {
    output.lines().filter(|l| l.contains("Intel")).find_map(|line| {
        let (start, marker) = match line.find("Version ") {
            Some(idx) => (idx, "Version "),
            None => (line.find("Compiler ")?, "Compiler "),
        };
        let rest = &line[start + marker.len()..];
        let version = rest.split(' ').next().unwrap_or_default();
        let version = numeric_prefix(version);
        (!version.is_empty()).then(|| version.to_string())
    })
}

/// `emcc (Emscripten gcc/clang-like replacement ...) 3.1.47 (431685f...)`.
pub fn parse_emcc_version(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let start = line.find(") ")? + 2;
        let version = numeric_prefix(&line[start..]);
        (!version.is_empty()).then(|| version.to_string())
    })
}

/// Parse the banner produced by [`version_command`].
pub fn parse_version(kind: ToolchainType, output: &str) -> Option<String> {
    match kind {
        ToolchainType::VisualStudio => parse_msvc_version(output),
        ToolchainType::IntelClassic | ToolchainType::IntelLlvm => parse_intel_version(output),
        ToolchainType::Unknown => None,
        _ => parse_gnu_version(output),
    }
}

/// `(MINGW64)` style flavor taken from the MSYS2 prefix folder.
///
/// `C:/msys64/mingw64/bin/gcc.exe` sits two levels under `mingw64`.
pub fn mingw_flavor(executable: &str) -> String {
    let normalized = executable.replace('\\', "/");
    let folder = Path::new(&normalized)
        .parent()
        .and_then(Path::parent)
        .and_then(Path::file_name)
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    if folder.ends_with("64") || folder.ends_with("32") {
        format!(" ({})", folder.to_uppercase())
    } else {
        String::new()
    }
}

/// Extra facts some descriptions mention.
#[derive(Debug, Clone, Default)]
pub struct DescriptionContext {
    /// Visual Studio installation version (`17.8.3`)
    pub vs_version: Option<String>,
    /// emcc version, for Emscripten
    pub emcc_version: Option<String>,
}

/// Human-readable description of a compiler.
pub fn description(
    kind: ToolchainType,
    executable: &str,
    version: &str,
    context: &DescriptionContext,
) -> String {
    let vs = context.vs_version.as_deref().unwrap_or("unknown");
    match kind {
        ToolchainType::Gnu => format!("GNU Compiler Collection version {}", version),
        ToolchainType::MingwGnu => format!(
            "Minimalist GNU Compiler Collection for Windows version {}{}",
            version,
            mingw_flavor(executable)
        ),
        ToolchainType::Llvm => format!("LLVM Clang version {}", version),
        ToolchainType::MingwLlvm => {
            format!("LLVM Clang version {}{}", version, mingw_flavor(executable))
        }
        ToolchainType::AppleLlvm => format!("Apple Clang version {}", version),
        ToolchainType::VisualStudio => {
            format!("Microsoft Visual C/C++ version {} (VS {})", version, vs)
        }
        ToolchainType::VisualStudioLlvm => format!("LLVM Clang version {} (VS {})", version, vs),
        ToolchainType::IntelClassic => format!("Intel 64 Compiler Classic version {}", version),
        ToolchainType::IntelLlvm => format!("Intel oneAPI DPC++/C++ version {}", version),
        ToolchainType::Emscripten => format!(
            "Emscripten version {} (Based on LLVM Clang {})",
            context.emcc_version.as_deref().unwrap_or("unknown"),
            version
        ),
        ToolchainType::Unknown => "Unrecognized".to_string(),
    }
}
