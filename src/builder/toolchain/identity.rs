//! Toolchain identity: which compiler family an executable belongs to.
//!
//! Classification is a pure function of the executable path, an optional
//! predefined-macro dump and the host platform. Nothing here spawns a
//! process; the caller decides whether a macro dump is needed (see
//! [`needs_macros`]) and passes it in.

use std::collections::BTreeMap;
use std::fmt;

use crate::core::arch::HostPlatform;

/// Compiler family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolchainType {
    Gnu,
    MingwGnu,
    Llvm,
    MingwLlvm,
    AppleLlvm,
    VisualStudio,
    VisualStudioLlvm,
    IntelClassic,
    IntelLlvm,
    Emscripten,
    Unknown,
}

impl ToolchainType {
    pub const ALL: [ToolchainType; 11] = [
        ToolchainType::Gnu,
        ToolchainType::MingwGnu,
        ToolchainType::Llvm,
        ToolchainType::MingwLlvm,
        ToolchainType::AppleLlvm,
        ToolchainType::VisualStudio,
        ToolchainType::VisualStudioLlvm,
        ToolchainType::IntelClassic,
        ToolchainType::IntelLlvm,
        ToolchainType::Emscripten,
        ToolchainType::Unknown,
    ];

    /// Stable identifier, used in cache file names.
    pub fn identifier(&self) -> &'static str {
        match self {
            ToolchainType::Gnu => "gcc",
            ToolchainType::MingwGnu => "mingw-gcc",
            ToolchainType::Llvm => "llvm",
            ToolchainType::MingwLlvm => "mingw-llvm",
            ToolchainType::AppleLlvm => "apple-llvm",
            ToolchainType::VisualStudio => "vs",
            ToolchainType::VisualStudioLlvm => "vs-llvm",
            ToolchainType::IntelClassic => "intel-classic",
            ToolchainType::IntelLlvm => "intel-llvm",
            ToolchainType::Emscripten => "emscripten",
            ToolchainType::Unknown => "unknown",
        }
    }

    pub fn from_identifier(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.identifier() == id)
    }

    pub fn is_known(&self) -> bool {
        *self != ToolchainType::Unknown
    }

    pub fn is_clang(&self) -> bool {
        matches!(
            self,
            ToolchainType::Llvm
                | ToolchainType::AppleLlvm
                | ToolchainType::VisualStudioLlvm
                | ToolchainType::IntelLlvm
                | ToolchainType::MingwLlvm
                | ToolchainType::Emscripten
        )
    }

    pub fn is_apple_clang(&self) -> bool {
        *self == ToolchainType::AppleLlvm
    }

    /// GCC-compatible driver. Intel Classic only qualifies off Windows,
    /// where it is `icc`/`icpc` rather than `icl`.
    pub fn is_gcc(&self, host: HostPlatform) -> bool {
        match self {
            ToolchainType::Gnu | ToolchainType::MingwGnu => true,
            ToolchainType::IntelClassic => host != HostPlatform::Windows,
            _ => false,
        }
    }

    pub fn is_msvc(&self) -> bool {
        *self == ToolchainType::VisualStudio
    }

    pub fn is_msvc_clang(&self) -> bool {
        *self == ToolchainType::VisualStudioLlvm
    }

    /// Clang using the MSVC ABI.
    pub fn is_windows_clang(&self, host: HostPlatform) -> bool {
        host == HostPlatform::Windows
            && matches!(
                self,
                ToolchainType::Llvm | ToolchainType::VisualStudioLlvm | ToolchainType::IntelLlvm
            )
    }

    pub fn is_mingw_gcc(&self) -> bool {
        *self == ToolchainType::MingwGnu
    }

    pub fn is_mingw_clang(&self) -> bool {
        *self == ToolchainType::MingwLlvm
    }

    pub fn is_mingw(&self) -> bool {
        self.is_mingw_gcc() || self.is_mingw_clang()
    }

    pub fn is_intel_classic(&self) -> bool {
        *self == ToolchainType::IntelClassic
    }

    pub fn is_emscripten(&self) -> bool {
        *self == ToolchainType::Emscripten
    }

    /// Uses `cl`-style command lines (`/c`, `/Fo`, ...).
    pub fn uses_msvc_cli(&self, host: HostPlatform) -> bool {
        self.is_msvc() || (self.is_intel_classic() && host == HostPlatform::Windows)
    }
}

impl fmt::Display for ToolchainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

/// Predefined macros parsed from a `-dM -E` dump.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MacroSet {
    macros: BTreeMap<String, String>,
}

impl MacroSet {
    /// Parse `#define NAME VALUE` lines; anything else is ignored.
    pub fn parse(dump: &str) -> Self {
        let mut macros = BTreeMap::new();
        for line in dump.lines() {
            let Some(rest) = line.trim().strip_prefix("#define ") else {
                continue;
            };
            let (name, value) = match rest.split_once(' ') {
                Some((name, value)) => (name, value.trim()),
                None => (rest, ""),
            };
            macros.insert(name.to_string(), value.to_string());
        }
        MacroSet { macros }
    }

    pub fn has(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.macros.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    fn is_mingw(&self) -> bool {
        self.has("__MINGW32__") || self.has("__MINGW64__")
    }
}

fn basename(path: &str) -> &str {
    let file = path.rsplit('/').next().unwrap_or(path);
    file.strip_suffix(".exe").unwrap_or(file)
}

fn is_apple_developer_path(path: &str) -> bool {
    path.contains("/contents/developer") || path.contains("/developer/commandlinetools")
}

/// Classify from the path alone. `None` means the path was not conclusive.
fn classify_path(path: &str, host: HostPlatform) -> Option<ToolchainType> {
    let name = basename(path);
    let windows = host == HostPlatform::Windows;

    if windows && name == "cl" {
        return Some(ToolchainType::VisualStudio);
    }
    if (windows && name == "icl") || (!windows && (name == "icc" || name == "icpc")) {
        return Some(ToolchainType::IntelClassic);
    }
    if name == "icx" || name == "icpx" || path.contains("/oneapi/") {
        return Some(ToolchainType::IntelLlvm);
    }
    if name == "emcc" || name == "em++" || name.starts_with("wasm32-clang") {
        return Some(ToolchainType::Emscripten);
    }
    if name.contains("clang") {
        if windows && (path.contains("/vc/tools/llvm/x64/bin/") || path.contains("/vc/tools/llvm/bin/")) {
            return Some(ToolchainType::VisualStudioLlvm);
        }
        if host == HostPlatform::MacOS && is_apple_developer_path(path) {
            return Some(ToolchainType::AppleLlvm);
        }
        return Some(ToolchainType::Llvm);
    }
    if name.contains("gcc") || name.contains("g++") {
        if host == HostPlatform::MacOS && is_apple_developer_path(path) {
            return Some(ToolchainType::AppleLlvm);
        }
        if windows || path.contains("mingw") {
            return Some(ToolchainType::MingwGnu);
        }
        return Some(ToolchainType::Gnu);
    }
    None
}

fn classify_macros(macros: &MacroSet, host: HostPlatform) -> ToolchainType {
    if macros.has("__EMSCRIPTEN__") {
        ToolchainType::Emscripten
    } else if macros.has("__INTEL_LLVM_COMPILER") || macros.has("__INTEL_CLANG_COMPILER") {
        ToolchainType::IntelLlvm
    } else if macros.has("__clang__") {
        if macros.is_mingw() {
            ToolchainType::MingwLlvm
        } else if host == HostPlatform::MacOS
            && (macros.has("__apple_build_version__")
                || macros
                    .get("__VERSION__")
                    .is_some_and(|v| v.contains("Apple LLVM") || v.contains("Apple clang")))
        {
            ToolchainType::AppleLlvm
        } else {
            ToolchainType::Llvm
        }
    } else if macros.has("__INTEL_COMPILER") {
        ToolchainType::IntelClassic
    } else if macros.has("__GNUC__") {
        if macros.is_mingw() {
            ToolchainType::MingwGnu
        } else {
            ToolchainType::Gnu
        }
    } else {
        ToolchainType::Unknown
    }
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/").to_ascii_lowercase()
}

/// Whether [`classify`] would consult a macro dump for this path.
///
/// True when the path rules are inconclusive, or when they resolve to plain
/// LLVM and a Mingw upgrade is still possible.
pub fn needs_macros(path: &str, host: HostPlatform) -> bool {
    match classify_path(&normalize(path), host) {
        None | Some(ToolchainType::Llvm) => true,
        Some(_) => false,
    }
}

/// Classify a compiler executable into one toolchain family.
pub fn classify(path: &str, macros: Option<&MacroSet>, host: HostPlatform) -> ToolchainType {
    let path = normalize(path);
    match (classify_path(&path, host), macros) {
        (Some(ToolchainType::Llvm), Some(m)) if m.is_mingw() => ToolchainType::MingwLlvm,
        (Some(found), _) => found,
        (None, Some(m)) => classify_macros(m, host),
        (None, None) => ToolchainType::Unknown,
    }
}
