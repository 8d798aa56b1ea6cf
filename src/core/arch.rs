//! Host platform and target architecture.

use std::fmt;

/// The operating system anvil is running on.
///
/// Passed explicitly wherever behavior differs by host so that every
/// platform's rules can be exercised from any machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostPlatform {
    Windows,
    MacOS,
    Linux,
}

impl HostPlatform {
    /// The platform this binary was compiled for.
    pub fn current() -> Self {
        if cfg!(windows) {
            HostPlatform::Windows
        } else if cfg!(target_os = "macos") {
            HostPlatform::MacOS
        } else {
            HostPlatform::Linux
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HostPlatform::Windows => "windows",
            HostPlatform::MacOS => "macos",
            HostPlatform::Linux => "linux",
        }
    }

    /// Separator between entries of `PATH`.
    pub fn path_separator(&self) -> char {
        match self {
            HostPlatform::Windows => ';',
            _ => ':',
        }
    }

    /// Shared library extension for native (non-Windows-target) builds.
    pub fn shared_library_extension(&self) -> &'static str {
        match self {
            HostPlatform::Windows => ".dll",
            HostPlatform::MacOS => ".dylib",
            HostPlatform::Linux => ".so",
        }
    }
}

/// CPU family of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cpu {
    X64,
    X86,
    Arm,
    ArmHf,
    Arm64,
    Wasm32,
    UniversalMacOS,
    Unknown,
}

/// A target architecture: the full triple plus its parsed CPU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arch {
    /// Full triple, or the bare token when no triple is known yet
    pub triple: String,
    /// Everything after the first `-`, including the dash
    pub suffix: String,
    /// Canonical architecture token (`x86_64`, `i686`, `arm64`, ...)
    pub token: String,
    pub cpu: Cpu,
}

impl Arch {
    /// Parse a triple (`aarch64-linux-gnu`) or a short token (`x64`).
    pub fn from(value: &str) -> Self {
        let value = value.trim();
        let (head, suffix) = match value.find('-') {
            Some(idx) => (&value[..idx], &value[idx..]),
            None => (value, ""),
        };

        let lower = head.to_ascii_lowercase();
        let (cpu, token) = match lower.as_str() {
            "x64" | "x86_64" | "amd64" => (Cpu::X64, "x86_64".to_string()),
            "x86" | "i686" | "i586" | "i486" | "i386" => (Cpu::X86, "i686".to_string()),
            "arm" | "armv7" | "armv7a" => (Cpu::Arm, "arm".to_string()),
            "armhf" => (Cpu::ArmHf, "armhf".to_string()),
            "arm64" | "aarch64" => (Cpu::Arm64, "arm64".to_string()),
            "wasm32" => (Cpu::Wasm32, "wasm32".to_string()),
            "universal" => (Cpu::UniversalMacOS, "universal".to_string()),
            _ => (Cpu::Unknown, lower.clone()),
        };

        let triple = if suffix.is_empty() {
            value.to_string()
        } else {
            let arch_part = if cpu == Cpu::Arm64 && lower == "aarch64" {
                "aarch64"
            } else {
                head
            };
            format!("{}{}", arch_part, suffix)
        };

        Arch {
            triple,
            suffix: suffix.to_string(),
            token,
            cpu,
        }
    }

    /// The architecture of the machine running anvil.
    pub fn host() -> Self {
        Arch::from(std::env::consts::ARCH)
    }

    /// Whether this value carries a full triple.
    pub fn has_triple(&self) -> bool {
        self.triple.contains('-')
    }

    /// Architecture token as GNU tools spell it (`aarch64`, `x86_64`, `i686`).
    pub fn gnu_arch(&self) -> &str {
        match self.cpu {
            Cpu::X64 => "x86_64",
            Cpu::X86 => "i686",
            Cpu::Arm | Cpu::ArmHf => "arm",
            Cpu::Arm64 => "aarch64",
            Cpu::Wasm32 => "wasm32",
            Cpu::UniversalMacOS => "universal",
            Cpu::Unknown => &self.token,
        }
    }

    /// Architecture token as Visual Studio spells it.
    pub fn vs_arch(&self) -> &str {
        match self.cpu {
            Cpu::X64 => "x64",
            Cpu::X86 => "x86",
            Cpu::Arm | Cpu::ArmHf => "arm",
            Cpu::Arm64 => "arm64",
            _ => &self.token,
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.triple)
    }
}
