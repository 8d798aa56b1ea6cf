//! Target triple resolution.

use std::path::Path;

use crate::builder::cache::SourceCache;
use crate::builder::toolchain::identity::ToolchainType;
use crate::builder::toolchain::probe::Probe;
use crate::core::{Arch, Cpu, HostPlatform};
use crate::util::diagnostic::ToolchainError;

/// Strip the Darwin version: `arm64-apple-darwin23.2.0` -> `arm64-apple-darwin`.
fn strip_darwin_version(triple: &str) -> String {
    match triple.find("apple-darwin") {
        Some(idx) => triple[..idx + "apple-darwin".len()].to_string(),
        None => triple.to_string(),
    }
}

fn arch_mismatch(detected: &str, requested: &Arch) -> ToolchainError {
    ToolchainError::ArchMismatch {
        detected: detected.to_string(),
        requested: requested.triple.clone(),
    }
}

/// Apply GNU corrections to a `-dumpmachine` result and check it against
/// the requested architecture.
pub fn gnu_triple(
    dumped: &str,
    host: HostPlatform,
    requested: Option<&Arch>,
) -> Result<String, ToolchainError> {
    let mut triple = dumped.trim().to_string();
    if host == HostPlatform::MacOS {
        triple = strip_darwin_version(&triple);
    } else if triple == "mingw32" {
        triple = "i686-pc-mingw32".to_string();
    }

    let Some(requested) = requested else {
        return Ok(triple);
    };
    if requested.has_triple() {
        return if requested.triple == triple {
            Ok(triple)
        } else {
            Err(arch_mismatch(&triple, requested))
        };
    }

    let mut candidates = vec![requested.gnu_arch(), requested.token.as_str()];
    if requested.cpu == Cpu::ArmHf {
        candidates = vec!["arm"];
    }
    if candidates.iter().any(|c| triple.starts_with(c)) {
        Ok(triple)
    } else {
        Err(arch_mismatch(&triple, requested))
    }
}

fn llvm_arch_token(requested: &Arch, host: HostPlatform) -> String {
    match requested.cpu {
        Cpu::X64 => "x86_64".into(),
        Cpu::X86 => "i686".into(),
        Cpu::ArmHf => "arm".into(),
        Cpu::Arm64 if host == HostPlatform::Linux => "aarch64".into(),
        Cpu::Arm64 => "arm64".into(),
        _ => requested.token.clone(),
    }
}

/// Build a Clang triple from the requested architecture and the suffix of
/// the compiler's default triple.
///
/// On Linux the result must name an installed GCC sysroot, since Clang
/// borrows its C++ runtime from there.
pub fn llvm_triple(
    dumped: &str,
    host: HostPlatform,
    requested: Option<&Arch>,
    probe: &dyn Probe,
) -> Result<String, ToolchainError> {
    let dumped = dumped.trim();
    let Some(requested) = requested else {
        return Ok(if host == HostPlatform::MacOS {
            strip_darwin_version(dumped)
        } else {
            dumped.to_string()
        });
    };
    if requested.has_triple() {
        return Ok(requested.triple.clone());
    }

    let suffix = dumped.find('-').map(|i| &dumped[i..]).unwrap_or_default();
    let mut suffix = if host == HostPlatform::MacOS {
        strip_darwin_version(suffix)
    } else {
        suffix.to_string()
    };
    if host == HostPlatform::Linux {
        let base = suffix
            .trim_end_matches("eabihf")
            .trim_end_matches("eabi")
            .to_string();
        suffix = match requested.cpu {
            Cpu::ArmHf => format!("{}eabihf", base),
            Cpu::Arm => format!("{}eabi", base),
            _ => base,
        };
    }

    let triple = format!("{}{}", llvm_arch_token(requested, host), suffix);
    if host != HostPlatform::Linux {
        return Ok(triple);
    }

    let installed = |t: &str| {
        probe.exists(&Path::new("/usr/lib/gcc").join(t))
            || probe.exists(&Path::new("/usr/lib/gcc-cross").join(t))
    };
    if installed(&triple) {
        return Ok(triple);
    }
    let without_pc = triple.replacen("-pc-linux-gnu", "-linux-gnu", 1);
    if without_pc != triple && installed(&without_pc) {
        return Ok(without_pc);
    }
    Err(arch_mismatch(dumped, requested))
}

/// Resolve the target triple of a compiler.
///
/// The `-dumpmachine` answer is memoized per executable in the source
/// cache, so repeated builds do not spawn the compiler.
pub fn resolve_triple(
    kind: ToolchainType,
    executable: &str,
    host: HostPlatform,
    requested: Option<&Arch>,
    probe: &dyn Probe,
    cache: &SourceCache,
) -> Result<String, ToolchainError> {
    match kind {
        ToolchainType::VisualStudio => {
            let arch = requested.cloned().unwrap_or_else(Arch::host);
            return Ok(format!("{}-pc-windows-msvc", arch.gnu_arch()));
        }
        ToolchainType::Emscripten => {
            return match requested {
                None => Ok("wasm32-unknown-emscripten".to_string()),
                Some(arch) if arch.cpu == Cpu::Wasm32 => Ok("wasm32-unknown-emscripten".to_string()),
                Some(arch) => Err(ToolchainError::UnsupportedArch {
                    arch: arch.triple.clone(),
                    toolchain: kind.identifier().to_string(),
                }),
            };
        }
        _ => {}
    }

    let mut dumped = String::new();
    if cache.arch_requires_update(executable, &mut dumped) {
        let argv = vec![executable.to_string(), "-dumpmachine".to_string()];
        let output = probe.output(&argv, None).map_err(|e| ToolchainError::Probe {
            path: executable.to_string(),
            reason: e.to_string(),
        })?;
        dumped = output.lines().next().unwrap_or_default().trim().to_string();
        if dumped.is_empty() {
            return Err(ToolchainError::Probe {
                path: executable.to_string(),
                reason: "empty -dumpmachine output".to_string(),
            });
        }
        cache.add_arch(executable, &dumped);
    }

    if kind.is_clang() {
        llvm_triple(&dumped, host, requested, probe)
    } else {
        gnu_triple(&dumped, host, requested)
    }
}

/// Whether a triple (or the toolchain itself) targets Windows.
pub fn is_windows_target(triple: &str, kind: ToolchainType, host: HostPlatform) -> bool {
    let lower = triple.to_ascii_lowercase();
    ["windows", "win32", "msvc", "mingw32", "w64"]
        .iter()
        .any(|needle| lower.contains(needle))
        || kind.is_msvc()
        || kind.is_windows_clang(host)
        || kind.is_mingw()
}

/// Bare-metal ARM targets.
pub fn is_embedded_target(triple: &str) -> bool {
    triple.contains("-none-eabi")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeProbe;
    use tempfile::TempDir;

    #[test]
    fn test_gnu_corrections() {
        use HostPlatform::*;
        assert_eq!(gnu_triple("arm64-apple-darwin23.2.0\n", MacOS, None).unwrap(), "arm64-apple-darwin");
        assert_eq!(gnu_triple("mingw32", Windows, None).unwrap(), "i686-pc-mingw32");
        assert_eq!(
            gnu_triple("x86_64-linux-gnu", Linux, Some(&Arch::from("x64"))).unwrap(),
            "x86_64-linux-gnu"
        );
        assert_eq!(
            gnu_triple("arm-linux-gnueabihf", Linux, Some(&Arch::from("armhf"))).unwrap(),
            "arm-linux-gnueabihf"
        );
    }

    #[test]
    fn test_gnu_arch_mismatch_message() {
        let err = gnu_triple("x86_64-linux-gnu", HostPlatform::Linux, Some(&Arch::from("arm64")))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Expected 'x86_64-linux-gnu' or 'arm64'. Please use a different toolchain or create a new one for this architecture."
        );
    }

    #[test]
    fn test_llvm_linux_cross() {
        let probe = FakeProbe::new()
            .with_path("/usr/lib/gcc-cross/arm-linux-gnueabihf")
            .with_path("/usr/lib/gcc/aarch64-linux-gnu");
        let armhf = llvm_triple(
            "x86_64-pc-linux-gnu",
            HostPlatform::Linux,
            Some(&Arch::from("armhf")),
            &probe,
        )
        .unwrap();
        assert_eq!(armhf, "arm-linux-gnueabihf");

        let arm64 = llvm_triple(
            "x86_64-unknown-linux-gnu",
            HostPlatform::Linux,
            Some(&Arch::from("arm64")),
            &probe,
        );
        assert!(arm64.is_err());

        let arm64 = llvm_triple(
            "x86_64-linux-gnu",
            HostPlatform::Linux,
            Some(&Arch::from("arm64")),
            &probe,
        )
        .unwrap();
        assert_eq!(arm64, "aarch64-linux-gnu");
    }

    #[test]
    fn test_llvm_macos_and_default() {
        let probe = FakeProbe::new();
        assert_eq!(
            llvm_triple("arm64-apple-darwin23.2.0", HostPlatform::MacOS, Some(&Arch::from("x64")), &probe)
                .unwrap(),
            "x86_64-apple-darwin"
        );
        assert_eq!(
            llvm_triple("x86_64-pc-linux-gnu", HostPlatform::Linux, None, &probe).unwrap(),
            "x86_64-pc-linux-gnu"
        );
    }

    #[test]
    fn test_resolve_memoizes_dumpmachine() {
        let tmp = TempDir::new().unwrap();
        let exe = tmp.path().join("gcc");
        std::fs::write(&exe, "").unwrap();
        let exe = exe.to_string_lossy().to_string();

        let cache = SourceCache::in_memory(tmp.path());
        let probe = FakeProbe::new().with_output(&format!("{} -dumpmachine", exe), "x86_64-linux-gnu\n");

        let first = resolve_triple(ToolchainType::Gnu, &exe, HostPlatform::Linux, None, &probe, &cache)
            .unwrap();
        let second = resolve_triple(ToolchainType::Gnu, &exe, HostPlatform::Linux, None, &probe, &cache)
            .unwrap();
        assert_eq!(first, "x86_64-linux-gnu");
        assert_eq!(second, first);
        assert_eq!(probe.calls().len(), 1);
    }

    #[test]
    fn test_fixed_triples() {
        let tmp = TempDir::new().unwrap();
        let cache = SourceCache::in_memory(tmp.path());
        let probe = FakeProbe::new();
        assert_eq!(
            resolve_triple(ToolchainType::VisualStudio, "cl.exe", HostPlatform::Windows, Some(&Arch::from("x86")), &probe, &cache)
                .unwrap(),
            "i686-pc-windows-msvc"
        );
        assert_eq!(
            resolve_triple(ToolchainType::Emscripten, "em++", HostPlatform::Linux, None, &probe, &cache).unwrap(),
            "wasm32-unknown-emscripten"
        );
        assert!(resolve_triple(ToolchainType::Emscripten, "em++", HostPlatform::Linux, Some(&Arch::from("x64")), &probe, &cache)
            .is_err());
    }

    #[test]
    fn test_target_predicates() {
        use HostPlatform::*;
        assert!(is_windows_target("x86_64-w64-mingw32", ToolchainType::Gnu, Linux));
        assert!(is_windows_target("", ToolchainType::VisualStudio, Windows));
        assert!(!is_windows_target("x86_64-linux-gnu", ToolchainType::Llvm, Linux));
        assert!(is_embedded_target("arm-none-eabi"));
    }
}
