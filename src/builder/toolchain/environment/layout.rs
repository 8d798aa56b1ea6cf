//! Toolchain folder layouts.
//!
//! A compiler is accepted only when its folder ends in a known `bin`
//! suffix and the matching `lib` and `include` folders exist next to it.

use std::path::Path;

use crate::builder::toolchain::identity::ToolchainType;
use crate::builder::toolchain::probe::Probe;
use crate::core::{Arch, Cpu, HostPlatform};

/// Relative bin/lib/include suffixes of one toolchain layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerPathStructure {
    pub bin_dir: String,
    pub lib_dir: String,
    pub include_dir: String,
}

impl CompilerPathStructure {
    pub fn new(bin: &str, lib: &str, include: &str) -> Self {
        CompilerPathStructure {
            bin_dir: bin.to_string(),
            lib_dir: lib.to_string(),
            include_dir: include.to_string(),
        }
    }
}

/// Resolved toolchain directories.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompilerDirectories {
    pub bin_dir: String,
    pub lib_dir: String,
    pub include_dir: String,
    /// Host architecture implied by an MSVC `bin/host*` folder
    pub msvc_host: Option<String>,
}

fn gnu_structures(host: HostPlatform, triple: &str) -> Vec<CompilerPathStructure> {
    let mut ret = vec![CompilerPathStructure::new(
        "/bin",
        &format!("/{}/lib", triple),
        &format!("/{}/include", triple),
    )];
    if host == HostPlatform::Linux {
        ret.push(CompilerPathStructure::new(
            "/bin",
            &format!("/lib/{}/lib", triple),
            &format!("/lib/{}/include", triple),
        ));
    }
    ret.push(CompilerPathStructure::new("/bin", "/lib", "/include"));
    ret
}

fn msvc_structures(host_arch: &Arch) -> Vec<CompilerPathStructure> {
    let mut pairs = vec![
        ("x64", "x64"),
        ("x64", "x86"),
        ("x64", "arm64"),
        ("x64", "arm"),
        ("x86", "x86"),
        ("x86", "x64"),
        ("x86", "arm64"),
        ("x86", "arm"),
    ];
    if host_arch.cpu == Cpu::Arm64 {
        pairs.extend([("arm64", "arm64"), ("arm64", "x64"), ("arm64", "x86")]);
    }
    pairs
        .into_iter()
        .map(|(host, target)| {
            CompilerPathStructure::new(
                &format!("/bin/host{}/{}", host, target),
                &format!("/lib/{}", target),
                "/include",
            )
        })
        .collect()
}

/// Candidate layouts for a toolchain, in priority order.
pub fn valid_compiler_paths(
    kind: ToolchainType,
    host: HostPlatform,
    triple: &str,
    arch: &Arch,
    host_arch: &Arch,
) -> Vec<CompilerPathStructure> {
    match kind {
        ToolchainType::VisualStudio => msvc_structures(host_arch),
        ToolchainType::VisualStudioLlvm => vec![
            CompilerPathStructure::new("/llvm/x64/bin", "/llvm/x64/lib", "/llvm/x64/include"),
            CompilerPathStructure::new("/llvm/bin", "/llvm/lib", "/llvm/include"),
        ],
        ToolchainType::IntelLlvm => {
            let mut ret = gnu_structures(host, triple);
            if host == HostPlatform::Windows {
                match arch.cpu {
                    Cpu::X64 => {
                        ret.push(CompilerPathStructure::new(
                            "/bin/intel64",
                            "/compiler/lib/intel64_win",
                            "/compiler/include",
                        ));
                        ret.push(CompilerPathStructure::new(
                            "/bin-llvm",
                            "/compiler/lib/intel64_win",
                            "/compiler/include",
                        ));
                    }
                    Cpu::X86 => {
                        ret.push(CompilerPathStructure::new(
                            "/bin/intel64_ia32",
                            "/compiler/lib/ia32_win",
                            "/compiler/include",
                        ));
                        ret.push(CompilerPathStructure::new(
                            "/bin-llvm",
                            "/compiler/lib/ia32_win",
                            "/compiler/include",
                        ));
                    }
                    _ => {}
                }
            }
            ret
        }
        ToolchainType::IntelClassic => {
            let mut ret = gnu_structures(host, triple);
            if arch.cpu == Cpu::X64 {
                ret.push(CompilerPathStructure::new(
                    "/bin/intel64",
                    "/compiler/lib",
                    "/compiler/include",
                ));
            }
            ret
        }
        ToolchainType::Emscripten => {
            let mut ret = gnu_structures(host, triple);
            if arch.cpu == Cpu::Wasm32 {
                ret.push(CompilerPathStructure::new(
                    "/bin",
                    "/lib",
                    "/emscripten/cache/sysroot/include",
                ));
            }
            ret
        }
        _ => gnu_structures(host, triple),
    }
}

/// Strip the Xcode toolchain part of a macOS path so the SDK layout
/// (`.../Toolchains/XcodeDefault.xctoolchain/usr`) resolves to `/usr`.
fn strip_xcode_toolchain(path: &str) -> String {
    match path.find("/Toolchains/XcodeDefault.xctoolchain") {
        Some(idx) if path.contains("Xcode") => {
            let rest = &path[idx + "/Toolchains/XcodeDefault.xctoolchain".len()..];
            format!("{}{}", &path[..idx], rest)
        }
        _ => path.to_string(),
    }
}

/// Match an executable's folder against `structures`.
///
/// The first structure whose `bin` suffix matches and whose `lib` and
/// `include` folders exist wins.
pub fn resolve_compiler_directories(
    executable: &str,
    structures: &[CompilerPathStructure],
    host: HostPlatform,
    probe: &dyn Probe,
) -> Option<CompilerDirectories> {
    let normalized = executable.replace('\\', "/");
    let folder = Path::new(&normalized).parent()?.to_str()?.to_string();
    let lower = folder.to_lowercase();

    for structure in structures {
        let bin = structure.bin_dir.to_lowercase();
        if !lower.ends_with(&bin) {
            continue;
        }
        let prefix = &folder[..folder.len() - bin.len()];
        let lib = format!("{}{}", prefix, structure.lib_dir);
        let include = format!("{}{}", prefix, structure.include_dir);
        if !probe.exists(Path::new(&lib)) || !probe.exists(Path::new(&include)) {
            continue;
        }

        let msvc_host = ["hostx64", "hostx86", "hostarm64"]
            .iter()
            .find(|h| bin.contains(*h))
            .map(|h| match *h {
                "hostx64" => "x86_64".to_string(),
                "hostx86" => "i686".to_string(),
                _ => "arm64".to_string(),
            });

        let prefix = if host == HostPlatform::MacOS {
            strip_xcode_toolchain(prefix)
        } else {
            prefix.to_string()
        };

        return Some(CompilerDirectories {
            bin_dir: format!("{}{}", prefix, structure.bin_dir),
            lib_dir: format!("{}{}", prefix, structure.lib_dir),
            include_dir: format!("{}{}", prefix, structure.include_dir),
            msvc_host,
        });
    }
    None
}

/// The `bin` suffixes of `structures`, for error messages.
pub fn describe(structures: &[CompilerPathStructure]) -> String {
    let mut bins: Vec<&str> = structures.iter().map(|s| s.bin_dir.as_str()).collect();
    bins.dedup();
    bins.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeProbe;

    #[test]
    fn test_gnu_structures_order() {
        let host_arch = Arch::from("x64");
        let arch = Arch::from("x86_64-linux-gnu");
        let list = valid_compiler_paths(
            ToolchainType::Gnu,
            HostPlatform::Linux,
            "x86_64-linux-gnu",
            &arch,
            &host_arch,
        );
        assert_eq!(list.len(), 3);
        assert_eq!(list[0].lib_dir, "/x86_64-linux-gnu/lib");
        assert_eq!(list[1].include_dir, "/lib/x86_64-linux-gnu/include");
        assert_eq!(list[2], CompilerPathStructure::new("/bin", "/lib", "/include"));

        let mac = valid_compiler_paths(
            ToolchainType::AppleLlvm,
            HostPlatform::MacOS,
            "arm64-apple-darwin",
            &arch,
            &host_arch,
        );
        assert_eq!(mac.len(), 2);
    }

    #[test]
    fn test_resolve_first_existing_layout() {
        let probe = FakeProbe::new()
            .with_path("/usr/lib")
            .with_path("/usr/include");
        let structures = gnu_structures(HostPlatform::Linux, "x86_64-linux-gnu");
        let dirs =
            resolve_compiler_directories("/usr/bin/g++", &structures, HostPlatform::Linux, &probe)
                .unwrap();
        assert_eq!(dirs.bin_dir, "/usr/bin");
        assert_eq!(dirs.lib_dir, "/usr/lib");
        assert_eq!(dirs.include_dir, "/usr/include");

        let cross = FakeProbe::new()
            .with_path("/opt/cross/aarch64-linux-gnu/lib")
            .with_path("/opt/cross/aarch64-linux-gnu/include")
            .with_path("/opt/cross/lib")
            .with_path("/opt/cross/include");
        let structures = gnu_structures(HostPlatform::Linux, "aarch64-linux-gnu");
        let dirs = resolve_compiler_directories(
            "/opt/cross/bin/aarch64-linux-gnu-g++",
            &structures,
            HostPlatform::Linux,
            &cross,
        )
        .unwrap();
        assert_eq!(dirs.lib_dir, "/opt/cross/aarch64-linux-gnu/lib");
    }

    #[test]
    fn test_resolve_msvc_host() {
        let root = "C:/VS/VC/Tools/MSVC/14.38.33130";
        let probe = FakeProbe::new()
            .with_path(format!("{}/lib/x86", root))
            .with_path(format!("{}/include", root));
        let structures = msvc_structures(&Arch::from("x64"));
        let dirs = resolve_compiler_directories(
            &format!("{}\\bin\\Hostx64\\x86\\cl.exe", root),
            &structures,
            HostPlatform::Windows,
            &probe,
        )
        .unwrap();
        assert_eq!(dirs.msvc_host.as_deref(), Some("x86_64"));
        assert_eq!(dirs.lib_dir, format!("{}/lib/x86", root));
    }

    #[test]
    fn test_unmatched_layout() {
        let probe = FakeProbe::new();
        let structures = gnu_structures(HostPlatform::Linux, "x86_64-linux-gnu");
        assert!(resolve_compiler_directories(
            "/home/me/tools/g++",
            &structures,
            HostPlatform::Linux,
            &probe
        )
        .is_none());
        assert_eq!(describe(&structures), "/bin");
    }

    #[test]
    fn test_strip_xcode_toolchain() {
        assert_eq!(
            strip_xcode_toolchain(
                "/Applications/Xcode.app/Contents/Developer/Toolchains/XcodeDefault.xctoolchain/usr"
            ),
            "/Applications/Xcode.app/Contents/Developer/usr"
        );
    }
}
