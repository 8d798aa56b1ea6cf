//! Debian-style GCC cross sysroots (`/usr/bin/<triple>-gcc`).

use std::path::Path;

use crate::builder::toolchain::probe::Probe;

/// Sysroot and system include folders of a cross toolchain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrossSysroot {
    /// GCC's private folder (`/usr/lib/gcc-cross/<triple>/<major>`)
    pub sysroot: String,
    /// Ordered `-isystem` list, existing folders only
    pub system_includes: Vec<String>,
}

fn dotted_version(output: &str) -> String {
    let line = output.lines().next().unwrap_or_default().trim();
    let end = line
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(line.len());
    line[..end].to_string()
}

/// Locate the cross sysroot of `triple`, if a Debian cross GCC is installed.
pub fn linux_cross_sysroot(triple: &str, probe: &dyn Probe) -> Option<CrossSysroot> {
    let gcc = format!("/usr/bin/{}-gcc", triple);
    if triple.is_empty() || !probe.exists(Path::new(&gcc)) {
        return None;
    }

    let output = probe
        .output(&[gcc.clone(), "-dumpfullversion".to_string()], None)
        .ok()?;
    let version = dotted_version(&output);
    if version.is_empty() {
        tracing::debug!("`{} -dumpfullversion` printed no version", gcc);
        return None;
    }
    let short: String = version.chars().take_while(|c| c.is_ascii_digit()).collect();

    let exists = |p: &str| probe.exists(Path::new(p));

    let sysroot = [format!("/usr/{}", triple), format!("/usr/lib/{}", triple)]
        .into_iter()
        .find(|p| exists(p))
        .unwrap_or_else(|| format!("/usr/{}", triple));

    let sysroot2 = [
        format!("/usr/lib/gcc/{}/{}", triple, version),
        format!("/usr/lib/gcc/{}/{}-posix", triple, version),
        format!("/usr/lib/gcc-cross/{}/{}", triple, short),
    ]
    .into_iter()
    .find(|p| exists(p))?;

    let mut candidates = Vec::new();
    let mut versions = vec![short.clone()];
    if short != version {
        versions.push(version.clone());
    }
    for v in &versions {
        candidates.push(format!("{}/include/c++/{}", sysroot, v));
        candidates.push(format!("{}/include/c++/{}/{}", sysroot, v, triple));
        candidates.push(format!("{}/include/c++/{}/backward", sysroot, v));
    }
    candidates.push(format!("{}/include/c++", sysroot2));
    candidates.push(format!("{}/include/c++/{}", sysroot2, triple));
    candidates.push(format!("{}/include/c++/backward", sysroot2));
    candidates.push(format!("{}/include", sysroot2));
    candidates.push(format!("{}/include-fixed", sysroot2));
    candidates.push(format!("{}/include", sysroot));
    candidates.push("/usr/include".to_string());

    let mut system_includes: Vec<String> = Vec::new();
    for path in candidates {
        if exists(&path) && !system_includes.contains(&path) {
            system_includes.push(path);
        }
    }

    Some(CrossSysroot {
        sysroot: sysroot2,
        system_includes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeProbe;

    #[test]
    fn test_cross_sysroot_layout() {
        let t = "aarch64-linux-gnu";
        let probe = FakeProbe::new()
            .with_path(format!("/usr/bin/{}-gcc", t))
            .with_path(format!("/usr/{}/include/c++/12/{}", t, t))
            .with_path(format!("/usr/{}/include/c++/12/backward", t))
            .with_path(format!("/usr/lib/gcc-cross/{}/12/include-fixed", t))
            .with_path("/usr/include/stdio.h")
            .with_output(&format!("/usr/bin/{}-gcc -dumpfullversion", t), "12.3.0\n");

        let found = linux_cross_sysroot(t, &probe).unwrap();
        assert_eq!(found.sysroot, format!("/usr/lib/gcc-cross/{}/12", t));
        assert_eq!(
            found.system_includes,
            vec![
                format!("/usr/{}/include/c++/12", t),
                format!("/usr/{}/include/c++/12/{}", t, t),
                format!("/usr/{}/include/c++/12/backward", t),
                format!("/usr/lib/gcc-cross/{}/12/include-fixed", t),
                format!("/usr/{}/include", t),
                "/usr/include".to_string(),
            ]
        );
    }

    #[test]
    fn test_no_cross_compiler() {
        let probe = FakeProbe::new();
        assert!(linux_cross_sysroot("aarch64-linux-gnu", &probe).is_none());
        assert_eq!(dotted_version("12.3.0-posix\n"), "12.3.0");
    }
}
