//! Supported-flag discovery.
//!
//! Compilers are asked for their option help once; the parsed flag names
//! are cached next to the other toolchain files as `flags_<hash>.env`.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Result;

use crate::builder::toolchain::identity::ToolchainType;
use crate::builder::toolchain::probe::Probe;
use crate::core::HostPlatform;
use crate::util::fs::{read_to_string, write_string};
use crate::util::hash::short_hash;

const INTEL_HELP_CATEGORIES: &[&str] = &[
    "codegen",
    "compatibility",
    "advanced",
    "component",
    "data",
    "diagnostics",
    "float",
    "inline",
    "ipo",
    "language",
    "link",
    "misc",
    "opt",
    "output",
    "pgo",
    "preproc",
    "reports",
    "openmp",
];

/// Commands whose output lists the options a compiler accepts.
pub fn flag_commands(kind: ToolchainType, executable: &str, host: HostPlatform) -> Vec<Vec<String>> {
    let exe = executable.to_string();
    if kind.uses_msvc_cli(host) {
        return Vec::new();
    }
    match kind {
        ToolchainType::IntelClassic => INTEL_HELP_CATEGORIES
            .iter()
            .map(|cat| vec![exe.clone(), "-Q".into(), "--help".into(), cat.to_string()])
            .collect(),
        k if k.is_clang() => vec![vec![exe, "-cc1".into(), "--help".into()]],
        ToolchainType::Gnu | ToolchainType::MingwGnu => vec![
            vec![
                exe.clone(),
                "-Q".into(),
                "--help=common".into(),
                "--help=optimizers".into(),
                "--help=target".into(),
                "--help=warnings".into(),
                "--help=undocumented".into(),
            ],
            vec![exe, "-Wl,--help".into()],
        ],
        _ => Vec::new(),
    }
}

fn flag_name(text: &str) -> Option<String> {
    let end = text
        .find(|c: char| c == '=' || c == '<' || c == ' ' || c == '\t')
        .unwrap_or(text.len());
    let name = text[..end].trim_end_matches([' ', ',']);
    (name.starts_with('-') && name.len() > 1).then(|| name.to_lowercase())
}

/// Parse option help text into lower-cased flag names.
///
/// Only the name is kept: `-std=<value>` becomes `-std`. When a line lists
/// a tab-separated alias, both names are kept.
pub fn parse_flags(output: &str) -> BTreeSet<String> {
    let mut flags = BTreeSet::new();
    for line in output.lines() {
        let trimmed = line.trim_start();
        if let Some(name) = flag_name(trimmed) {
            flags.insert(name);
        }
        if let Some((_, alias)) = trimmed.rsplit_once('\t') {
            let alias = alias.trim_start();
            if alias.starts_with('-') {
                let end = alias.find(['"', ' ']).unwrap_or(alias.len());
                if let Some(name) = flag_name(&alias[..end]) {
                    flags.insert(name);
                }
            }
        }
    }
    flags
}

/// Cache file holding the flags of `executable`.
pub fn flags_cache_file(cache_dir: &Path, executable: &str) -> std::path::PathBuf {
    cache_dir.join(format!("flags_{}.env", short_hash(executable)))
}

/// Load the supported flags of a compiler, probing on a cache miss.
///
/// A failing help command contributes nothing. An empty result means
/// "unknown", which callers treat as "everything is supported".
pub fn supported_flags(
    kind: ToolchainType,
    executable: &str,
    host: HostPlatform,
    cache_dir: &Path,
    probe: &dyn Probe,
) -> Result<BTreeSet<String>> {
    let commands = flag_commands(kind, executable, host);
    if commands.is_empty() {
        return Ok(BTreeSet::new());
    }

    let cache_file = flags_cache_file(cache_dir, executable);
    if cache_file.exists() {
        let content = read_to_string(&cache_file)?;
        return Ok(content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect());
    }

    let mut flags = BTreeSet::new();
    for argv in &commands {
        match probe.output(argv, None) {
            Ok(output) => flags.extend(parse_flags(&output)),
            Err(e) => tracing::debug!("flag query `{}` failed: {:#}", argv.join(" "), e),
        }
    }

    let mut content = flags.iter().cloned().collect::<Vec<_>>().join("\n");
    content.push('\n');
    write_string(&cache_file, &content)?;
    tracing::debug!("cached {} flags in {}", flags.len(), cache_file.display());
    Ok(flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeProbe;
    use tempfile::TempDir;

    const GCC_HELP: &str = "The following options are language-independent:
  -Wall                       Enable most warning messages.
  -std=<standard>             Conform to the ISO standard.
  -fdiagnostics-color=[never|always|auto] Colorize diagnostics.
  -O<number>                  Set optimization level.
";

    const CLANG_CC1: &str = "OPTIONS:
  -fmodules-ts            Enable support for the C++ Modules TS
  -fcolor-diagnostics,    Enable colors
  -fsyntax-only\t-fno-syntax \"alias\"
";

    #[test]
    fn test_parse_gcc_help() {
        let flags = parse_flags(GCC_HELP);
        assert!(flags.contains("-wall"));
        assert!(flags.contains("-std"));
        assert!(flags.contains("-fdiagnostics-color"));
        assert!(flags.contains("-o"));
        assert!(!flags.iter().any(|f| f.contains("following")));
    }

    #[test]
    fn test_parse_clang_aliases() {
        let flags = parse_flags(CLANG_CC1);
        assert!(flags.contains("-fmodules-ts"));
        assert!(flags.contains("-fcolor-diagnostics"));
        assert!(flags.contains("-fsyntax-only"));
        assert!(flags.contains("-fno-syntax"));
    }

    #[test]
    fn test_commands_per_family() {
        let gnu = flag_commands(ToolchainType::Gnu, "g++", HostPlatform::Linux);
        assert_eq!(gnu.len(), 2);
        assert_eq!(gnu[1], vec!["g++", "-Wl,--help"]);
        assert_eq!(
            flag_commands(ToolchainType::Llvm, "clang++", HostPlatform::Linux),
            vec![vec!["clang++", "-cc1", "--help"]]
        );
        assert_eq!(flag_commands(ToolchainType::IntelClassic, "icpc", HostPlatform::Linux).len(), 18);
        assert!(flag_commands(ToolchainType::VisualStudio, "cl.exe", HostPlatform::Windows).is_empty());
    }

    #[test]
    fn test_supported_flags_cached() {
        let tmp = TempDir::new().unwrap();
        let probe = FakeProbe::new().with_output("clang++ -cc1 --help", CLANG_CC1);

        let first =
            supported_flags(ToolchainType::Llvm, "clang++", HostPlatform::Linux, tmp.path(), &probe)
                .unwrap();
        assert!(flags_cache_file(tmp.path(), "clang++").exists());

        let second =
            supported_flags(ToolchainType::Llvm, "clang++", HostPlatform::Linux, tmp.path(), &probe)
                .unwrap();
        assert_eq!(first, second);
        assert_eq!(probe.calls().len(), 1);
    }
}
