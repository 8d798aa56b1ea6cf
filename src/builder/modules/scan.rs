//! Textual module dependency scan.
//!
//! Reads the module preamble of a source without running the compiler.
//! Only top-level declarations at the start of a line are recognized:
//!
//! ```text
//! export module app.core;      provides app.core
//! module app.core;             implementation unit of app.core
//! module;                      global module fragment (ignored)
//! import app.util;             imports a named module
//! import :detail;              imports the partition app.core:detail
//! import <vector>;             imports a system header unit
//! import "config.h";           imports a user header unit
//! ```
//!
//! Scanning stops at the first `namespace`, `class`, `struct`, `using` or
//! `const` line.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use super::deps::ModuleDependencies;

static MODULE_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(export\s+)?module\s+([A-Za-z_][\w.]*(?::[A-Za-z_][\w.]*)?)\s*;").expect("valid regex")
});

static IMPORT_DECL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^(?:export\s+)?import\s+(<[^>]+>|"[^"]+"|:?[A-Za-z_][\w.:]*)\s*;"#).expect("valid regex"));

const STOP_WORDS: &[&str] = &["namespace", "class", "struct", "using", "const"];

fn starts_with_word(line: &str, word: &str) -> bool {
    line.strip_prefix(word)
        .is_some_and(|rest| rest.is_empty() || !rest.starts_with(|c: char| c.is_alphanumeric() || c == '_'))
}

fn push_unique(list: &mut Vec<String>, item: String) {
    if !list.contains(&item) {
        list.push(item);
    }
}

/// Scan source text. `source` is recorded as the dependency's source path.
pub fn scan_source(source: &str, text: &str) -> ModuleDependencies {
    let mut deps = ModuleDependencies::new(source);
    // Primary module name, for resolving `import :part;`
    let mut primary = String::new();

    for raw in text.lines() {
        let line = match raw.find("//") {
            Some(idx) => &raw[..idx],
            None => raw,
        }
        .trim();
        if line.is_empty() {
            continue;
        }

        if let Some(caps) = MODULE_DECL.captures(line) {
            let name = caps[2].to_string();
            primary = name.split(':').next().unwrap_or_default().to_string();
            if caps.get(1).is_some() || name.contains(':') {
                deps.provided_module = name;
            } else {
                // `module X;` implements X and implicitly imports it
                deps.implemented_module = name.clone();
                push_unique(&mut deps.imported_modules, name);
            }
            continue;
        }

        if let Some(caps) = IMPORT_DECL.captures(line) {
            let imported = &caps[1];
            if let Some(header) = imported.strip_prefix('"').and_then(|h| h.strip_suffix('"')) {
                push_unique(&mut deps.imported_header_units, header.replace('\\', "/"));
            } else if imported.starts_with('<') {
                push_unique(&mut deps.imported_header_units, imported.to_string());
            } else if let Some(partition) = imported.strip_prefix(':') {
                if !primary.is_empty() {
                    push_unique(&mut deps.imported_modules, format!("{}:{}", primary, partition));
                }
            } else {
                push_unique(&mut deps.imported_modules, imported.to_string());
            }
            continue;
        }

        if STOP_WORDS.iter().any(|w| starts_with_word(line, w)) {
            break;
        }
    }

    deps
}

/// Scan a source file relative to `root`.
pub fn scan_file(root: &Path, source: &str) -> Result<ModuleDependencies> {
    let path = root.join(source);
    let text = std::fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(scan_source(source, &text))
}
