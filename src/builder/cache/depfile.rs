//! Compiler-emitted dependency files.
//!
//! GNU-style drivers write Makefile fragments (`-MMD -MP -MF`). MSVC writes
//! `/sourceDependencies` JSON. Both are reduced to a flat list of paths.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

/// Read the dependencies listed in a dependency file.
///
/// JSON is detected by a leading `{`; everything else is parsed as a
/// Makefile fragment.
pub fn read_dependencies(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read dependency file {}", path.display()))?;
    if content.trim_start().starts_with('{') {
        parse_json(&content).with_context(|| format!("in {}", path.display()))
    } else {
        Ok(parse_makefile(&content))
    }
}

/// Parse a Makefile dependency fragment.
///
/// Continuation lines are joined, `-MP` phony rules (`dep:` with nothing
/// after the colon) contribute nothing, escaped spaces (`\ `) and `$$` are
/// unescaped. The rule target itself is not returned.
pub fn parse_makefile(content: &str) -> Vec<String> {
    let joined = content.replace("\\\r\n", " ").replace("\\\n", " ");
    let mut deps: Vec<String> = Vec::new();

    for line in joined.lines() {
        let Some(sep) = rule_separator(line) else {
            continue;
        };
        for dep in split_escaped(&line[sep + 1..]) {
            if !deps.contains(&dep) {
                deps.push(dep);
            }
        }
    }

    deps
}

/// Index of the `:` that ends a rule's target list.
///
/// A drive letter colon (`C:/x.o`) is followed by a path separator, never
/// by whitespace, so it is skipped naturally.
fn rule_separator(line: &str) -> Option<usize> {
    let bytes = line.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b != b':' {
            continue;
        }
        if i > 0 && bytes[i - 1] == b'\\' {
            continue;
        }
        match bytes.get(i + 1) {
            None | Some(b' ') | Some(b'\t') => return Some(i),
            _ => {}
        }
    }
    None
}

fn split_escaped(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if matches!(chars.peek(), Some(' ') | Some('#') | Some(':')) => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '$' if chars.peek() == Some(&'$') => {
                chars.next();
                current.push('$');
            }
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Parse MSVC `/sourceDependencies` output.
///
/// Both `Data.Includes` and `Data.ImportedHeaderUnits` count as
/// dependencies. The version is not checked here; only the module scan
/// cares about it.
pub fn parse_json(content: &str) -> Result<Vec<String>> {
    let json: Value = serde_json::from_str(content).context("malformed dependency JSON")?;
    let mut deps = Vec::new();
    if let Some(data) = json.get("Data") {
        for key in ["Includes", "ImportedHeaderUnits"] {
            if let Some(list) = data.get(key).and_then(Value::as_array) {
                // `<name>` entries are system header units without a path
                for item in list.iter().filter_map(Value::as_str).filter(|i| !i.starts_with('<')) {
                    let path = item.replace('\\', "/");
                    if !deps.contains(&path) {
                        deps.push(path);
                    }
                }
            }
        }
    }
    Ok(deps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_makefile_with_continuations() {
        let content = "build/obj.app/src/main.cpp.o: src/main.cpp src/util.hpp \\\n  /usr/include/stdio.h\nsrc/util.hpp:\n/usr/include/stdio.h:\n";
        assert_eq!(
            parse_makefile(content),
            vec!["src/main.cpp", "src/util.hpp", "/usr/include/stdio.h"]
        );
    }

    #[test]
    fn test_parse_makefile_escapes() {
        let content = "out.o: my\\ dir/a.h cost$$.h C:/sdk/b.h\n";
        assert_eq!(parse_makefile(content), vec!["my dir/a.h", "cost$.h", "C:/sdk/b.h"]);

        let windows = "C:/build/a.o: C:/src/a.cpp\n";
        assert_eq!(parse_makefile(windows), vec!["C:/src/a.cpp"]);
    }

    #[test]
    fn test_parse_msvc_json() {
        let content = r#"{
            "Version": "1.1",
            "Data": {
                "Source": "src\\main.cpp",
                "ProvidedModule": "",
                "Includes": ["C:\\sdk\\stdio.h", "src\\util.hpp"],
                "ImportedModules": [],
                "ImportedHeaderUnits": ["C:\\sdk\\vector"]
            }
        }"#;
        let deps = parse_json(content).unwrap();
        assert_eq!(deps, vec!["C:/sdk/stdio.h", "src/util.hpp", "C:/sdk/vector"]);
        assert!(parse_json("{ nope").is_err());
    }

    #[test]
    fn test_read_dependencies_detects_format() {
        let tmp = TempDir::new().unwrap();
        let make = tmp.path().join("a.d");
        std::fs::write(&make, "a.o: a.c a.h\n").unwrap();
        assert_eq!(read_dependencies(&make).unwrap(), vec!["a.c", "a.h"]);

        let json = tmp.path().join("a.d.json");
        std::fs::write(&json, r#"{"Version":"1.1","Data":{"Includes":["a.h"]}}"#).unwrap();
        assert_eq!(read_dependencies(&json).unwrap(), vec!["a.h"]);

        assert!(read_dependencies(&tmp.path().join("missing.d")).is_err());
    }
}
