//! `compile_commands.json` for editors and language servers.
//!
//! Written from the same command generation the build uses, one entry per
//! C-family source and precompiled header. Resource compiles are left out.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::builder::context::BuildState;
use crate::core::{SourceTarget, SourceType};
use crate::util::fs::{ensure_dir, unix_path, write_string};

pub const COMPILE_COMMANDS_FILE: &str = "compile_commands.json";

/// One compilation database entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileCommand {
    pub directory: String,
    pub file: String,
    pub arguments: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// Entries for every compile a full build of `target` runs.
pub fn target_entries(state: &BuildState, target: &SourceTarget) -> Result<Vec<CompileCommand>> {
    let ctx = state.context(target);
    let files = state.paths.resolve_files(&state.root, target)?;
    let outputs = state
        .paths
        .outputs(target, &files, state.controller.compiles_resources());
    let directory = unix_path(&state.root);

    let mut entries = Vec::new();
    for group in &outputs.groups {
        let specs = match group.kind {
            SourceType::C | SourceType::Cpp | SourceType::ObjectiveC | SourceType::ObjectiveCpp => {
                vec![state.controller.compile(&ctx, group)]
            }
            SourceType::CxxPrecompiledHeader => state.controller.precompiled_header(&ctx, group),
            SourceType::WindowsResource | SourceType::Unknown => continue,
        };
        for spec in specs.iter().filter(|s| !s.is_empty()) {
            entries.push(CompileCommand {
                directory: directory.clone(),
                file: unix_path(&state.root.join(&group.source_file)),
                arguments: spec.to_argv(),
                output: Some(group.object_file.clone()),
            });
        }
    }
    Ok(entries)
}

/// Write the database for `targets` into the configuration's output
/// directory and copy it to the build directory, where tools look first.
///
/// Returns the path written in the output directory.
pub fn write_compile_commands(state: &BuildState, targets: &[SourceTarget]) -> Result<PathBuf> {
    let mut entries = Vec::new();
    for target in targets {
        entries.extend(target_entries(state, target)?);
    }
    let json = serde_json::to_string_pretty(&entries)?;

    let output_dir = state.root.join(state.paths.output_dir());
    ensure_dir(&output_dir)?;
    let path = output_dir.join(COMPILE_COMMANDS_FILE);
    write_string(&path, &json)?;

    let copy = state.root.join(state.paths.build_dir()).join(COMPILE_COMMANDS_FILE);
    if copy != path {
        std::fs::copy(&path, &copy).with_context(|| format!("failed to copy {} to {}", path.display(), copy.display()))?;
    }
    tracing::debug!("wrote {} ({} entries)", path.display(), entries.len());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::context::tests::gcc_state;
    use tempfile::TempDir;

    fn write(root: &std::path::Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_entries_follow_compile_commands() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "src/main.cpp", "int main() { return 0; }\n");
        write(tmp.path(), "src/util.c", "int util(void) { return 1; }\n");
        write(tmp.path(), "src/app.rc", "1 ICON \"app.ico\"\n");
        let (ws, state) = gcc_state(
            tmp.path(),
            "[[target]]\nname = \"app\"\nfiles = [\"src/*.cpp\", \"src/*.c\", \"src/*.rc\"]\n",
        );
        let target = &ws.manifest().targets()[0];

        let entries = target_entries(&state, target).unwrap();
        assert_eq!(entries.len(), 2);
        let main = entries.iter().find(|e| e.file.ends_with("src/main.cpp")).unwrap();
        assert_eq!(main.directory, unix_path(&state.root));
        assert_eq!(main.output.as_deref(), Some("build/Debug/obj.app/src/main.cpp.o"));
        assert_eq!(main.arguments[0], state.tools.cxx);
        assert!(main.arguments.contains(&"src/main.cpp".to_string()));
        assert!(entries.iter().all(|e| !e.file.ends_with(".rc")));
    }

    #[test]
    fn test_write_places_database_in_both_directories() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "src/main.cpp", "int main() { return 0; }\n");
        let (ws, state) = gcc_state(tmp.path(), "[[target]]\nname = \"app\"\nfiles = [\"src/*.cpp\"]\n");

        let path = write_compile_commands(&state, ws.manifest().targets()).unwrap();
        assert_eq!(path, state.root.join("build/Debug/compile_commands.json"));

        let text = std::fs::read_to_string(&path).unwrap();
        let entries: Vec<CompileCommand> = serde_json::from_str(&text).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            std::fs::read_to_string(state.root.join("build/compile_commands.json")).unwrap(),
            text
        );
    }
}
