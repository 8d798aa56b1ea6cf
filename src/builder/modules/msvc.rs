//! Visual Studio module strategy.
//!
//! Dependencies come from `cl /sourceDependencies`. The standard library
//! modules `std` and `std.compat` are built from the sources listed in
//! `<VCToolsInstallDir>/modules/modules.json`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use super::ModuleStrategy;
use crate::builder::toolchain::ToolchainEnvironment;
use crate::core::SourceFileGroup;

#[derive(Debug, Deserialize)]
struct ModulesManifest {
    #[serde(rename = "module-sources", default)]
    module_sources: Vec<String>,
}

/// Modules provided by the toolchain, by name, read from `modules_dir`.
///
/// Falls back to the well-known file names when `modules.json` is missing.
pub fn read_system_modules(modules_dir: &Path) -> BTreeMap<String, String> {
    let manifest = modules_dir.join("modules.json");
    let sources = match std::fs::read_to_string(&manifest) {
        Ok(text) => match serde_json::from_str::<ModulesManifest>(&text) {
            Ok(parsed) => parsed.module_sources,
            Err(e) => {
                tracing::warn!("failed to parse {}: {}", manifest.display(), e);
                Vec::new()
            }
        },
        Err(_) => vec!["std.ixx".to_string(), "std.compat.ixx".to_string()],
    };

    let mut modules = BTreeMap::new();
    for source in sources {
        let path = modules_dir.join(&source);
        if !path.exists() {
            continue;
        }
        let name = source.strip_suffix(".ixx").unwrap_or(&source).to_string();
        modules.insert(name, path.to_string_lossy().replace('\\', "/"));
    }
    modules
}

#[derive(Debug, Default)]
pub struct MsvcStrategy;

impl ModuleStrategy for MsvcStrategy {
    fn name(&self) -> &'static str {
        "msvc"
    }

    fn scans_with_compiler(&self) -> bool {
        true
    }

    fn system_modules(&self, toolchain: &ToolchainEnvironment) -> BTreeMap<String, String> {
        match toolchain.env.get("VCToolsInstallDir") {
            Some(dir) => read_system_modules(&Path::new(dir).join("modules")),
            None => BTreeMap::new(),
        }
    }

    fn links_header_units(&self) -> bool {
        true
    }

    fn system_header_source(&self, header: &str) -> String {
        // `/headerName:angle` takes the include name, not the resolved path
        match header.rsplit_once('/') {
            Some((_, file)) => file.to_string(),
            None => header.to_string(),
        }
    }

    fn system_header_rename(&self, group: &SourceFileGroup, header: &str) -> Option<(String, String)> {
        let (dir, _) = group.other_file.rsplit_once('/')?;
        let file = self.system_header_source(header);
        Some((format!("{}/{}.ifc", dir, file), group.other_file.clone()))
    }
}
