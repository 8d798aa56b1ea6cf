//! Module dependency files (`"Version": "1.1"`).
//!
//! MSVC writes these with `/sourceDependencies`. The textual scanner used
//! for GCC and Clang writes the same shape so every strategy reads one
//! format back:
//!
//! ```json
//! {
//!   "Version": "1.1",
//!   "Data": {
//!     "Source": "src/main.cpp",
//!     "ProvidedModule": "",
//!     "ImportedModules": ["app.core"],
//!     "ImportedHeaderUnits": ["<vector>"],
//!     "Includes": []
//!   }
//! }
//! ```

use std::path::Path;

use anyhow::Result;
use serde_json::{json, Map, Value};

use crate::util::diagnostic::ModuleDependencyError;
use crate::util::fs::write_string;

/// The only dependency format version understood.
pub const DEPENDENCY_VERSION: &str = "1.1";

/// What one translation unit provides and imports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleDependencies {
    pub source: String,
    /// Empty for translation units that declare no module
    pub provided_module: String,
    pub imported_modules: Vec<String>,
    /// Header paths with `/` separators; system headers as `<name>`
    pub imported_header_units: Vec<String>,
    pub includes: Vec<String>,
    /// Module named by a `module X;` declaration, empty otherwise
    pub implemented_module: String,
}

impl ModuleDependencies {
    pub fn new(source: impl Into<String>) -> Self {
        ModuleDependencies {
            source: source.into(),
            ..Default::default()
        }
    }

    pub fn provides_module(&self) -> bool {
        !self.provided_module.is_empty()
    }

    /// An empty ProvidedModule that is not an implementation unit claims
    /// the program's root translation unit.
    pub fn claims_root(&self) -> bool {
        !self.provides_module() && self.implemented_module.is_empty()
    }

    pub fn to_json(&self) -> Value {
        let mut value = json!({
            "Version": DEPENDENCY_VERSION,
            "Data": {
                "Source": self.source,
                "ProvidedModule": self.provided_module,
                "ImportedModules": self.imported_modules,
                "ImportedHeaderUnits": self.imported_header_units,
                "Includes": self.includes,
            }
        });
        if !self.implemented_module.is_empty() {
            value["Data"]["ImplementedModule"] = json!(self.implemented_module);
        }
        value
    }

    /// Write the dependency file, pretty-printed.
    pub fn write(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(&self.to_json())?;
        write_string(path, &text)
    }
}

/// Read and validate a dependency file. `display` names the file in errors.
pub fn read_module_dependencies(path: &Path, display: &str) -> Result<ModuleDependencies, ModuleDependencyError> {
    let content = std::fs::read_to_string(path).map_err(|e| ModuleDependencyError::Malformed {
        path: display.to_string(),
        reason: e.to_string(),
    })?;
    parse_module_dependencies(&content, display)
}

/// Validate and parse dependency JSON.
pub fn parse_module_dependencies(content: &str, display: &str) -> Result<ModuleDependencies, ModuleDependencyError> {
    let root: Value = serde_json::from_str(content).map_err(|e| ModuleDependencyError::Malformed {
        path: display.to_string(),
        reason: e.to_string(),
    })?;
    let missing = |key: &str| ModuleDependencyError::MissingKey {
        path: display.to_string(),
        key: key.to_string(),
    };

    let version = root.get("Version").and_then(Value::as_str).ok_or_else(|| missing("Version"))?;
    if version != DEPENDENCY_VERSION {
        return Err(ModuleDependencyError::VersionMismatch {
            path: display.to_string(),
            found: version.to_string(),
            expected: DEPENDENCY_VERSION.to_string(),
        });
    }

    let data = root.get("Data").and_then(Value::as_object).ok_or_else(|| missing("Data"))?;
    let source = data.get("Source").and_then(Value::as_str).ok_or_else(|| missing("Data.Source"))?;
    let provided = data
        .get("ProvidedModule")
        .and_then(Value::as_str)
        .ok_or_else(|| missing("Data.ProvidedModule"))?;
    if !data.get("ImportedHeaderUnits").is_some_and(Value::is_array) {
        return Err(missing("Data.ImportedHeaderUnits"));
    }

    Ok(ModuleDependencies {
        source: source.replace('\\', "/"),
        provided_module: provided.to_string(),
        imported_modules: string_list(data, "ImportedModules", display)?,
        imported_header_units: string_list(data, "ImportedHeaderUnits", display)?
            .into_iter()
            .map(|h| h.replace('\\', "/"))
            .collect(),
        includes: string_list(data, "Includes", display)?
            .into_iter()
            .map(|h| h.replace('\\', "/"))
            .collect(),
        implemented_module: data
            .get("ImplementedModule")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

/// An optional array of strings, without duplicates.
fn string_list(data: &Map<String, Value>, key: &str, display: &str) -> Result<Vec<String>, ModuleDependencyError> {
    let Some(value) = data.get(key) else {
        return Ok(Vec::new());
    };
    let malformed = || ModuleDependencyError::Malformed {
        path: display.to_string(),
        reason: format!("unexpected structure for '{}'", key),
    };
    let items = value.as_array().ok_or_else(malformed)?;

    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let item = item.as_str().ok_or_else(malformed)?;
        if !out.iter().any(|o| o == item) {
            out.push(item.to_string());
        }
    }
    Ok(out)
}
