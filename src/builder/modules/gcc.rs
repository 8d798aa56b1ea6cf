//! GCC module strategy.
//!
//! GCC resolves module names through a mapper file of `name path` lines.
//! User header units are keyed by their `./` relative path; system header
//! units are left to GCC's default `gcm.cache` naming.

use std::path::Path;

use anyhow::Result;

use super::ModuleStrategy;
use crate::util::fs::write_string;

/// Contents of a module mapper file.
pub fn mapper_contents(modules: &[(String, String)], header_units: &[(String, String)]) -> String {
    let mut out = String::new();
    for (header, interface) in header_units {
        out.push_str(&format!("./{} {}\n", header.trim_start_matches("./"), interface));
    }
    for (name, interface) in modules {
        out.push_str(&format!("{} {}\n", name, interface));
    }
    out
}

#[derive(Debug, Default)]
pub struct GccStrategy;

impl ModuleStrategy for GccStrategy {
    fn name(&self) -> &'static str {
        "gcc"
    }

    fn writes_build_dependencies(&self) -> bool {
        true
    }

    fn system_header_interface(&self, _modules_dir: &str, _stem: &str, _interface_ext: &str) -> String {
        String::new()
    }

    fn uses_mapper(&self) -> bool {
        true
    }

    fn write_mapper(&self, path: &Path, modules: &[(String, String)], header_units: &[(String, String)]) -> Result<()> {
        write_string(path, &mapper_contents(modules, header_units))
    }
}
