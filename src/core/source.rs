//! Translatable inputs of a target.

use std::path::Path;

/// What kind of translation an input file needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceType {
    C,
    Cpp,
    ObjectiveC,
    ObjectiveCpp,
    CxxPrecompiledHeader,
    WindowsResource,
    Unknown,
}

const CPP_EXTENSIONS: &[&str] = &["cpp", "cc", "cxx", "c++", "cp", "cppm", "ixx", "mpp", "C"];
const RESOURCE_EXTENSIONS: &[&str] = &["rc", "RC"];

impl SourceType {
    /// Classify a file by extension. Headers and unknown files are `Unknown`.
    pub fn from_path(path: &str) -> Self {
        let Some(ext) = Path::new(path).extension().and_then(|e| e.to_str()) else {
            return SourceType::Unknown;
        };

        if ext == "c" {
            SourceType::C
        } else if RESOURCE_EXTENSIONS.contains(&ext) {
            SourceType::WindowsResource
        } else if ext == "m" {
            SourceType::ObjectiveC
        } else if ext == "mm" || ext == "M" {
            SourceType::ObjectiveCpp
        } else if CPP_EXTENSIONS.contains(&ext) {
            SourceType::Cpp
        } else {
            SourceType::Unknown
        }
    }

    /// Short name used in cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::C => "c",
            SourceType::Cpp => "cxx",
            SourceType::ObjectiveC => "objc",
            SourceType::ObjectiveCpp => "objcxx",
            SourceType::CxxPrecompiledHeader => "pch",
            SourceType::WindowsResource => "rc",
            SourceType::Unknown => "unknown",
        }
    }

    /// Compiled by the C/C++ compiler (not the resource compiler).
    pub fn is_compiled(&self) -> bool {
        matches!(
            self,
            SourceType::C | SourceType::Cpp | SourceType::ObjectiveC | SourceType::ObjectiveCpp
        )
    }

    pub fn is_cpp(&self) -> bool {
        matches!(
            self,
            SourceType::Cpp | SourceType::ObjectiveCpp | SourceType::CxxPrecompiledHeader
        )
    }
}

/// Role of a file in a C++ modules build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SourceDataType {
    #[default]
    Normal,
    SystemModule,
    SystemHeaderUnit,
    UserHeaderUnit,
}

/// One translatable input and the files it produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFileGroup {
    pub source_file: String,
    pub object_file: String,
    pub dependency_file: String,
    /// Interface output for modules, the stub source for MSVC PCHs
    pub other_file: String,
    pub kind: SourceType,
    pub data_type: SourceDataType,
}

/// Every output of a target's sources.
#[derive(Debug, Clone, Default)]
pub struct SourceOutputs {
    pub groups: Vec<SourceFileGroup>,
    /// Objects passed to the linker or archiver
    pub objects: Vec<String>,
    /// Directories that must exist before compiling
    pub directories: Vec<String>,
    /// The target's output file
    pub target: String,
}

impl SourceOutputs {
    /// The precompiled header group, if the target has one.
    pub fn pch(&self) -> Option<&SourceFileGroup> {
        self.groups
            .iter()
            .find(|g| g.kind == SourceType::CxxPrecompiledHeader)
    }

    /// Distinct source types present, in a stable order.
    pub fn source_types(&self) -> Vec<SourceType> {
        let mut types: Vec<SourceType> = self.groups.iter().map(|g| g.kind).collect();
        types.sort();
        types.dedup();
        types
    }
}
