//! User-facing diagnostic messages.
//!
//! Configuration problems (unknown toolchain, architecture mismatch, a bad
//! manifest) are reported with the root cause, the values involved and a
//! suggested fix. Build errors from compilers are printed verbatim by the
//! command pool and do not go through here.

use std::fmt;
use std::path::PathBuf;

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

use crate::core::workspace::ManifestError;

/// Common suggestion messages for consistent error handling.
pub mod suggestions {
    /// No manifest in the working directory.
    pub const NO_MANIFEST: &str = "Create an `Anvil.toml` or pass `-C <dir>`";
}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
        }
    }
}

/// A diagnostic message with optional suggestions.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Primary message
    pub message: String,
    /// Severity level
    pub severity: Severity,
    /// Additional context lines
    pub context: Vec<String>,
    /// Suggested fixes
    pub suggestions: Vec<String>,
    /// Related file
    pub location: Option<PathBuf>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            severity: Severity::Error,
            context: Vec::new(),
            suggestions: Vec::new(),
            location: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            ..Diagnostic::error(message)
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.location = Some(path.into());
        self
    }

    /// Report an error chain.
    ///
    /// The message is the whole chain. The help line comes from the first
    /// error in the chain that carries one.
    pub fn from_error(err: &anyhow::Error) -> Self {
        let diag = Diagnostic::error(format!("{:#}", err));
        for cause in err.chain() {
            let help = if let Some(e) = cause.downcast_ref::<ToolchainError>() {
                e.help().map(|h| h.to_string())
            } else if let Some(e) = cause.downcast_ref::<ModuleDependencyError>() {
                e.help().map(|h| h.to_string())
            } else if let Some(e) = cause.downcast_ref::<PoolError>() {
                e.help().map(|h| h.to_string())
            } else if cause.downcast_ref::<ManifestError>().is_some() {
                Some(suggestions::NO_MANIFEST.to_string())
            } else {
                None
            };
            if let Some(help) = help {
                return diag.with_suggestion(help);
            }
        }
        diag
    }

    /// Format the diagnostic for terminal output.
    pub fn format(&self, color: bool) -> String {
        let mut output = String::new();

        let severity_str = if color {
            match self.severity {
                Severity::Error => "\x1b[1;31merror\x1b[0m",
                Severity::Warning => "\x1b[1;33mwarning\x1b[0m",
                Severity::Note => "\x1b[1;36mnote\x1b[0m",
            }
        } else {
            match self.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
                Severity::Note => "note",
            }
        };

        output.push_str(&format!("{}: {}\n", severity_str, self.message));

        if let Some(ref path) = self.location {
            output.push_str(&format!("  --> {}\n", path.display()));
        }

        for ctx in &self.context {
            output.push_str(&format!("  -> {}\n", ctx));
        }

        if !self.suggestions.is_empty() {
            let help_prefix = if color {
                "\x1b[1;32mhelp\x1b[0m"
            } else {
                "help"
            };
            for suggestion in &self.suggestions {
                output.push_str(&format!("{}: {}\n", help_prefix, suggestion));
            }
        }

        output
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format(false))
    }
}

/// Print a diagnostic to stderr.
pub fn emit(diagnostic: &Diagnostic, color: bool) {
    eprint!("{}", diagnostic.format(color));
}

/// Toolchain configuration errors. All of them abort a build before any
/// compilation starts.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum ToolchainError {
    #[error("could not identify the toolchain of `{path}`")]
    #[diagnostic(
        code(anvil::toolchain::unknown),
        help("Pass `--toolchain <compiler>` or set `cxx` in `.anvil/toolchain.toml`")
    )]
    Unknown { path: String },

    #[error("`{path}` is not inside a recognized toolchain layout")]
    #[diagnostic(
        code(anvil::toolchain::path_structure),
        help("The compiler's folder must end in one of: {expected}")
    )]
    PathStructure { path: String, expected: String },

    #[error("Expected '{detected}' or '{requested}'. Please use a different toolchain or create a new one for this architecture.")]
    #[diagnostic(
        code(anvil::toolchain::arch_mismatch),
        help("Select a cross compiler for the requested architecture, or drop `--arch`")
    )]
    ArchMismatch { detected: String, requested: String },

    #[error("architecture `{arch}` is not supported by the {toolchain} toolchain")]
    #[diagnostic(code(anvil::toolchain::unsupported_arch))]
    UnsupportedArch { arch: String, toolchain: String },

    #[error("failed to verify toolchain `{path}`: {reason}")]
    #[diagnostic(
        code(anvil::toolchain::probe),
        help("Run `anvil detect --verbose` to see the probe commands")
    )]
    Probe { path: String, reason: String },

    #[error("Found '{executable}' in a toolchain other than {expected}")]
    #[diagnostic(code(anvil::toolchain::wrong_family))]
    WrongFamily { executable: String, expected: String },

    #[error("C++ modules are not supported by this toolchain.")]
    #[diagnostic(
        code(anvil::toolchain::modules_unsupported),
        help("Modules need MSVC 19.28, GCC 11, Clang 16, Apple Clang 16 or Intel oneAPI 2023.1")
    )]
    ModulesUnsupported { toolchain: String },

    #[error("Unimplemented module strategy for toolchain '{toolchain}'")]
    #[diagnostic(code(anvil::toolchain::module_strategy))]
    ModuleStrategy { toolchain: String },
}

/// Errors planning a C++ modules build.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum ModuleDependencyError {
    #[error("{path}: unsupported module dependency version '{found}' (expected '{expected}')")]
    #[diagnostic(code(anvil::modules::version))]
    VersionMismatch {
        path: String,
        found: String,
        expected: String,
    },

    #[error("{path}: missing required key '{key}'")]
    #[diagnostic(code(anvil::modules::missing_key))]
    MissingKey { path: String, key: String },

    #[error("{path}: malformed module dependency file: {reason}")]
    #[diagnostic(code(anvil::modules::malformed))]
    Malformed { path: String, reason: String },

    #[error("module '{module}' is provided by both '{first}' and '{second}'")]
    #[diagnostic(
        code(anvil::modules::duplicate),
        help("Each named module may only be declared by one interface unit")
    )]
    DuplicateModule {
        module: String,
        first: String,
        second: String,
    },

    #[error("'{first}' and '{second}' are both root translation units")]
    #[diagnostic(
        code(anvil::modules::duplicate_root),
        help("Only one source of a module target may be without a module declaration")
    )]
    DuplicateRoot { first: String, second: String },

    #[error("Cyclical module dependency: {chain}")]
    #[diagnostic(code(anvil::modules::cycle))]
    Cycle { chain: String },

    #[error("{source_file}: imported module '{module}' is not provided by any source")]
    #[diagnostic(code(anvil::modules::not_found))]
    ModuleNotFound { source_file: String, module: String },

    #[error("'import {module}' requires cppStandard=c++23 (found '{standard}')")]
    #[diagnostic(code(anvil::modules::std_requires_cpp23))]
    StdRequiresCpp23 { module: String, standard: String },
}

/// Failure of one or more commands run by the command pool.
#[derive(Debug, Error, MietteDiagnostic)]
#[error("{} command(s) failed: {}", .labels.len(), .labels.join(", "))]
#[diagnostic(
    code(anvil::build::failed),
    help("Run `anvil build --verbose` for more details")
)]
pub struct PoolError {
    /// Output labels of the failed commands
    pub labels: Vec<String>,
    /// What the failed commands were producing, to be removed
    pub failed: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_formatting() {
        let diag = Diagnostic::error("architecture mismatch")
            .with_context("compiler targets x86_64-linux-gnu")
            .with_context("requested arm64")
            .with_suggestion("Select a cross compiler for the requested architecture")
            .with_location("Anvil.toml");

        let output = diag.format(false);
        assert!(output.starts_with("error: architecture mismatch\n"));
        assert!(output.contains("  --> Anvil.toml"));
        assert!(output.contains("  -> requested arm64"));
        assert!(output.contains("help: Select a cross compiler"));
    }

    #[test]
    fn test_toolchain_error_messages() {
        let err = ToolchainError::ArchMismatch {
            detected: "x86_64-linux-gnu".into(),
            requested: "arm64".into(),
        };
        assert!(err.to_string().starts_with("Expected 'x86_64-linux-gnu' or 'arm64'."));
        assert_eq!(
            err.code().map(|c| c.to_string()),
            Some("anvil::toolchain::arch_mismatch".to_string())
        );
    }

    #[test]
    fn test_pool_error_lists_labels() {
        let err = PoolError {
            labels: vec!["src/a.cpp".into(), "src/b.cpp".into()],
            failed: vec!["build/a.o".into(), "build/b.o".into()],
        };
        assert_eq!(err.to_string(), "2 command(s) failed: src/a.cpp, src/b.cpp");
    }

    #[test]
    fn test_from_error_takes_help_from_chain() {
        let err = anyhow::Error::new(ToolchainError::Unknown {
            path: "/opt/cc".into(),
        })
        .context("failed to detect the toolchain");
        let output = Diagnostic::from_error(&err).format(false);
        assert!(output.starts_with(
            "error: failed to detect the toolchain: could not identify the toolchain of `/opt/cc`\n"
        ));
        assert!(output.contains("help: Pass `--toolchain <compiler>`"));

        let plain = anyhow::anyhow!("something else");
        assert_eq!(Diagnostic::from_error(&plain).format(false), "error: something else\n");
    }

    #[test]
    fn test_warning_keeps_message() {
        let diag = Diagnostic::warning("cache unreadable");
        assert_eq!(diag.severity, Severity::Warning);
        assert_eq!(diag.to_string(), "warning: cache unreadable\n");
    }
}
