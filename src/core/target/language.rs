//! Source languages and language standards.
//!
//! Standards are kept as the strings written in the manifest (`c++20`,
//! `gnu17`, `iso9899:2011`) and only validated and translated when a
//! compiler builds its command line.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Primary language of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Language {
    #[serde(rename = "c")]
    C,
    /// C++ (default)
    #[default]
    #[serde(rename = "c++", alias = "cpp", alias = "cxx")]
    Cpp,
    #[serde(rename = "objective-c", alias = "objc")]
    ObjectiveC,
    #[serde(rename = "objective-c++", alias = "objcpp")]
    ObjectiveCpp,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Cpp => "c++",
            Language::ObjectiveC => "objective-c",
            Language::ObjectiveCpp => "objective-c++",
        }
    }

    /// Whether sources of this language are compiled as C++.
    pub fn is_cpp(&self) -> bool {
        matches!(self, Language::Cpp | Language::ObjectiveCpp)
    }

    pub fn is_objective(&self) -> bool {
        matches!(self, Language::ObjectiveC | Language::ObjectiveCpp)
    }
}

static STANDARD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(((c|gnu)\+\+|gnu|c|iso9899:)(\d[\dzaxybc]{1,3}|199409))$").expect("valid regex")
});

/// Check a standard string against the spellings GNU-style drivers accept.
pub fn is_valid_standard(standard: &str) -> bool {
    STANDARD_PATTERN.is_match(&standard.to_ascii_lowercase())
}

/// A language standard split into dialect prefix and year.
///
/// `gnu++20` splits into `("gnu++", "20")`, `c17` into `("c", "17")`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageStandard {
    pub prefix: String,
    pub year: String,
}

impl LanguageStandard {
    /// Parse a standard string, returning `None` when it is not valid.
    pub fn parse(standard: &str) -> Option<Self> {
        let lower = standard.to_ascii_lowercase();
        let caps = STANDARD_PATTERN.captures(&lower)?;
        Some(LanguageStandard {
            prefix: caps.get(2)?.as_str().to_string(),
            year: caps.get(4)?.as_str().to_string(),
        })
    }

    pub fn is_cpp(&self) -> bool {
        self.prefix.ends_with("++")
    }

    pub fn is_gnu(&self) -> bool {
        self.prefix.starts_with("gnu")
    }

    /// Numeric C++ year, resolving the draft spellings (`2a` -> 20).
    pub fn cpp_year(&self) -> Option<u32> {
        let year = match self.year.as_str() {
            "98" | "03" => 3,
            "0x" | "11" => 11,
            "1y" | "14" => 14,
            "1z" | "17" => 17,
            "2a" | "20" => 20,
            "2b" | "23" => 23,
            "2c" | "26" => 26,
            _ => return None,
        };
        Some(year)
    }
}

impl std::fmt::Display for LanguageStandard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.prefix, self.year)
    }
}
