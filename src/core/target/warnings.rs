//! Warning presets.
//!
//! Presets are cumulative: each level includes everything below it.

use serde::{Deserialize, Serialize};

const MINIMAL: &[&str] = &["all"];
const EXTRA: &[&str] = &["extra"];
const PEDANTIC: &[&str] = &["pedantic"];
const STRICT: &[&str] = &[
    "unused",
    "cast-align",
    "double-promotion",
    "format=2",
    "missing-declarations",
    "missing-include-dirs",
    "non-virtual-dtor",
    "redundant-decls",
];
const STRICT_PEDANTIC: &[&str] = &["unreachable-code", "shadow"];
const VERY_STRICT: &[&str] = &[
    "noexcept",
    "undef",
    "conversion",
    "cast-qual",
    "float-equal",
    "inline",
    "old-style-cast",
    "strict-null-sentinel",
    "overloaded-virtual",
    "sign-conversion",
    "sign-promo",
];

/// Warnings that only GCC understands.
pub const GCC_ONLY_WARNINGS: &[&str] = &["noexcept", "strict-null-sentinel"];

/// Named warning preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum WarningsPreset {
    #[default]
    None,
    Minimal,
    Extra,
    Pedantic,
    Strict,
    StrictPedantic,
    VeryStrict,
}

impl WarningsPreset {
    /// Expanded warning names (without the `-W` prefix).
    pub fn flags(&self) -> Vec<&'static str> {
        let tiers: &[&[&str]] = match self {
            WarningsPreset::None => &[],
            WarningsPreset::Minimal => &[MINIMAL],
            WarningsPreset::Extra => &[MINIMAL, EXTRA],
            WarningsPreset::Pedantic => &[MINIMAL, EXTRA, PEDANTIC],
            WarningsPreset::Strict => &[MINIMAL, EXTRA, PEDANTIC, STRICT],
            WarningsPreset::StrictPedantic => {
                &[MINIMAL, EXTRA, PEDANTIC, STRICT, STRICT_PEDANTIC]
            }
            WarningsPreset::VeryStrict => {
                &[MINIMAL, EXTRA, PEDANTIC, STRICT, STRICT_PEDANTIC, VERY_STRICT]
            }
        };
        tiers.iter().flat_map(|tier| tier.iter().copied()).collect()
    }
}

/// MSVC `/W` level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MsvcWarningLevel {
    None,
    Level1,
    Level2,
    Level3,
    Level4,
}

impl MsvcWarningLevel {
    /// The `/W` flag body (`W4`), or `None` when no level applies.
    pub fn flag(&self) -> Option<&'static str> {
        match self {
            MsvcWarningLevel::None => None,
            MsvcWarningLevel::Level1 => Some("W1"),
            MsvcWarningLevel::Level2 => Some("W2"),
            MsvcWarningLevel::Level3 => Some("W3"),
            MsvcWarningLevel::Level4 => Some("W4"),
        }
    }

    /// Classify a preset, or a custom warning list by its strictest member.
    pub fn classify(preset: WarningsPreset, custom: &[String]) -> Self {
        if custom.is_empty() {
            return match preset {
                WarningsPreset::None => MsvcWarningLevel::None,
                WarningsPreset::Minimal => MsvcWarningLevel::Level1,
                WarningsPreset::Extra => MsvcWarningLevel::Level2,
                WarningsPreset::Pedantic => MsvcWarningLevel::Level3,
                _ => MsvcWarningLevel::Level4,
            };
        }

        let has = |list: &[&str]| custom.iter().any(|w| list.contains(&w.as_str()));
        if has(VERY_STRICT) || has(STRICT) || has(STRICT_PEDANTIC) {
            MsvcWarningLevel::Level4
        } else if has(PEDANTIC) {
            MsvcWarningLevel::Level3
        } else if has(EXTRA) {
            MsvcWarningLevel::Level2
        } else if has(MINIMAL) {
            MsvcWarningLevel::Level1
        } else {
            MsvcWarningLevel::None
        }
    }
}
