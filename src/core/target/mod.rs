//! Target definitions - what gets built.
//!
//! A target is one compiled artifact: an executable, a static library or a
//! shared library, plus the language and warning settings used to build it.

mod core;
mod language;
mod warnings;
mod windows;

pub use self::core::{SourceTarget, TargetKind};
pub use self::language::{is_valid_standard, Language, LanguageStandard};
pub use self::warnings::{MsvcWarningLevel, WarningsPreset, GCC_ONLY_WARNINGS};
pub use self::windows::{WindowsEntryPoint, WindowsSubSystem, WIN32_CORE_LIBRARIES};
