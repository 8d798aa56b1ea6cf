//! Clang module strategy.
//!
//! Dependencies come from the textual scan. Every interface is passed
//! explicitly with `-fmodule-file`, so nothing is written besides the
//! `.pcm` files themselves.

use super::ModuleStrategy;

#[derive(Debug, Default)]
pub struct ClangStrategy;

impl ModuleStrategy for ClangStrategy {
    fn name(&self) -> &'static str {
        "clang"
    }

    fn writes_build_dependencies(&self) -> bool {
        true
    }
}
