//! Static library archivers.

use super::{tool_basename, CommandContext, CommandSpec};

/// Generates the command that bundles objects into a static library.
pub trait Archiver: Send + Sync {
    fn name(&self) -> &'static str;

    fn archive(&self, ctx: &CommandContext<'_>, output: &str, objects: &[String]) -> CommandSpec;
}

/// `ar`, `llvm-ar`, `emar`, `xiar`.
#[derive(Debug, Clone, Copy)]
pub struct GnuArchiver;

impl Archiver for GnuArchiver {
    fn name(&self) -> &'static str {
        "ar"
    }

    fn archive(&self, ctx: &CommandContext<'_>, output: &str, objects: &[String]) -> CommandSpec {
        if ctx.tools.ar.is_empty() {
            return CommandSpec::empty();
        }
        CommandSpec::new(&ctx.tools.ar)
            .args(["-c", "-r", "-s"])
            .arg(ctx.quoted(output))
            .args(objects.iter().map(|o| ctx.quoted(o)))
    }
}

/// Apple `libtool`.
#[derive(Debug, Clone, Copy)]
pub struct LibtoolArchiver;

impl Archiver for LibtoolArchiver {
    fn name(&self) -> &'static str {
        "libtool"
    }

    fn archive(&self, ctx: &CommandContext<'_>, output: &str, objects: &[String]) -> CommandSpec {
        if ctx.tools.ar.is_empty() {
            return CommandSpec::empty();
        }
        CommandSpec::new(&ctx.tools.ar)
            .args(["-static", "-no_warning_for_no_symbols", "-o"])
            .arg(ctx.quoted(output))
            .args(objects.iter().map(|o| ctx.quoted(o)))
    }
}

/// `lib.exe` and `xilib.exe`.
#[derive(Debug, Clone, Copy)]
pub struct LibArchiver;

/// `/machine:` value for a Visual Studio architecture.
pub fn msvc_machine(vs_arch: &str) -> String {
    vs_arch.to_ascii_uppercase()
}

impl Archiver for LibArchiver {
    fn name(&self) -> &'static str {
        "lib"
    }

    fn archive(&self, ctx: &CommandContext<'_>, output: &str, objects: &[String]) -> CommandSpec {
        if ctx.tools.ar.is_empty() {
            return CommandSpec::empty();
        }
        let mut cmd = CommandSpec::new(&ctx.tools.ar)
            .arg("/nologo")
            .arg(format!("/machine:{}", msvc_machine(ctx.toolchain.arch.vs_arch())));
        if ctx.configuration.interprocedural_optimization {
            cmd = cmd.arg("/LTCG");
        }
        if ctx.target.treat_warnings_as_errors {
            cmd = cmd.arg("/WX");
        }
        cmd.arg(format!("/out:{}", ctx.quoted(output)))
            .args(objects.iter().map(|o| ctx.quoted(o)))
    }
}

/// Pick the archiver by the archive tool's name.
pub fn select_archiver(ar: &str) -> Box<dyn Archiver> {
    let name = tool_basename(ar);
    if name == "lib" || name == "xilib" {
        Box::new(LibArchiver)
    } else if name == "libtool" {
        Box::new(LibtoolArchiver)
    } else {
        Box::new(GnuArchiver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::toolchain::tests::Fixture;

    fn objects() -> Vec<String> {
        vec!["build/Debug/obj.core/a.o".into(), "build/Debug/obj.core/b.o".into()]
    }

    #[test]
    fn test_gnu_archive() {
        let fixture = Fixture::gcc();
        let archiver = select_archiver(&fixture.tools.ar);
        assert_eq!(archiver.name(), "ar");
        let argv = archiver
            .archive(&fixture.context(), "build/Debug/libcore.a", &objects())
            .to_argv();
        assert_eq!(
            argv,
            vec![
                "/usr/bin/ar",
                "-c",
                "-r",
                "-s",
                "build/Debug/libcore.a",
                "build/Debug/obj.core/a.o",
                "build/Debug/obj.core/b.o",
            ]
        );
    }

    #[test]
    fn test_libtool_and_lib() {
        let mut fixture = Fixture::gcc();
        fixture.tools.ar = "/usr/bin/libtool".into();
        let argv = select_archiver(&fixture.tools.ar)
            .archive(&fixture.context(), "libcore.a", &objects())
            .to_argv();
        assert_eq!(&argv[1..5], &["-static", "-no_warning_for_no_symbols", "-o", "libcore.a"]);

        fixture.tools.ar = "C:/VS/bin/lib.exe".into();
        fixture.configuration.interprocedural_optimization = true;
        fixture.target.treat_warnings_as_errors = true;
        let args = select_archiver(&fixture.tools.ar)
            .archive(&fixture.context(), "core.lib", &objects())
            .args;
        assert_eq!(&args[..5], &["/nologo", "/machine:X64", "/LTCG", "/WX", "/out:core.lib"]);
    }

    #[test]
    fn test_missing_archiver() {
        let mut fixture = Fixture::gcc();
        fixture.tools.ar.clear();
        assert!(GnuArchiver.archive(&fixture.context(), "libcore.a", &objects()).is_empty());
    }
}
