//! Build plan primitives consumed by the command pool.
//!
//! A [`Cmd`] is one subprocess, a [`Job`] is a sequence of commands that
//! run one after another, and a [`Target`] groups jobs with barrier
//! semantics:
//!
//! ```text
//! pre ──▶ list[0] list[1] ... list[n] (in parallel) ──▶ post
//! ```

use crate::builder::toolchain::CommandSpec;

/// One subprocess invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cmd {
    /// Short text shown while the command runs
    pub label: String,
    pub argv: Vec<String>,
    /// Path reported when the command fails (usually the output file)
    pub reference: String,
    /// Dependency file written by the command; removed on failure
    pub dependency: Option<String>,
    /// Rename `rename_from` to `rename_to` after success
    pub rename_from: Option<String>,
    pub rename_to: Option<String>,
}

impl Cmd {
    pub fn new(label: impl Into<String>, argv: Vec<String>) -> Self {
        Cmd {
            label: label.into(),
            argv,
            ..Default::default()
        }
    }

    /// A command from a generated spec. `None` when the spec is empty.
    pub fn from_spec(label: impl Into<String>, spec: &CommandSpec) -> Option<Self> {
        if spec.is_empty() {
            return None;
        }
        Some(Cmd::new(label, spec.to_argv()))
    }

    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = reference.into();
        self
    }

    pub fn dependency(mut self, dependency: impl Into<String>) -> Self {
        let dependency = dependency.into();
        if !dependency.is_empty() {
            self.dependency = Some(dependency);
        }
        self
    }

    pub fn rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.rename_from = Some(from.into());
        self.rename_to = Some(to.into());
        self
    }

    /// Command line as one string, for `--dry-run` and logs.
    pub fn display(&self) -> String {
        self.argv.join(" ")
    }
}

/// Commands that must run in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Job {
    pub commands: Vec<Cmd>,
}

impl Job {
    pub fn new(commands: Vec<Cmd>) -> Self {
        Job { commands }
    }

    pub fn single(cmd: Cmd) -> Self {
        Job {
            commands: vec![cmd],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Jobs of one pool run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub pre: Option<Job>,
    pub list: Vec<Job>,
    pub post: Option<Job>,
}

impl Target {
    pub fn new(name: impl Into<String>) -> Self {
        Target {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Nothing to run.
    pub fn is_empty(&self) -> bool {
        self.pre.as_ref().map_or(true, Job::is_empty)
            && self.list.iter().all(Job::is_empty)
            && self.post.as_ref().map_or(true, Job::is_empty)
    }

    /// Number of commands across all jobs.
    pub fn command_count(&self) -> usize {
        let count = |job: &Job| job.commands.len();
        self.pre.as_ref().map_or(0, count)
            + self.list.iter().map(count).sum::<usize>()
            + self.post.as_ref().map_or(0, count)
    }

    /// Every command in execution order, `pre` first and `post` last.
    pub fn commands(&self) -> impl Iterator<Item = &Cmd> {
        self.pre
            .iter()
            .chain(self.list.iter())
            .chain(self.post.iter())
            .flat_map(|job| job.commands.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(label: &str) -> Cmd {
        Cmd::new(label, vec!["cc".into(), label.into()])
    }

    #[test]
    fn test_target_counts() {
        let mut target = Target::new("app");
        assert!(target.is_empty());

        target.pre = Some(Job::single(cmd("pch")));
        target.list = vec![Job::single(cmd("a.c")), Job::new(vec![cmd("b.c"), cmd("c.c")])];
        target.post = Some(Job::single(cmd("link")));
        assert!(!target.is_empty());
        assert_eq!(target.command_count(), 5);

        let labels: Vec<&str> = target.commands().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["pch", "a.c", "b.c", "c.c", "link"]);
    }

    #[test]
    fn test_cmd_from_spec() {
        assert!(Cmd::from_spec("x", &CommandSpec::empty()).is_none());
        let spec = CommandSpec::new("gcc").arg("-c").arg("a.c");
        let cmd = Cmd::from_spec("a.c", &spec)
            .unwrap()
            .reference("a.o")
            .dependency("")
            .rename("out/", "out/a.ifc");
        assert_eq!(cmd.display(), "gcc -c a.c");
        assert_eq!(cmd.reference, "a.o");
        assert!(cmd.dependency.is_none());
        assert_eq!(cmd.rename_to.as_deref(), Some("out/a.ifc"));
    }
}
