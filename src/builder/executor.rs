//! The command pool: runs a [`Target`] with bounded parallelism.
//!
//! `pre` runs first and must succeed, the `list` jobs run on a fixed-size
//! rayon pool, and `post` runs only when everything before it succeeded.
//! A failure stops new dispatch unless `keep_going` is set; commands
//! already running are allowed to finish.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

use crate::builder::plan::{Cmd, Job, Target};
use crate::builder::toolchain::EnvSnapshot;
use crate::util::diagnostic::PoolError;
use crate::util::fs::remove_file_if_exists;
use crate::util::process::ProcessBuilder;

/// How the pool runs commands.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Requested worker count; 0 means one per CPU
    pub max_jobs: usize,
    pub keep_going: bool,
    /// Print commands instead of running them
    pub dry_run: bool,
    /// Hide the progress bar
    pub quiet: bool,
    /// Print every command line before running it
    pub verbose: bool,
}

impl Default for PoolSettings {
    fn default() -> Self {
        PoolSettings {
            max_jobs: 0,
            keep_going: false,
            dry_run: false,
            quiet: false,
            verbose: false,
        }
    }
}

/// Worker count: `min(requested, available parallelism)`, at least one.
pub fn worker_count(requested: usize) -> usize {
    let available = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    if requested == 0 {
        available
    } else {
        requested.min(available).max(1)
    }
}

/// Executes build targets. One pool serves every target of a build.
pub struct CommandPool {
    pool: rayon::ThreadPool,
    settings: PoolSettings,
    env: EnvSnapshot,
    cwd: PathBuf,
    /// Commands currently executing
    in_flight: AtomicUsize,
    /// Most commands ever executing at once
    peak: AtomicUsize,
}

impl std::fmt::Debug for CommandPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandPool")
            .field("workers", &self.pool.current_num_threads())
            .field("settings", &self.settings)
            .field("cwd", &self.cwd)
            .finish()
    }
}

/// Outcome of one command.
enum CmdOutcome {
    Success,
    Failed,
}

impl CommandPool {
    /// Create the pool. Commands run in `cwd` with exactly the variables of
    /// `env`.
    pub fn new(settings: PoolSettings, env: EnvSnapshot, cwd: &Path) -> Result<Self> {
        let workers = worker_count(settings.max_jobs);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("anvil-worker-{}", i))
            .build()
            .context("failed to create the command pool")?;
        tracing::debug!("command pool with {} worker(s)", workers);
        Ok(CommandPool {
            pool,
            settings,
            env,
            cwd: cwd.to_path_buf(),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Highest number of commands that ran at the same time so far.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    fn progress_bar(&self, target: &Target) -> ProgressBar {
        if self.settings.quiet || self.settings.verbose {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(target.command_count() as u64);
        if let Ok(style) =
            ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }

    /// Run every job of a target.
    ///
    /// The error names each failed command by its label and carries its
    /// reference, so the caller can remove the outputs.
    pub fn run(&self, target: &Target) -> Result<(), PoolError> {
        if target.is_empty() {
            return Ok(());
        }
        if self.settings.dry_run {
            for cmd in target.commands() {
                println!("{}", cmd.display());
            }
            return Ok(());
        }

        tracing::debug!("running {} command(s) for {}", target.command_count(), target.name);
        let pb = self.progress_bar(target);
        let failed = Mutex::new(Vec::new());

        if let Some(pre) = &target.pre {
            if !self.run_job(pre, &pb, &failed, None) {
                pb.finish_and_clear();
                return Err(self.pool_error(failed));
            }
        }

        let stop = AtomicBool::new(false);
        self.pool.install(|| {
            target.list.par_iter().for_each(|job| {
                if stop.load(Ordering::SeqCst) && !self.settings.keep_going {
                    return;
                }
                if !self.run_job(job, &pb, &failed, Some(&stop)) {
                    stop.store(true, Ordering::SeqCst);
                }
            });
        });

        if stop.load(Ordering::SeqCst) {
            pb.finish_and_clear();
            return Err(self.pool_error(failed));
        }

        if let Some(post) = &target.post {
            if !self.run_job(post, &pb, &failed, None) {
                pb.finish_and_clear();
                return Err(self.pool_error(failed));
            }
        }
        pb.finish_and_clear();
        tracing::debug!("{}: at most {} command(s) in flight", target.name, self.peak_in_flight());
        Ok(())
    }

    fn pool_error(&self, failed: Mutex<Vec<(String, String)>>) -> PoolError {
        let (labels, failed) = failed.into_inner().unwrap_or_else(|e| e.into_inner()).into_iter().unzip();
        PoolError { labels, failed }
    }

    /// Run a job's commands in order. False when one failed.
    fn run_job(
        &self,
        job: &Job,
        pb: &ProgressBar,
        failed: &Mutex<Vec<(String, String)>>,
        stop: Option<&AtomicBool>,
    ) -> bool {
        for cmd in &job.commands {
            if let Some(stop) = stop {
                if stop.load(Ordering::SeqCst) && !self.settings.keep_going {
                    return false;
                }
            }
            pb.set_message(cmd.label.clone());
            let outcome = self.run_cmd(cmd, pb);
            pb.inc(1);
            if let CmdOutcome::Failed = outcome {
                let reference = if cmd.reference.is_empty() {
                    cmd.label.clone()
                } else {
                    cmd.reference.clone()
                };
                tracing::error!("failed: {}", cmd.label);
                failed
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push((cmd.label.clone(), reference));
                return false;
            }
        }
        true
    }

    fn run_cmd(&self, cmd: &Cmd, pb: &ProgressBar) -> CmdOutcome {
        if self.settings.verbose {
            pb.suspend(|| eprintln!("{}", cmd.display()));
        }
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        let result = ProcessBuilder::from_argv(&cmd.argv).and_then(|builder| {
            builder
                .clear_env()
                .envs(self.env.vars())
                .cwd(&self.cwd)
                .exec()
        });
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                pb.suspend(|| eprintln!("error: {:#}", e));
                self.discard_dependency(cmd);
                return CmdOutcome::Failed;
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stdout.trim().is_empty() || !stderr.trim().is_empty() {
            // One block per command so parallel output never interleaves
            pb.suspend(|| {
                if !stdout.trim().is_empty() {
                    eprint!("{}", stdout);
                }
                if !stderr.trim().is_empty() {
                    eprint!("{}", stderr);
                }
            });
        }

        if !output.status.success() {
            self.discard_dependency(cmd);
            return CmdOutcome::Failed;
        }

        if let (Some(from), Some(to)) = (&cmd.rename_from, &cmd.rename_to) {
            if let Err(e) = std::fs::rename(self.cwd.join(from), self.cwd.join(to)) {
                pb.suspend(|| eprintln!("error: failed to rename {} to {}: {}", from, to, e));
                return CmdOutcome::Failed;
            }
        }
        CmdOutcome::Success
    }

    fn discard_dependency(&self, cmd: &Cmd) {
        if let Some(dep) = &cmd.dependency {
            if let Err(e) = remove_file_if_exists(&self.cwd.join(dep)) {
                tracing::debug!("{:#}", e);
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sh(label: &str, script: &str) -> Cmd {
        Cmd::new(label, vec!["/bin/sh".into(), "-c".into(), script.into()]).reference(label)
    }

    fn pool(dir: &Path, settings: PoolSettings) -> CommandPool {
        let env = EnvSnapshot::from_vars([("PATH", "/usr/bin:/bin")]);
        CommandPool::new(
            PoolSettings {
                quiet: true,
                ..settings
            },
            env,
            dir,
        )
        .unwrap()
    }

    #[test]
    fn test_pre_list_post_order() {
        let tmp = TempDir::new().unwrap();
        let pool = pool(tmp.path(), PoolSettings::default());
        let mut target = Target::new("app");
        target.pre = Some(Job::single(sh("pre", "echo pre >> log")));
        target.list = (0..4)
            .map(|i| Job::single(sh(&format!("c{i}"), "test -f log && echo c >> log")))
            .collect();
        target.post = Some(Job::single(sh("post", "echo post >> log")));

        pool.run(&target).unwrap();
        let log = std::fs::read_to_string(tmp.path().join("log")).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "pre");
        assert_eq!(lines[5], "post");
    }

    #[test]
    fn test_failure_skips_post() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.d"), "a.o: a.c\n").unwrap();
        let pool = pool(tmp.path(), PoolSettings::default());
        let mut target = Target::new("app");
        target.list = vec![Job::single(sh("a.o", "exit 1").dependency("a.d"))];
        target.post = Some(Job::single(sh("link", "touch linked")));

        let err = pool.run(&target).unwrap_err();
        assert_eq!(err.failed, vec!["a.o".to_string()]);
        assert_eq!(err.labels, vec!["a.o".to_string()]);
        assert!(!tmp.path().join("linked").exists());
        assert!(!tmp.path().join("a.d").exists());
    }

    #[test]
    fn test_keep_going_runs_every_job() {
        let tmp = TempDir::new().unwrap();
        let pool = pool(
            tmp.path(),
            PoolSettings {
                max_jobs: 1,
                keep_going: true,
                ..Default::default()
            },
        );
        let mut target = Target::new("app");
        target.list = vec![
            Job::single(sh("bad1", "exit 1")),
            Job::single(sh("good", "touch good")),
            Job::single(sh("bad2", "exit 2")),
        ];
        let err = pool.run(&target).unwrap_err();
        let mut failed = err.failed.clone();
        failed.sort();
        assert_eq!(failed, vec!["bad1".to_string(), "bad2".to_string()]);
        assert!(tmp.path().join("good").exists());
    }

    #[test]
    fn test_failed_pre_stops_everything() {
        let tmp = TempDir::new().unwrap();
        let pool = pool(tmp.path(), PoolSettings::default());
        let mut target = Target::new("app");
        target.pre = Some(Job::single(sh("pch", "exit 1")));
        target.list = vec![Job::single(sh("a", "touch a"))];
        assert!(pool.run(&target).is_err());
        assert!(!tmp.path().join("a").exists());
    }

    #[test]
    fn test_rename_after_success() {
        let tmp = TempDir::new().unwrap();
        let pool = pool(tmp.path(), PoolSettings::default());
        let mut target = Target::new("app");
        target.list = vec![Job::single(sh("hu", "touch vector.ifc").rename("vector.ifc", "vector_1234.ifc"))];
        pool.run(&target).unwrap();
        assert!(tmp.path().join("vector_1234.ifc").exists());
        assert!(!tmp.path().join("vector.ifc").exists());
    }

    #[test]
    fn test_dry_run_spawns_nothing() {
        let tmp = TempDir::new().unwrap();
        let pool = pool(
            tmp.path(),
            PoolSettings {
                dry_run: true,
                ..Default::default()
            },
        );
        let mut target = Target::new("app");
        target.list = vec![Job::single(sh("a", "touch a"))];
        pool.run(&target).unwrap();
        assert!(!tmp.path().join("a").exists());
    }

    #[test]
    fn test_commands_see_only_the_snapshot() {
        let tmp = TempDir::new().unwrap();
        let env = EnvSnapshot::from_vars([("PATH", "/usr/bin:/bin"), ("ANVIL_PROBE", "1")]);
        let pool = CommandPool::new(
            PoolSettings {
                quiet: true,
                ..Default::default()
            },
            env,
            tmp.path(),
        )
        .unwrap();
        let mut target = Target::new("env");
        target.list = vec![Job::single(sh("env", "test \"$ANVIL_PROBE\" = 1 && touch ok"))];
        pool.run(&target).unwrap();
        assert!(tmp.path().join("ok").exists());
    }

    #[test]
    fn test_worker_count() {
        assert!(worker_count(0) >= 1);
        assert_eq!(worker_count(1), 1);
    }

    #[test]
    fn test_in_flight_commands_bounded_by_workers() {
        let tmp = TempDir::new().unwrap();
        let pool = pool(
            tmp.path(),
            PoolSettings {
                max_jobs: 2,
                ..Default::default()
            },
        );
        assert!(pool.workers() <= 2);

        let mut target = Target::new("app");
        target.list = (0..8)
            .map(|i| Job::single(sh(&format!("c{i}"), "sleep 0.2")))
            .collect();
        pool.run(&target).unwrap();

        assert!(pool.peak_in_flight() >= 1);
        assert!(
            pool.peak_in_flight() <= pool.workers(),
            "{} commands ran at once on {} worker(s)",
            pool.peak_in_flight(),
            pool.workers()
        );
    }

    #[test]
    fn test_failure_reported_by_label() {
        let tmp = TempDir::new().unwrap();
        let pool = pool(tmp.path(), PoolSettings::default());
        let mut target = Target::new("app");
        target.list = vec![Job::single(
            Cmd::new("src/main.cpp", vec!["/bin/sh".into(), "-c".into(), "exit 1".into()])
                .reference("build/Debug/obj.app/src/main.cpp.o"),
        )];

        let err = pool.run(&target).unwrap_err();
        assert_eq!(err.labels, vec!["src/main.cpp".to_string()]);
        assert_eq!(err.failed, vec!["build/Debug/obj.app/src/main.cpp.o".to_string()]);
        assert_eq!(err.to_string(), "1 command(s) failed: src/main.cpp");
    }
}
