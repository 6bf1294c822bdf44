//! git plumbing for the preview repository in the target directory.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use tracing::info;

use crate::process::{CommandRunner, CommandSpec, RunOutcome};

/// Pathspec for the generated pages. git expands the glob itself.
pub const HTML_PATHSPEC: &str = "*.html";

pub struct Git<'r, R> {
    runner: &'r R,
    dir: PathBuf,
    timeout: Option<u64>,
}

/// Result of the best-effort first-time setup steps.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// False when an existing working copy was reused untouched.
    pub initialized: bool,
    /// Setup steps that failed and were skipped over.
    pub failed_steps: Vec<String>,
}

impl<'r, R: CommandRunner> Git<'r, R> {
    pub fn new(runner: &'r R, dir: impl AsRef<Path>, timeout: Option<u64>) -> Self {
        Self {
            runner,
            dir: dir.as_ref().to_path_buf(),
            timeout,
        }
    }

    fn command(&self, args: &[&str]) -> CommandSpec {
        CommandSpec::new("git", args.iter().copied())
            .in_dir(&self.dir)
            .with_timeout(self.timeout)
    }

    pub async fn run(&self, args: &[&str]) -> RunOutcome {
        self.runner.run(&self.command(args)).await
    }

    pub fn has_working_copy(&self) -> bool {
        self.dir.join(".git").exists()
    }

    /// Creates the working copy and attaches it to `branch` on the remote.
    /// Only `git init` is required to succeed; the remote may not have the
    /// branch yet, in which case the first push creates it.
    pub async fn ensure_working_copy(&self, remote_url: &str, branch: &str) -> Result<SyncReport> {
        if self.has_working_copy() {
            info!(dir = %self.dir.display(), "reusing existing working copy");
            return Ok(SyncReport::default());
        }

        let init = self.run(&["init"]).await;
        if !init.is_success() {
            bail!("git init in {} {}", self.dir.display(), init.describe());
        }

        let mut report = SyncReport {
            initialized: true,
            failed_steps: Vec::new(),
        };
        let steps: [&[&str]; 4] = [
            &["remote", "add", "origin", remote_url],
            &["fetch", "origin"],
            &["checkout", "-b", branch],
            &["pull", "origin", branch, "--allow-unrelated-histories"],
        ];
        for args in steps {
            let outcome = self.run(args).await;
            if !outcome.is_success() {
                report.failed_steps.push(format!("git {}", args.join(" ")));
            }
        }
        Ok(report)
    }

    pub async fn stage_html(&self) -> Result<()> {
        let outcome = self.run(&["add", "--", HTML_PATHSPEC]).await;
        if !outcome.is_success() {
            bail!("staging generated pages {}", outcome.describe());
        }
        Ok(())
    }

    /// Paths currently staged for commit.
    pub async fn staged_files(&self) -> Result<Vec<String>> {
        let outcome = self.run(&["diff", "--cached", "--name-only"]).await;
        match outcome.stdout() {
            Some(out) => Ok(out
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect()),
            None => bail!("reading staged changes {}", outcome.describe()),
        }
    }

    pub async fn commit(&self, message: &str) -> RunOutcome {
        self.run(&["commit", "-m", message]).await
    }

    pub async fn push(&self, branch: &str) -> RunOutcome {
        self.run(&["push", "-u", "origin", branch]).await
    }

    pub async fn head(&self) -> Option<String> {
        self.run(&["rev-parse", "--short", "HEAD"])
            .await
            .stdout()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::process::testing::{fail, is_git, ok, ScriptedRunner};

    #[tokio::test]
    async fn fresh_directory_runs_full_setup() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::succeeding();
        let git = Git::new(&runner, dir.path(), None);

        let report = git
            .ensure_working_copy("https://example.com/site.git", "main")
            .await
            .unwrap();
        assert!(report.initialized);
        assert!(report.failed_steps.is_empty());
        assert_eq!(
            runner.command_lines(),
            vec![
                "git init",
                "git remote add origin https://example.com/site.git",
                "git fetch origin",
                "git checkout -b main",
                "git pull origin main --allow-unrelated-histories",
            ]
        );
        assert!(runner
            .calls()
            .iter()
            .all(|c| c.cwd.as_deref() == Some(dir.path())));
    }

    #[tokio::test]
    async fn existing_working_copy_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        let runner = ScriptedRunner::succeeding();
        let git = Git::new(&runner, dir.path(), None);

        let report = git.ensure_working_copy("url", "main").await.unwrap();
        assert!(!report.initialized);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn setup_steps_after_init_are_best_effort() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new(|spec| {
            if is_git(spec, "pull") {
                fail(1, "couldn't find remote ref main")
            } else {
                ok("")
            }
        });
        let git = Git::new(&runner, dir.path(), None);

        let report = git.ensure_working_copy("url", "main").await.unwrap();
        assert_eq!(
            report.failed_steps,
            vec!["git pull origin main --allow-unrelated-histories"]
        );
    }

    #[tokio::test]
    async fn failed_init_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new(|_| fail(128, "permission denied"));
        let git = Git::new(&runner, dir.path(), None);

        let err = git.ensure_working_copy("url", "main").await.unwrap_err();
        assert!(err.to_string().contains("permission denied"));
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn staged_files_parses_name_only_output() {
        let runner = ScriptedRunner::new(|spec| {
            if is_git(spec, "diff") {
                ok("index.html\n1009950005.html\n\n")
            } else {
                ok("")
            }
        });
        let git = Git::new(&runner, "/tmp/site", Some(30));

        git.stage_html().await.unwrap();
        let files = git.staged_files().await.unwrap();
        assert_eq!(files, vec!["index.html", "1009950005.html"]);
        assert_eq!(runner.command_lines()[0], "git add -- *.html");
        assert!(runner
            .calls()
            .iter()
            .all(|c| c.timeout == Some(std::time::Duration::from_secs(30))));
    }

    #[tokio::test]
    async fn head_is_trimmed() {
        let runner = ScriptedRunner::new(|_| ok("abc1234\n"));
        let git = Git::new(&runner, "/tmp/site", None);
        assert_eq!(git.head().await.as_deref(), Some("abc1234"));
    }
}
