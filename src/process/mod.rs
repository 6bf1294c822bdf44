//! Child process execution for the generator scripts and git.
//!
//! Every launch ends in a [`RunOutcome`]; nothing here returns an error to
//! the caller. Spawn failures, non-zero exits and timeouts are logged and
//! folded into the outcome so each step can apply its own policy.

use std::{
    fmt,
    future::Future,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use tokio::{process::Command, time::timeout};
use tracing::{debug, warn};

pub mod python;
#[cfg(test)]
pub mod testing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Child inherits our stdout/stderr; the operator watches it live.
    Forward,
    /// Output is collected and handed back to the caller.
    Capture,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub mode: OutputMode,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
            mode: OutputMode::Capture,
            timeout: None,
        }
    }

    pub fn in_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn forward(mut self) -> Self {
        self.mode = OutputMode::Forward;
        self
    }

    pub fn with_timeout(mut self, secs: Option<u64>) -> Self {
        self.timeout = secs.map(Duration::from_secs);
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " {:?}", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Exit status 0. `stdout` is empty for forwarded runs.
    Success { stdout: String },
    /// Non-zero exit (or killed by a signal, `code == None`).
    Failed { code: Option<i32>, stderr: String },
    SpawnFailed(String),
    TimedOut(u64),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn stdout(&self) -> Option<&str> {
        match self {
            Self::Success { stdout } => Some(stdout),
            _ => None,
        }
    }

    /// One-line explanation of a failed run for status output.
    pub fn describe(&self) -> String {
        match self {
            Self::Success { .. } => "succeeded".to_string(),
            Self::Failed { code: Some(code), stderr } if !stderr.trim().is_empty() => {
                format!("exited with code {}: {}", code, stderr.trim())
            }
            Self::Failed { code: Some(code), .. } => format!("exited with code {}", code),
            Self::Failed { code: None, .. } => "terminated by a signal".to_string(),
            Self::SpawnFailed(msg) => format!("could not be started: {}", msg),
            Self::TimedOut(secs) => format!("timed out after {}s", secs),
        }
    }
}

/// Seam between the coordinator and the operating system.
pub trait CommandRunner {
    fn run(&self, spec: &CommandSpec) -> impl Future<Output = RunOutcome>;
}

/// Runs commands as real child processes, one at a time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> RunOutcome {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args).stdin(Stdio::null()).kill_on_drop(true);
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }

        debug!(command = %spec, cwd = ?spec.cwd, mode = ?spec.mode, "spawning process");

        let outcome = match spec.mode {
            OutputMode::Forward => {
                cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
                match with_deadline(spec.timeout, cmd.status()).await {
                    Ok(Ok(status)) if status.success() => RunOutcome::Success {
                        stdout: String::new(),
                    },
                    Ok(Ok(status)) => RunOutcome::Failed {
                        code: status.code(),
                        stderr: String::new(),
                    },
                    Ok(Err(e)) => RunOutcome::SpawnFailed(e.to_string()),
                    Err(secs) => RunOutcome::TimedOut(secs),
                }
            }
            OutputMode::Capture => {
                cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
                match with_deadline(spec.timeout, cmd.output()).await {
                    Ok(Ok(out)) if out.status.success() => RunOutcome::Success {
                        stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
                    },
                    Ok(Ok(out)) => RunOutcome::Failed {
                        code: out.status.code(),
                        stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
                    },
                    Ok(Err(e)) => RunOutcome::SpawnFailed(e.to_string()),
                    Err(secs) => RunOutcome::TimedOut(secs),
                }
            }
        };

        match &outcome {
            RunOutcome::Success { .. } => debug!(command = %spec, "process finished"),
            RunOutcome::Failed { code, stderr } => {
                warn!(command = %spec, exit_code = ?code, stderr = %stderr.trim(), "command failed")
            }
            RunOutcome::SpawnFailed(msg) => warn!(command = %spec, error = %msg, "spawn failed"),
            RunOutcome::TimedOut(secs) => warn!(command = %spec, secs, "command timed out"),
        }
        outcome
    }
}

/// Awaits `fut`, giving up after `limit`. The error carries the limit in seconds.
async fn with_deadline<F: Future>(limit: Option<Duration>, fut: F) -> Result<F::Output, u64> {
    match limit {
        Some(limit) => timeout(limit, fut).await.map_err(|_| limit.as_secs()),
        None => Ok(fut.await),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout() {
        let spec = CommandSpec::new("sh", ["-c", "printf hello"]);
        let out = SystemRunner.run(&spec).await;
        assert_eq!(out.stdout(), Some("hello"));
    }

    #[tokio::test]
    async fn non_zero_exit_keeps_stderr() {
        let spec = CommandSpec::new("sh", ["-c", "echo broken >&2; exit 3"]);
        let out = SystemRunner.run(&spec).await;
        assert_eq!(
            out,
            RunOutcome::Failed {
                code: Some(3),
                stderr: "broken\n".to_string()
            }
        );
        assert_eq!(out.describe(), "exited with code 3: broken");
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_failure() {
        let spec = CommandSpec::new("definitely-not-a-real-program-1234", Vec::<String>::new());
        let out = SystemRunner.run(&spec).await;
        assert!(matches!(out, RunOutcome::SpawnFailed(_)));
        assert!(!out.is_success());
    }

    #[tokio::test]
    async fn forwarded_run_reports_success_without_output() {
        let spec = CommandSpec::new("sh", ["-c", "true"]).forward();
        assert_eq!(
            SystemRunner.run(&spec).await,
            RunOutcome::Success {
                stdout: String::new()
            }
        );
    }

    #[tokio::test]
    async fn runs_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let spec = CommandSpec::new("sh", ["-c", "pwd"]).in_dir(dir.path());
        let out = SystemRunner.run(&spec).await;
        let reported = std::path::PathBuf::from(out.stdout().unwrap().trim());
        assert_eq!(
            reported.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[tokio::test]
    async fn timeout_kills_the_child() {
        let spec = CommandSpec::new("sh", ["-c", "sleep 5"]).with_timeout(Some(1));
        assert_eq!(SystemRunner.run(&spec).await, RunOutcome::TimedOut(1));
    }

    #[test]
    fn display_quotes_arguments_with_spaces() {
        let spec = CommandSpec::new("git", ["commit", "-m", "Test deployment"]);
        assert_eq!(spec.to_string(), "git commit -m \"Test deployment\"");
    }
}
