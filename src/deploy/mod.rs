//! The end-to-end test deployment.
//!
//! [`Deployer`] walks a fixed sequence of stages:
//!
//! ```text
//! Idle -> Confirmed -> HomepageGenerated -> ReportsGenerated -> RepoSynced
//!      -> Committed -> Pushed -> CleanedUp -> Done
//! ```
//!
//! Any error after `Confirmed` moves to `Failed`; the temporary patched
//! scripts are removed on every path out of [`Deployer::run`].

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    config::DeployConfig,
    dataset,
    git::Git,
    patch::{
        self,
        rules::{self, RuleContext},
        PatchMode, PatchReport, Substitution,
    },
    printer::StatusPrinter,
    process::{python, CommandRunner, RunOutcome},
    prompt::PLACEHOLDER_LABEL,
};

/// What a failed step does to the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepPolicy {
    Fatal,
    Warn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Confirmed,
    HomepageGenerated,
    ReportsGenerated,
    RepoSynced,
    Committed,
    Pushed,
    CleanedUp,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    /// Committed and pushed.
    Pushed { commit: Option<String>, files: Vec<String> },
    /// Committed locally; the push was rejected or unreachable.
    PushFailed { commit: Option<String>, files: Vec<String> },
    /// Staged changes exist but `git commit` failed.
    CommitFailed { files: Vec<String> },
    /// Generated pages are identical to the last commit.
    NothingToDeploy,
}

/// The two patched script copies. Removed on `cleanup` and again on drop.
struct TempScripts {
    paths: [PathBuf; 2],
    printer: StatusPrinter,
}

impl TempScripts {
    fn new(target: &Path, printer: StatusPrinter) -> Self {
        Self {
            paths: [target.join(rules::HOMEPAGE_TEMP), target.join(rules::REPORT_TEMP)],
            printer,
        }
    }

    fn homepage(&self) -> &Path {
        &self.paths[0]
    }

    fn report(&self) -> &Path {
        &self.paths[1]
    }

    fn cleanup(&self) {
        for path in &self.paths {
            if !path.exists() {
                continue;
            }
            match fs::remove_file(path) {
                Ok(()) => {
                    let name = path.file_name().unwrap_or_default().to_string_lossy();
                    self.printer.info(&format!("Cleaned up {}", name));
                }
                Err(e) => warn!(path = %path.display(), error = %e, "could not remove temp script"),
            }
        }
    }
}

impl Drop for TempScripts {
    fn drop(&mut self) {
        self.cleanup();
    }
}

pub struct Deployer<'a, R> {
    cfg: &'a DeployConfig,
    runner: &'a R,
    printer: StatusPrinter,
    stage: Stage,
    history: Vec<Stage>,
}

impl<'a, R: CommandRunner> Deployer<'a, R> {
    pub fn new(cfg: &'a DeployConfig, runner: &'a R, printer: StatusPrinter) -> Self {
        Self {
            cfg,
            runner,
            printer,
            stage: Stage::Idle,
            history: vec![Stage::Idle],
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Every stage entered so far, in order.
    pub fn history(&self) -> &[Stage] {
        &self.history
    }

    fn enter(&mut self, stage: Stage) {
        info!(from = ?self.stage, to = ?stage, "stage transition");
        self.stage = stage;
        self.history.push(stage);
    }

    /// The operator said yes; mutations may start.
    pub fn confirm(&mut self) {
        if self.stage == Stage::Idle {
            self.enter(Stage::Confirmed);
        }
    }

    pub async fn run(&mut self, label: &str) -> Result<DeployOutcome> {
        if self.stage != Stage::Confirmed {
            bail!("deployment has not been confirmed");
        }

        let scripts = TempScripts::new(&self.cfg.target_dir, self.printer);
        let result = self.execute(label, &scripts).await;
        if result.is_err() {
            self.enter(Stage::Failed);
        }
        scripts.cleanup();
        let outcome = result?;
        self.enter(Stage::CleanedUp);
        self.enter(Stage::Done);
        Ok(outcome)
    }

    async fn execute(&mut self, label: &str, scripts: &TempScripts) -> Result<DeployOutcome> {
        let cfg = self.cfg;
        fs::create_dir_all(&cfg.target_dir)
            .with_context(|| format!("creating target folder {}", cfg.target_dir.display()))?;

        self.check_dataset();

        let ctx = RuleContext {
            target_dir: &cfg.target_dir,
            entity_ids: &cfg.entity_ids,
            dataset: &cfg.dataset,
            production_url: &cfg.production_url,
            site_url: &cfg.site_url,
            label,
        };

        self.printer.step("Generating test homepage...");
        self.patch(&cfg.homepage_script, scripts.homepage(), &rules::homepage_rules(&ctx))?;
        let outcome = self.generate(scripts.homepage()).await;
        self.apply_policy(StepPolicy::Fatal, "homepage generator", &outcome)?;
        self.enter(Stage::HomepageGenerated);

        self.printer.step(&format!(
            "Generating {} test building reports...",
            cfg.entity_ids.len()
        ));
        self.patch(&cfg.report_script, scripts.report(), &rules::report_rules(&ctx))?;
        let outcome = self.generate(scripts.report()).await;
        self.apply_policy(cfg.report_policy, "building report generator", &outcome)?;
        self.check_pages();
        self.enter(Stage::ReportsGenerated);

        self.printer.step("Setting up git repository...");
        let git = Git::new(self.runner, &cfg.target_dir, cfg.command_timeout);
        let sync = git.ensure_working_copy(&cfg.remote_url, &cfg.branch).await?;
        if sync.initialized {
            self.printer.info(&format!("Initialized working copy for {}", cfg.remote_url));
        }
        for step in &sync.failed_steps {
            self.printer.warn(&format!("`{}` failed, continuing", step));
        }
        self.enter(Stage::RepoSynced);

        self.printer.step("Deploying to test repository...");
        git.stage_html().await?;
        let files = git.staged_files().await?;
        if files.is_empty() {
            self.printer.success("Nothing to deploy: generated pages match the last commit.");
            return Ok(DeployOutcome::NothingToDeploy);
        }
        self.printer.info(&format!("{} changed file(s) staged", files.len()));

        let message = commit_message(label, cfg.entity_ids.len());
        let commit = git.commit(&message).await;
        if !commit.is_success() {
            self.printer.warn(&format!("git commit {}", commit.describe()));
            return Ok(DeployOutcome::CommitFailed { files });
        }
        let head = git.head().await;
        self.enter(Stage::Committed);

        let push = git.push(&cfg.branch).await;
        if !push.is_success() {
            self.printer.warn(&format!(
                "git push {}; the commit is kept locally",
                push.describe()
            ));
            return Ok(DeployOutcome::PushFailed { commit: head, files });
        }
        self.enter(Stage::Pushed);
        Ok(DeployOutcome::Pushed { commit: head, files })
    }

    fn patch(&self, script: &str, dest: &Path, rules: &[Substitution]) -> Result<PatchReport> {
        let source = self.cfg.source_dir.join(script);
        self.printer.info(&format!("Creating modified {}...", script));
        let report = patch::patch_script(
            &source,
            dest,
            rules,
            PatchMode::from_strict(self.cfg.strict_patch),
        )?;
        info!(script, applied = ?report.applied, "patched generator");
        if !report.is_complete() {
            for rule in &report.skipped {
                self.printer
                    .warn(&format!("{}: rule `{}` matched nothing and was skipped", script, rule));
            }
        }
        Ok(report)
    }

    async fn generate(&self, script: &Path) -> RunOutcome {
        let spec = python::script_command(&self.cfg.python, script)
            .in_dir(self.cfg.generator_workdir())
            .with_timeout(self.cfg.command_timeout);
        self.runner.run(&spec).await
    }

    fn apply_policy(&self, policy: StepPolicy, what: &str, outcome: &RunOutcome) -> Result<()> {
        if outcome.is_success() {
            return Ok(());
        }
        match policy {
            StepPolicy::Fatal => bail!("{} {}", what, outcome.describe()),
            StepPolicy::Warn => {
                self.printer
                    .warn(&format!("{} {}; continuing", what, outcome.describe()));
                Ok(())
            }
        }
    }

    fn check_dataset(&self) {
        let path = self.cfg.source_dir.join(&self.cfg.dataset);
        match dataset::preflight(&path, rules::KEY_COLUMN, &self.cfg.entity_ids) {
            Ok(filtered) => {
                self.printer.info(&format!(
                    "{} of {} dataset rows selected",
                    filtered.rows.len(),
                    filtered.total
                ));
                if !filtered.missing.is_empty() {
                    self.printer.warn(&format!(
                        "not in the dataset: {}",
                        join_ids(&filtered.missing)
                    ));
                }
            }
            Err(e) => warn!(path = %path.display(), error = %e, "dataset preflight skipped"),
        }
    }

    fn check_pages(&self) {
        let missing: Vec<String> = std::iter::once("index".to_string())
            .chain(self.cfg.entity_ids.iter().map(u64::to_string))
            .map(|stem| format!("{}.html", stem))
            .filter(|name| !self.cfg.target_dir.join(name).exists())
            .collect();
        if !missing.is_empty() {
            self.printer
                .warn(&format!("no page generated for: {}", missing.join(", ")));
        }
    }
}

/// The label itself, or a timestamped default for the placeholder label.
pub fn commit_message(label: &str, entity_count: usize) -> String {
    let label = label.trim();
    if label.is_empty() || label == PLACEHOLDER_LABEL {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        format!(
            "Test deployment - {} ({} buildings + homepage)",
            timestamp, entity_count
        )
    } else {
        label.to_string()
    }
}

pub fn join_ids(ids: &[u64]) -> String {
    ids.iter().map(u64::to_string).collect::<Vec<_>>().join(", ")
}
