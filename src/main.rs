mod cli;
mod config;
mod dataset;
mod deploy;
mod git;
mod patch;
mod printer;
mod process;
mod prompt;

use std::process::ExitCode;

use anyhow::Result;
use config::{Config, DeployConfig};
use deploy::{join_ids, DeployOutcome, Deployer};
use is_terminal::IsTerminal;
use printer::StatusPrinter;
use process::SystemRunner;
use prompt::Console;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = cli::Cli::parse();
    init_tracing(args.verbose);

    let printer = StatusPrinter::new(std::io::stdout().is_terminal());
    match run(args, printer).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            printer.error(&format!("Deployment failed: {:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "testdeploy=warn",
        1 => "testdeploy=debug",
        _ => "testdeploy=trace",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(args: cli::Cli, printer: StatusPrinter) -> Result<()> {
    let mut cfg = Config::load();
    apply_overrides(&mut cfg, &args);
    tracing::debug!(path = %cfg.config_path.display(), "configuration loaded");
    let deploy_cfg = DeployConfig::resolve(&cfg)?;

    if args.show_config {
        println!("{}", deploy_cfg.to_pretty_json()?);
        return Ok(());
    }

    printer.heading("NYC ODCV Test Deployment");
    printer.info(&format!("Test folder: {}", deploy_cfg.target_dir.display()));
    printer.info(&format!("Building BBLs: {}", join_ids(&deploy_cfg.entity_ids)));
    printer.info(&format!(
        "Git repository: {} ({})",
        deploy_cfg.remote_url, deploy_cfg.branch
    ));

    let mut console = Console::stdio();
    let label = match args.label.as_deref().map(str::trim) {
        Some(l) if !l.is_empty() => l.to_string(),
        Some(_) => prompt::PLACEHOLDER_LABEL.to_string(),
        None => console.version_label()?,
    };
    if !args.yes && !console.confirm("\nDeploy test version?")? {
        printer.info("Cancelled.");
        return Ok(());
    }

    let runner = SystemRunner;
    let mut deployer = Deployer::new(&deploy_cfg, &runner, printer);
    deployer.confirm();
    let outcome = deployer.run(&label).await?;
    tracing::debug!(stage = ?deployer.stage(), stages = ?deployer.history(), "deployment finished");

    match outcome {
        DeployOutcome::Pushed { commit, files } => {
            printer.success(&format!(
                "\nTest deployment completed: {} file(s) pushed{}",
                files.len(),
                commit.map(|c| format!(" in {}", c)).unwrap_or_default()
            ));
            printer.info(&format!("View at: {}", deploy_cfg.site_url));
        }
        DeployOutcome::PushFailed { commit, .. } => {
            printer.warn(&format!(
                "Committed locally{} but the push failed; rerun or push by hand.",
                commit.map(|c| format!(" ({})", c)).unwrap_or_default()
            ));
        }
        DeployOutcome::CommitFailed { files } => {
            printer.warn(&format!(
                "{} file(s) are staged but could not be committed.",
                files.len()
            ));
        }
        DeployOutcome::NothingToDeploy => {}
    }
    printer.info(&format!("Local files: {}", deploy_cfg.target_dir.display()));
    Ok(())
}

fn apply_overrides(cfg: &mut Config, args: &cli::Cli) {
    let paths = [
        (config::SOURCE_DIR, &args.source_dir),
        (config::TARGET_DIR, &args.target_dir),
    ];
    for (key, value) in paths {
        if let Some(p) = value {
            cfg.set(key, p.to_string_lossy());
        }
    }

    let values = [
        (config::REMOTE_URL, &args.remote),
        (config::BRANCH, &args.branch),
        (config::ENTITY_IDS, &args.ids),
        (config::PYTHON, &args.python),
        (config::REPORT_POLICY, &args.report_policy),
    ];
    for (key, value) in values {
        if let Some(v) = value {
            cfg.set(key, v.as_str());
        }
    }

    if args.lenient {
        cfg.set(config::STRICT_PATCH, "false");
    }
}
