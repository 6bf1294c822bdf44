use std::path::PathBuf;

use clap::{ArgAction, Parser};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "testdeploy",
    about = "Generate the homepage and a few building reports into a test folder and push them to the preview repository",
    version
)]
pub struct Cli {
    /// Version label appended to the build timestamp and used as commit message.
    /// Prompted for when omitted.
    #[arg(short, long)]
    pub label: Option<String>,

    /// Skip the confirmation prompt.
    #[arg(short, long)]
    pub yes: bool,

    /// Skip substitution rules whose pattern is missing instead of failing.
    #[arg(long)]
    pub lenient: bool,

    /// Folder holding homepage.py, building.py and the dataset.
    #[arg(long = "source-dir", value_name = "DIR")]
    pub source_dir: Option<PathBuf>,

    /// Folder the test site is generated into and published from.
    #[arg(long = "target-dir", value_name = "DIR")]
    pub target_dir: Option<PathBuf>,

    /// Remote repository URL of the test site.
    #[arg(long, value_name = "URL")]
    pub remote: Option<String>,

    /// Branch the test site is published to.
    #[arg(long)]
    pub branch: Option<String>,

    /// Entity identifiers (BBLs) to include, comma separated.
    #[arg(long, value_name = "ID,ID,...")]
    pub ids: Option<String>,

    /// Python interpreter used to run the generators.
    #[arg(long, value_name = "BIN")]
    pub python: Option<String>,

    /// What a failing building report run does: warn (default) or fatal.
    #[arg(long = "report-policy", value_parser = ["warn", "fatal"])]
    pub report_policy: Option<String>,

    /// Print the resolved configuration as JSON and exit.
    #[arg(long = "show-config")]
    pub show_config: bool,

    /// More diagnostics on stderr (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_overrides() {
        let cli = Cli::try_parse_from([
            "testdeploy",
            "--yes",
            "-l",
            "preview 7",
            "--ids",
            "1,2",
            "--report-policy",
            "fatal",
            "-vv",
        ])
        .unwrap();
        assert!(cli.yes);
        assert_eq!(cli.label.as_deref(), Some("preview 7"));
        assert_eq!(cli.ids.as_deref(), Some("1,2"));
        assert_eq!(cli.report_policy.as_deref(), Some("fatal"));
        assert_eq!(cli.verbose, 2);
        assert!(!cli.lenient);
    }

    #[test]
    fn rejects_unknown_policy() {
        assert!(Cli::try_parse_from(["testdeploy", "--report-policy", "ignore"]).is_err());
    }

    #[test]
    fn command_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
