//! Substitution rule sets for the homepage and building report generators.
//!
//! The literals below are the statements the generators are expected to
//! contain verbatim. Values spliced into the generated Python (paths,
//! identifiers, the version label) go through [`py_str`] or [`label_text`].

use std::path::Path;

use super::Substitution;

pub const HOMEPAGE_TEMP: &str = "temp_homepage_test.py";
pub const REPORT_TEMP: &str = "temp_building_test.py";

pub const HOMEPAGE_OUTPUT: &str = "with open('index.html', 'w', encoding='utf-8') as f:";
pub const REPORT_ITERATION: &str = "# For each building\nfor i, row in scoring.iterrows():";
pub const REPORT_OUTPUT: &str = "with open(f\"{bbl}.html\", 'w') as f:";
pub const BUILD_TIMESTAMP: &str = "datetime.now().strftime('%B %d, %Y at %I:%M %p')";

/// Column of the scoring dataset that holds the entity identifier.
pub const KEY_COLUMN: &str = "bbl";

/// Everything the rule builders need to know about one run.
#[derive(Debug, Clone)]
pub struct RuleContext<'a> {
    pub target_dir: &'a Path,
    pub entity_ids: &'a [u64],
    pub dataset: &'a str,
    pub production_url: &'a str,
    pub site_url: &'a str,
    pub label: &'a str,
}

impl RuleContext<'_> {
    fn target(&self) -> String {
        self.target_dir.to_string_lossy().trim_end_matches(['/', '\\']).to_string()
    }

    fn id_list(&self) -> String {
        let ids: Vec<String> = self.entity_ids.iter().map(u64::to_string).collect();
        format!("[{}]", ids.join(", "))
    }
}

/// The statement that loads the scoring dataset in both generators.
pub fn dataset_load(dataset: &str) -> String {
    format!("scoring = pd.read_csv({})", py_str(dataset))
}

pub fn homepage_rules(ctx: &RuleContext<'_>) -> Vec<Substitution> {
    let load = dataset_load(ctx.dataset);
    vec![
        Substitution::new(
            "homepage-output",
            HOMEPAGE_OUTPUT,
            format!(
                "with open({}, 'w', encoding='utf-8') as f:",
                py_str(&format!("{}/index.html", ctx.target()))
            ),
        ),
        Substitution::new(
            "homepage-filter",
            load.clone(),
            format!(
                "{load}\nscoring = scoring[scoring['{KEY_COLUMN}'].isin({ids})]",
                ids = ctx.id_list()
            ),
        ),
        asset_base_url(ctx),
        build_label(ctx),
    ]
}

pub fn report_rules(ctx: &RuleContext<'_>) -> Vec<Substitution> {
    vec![
        Substitution::new(
            "report-iteration",
            REPORT_ITERATION,
            format!(
                "# For each building - TEST MODE: only the configured BBLs\n\
                 test_bbls = {ids}\n\
                 scoring_filtered = scoring[scoring['{KEY_COLUMN}'].isin(test_bbls)]\n\
                 print(f\"TEST MODE: Processing {{len(scoring_filtered)}} buildings: {{test_bbls}}\")\n\
                 for i, row in scoring_filtered.iterrows():",
                ids = ctx.id_list()
            ),
        ),
        Substitution::new(
            "report-output",
            REPORT_OUTPUT,
            format!(
                "with open({} + f\"/{{bbl}}.html\", 'w') as f:",
                py_str(&ctx.target())
            ),
        ),
        asset_base_url(ctx),
        build_label(ctx),
    ]
}

fn asset_base_url(ctx: &RuleContext<'_>) -> Substitution {
    Substitution::new("asset-base-url", ctx.production_url, ctx.site_url)
}

fn build_label(ctx: &RuleContext<'_>) -> Substitution {
    Substitution::new(
        "build-label",
        BUILD_TIMESTAMP,
        format!("{BUILD_TIMESTAMP} + ' ({})'", label_text(ctx.label)),
    )
}

/// Single-quoted Python string literal.
pub fn py_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// The label lands inside an f-string expression, where older Pythons reject
/// backslashes, so it is sanitized instead of escaped.
pub fn label_text(label: &str) -> String {
    label
        .chars()
        .map(|c| match c {
            '\'' => '\u{2019}',
            '"' => '\u{201d}',
            '\\' => '/',
            '{' => '(',
            '}' => ')',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::{apply_rules, PatchMode};

    const PROD: &str = "https://example.github.io/prod-site/";
    const TEST: &str = "https://example.github.io/test-site/";

    fn ctx<'a>(target: &'a Path, ids: &'a [u64], label: &'a str) -> RuleContext<'a> {
        RuleContext {
            target_dir: target,
            entity_ids: ids,
            dataset: "odcv_scoring.csv",
            production_url: PROD,
            site_url: TEST,
            label,
        }
    }

    fn homepage_source() -> String {
        format!(
            "import pandas as pd\n\
             from datetime import datetime\n\
             scoring = pd.read_csv('odcv_scoring.csv')\n\
             stamp = f\"Updated {{{BUILD_TIMESTAMP}}}\"\n\
             logo = '{PROD}logo.png'\n\
             {HOMEPAGE_OUTPUT}\n    f.write(stamp)\n"
        )
    }

    fn report_source() -> String {
        format!(
            "scoring = pd.read_csv('odcv_scoring.csv')\n\
             stamp = f\"Updated {{{BUILD_TIMESTAMP}}}\"\n\
             {REPORT_ITERATION}\n\
             \x20   bbl = row['bbl']\n\
             \x20   {REPORT_OUTPUT}\n\
             \x20       f.write('{PROD}' + stamp)\n"
        )
    }

    #[test]
    fn homepage_rules_apply_in_strict_mode() {
        let target = Path::new("/home/me/NYC Test");
        let ids = [11, 22];
        let rules = homepage_rules(&ctx(target, &ids, "v2 preview"));
        let (out, report) =
            apply_rules("homepage.py", &homepage_source(), &rules, PatchMode::Strict).unwrap();

        assert!(report.is_complete());
        assert!(out.contains("with open('/home/me/NYC Test/index.html', 'w', encoding='utf-8') as f:"));
        assert!(out.contains(
            "scoring = pd.read_csv('odcv_scoring.csv')\nscoring = scoring[scoring['bbl'].isin([11, 22])]\n"
        ));
        assert!(out.contains("logo = 'https://example.github.io/test-site/logo.png'"));
        assert!(!out.contains(PROD));
        assert!(out.contains(&format!("{BUILD_TIMESTAMP} + ' (v2 preview)'")));
    }

    #[test]
    fn report_rules_filter_iteration_and_redirect_output() {
        let target = Path::new("/srv/test/");
        let ids = [1009950005];
        let rules = report_rules(&ctx(target, &ids, "TEST BUILD"));
        let (out, report) =
            apply_rules("building.py", &report_source(), &rules, PatchMode::Strict).unwrap();

        assert_eq!(
            report.applied,
            vec![
                ("report-iteration", 1),
                ("report-output", 1),
                ("asset-base-url", 1),
                ("build-label", 1)
            ]
        );
        assert!(out.contains("test_bbls = [1009950005]\n"));
        assert!(out.contains("print(f\"TEST MODE: Processing {len(scoring_filtered)} buildings: {test_bbls}\")"));
        assert!(out.contains("for i, row in scoring_filtered.iterrows():"));
        assert!(!out.contains("scoring.iterrows()"));
        assert!(out.contains("with open('/srv/test' + f\"/{bbl}.html\", 'w') as f:"));
    }

    #[test]
    fn changed_generator_is_caught() {
        let target = Path::new("/srv/test");
        let ids = [1];
        let rules = report_rules(&ctx(target, &ids, "x"));
        let source = report_source().replace("# For each building\n", "# Loop\n");
        let err = apply_rules("building.py", &source, &rules, PatchMode::Strict).unwrap_err();
        assert!(err.to_string().contains("report-iteration"));
    }

    #[test]
    fn python_literals_are_escaped() {
        assert_eq!(py_str("it's"), r"'it\'s'");
        assert_eq!(py_str(r"C:\sites"), r"'C:\\sites'");
        assert_eq!(py_str("plain dir"), "'plain dir'");
    }

    #[test]
    fn label_is_sanitized_for_fstring_context() {
        assert_eq!(label_text(" fix {x} \"quoted\"\n"), "fix (x) \u{201d}quoted\u{201d}");
        assert_eq!(label_text(r"a\b's"), "a/b\u{2019}s");
    }
}
