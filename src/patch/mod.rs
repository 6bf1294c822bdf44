//! Literal source patching of the external generator scripts.
//!
//! A patched copy is the original script with an ordered list of
//! [`Substitution`]s applied. Each rule sees the output of the rules before
//! it. In [`PatchMode::Strict`] a rule whose literal is missing aborts the
//! patch; in [`PatchMode::Lenient`] it is skipped and reported.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, warn};

pub mod rules;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub name: &'static str,
    pub find: String,
    pub replace: String,
}

impl Substitution {
    pub fn new(name: &'static str, find: impl Into<String>, replace: impl Into<String>) -> Self {
        Self {
            name,
            find: find.into(),
            replace: replace.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchMode {
    Strict,
    Lenient,
}

impl PatchMode {
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            Self::Strict
        } else {
            Self::Lenient
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchReport {
    /// Rule name and how many occurrences it replaced.
    pub applied: Vec<(&'static str, usize)>,
    /// Rules whose literal was not found (lenient mode only).
    pub skipped: Vec<&'static str>,
}

impl PatchReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("cannot read generator script {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot write patched script {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("rule `{rule}` found no match in {script}; the generator source has changed")]
    PatternMissing { rule: &'static str, script: String },
}

/// Applies `rules` in order to `text`. `script` only labels errors and logs.
pub fn apply_rules(
    script: &str,
    text: &str,
    rules: &[Substitution],
    mode: PatchMode,
) -> Result<(String, PatchReport), PatchError> {
    let mut out = text.to_string();
    let mut report = PatchReport::default();

    for rule in rules {
        let count = if rule.find.is_empty() {
            0
        } else {
            out.matches(rule.find.as_str()).count()
        };
        if count == 0 {
            match mode {
                PatchMode::Strict => {
                    return Err(PatchError::PatternMissing {
                        rule: rule.name,
                        script: script.to_string(),
                    })
                }
                PatchMode::Lenient => {
                    warn!(rule = rule.name, script, "pattern not found, rule skipped");
                    report.skipped.push(rule.name);
                    continue;
                }
            }
        }
        out = out.replace(rule.find.as_str(), &rule.replace);
        debug!(rule = rule.name, script, count, "rule applied");
        report.applied.push((rule.name, count));
    }

    Ok((out, report))
}

/// Copies `source` to `dest`, then rewrites `dest` with `rules` applied.
/// On failure no file is left at `dest`.
pub fn patch_script(
    source: &Path,
    dest: &Path,
    rules: &[Substitution],
    mode: PatchMode,
) -> Result<PatchReport, PatchError> {
    fs::copy(source, dest).map_err(|e| PatchError::Read {
        path: source.to_path_buf(),
        source: e,
    })?;

    let result = fs::read_to_string(dest)
        .map_err(|e| PatchError::Read {
            path: dest.to_path_buf(),
            source: e,
        })
        .and_then(|text| apply_rules(&source.display().to_string(), &text, rules, mode))
        .and_then(|(patched, report)| {
            fs::write(dest, patched).map_err(|e| PatchError::Write {
                path: dest.to_path_buf(),
                source: e,
            })?;
            Ok(report)
        });

    if result.is_err() {
        let _ = fs::remove_file(dest);
    }
    result
}
