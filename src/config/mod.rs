//! Layered configuration: built-in defaults, `.testdeployrc`, environment, CLI.

use std::{
    collections::{HashMap, HashSet},
    env,
    fs,
    io::{BufRead, BufReader},
    path::PathBuf,
};

use directories::{BaseDirs, UserDirs};
use serde::Serialize;
use thiserror::Error;

use crate::deploy::StepPolicy;

pub const SOURCE_DIR: &str = "TESTDEPLOY_SOURCE_DIR";
pub const TARGET_DIR: &str = "TESTDEPLOY_TARGET_DIR";
pub const REMOTE_URL: &str = "TESTDEPLOY_REMOTE_URL";
pub const BRANCH: &str = "TESTDEPLOY_BRANCH";
pub const ENTITY_IDS: &str = "TESTDEPLOY_ENTITY_IDS";
pub const SITE_URL: &str = "TESTDEPLOY_SITE_URL";
pub const PRODUCTION_URL: &str = "TESTDEPLOY_PRODUCTION_URL";
pub const PYTHON: &str = "TESTDEPLOY_PYTHON";
pub const HOMEPAGE_SCRIPT: &str = "TESTDEPLOY_HOMEPAGE_SCRIPT";
pub const REPORT_SCRIPT: &str = "TESTDEPLOY_REPORT_SCRIPT";
pub const DATASET: &str = "TESTDEPLOY_DATASET";
pub const GENERATOR_CWD: &str = "TESTDEPLOY_GENERATOR_CWD";
pub const REPORT_POLICY: &str = "TESTDEPLOY_REPORT_POLICY";
pub const STRICT_PATCH: &str = "TESTDEPLOY_STRICT_PATCH";
pub const COMMAND_TIMEOUT: &str = "TESTDEPLOY_COMMAND_TIMEOUT";

const KEYS: &[&str] = &[
    SOURCE_DIR,
    TARGET_DIR,
    REMOTE_URL,
    BRANCH,
    ENTITY_IDS,
    SITE_URL,
    PRODUCTION_URL,
    PYTHON,
    HOMEPAGE_SCRIPT,
    REPORT_SCRIPT,
    DATASET,
    GENERATOR_CWD,
    REPORT_POLICY,
    STRICT_PATCH,
    COMMAND_TIMEOUT,
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} is not set")]
    Missing { key: &'static str },

    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("entity identifier list is empty")]
    EmptyEntityList,

    #[error("entity identifier {0} is listed more than once")]
    DuplicateEntity(u64),

    #[error("source and target directory are the same: {0}")]
    SameDirectories(PathBuf),
}

/// Raw key/value view over every configuration layer.
#[derive(Debug, Clone)]
pub struct Config {
    inner: HashMap<String, String>,
    pub config_path: PathBuf,
}

impl Config {
    pub fn load() -> Self {
        let config_path = default_config_path();
        let rc_text = fs::read_to_string(&config_path).ok();
        let mut cfg = Self::from_layers(rc_text.as_deref(), env::vars());
        cfg.config_path = config_path;
        cfg
    }

    /// Builds a config from rc-file text and an environment snapshot.
    /// Environment entries take precedence over the rc file.
    pub fn from_layers(
        rc_text: Option<&str>,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        let mut map = default_map();

        if let Some(text) = rc_text {
            let reader = BufReader::new(text.as_bytes());
            for line in reader.lines().map_while(Result::ok) {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((k, v)) = line.split_once('=') {
                    map.insert(k.trim().to_string(), unquote(v.trim()).to_string());
                }
            }
        }

        for (k, v) in vars {
            if is_config_key(&k) {
                map.insert(k, v);
            }
        }

        Self {
            inner: map,
            config_path: PathBuf::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).cloned()
    }

    /// CLI flags land here, on top of every other layer.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.inner.insert(key.to_string(), value.into());
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key)
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false)
    }

    pub fn get_path(&self, key: &str) -> Option<PathBuf> {
        self.get(key).filter(|v| !v.trim().is_empty()).map(PathBuf::from)
    }
}

/// Where the generator child processes run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorCwd {
    /// Source directory, so the generators' relative dataset paths resolve.
    Source,
    Target,
}

/// Validated configuration handed to the coordinator.
#[derive(Debug, Clone, Serialize)]
pub struct DeployConfig {
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
    pub remote_url: String,
    pub branch: String,
    pub entity_ids: Vec<u64>,
    pub site_url: String,
    pub production_url: String,
    pub python: String,
    pub homepage_script: String,
    pub report_script: String,
    pub dataset: String,
    pub generator_cwd: GeneratorCwd,
    pub report_policy: StepPolicy,
    pub strict_patch: bool,
    pub command_timeout: Option<u64>,
}

impl DeployConfig {
    pub fn resolve(cfg: &Config) -> Result<Self, ConfigError> {
        let source_dir = cfg
            .get_path(SOURCE_DIR)
            .ok_or(ConfigError::Missing { key: SOURCE_DIR })?;
        let target_dir = cfg
            .get_path(TARGET_DIR)
            .ok_or(ConfigError::Missing { key: TARGET_DIR })?;
        if source_dir == target_dir {
            return Err(ConfigError::SameDirectories(source_dir));
        }

        let entity_ids = parse_entity_ids(&required(cfg, ENTITY_IDS)?)?;

        let generator_cwd = match required(cfg, GENERATOR_CWD)?.to_ascii_lowercase().as_str() {
            "source" => GeneratorCwd::Source,
            "target" => GeneratorCwd::Target,
            _ => {
                return Err(ConfigError::Invalid {
                    key: GENERATOR_CWD,
                    value: cfg.get(GENERATOR_CWD).unwrap_or_default(),
                    reason: "expected `source` or `target`",
                })
            }
        };

        let report_policy = match required(cfg, REPORT_POLICY)?.to_ascii_lowercase().as_str() {
            "warn" => StepPolicy::Warn,
            "fatal" => StepPolicy::Fatal,
            _ => {
                return Err(ConfigError::Invalid {
                    key: REPORT_POLICY,
                    value: cfg.get(REPORT_POLICY).unwrap_or_default(),
                    reason: "expected `warn` or `fatal`",
                })
            }
        };

        let timeout_raw = required(cfg, COMMAND_TIMEOUT)?;
        let command_timeout = match timeout_raw.parse::<u64>() {
            Ok(0) => None,
            Ok(secs) => Some(secs),
            Err(_) => {
                return Err(ConfigError::Invalid {
                    key: COMMAND_TIMEOUT,
                    value: timeout_raw,
                    reason: "expected a number of seconds",
                })
            }
        };

        Ok(Self {
            source_dir,
            target_dir,
            remote_url: required(cfg, REMOTE_URL)?,
            branch: required(cfg, BRANCH)?,
            entity_ids,
            site_url: required(cfg, SITE_URL)?,
            production_url: required(cfg, PRODUCTION_URL)?,
            python: required(cfg, PYTHON)?,
            homepage_script: required(cfg, HOMEPAGE_SCRIPT)?,
            report_script: required(cfg, REPORT_SCRIPT)?,
            dataset: required(cfg, DATASET)?,
            generator_cwd,
            report_policy,
            strict_patch: cfg.get_bool(STRICT_PATCH),
            command_timeout,
        })
    }

    pub fn generator_workdir(&self) -> &PathBuf {
        match self.generator_cwd {
            GeneratorCwd::Source => &self.source_dir,
            GeneratorCwd::Target => &self.target_dir,
        }
    }

    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn required(cfg: &Config, key: &'static str) -> Result<String, ConfigError> {
    cfg.get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing { key })
}

/// Parses a comma or whitespace separated identifier list, keeping order.
pub fn parse_entity_ids(raw: &str) -> Result<Vec<u64>, ConfigError> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for part in raw.split(|c: char| c == ',' || c.is_whitespace()) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let id = part
            .parse::<u64>()
            .ok()
            .filter(|id| *id > 0)
            .ok_or_else(|| ConfigError::Invalid {
                key: ENTITY_IDS,
                value: part.to_string(),
                reason: "expected a positive integer",
            })?;
        if !seen.insert(id) {
            return Err(ConfigError::DuplicateEntity(id));
        }
        ids.push(id);
    }
    if ids.is_empty() {
        return Err(ConfigError::EmptyEntityList);
    }
    Ok(ids)
}

fn unquote(v: &str) -> &str {
    v.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(v)
}

fn is_config_key(k: &str) -> bool {
    KEYS.contains(&k)
}

fn default_config_path() -> PathBuf {
    let base = BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config"));
    base.join("testdeploy").join(".testdeployrc")
}

fn desktop_dir() -> PathBuf {
    UserDirs::new()
        .and_then(|u| u.desktop_dir().map(|d| d.to_path_buf()))
        .or_else(|| BaseDirs::new().map(|b| b.home_dir().join("Desktop")))
        .unwrap_or_else(|| PathBuf::from("~/Desktop"))
}

fn default_map() -> HashMap<String, String> {
    let mut m = HashMap::new();
    let desktop = desktop_dir();

    // Paths
    m.insert(
        SOURCE_DIR.into(),
        desktop.join("New").to_string_lossy().into_owned(),
    );
    m.insert(
        TARGET_DIR.into(),
        desktop.join("NYC Test").to_string_lossy().into_owned(),
    );
    m.insert(HOMEPAGE_SCRIPT.into(), "homepage.py".into());
    m.insert(REPORT_SCRIPT.into(), "building.py".into());
    m.insert(DATASET.into(), "odcv_scoring.csv".into());

    // Remote
    m.insert(
        REMOTE_URL.into(),
        "https://github.com/fmillerrzero/nyc-test-site.git".into(),
    );
    m.insert(BRANCH.into(), "main".into());
    m.insert(
        SITE_URL.into(),
        "https://fmillerrzero.github.io/nyc-test-site/".into(),
    );
    m.insert(
        PRODUCTION_URL.into(),
        "https://fmillerrzero.github.io/nyc-odcv-prospector/".into(),
    );

    // Top 5 BBLs from odcv_scoring.csv
    m.insert(
        ENTITY_IDS.into(),
        "1009950005,1000940025,1010160036,1012670001,1013010001".into(),
    );

    m.insert(PYTHON.into(), "python3".into());
    m.insert(GENERATOR_CWD.into(), "source".into());
    m.insert(REPORT_POLICY.into(), "warn".into());
    m.insert(STRICT_PATCH.into(), "true".into());
    m.insert(COMMAND_TIMEOUT.into(), "600".into());

    m
}
