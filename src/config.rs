//! Configuration loading and merging
//!
//! The YAML file is parsed into [`FileConfig`] and validated once: every
//! `queries` entry must be either a file path or a list of hosts. The CLI and
//! the file are then merged into a single immutable [`RunConfig`], which is
//! the only configuration the probing core ever sees.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::cli::{Cli, OutputFormat};
use crate::error::ConfigError;

/// Default per-probe timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u16 = 10;
/// Default ExpiringSoon horizon in days
pub const DEFAULT_WARNING_DAYS: u32 = 30;
/// Port used when a target does not carry one
pub const DEFAULT_PORT: u16 = 443;
/// Default ceiling of probes in flight
pub const DEFAULT_CONCURRENCY: usize = 50;

/// Where the hosts of one environment come from
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TargetSource {
    /// A newline-delimited host file
    File(PathBuf),
    /// A literal list of hosts
    Domains(Vec<String>),
}

/// One environment and its target source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetEntry {
    pub environment: String,
    pub source: TargetSource,
}

/// Ordered collection of configured targets
///
/// Entries keep the order in which they were configured; the resolver relies
/// on it for its presentation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Targets {
    entries: Vec<TargetEntry>,
}

impl Targets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds targets from separate file and domain mappings
    ///
    /// File targets come first, then domain targets, each in iteration order.
    pub fn from_parts<F, D>(file_targets: F, domain_targets: D) -> Self
    where
        F: IntoIterator<Item = (String, PathBuf)>,
        D: IntoIterator<Item = (String, Vec<String>)>,
    {
        let mut targets = Self::new();
        for (environment, path) in file_targets {
            targets.push(environment, TargetSource::File(path));
        }
        for (environment, hosts) in domain_targets {
            targets.push(environment, TargetSource::Domains(hosts));
        }
        targets
    }

    pub fn push(&mut self, environment: impl Into<String>, source: TargetSource) {
        self.entries.push(TargetEntry {
            environment: environment.into(),
            source,
        });
    }

    pub fn extend(&mut self, other: Targets) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[TargetEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// File targets as `(environment, path)` pairs
    pub fn file_targets(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.entries.iter().filter_map(|entry| match &entry.source {
            TargetSource::File(path) => Some((entry.environment.as_str(), path.as_path())),
            TargetSource::Domains(_) => None,
        })
    }

    /// Domain targets as `(environment, hosts)` pairs
    pub fn domain_targets(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().filter_map(|entry| match &entry.source {
            TargetSource::Domains(hosts) => Some((entry.environment.as_str(), hosts.as_slice())),
            TargetSource::File(_) => None,
        })
    }
}

/// Raw YAML configuration file
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub timeout: Option<u16>,
    pub silent: Option<bool>,
    pub warning_days: Option<u32>,
    pub default_port: Option<u16>,
    pub concurrency: Option<usize>,
    /// Kept as a raw mapping so that entry order survives parsing
    #[serde(default)]
    pub queries: serde_yaml::Mapping,
}

impl FileConfig {
    /// Parses a configuration document
    pub fn from_yaml(source: &str, path: &Path) -> Result<Self, ConfigError> {
        // An empty document is a valid, empty configuration
        if source.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(source).map_err(|source| ConfigError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads a configuration file from disk
    ///
    /// A missing file is only an error when `explicit` is set, i.e. when the
    /// user asked for this file rather than relying on the default location.
    pub fn load(path: &Path, explicit: bool) -> Result<Option<Self>, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_yaml(&contents, path).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => {
                debug!("No config file found at {}", path.display());
                Ok(None)
            }
            Err(source) => Err(ConfigError::ConfigUnreadable {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Validates `queries` into typed targets, preserving their order
    pub fn targets(&self) -> Result<Targets, ConfigError> {
        let mut targets = Targets::new();

        for (key, value) in &self.queries {
            let environment = match key {
                serde_yaml::Value::String(s) => s.clone(),
                serde_yaml::Value::Number(n) => n.to_string(),
                other => {
                    return Err(ConfigError::UnsupportedQuery {
                        environment: format!("{:?}", other),
                    })
                }
            };

            let source: TargetSource = serde_yaml::from_value(value.clone()).map_err(|_| {
                ConfigError::UnsupportedQuery {
                    environment: environment.clone(),
                }
            })?;

            targets.push(environment, source);
        }

        debug!("Loaded {} query entries from configuration", targets.entries().len());
        Ok(targets)
    }
}

/// Default configuration file location
pub fn default_config_path() -> PathBuf {
    let home = std::env::var_os("HOME").unwrap_or_else(|| ".".into());
    PathBuf::from(home)
        .join(".config")
        .join("ssl-checker")
        .join("config.yaml")
}

/// Fully resolved settings for one run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Per-probe timeout
    pub timeout: Duration,
    /// Suppress the live view
    pub silent: bool,
    /// Lead time before expiry that flags a certificate as expiring soon
    pub warning_horizon: chrono::Duration,
    /// Port for targets without an explicit one
    pub default_port: u16,
    /// Ceiling of probes in flight
    pub concurrency: usize,
    /// Final report format
    pub output: OutputFormat,
    /// Restrict the run to these environments when set
    pub environments: Option<HashSet<String>>,
    pub targets: Targets,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS.into()),
            silent: false,
            warning_horizon: chrono::Duration::days(DEFAULT_WARNING_DAYS.into()),
            default_port: DEFAULT_PORT,
            concurrency: DEFAULT_CONCURRENCY,
            output: OutputFormat::Table,
            environments: None,
            targets: Targets::new(),
        }
    }
}

impl RunConfig {
    /// Merges CLI flags over the configuration file over defaults
    pub fn from_sources(cli: &Cli, file: Option<&FileConfig>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let mut targets = match file {
            Some(file) => file.targets()?,
            None => Targets::new(),
        };
        targets.extend(Targets::from_parts(
            cli.file_targets.iter().cloned(),
            cli.domain_targets.iter().cloned(),
        ));

        let timeout_secs = cli
            .timeout
            .or_else(|| file.and_then(|f| f.timeout))
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        let warning_days = cli
            .warning_days
            .or_else(|| file.and_then(|f| f.warning_days))
            .unwrap_or(DEFAULT_WARNING_DAYS);
        let concurrency = cli
            .concurrency
            .or_else(|| file.and_then(|f| f.concurrency))
            .unwrap_or(DEFAULT_CONCURRENCY)
            .max(1);
        let default_port = cli
            .port
            .or_else(|| file.and_then(|f| f.default_port))
            .unwrap_or(DEFAULT_PORT);

        let silent = cli.silent
            || file.and_then(|f| f.silent).unwrap_or(defaults.silent)
            || cli.output == OutputFormat::Json;

        let environments: HashSet<String> = cli
            .environments
            .iter()
            .map(|env| env.trim())
            .filter(|env| !env.is_empty())
            .map(String::from)
            .collect();

        Ok(Self {
            timeout: Duration::from_secs(timeout_secs.into()),
            silent,
            warning_horizon: chrono::Duration::days(warning_days.into()),
            default_port,
            concurrency,
            output: cli.output,
            environments: (!environments.is_empty()).then_some(environments),
            targets,
        })
    }
}
