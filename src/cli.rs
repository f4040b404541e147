//! Command-line interface for ssl-checker
//!
//! The CLI only collects flags; it never touches the network. Values given
//! here take precedence over the YAML configuration file, which in turn takes
//! precedence over built-in defaults (see [`crate::config::RunConfig`]).
//!
//! # Usage
//!
//! ```text
//! ssl-checker                                  # everything from the config file
//! ssl-checker -e prod,staging -t 5             # restrict environments, shorter timeout
//! ssl-checker -s --file-target prod=hosts.txt  # silent run against a host file
//! ssl-checker --domain-target qa=a.example.com,b.example.com:8443
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::error::ConfigError;

/// Main command-line interface structure for ssl-checker
///
/// Every overridable setting is an `Option` so that an absent flag can fall
/// back to the configuration file.
#[derive(Parser, Debug)]
#[command(
    name = "ssl-checker",
    about = "Quickly check certificate details of multiple https targets",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file location
    /// Defaults to $HOME/.config/ssl-checker/config.yaml
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Comma delimited list of environments to check
    #[arg(short = 'e', long, value_delimiter = ',')]
    pub environments: Vec<String>,

    /// Disable the live view and only print a final report
    #[arg(short = 's', long)]
    pub silent: bool,

    /// Enable debug logging in the log file
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Timeout in seconds for each certificate probe
    #[arg(short = 't', long)]
    pub timeout: Option<u16>,

    /// Maximum number of probes in flight at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Days before expiry at which a certificate is flagged as expiring soon
    #[arg(long)]
    pub warning_days: Option<u32>,

    /// Port used for targets that do not specify one
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Final report format
    #[arg(short = 'o', long, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,

    /// Log file location
    #[arg(long, default_value = "./ssl-checker.log")]
    pub log_file: PathBuf,

    /// Additional file target as ENV=PATH (one host per line)
    #[arg(long = "file-target", value_name = "ENV=PATH", value_parser = parse_file_target)]
    pub file_targets: Vec<(String, PathBuf)>,

    /// Additional domain targets as ENV=HOST[,HOST...]
    #[arg(long = "domain-target", value_name = "ENV=HOSTS", value_parser = parse_domain_target)]
    pub domain_targets: Vec<(String, Vec<String>)>,
}

/// Available subcommands
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Show the current version
    Version,
}

/// Format of the final report
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human readable tables
    #[default]
    Table,
    /// The final run state as a JSON document
    Json,
}

fn split_assignment(value: &str) -> Result<(String, &str), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidTargetFlag {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let (env, rest) = value
        .split_once('=')
        .ok_or_else(|| invalid("expected ENV=VALUE"))?;
    let env = env.trim();
    if env.is_empty() {
        return Err(invalid("environment name is empty"));
    }
    if rest.trim().is_empty() {
        return Err(invalid("value is empty"));
    }
    Ok((env.to_string(), rest.trim()))
}

fn parse_file_target(value: &str) -> Result<(String, PathBuf), ConfigError> {
    let (env, path) = split_assignment(value)?;
    Ok((env, PathBuf::from(path)))
}

fn parse_domain_target(value: &str) -> Result<(String, Vec<String>), ConfigError> {
    let (env, hosts) = split_assignment(value)?;
    let hosts = hosts
        .split(',')
        .map(str::trim)
        .filter(|host| !host.is_empty())
        .map(String::from)
        .collect();
    Ok((env, hosts))
}
