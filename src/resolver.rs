//! Target resolution
//!
//! Expands the configured targets into a flat, ordered list of
//! [`ProbeRequest`]s. File targets are read here, so every configuration
//! problem (unreadable file, malformed host) surfaces before the first
//! connection is attempted.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, BufReader},
};
use tracing::{debug, info};

use crate::config::{TargetSource, Targets};
use crate::error::ConfigError;
use crate::validation::{parse_target, Endpoint};

/// A single certificate check to perform
///
/// Requests are immutable once resolved. Duplicates are allowed and are
/// probed independently; `index` is the position in the resolved list and
/// gives each request a unique identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeRequest {
    /// Position in the resolved request list
    pub index: usize,
    /// Environment label the target was configured under
    pub environment: String,
    /// Target as written in the configuration
    pub hostname: String,
    /// Parsed host and port
    pub endpoint: Endpoint,
}

/// Resolves configured targets into probe requests
///
/// Environments not in `env_filter` are skipped entirely when a filter is
/// given. Output order is configuration order, then file order or list order
/// within an environment.
///
/// # Errors
///
/// Returns a [`ConfigError`] when a target file cannot be read or a target
/// is malformed. No request list is produced in that case.
pub async fn resolve(
    targets: &Targets,
    env_filter: Option<&HashSet<String>>,
    default_port: u16,
) -> Result<Vec<ProbeRequest>, ConfigError> {
    let mut requests = Vec::new();

    for entry in targets.entries() {
        if let Some(filter) = env_filter {
            if !filter.contains(&entry.environment) {
                debug!("Skipping environment {} (filtered out)", entry.environment);
                continue;
            }
        }

        let hosts = match &entry.source {
            TargetSource::File(path) => read_host_file(&entry.environment, path).await?,
            TargetSource::Domains(hosts) => hosts.clone(),
        };

        for hostname in hosts {
            let endpoint = parse_target(&hostname, default_port).map_err(|reason| {
                ConfigError::MalformedTarget {
                    environment: entry.environment.clone(),
                    target: hostname.clone(),
                    reason,
                }
            })?;

            requests.push(ProbeRequest {
                index: requests.len(),
                environment: entry.environment.clone(),
                hostname,
                endpoint,
            });
        }
    }

    info!("Resolved {} probe requests", requests.len());
    Ok(requests)
}

/// Reads a newline-delimited host file
///
/// Blank lines and lines starting with '#' are skipped.
async fn read_host_file(environment: &str, path: &Path) -> Result<Vec<String>, ConfigError> {
    let unreadable = |source| ConfigError::TargetFileUnreadable {
        environment: environment.to_string(),
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).await.map_err(unreadable)?;
    let mut lines = BufReader::new(file).lines();
    let mut hosts = Vec::new();

    while let Some(line) = lines.next_line().await.map_err(unreadable)? {
        let trimmed = line.trim();
        if !trimmed.is_empty() && !trimmed.starts_with('#') {
            hosts.push(trimmed.to_string());
        }
    }

    debug!(
        "Read {} hosts for environment {} from {}",
        hosts.len(),
        environment,
        path.display()
    );
    Ok(hosts)
}
