//! Error taxonomy for ssl-checker
//!
//! Two families of errors exist and they are handled very differently:
//!
//! - [`ConfigError`] is fatal. It is raised while loading configuration or
//!   resolving targets, before any network activity, and maps to a
//!   distinguished process exit code.
//! - [`ProbeError`] never aborts a run. The prober folds it into a
//!   `ConnectionError` status on the corresponding result.

use std::path::PathBuf;
use thiserror::Error;

/// Exit code when every target passed (warnings allowed)
pub const EXIT_OK: i32 = 0;
/// Exit code when at least one target failed, or there was nothing to check
pub const EXIT_FAILED: i32 = 1;
/// Exit code for configuration errors detected before probing
pub const EXIT_CONFIG: i32 = 2;
/// Exit code when the run was interrupted
pub const EXIT_INTERRUPTED: i32 = 130;

/// Fatal configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    ConfigUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Unsupported query for environment '{environment}': expected a file path or a list of hosts")]
    UnsupportedQuery { environment: String },

    #[error("Invalid command-line target '{value}': {reason}")]
    InvalidTargetFlag { value: String, reason: String },

    #[error("Failed to read target file {path} for environment '{environment}': {source}")]
    TargetFileUnreadable {
        environment: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed target '{target}' in environment '{environment}': {reason}")]
    MalformedTarget {
        environment: String,
        target: String,
        reason: String,
    },
}

/// Per-probe failures, recovered into a result status
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("DNS resolution failed for {host}: {message}")]
    Resolve { host: String, message: String },

    #[error("Connection to {addr} failed: {source}")]
    Connect {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS client setup failed: {0}")]
    TlsSetup(#[from] rustls::Error),

    #[error("Invalid server name: {0}")]
    InvalidServerName(String),

    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] std::io::Error),

    #[error("Server presented no certificate")]
    NoCertificate,

    #[error("Failed to parse leaf certificate: {0}")]
    CertificateParse(String),
}

/// Maps an error chain to the process exit code
///
/// Any [`ConfigError`] in the chain yields [`EXIT_CONFIG`]; everything else is
/// a generic failure.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.chain().any(|cause| cause.downcast_ref::<ConfigError>().is_some()) {
        EXIT_CONFIG
    } else {
        EXIT_FAILED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_config_error_maps_to_config_exit_code() {
        let err: anyhow::Result<()> = Err(ConfigError::UnsupportedQuery {
            environment: "prod".to_string(),
        })
        .context("Loading configuration");

        assert_eq!(exit_code_for(&err.unwrap_err()), EXIT_CONFIG);
    }

    #[test]
    fn test_other_errors_map_to_generic_failure() {
        let err = anyhow::anyhow!("runtime exploded");
        assert_eq!(exit_code_for(&err), EXIT_FAILED);
    }

    #[test]
    fn test_probe_error_message_is_single_line() {
        let err = ProbeError::Resolve {
            host: "unreachable.invalid".to_string(),
            message: "no record found".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("unreachable.invalid"));
        assert!(!text.contains('\n'));
    }
}
