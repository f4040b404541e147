use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// A network endpoint to probe: hostname or IP literal plus port
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Returns the host as an IP address when it is an IP literal
    pub fn ip(&self) -> Option<IpAddr> {
        self.host.parse().ok()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip() {
            Some(IpAddr::V6(_)) => write!(f, "[{}]:{}", self.host, self.port),
            _ => write!(f, "{}:{}", self.host, self.port),
        }
    }
}

/// Provides hostname validation functionality
pub struct HostValidator;

impl HostValidator {
    /// Creates a new HostValidator instance
    pub fn new() -> Self {
        Self {}
    }

    /// Validates a hostname for format and syntax
    ///
    /// This function checks that the hostname:
    /// - Does not exceed 253 characters (RFC 1035)
    /// - Consists of valid characters (a-z, 0-9, -, _, .)
    /// - Does not have empty labels (consecutive, leading or trailing dots)
    /// - Has no label starting or ending with a hyphen
    /// - Has no label exceeding 63 characters
    ///
    /// Single-label names such as `localhost` are accepted.
    pub fn validate_host_format(&self, host: &str) -> bool {
        if host.is_empty() || host.len() > 253 {
            return false;
        }

        // A single trailing dot denotes a fully qualified name
        let host = host.strip_suffix('.').unwrap_or(host);

        for label in host.split('.') {
            if label.is_empty() || label.len() > 63 {
                return false;
            }

            if !label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            {
                return false;
            }

            if label.starts_with('-') || label.ends_with('-') {
                return false;
            }
        }

        true
    }
}

impl Default for HostValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses a raw target line into an [`Endpoint`]
///
/// Accepted forms are `host`, `host:port`, a bare IPv4/IPv6 address and
/// `[ipv6]:port`. `default_port` applies when no port is given.
pub fn parse_target(raw: &str, default_port: u16) -> Result<Endpoint, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("empty target".to_string());
    }

    // Bare IP literal, including unbracketed IPv6
    if let Ok(ip) = raw.parse::<IpAddr>() {
        return Ok(Endpoint {
            host: ip.to_string(),
            port: default_port,
        });
    }

    let (host, port) = if let Some(rest) = raw.strip_prefix('[') {
        let (inner, tail) = rest
            .split_once(']')
            .ok_or_else(|| format!("unterminated IPv6 literal: {}", raw))?;
        let port = match tail {
            "" => None,
            tail => Some(
                tail.strip_prefix(':')
                    .ok_or_else(|| format!("unexpected characters after IPv6 literal: {}", tail))?,
            ),
        };
        inner
            .parse::<std::net::Ipv6Addr>()
            .map_err(|_| format!("invalid IPv6 address: {}", inner))?;
        (inner, port)
    } else {
        match raw.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (raw, None),
        }
    };

    let port = match port {
        Some(port) => parse_port(port)?,
        None => default_port,
    };

    if host.parse::<IpAddr>().is_err() && !HostValidator::new().validate_host_format(host) {
        return Err(format!("invalid hostname: {}", host));
    }

    Ok(Endpoint {
        host: host.to_ascii_lowercase(),
        port,
    })
}

fn parse_port(port: &str) -> Result<u16, String> {
    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err(format!("invalid port: {}", port)),
        Ok(port) => Ok(port),
    }
}
