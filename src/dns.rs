use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, warn};
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::TokioAsyncResolver as AsyncResolver;

use crate::error::ProbeError;

/// Asynchronous hostname resolver shared by all probes
pub struct DnsResolver {
    resolver: AsyncResolver,
}

impl DnsResolver {
    /// Creates a resolver from the system configuration
    ///
    /// Falls back to the library's default upstream servers when the system
    /// configuration cannot be read.
    pub fn new() -> Self {
        let resolver = match AsyncResolver::tokio_from_system_conf() {
            Ok(r) => r,
            Err(e) => {
                warn!("Failed to read system DNS configuration ({}), using defaults", e);
                let mut opts = ResolverOpts::default();
                opts.cache_size = 1024;
                opts.timeout = Duration::from_secs(5);
                opts.attempts = 2;
                AsyncResolver::tokio(ResolverConfig::default(), opts)
            }
        };

        Self { resolver }
    }

    /// Resolves a host to its IP addresses
    ///
    /// IP literals are returned as-is without a lookup.
    pub async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, ProbeError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }

        debug!("Resolving DNS for host: {}", host);
        let lookup = self
            .resolver
            .lookup_ip(host)
            .await
            .map_err(|e| ProbeError::Resolve {
                host: host.to_string(),
                message: e.to_string(),
            })?;

        let ips: Vec<IpAddr> = lookup.iter().collect();
        if ips.is_empty() {
            return Err(ProbeError::Resolve {
                host: host.to_string(),
                message: "no addresses found".to_string(),
            });
        }

        debug!("Resolved {} IP addresses for {}", ips.len(), host);
        Ok(ips)
    }
}

impl Default for DnsResolver {
    fn default() -> Self {
        Self::new()
    }
}
