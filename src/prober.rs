//! Certificate prober
//!
//! One probe is DNS resolution, a TCP connect and a TLS handshake against a
//! single target, bounded as a whole by the configured timeout. Every probe
//! produces exactly one [`ProbeResult`]; failures become a status instead of
//! an error.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rustls::pki_types::ServerName;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::certificate::{classify, LeafCertificate, Status};
use crate::config::RunConfig;
use crate::dns::DnsResolver;
use crate::error::ProbeError;
use crate::resolver::ProbeRequest;
use crate::tls::TlsClient;
use crate::validation::Endpoint;

/// Result of probing one request
///
/// Created exactly once per [`ProbeRequest`] and never modified afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub request: ProbeRequest,
    pub status: Status,
    /// Leaf certificate details when the handshake succeeded
    pub certificate: Option<LeafCertificate>,
    /// Chain verification failure, if any
    pub chain_issue: Option<String>,
    /// Short diagnostic for connection errors and timeouts
    pub error_detail: Option<String>,
    /// Address the handshake was performed against
    pub peer: Option<SocketAddr>,
    pub elapsed_ms: u64,
    /// Clock reading used for classification
    pub checked_at: DateTime<Utc>,
}

impl ProbeResult {
    pub fn not_before(&self) -> Option<DateTime<Utc>> {
        self.certificate.as_ref().map(|c| c.not_before)
    }

    pub fn not_after(&self) -> Option<DateTime<Utc>> {
        self.certificate.as_ref().map(|c| c.not_after)
    }

    /// Whole days until expiry, negative once expired
    pub fn days_remaining(&self) -> Option<i64> {
        self.not_after()
            .map(|not_after| (not_after - self.checked_at).num_days())
    }
}

/// What a successful handshake yields
struct Handshake {
    peer: SocketAddr,
    certificate: LeafCertificate,
    chain_issue: Option<String>,
}

/// Performs certificate probes
///
/// The prober holds no per-probe state; one instance is shared by all
/// concurrent probes of a run.
pub struct Prober {
    dns: DnsResolver,
    tls: TlsClient,
    timeout: Duration,
    warning_horizon: chrono::Duration,
}

impl Prober {
    /// Creates a prober with the given per-probe timeout and warning horizon
    pub fn new(timeout: Duration, warning_horizon: chrono::Duration) -> Result<Self> {
        Ok(Self {
            dns: DnsResolver::new(),
            tls: TlsClient::new()?,
            timeout,
            warning_horizon,
        })
    }

    pub fn from_config(config: &RunConfig) -> Result<Self> {
        Self::new(config.timeout, config.warning_horizon)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Probes one target
    ///
    /// When the timeout elapses the in-flight connection is dropped and the
    /// result is `Timeout`. Any other failure is a `ConnectionError`.
    pub async fn probe(&self, request: ProbeRequest) -> ProbeResult {
        let start = Instant::now();
        debug!("Probing {}", request.endpoint);

        let outcome = tokio::time::timeout(self.timeout, self.handshake(&request.endpoint)).await;
        let checked_at = Utc::now();
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(Ok(handshake)) => ProbeResult {
                status: classify(
                    handshake.certificate.not_before,
                    handshake.certificate.not_after,
                    checked_at,
                    self.warning_horizon,
                ),
                certificate: Some(handshake.certificate),
                chain_issue: handshake.chain_issue,
                error_detail: None,
                peer: Some(handshake.peer),
                elapsed_ms,
                checked_at,
                request,
            },
            Ok(Err(e)) => ProbeResult {
                status: Status::ConnectionError,
                certificate: None,
                chain_issue: None,
                error_detail: Some(e.to_string()),
                peer: None,
                elapsed_ms,
                checked_at,
                request,
            },
            Err(_) => ProbeResult {
                status: Status::Timeout,
                certificate: None,
                chain_issue: None,
                error_detail: Some(format!(
                    "no response within {}s",
                    self.timeout.as_secs_f64()
                )),
                peer: None,
                elapsed_ms,
                checked_at,
                request,
            },
        };

        // Per-target outcomes belong in the log file; stderr stays quiet
        match result.status {
            Status::ConnectionError | Status::Timeout => info!(
                "{} {}: {}",
                result.request.endpoint,
                result.status,
                result.error_detail.as_deref().unwrap_or_default()
            ),
            status => info!(
                "{} {} (expires {})",
                result.request.endpoint,
                status,
                result
                    .not_after()
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default()
            ),
        }

        result
    }

    async fn handshake(&self, endpoint: &Endpoint) -> Result<Handshake, ProbeError> {
        let ips = self.dns.resolve(&endpoint.host).await?;

        let mut last_error = None;
        let mut connected = None;
        for ip in ips {
            let addr = SocketAddr::new(ip, endpoint.port);
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    connected = Some((stream, addr));
                    break;
                }
                Err(source) => {
                    debug!("Connection to {} failed: {}", addr, source);
                    last_error = Some(ProbeError::Connect { addr, source });
                }
            }
        }

        let (stream, peer) = match connected {
            Some(connected) => connected,
            None => {
                return Err(last_error.unwrap_or_else(|| ProbeError::Resolve {
                    host: endpoint.host.clone(),
                    message: "no usable addresses".to_string(),
                }))
            }
        };

        let server_name = ServerName::try_from(endpoint.host.clone())
            .map_err(|_| ProbeError::InvalidServerName(endpoint.host.clone()))?;

        let (connector, finding) = self.tls.connector()?;
        let tls_stream = connector
            .connect(server_name, stream)
            .await
            .map_err(ProbeError::Handshake)?;

        let (_, connection) = tls_stream.get_ref();
        let leaf = connection
            .peer_certificates()
            .and_then(|chain| chain.first())
            .ok_or(ProbeError::NoCertificate)?;
        let certificate = LeafCertificate::from_der(leaf.as_ref())?;

        Ok(Handshake {
            peer,
            certificate,
            chain_issue: finding.take(),
        })
    }
}
