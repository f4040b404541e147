//! TLS client setup
//!
//! Every probe performs a single handshake with a verifier that runs the
//! regular WebPKI checks against the Mozilla root set but never aborts the
//! handshake. A verification failure is recorded as a [`ChainFinding`] so
//! that untrusted, mismatched or expired certificates can still be inspected.

use anyhow::{Context, Result};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{
    CertificateError, ClientConfig, DigitallySignedStruct, Error as RustlsError, RootCertStore,
    SignatureScheme,
};
use std::sync::{Arc, Mutex};
use tokio_rustls::TlsConnector;
use tracing::debug;

/// Chain verification outcome captured during one handshake
#[derive(Debug, Clone, Default)]
pub struct ChainFinding(Arc<Mutex<Option<String>>>);

impl ChainFinding {
    fn record(&self, issue: String) {
        if let Ok(mut slot) = self.0.lock() {
            *slot = Some(issue);
        }
    }

    /// Takes the recorded issue, if verification failed
    pub fn take(&self) -> Option<String> {
        self.0.lock().ok().and_then(|mut slot| slot.take())
    }
}

/// Verifier wrapper that records WebPKI failures instead of failing
#[derive(Debug)]
struct RecordingVerifier {
    inner: Arc<WebPkiServerVerifier>,
    finding: ChainFinding,
}

impl ServerCertVerifier for RecordingVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, RustlsError> {
        if let Err(e) =
            self.inner
                .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
        {
            debug!("Certificate verification failed for {:?}: {}", server_name, e);
            // The validity window is classified from the certificate itself
            if !is_validity_window_error(&e) {
                self.finding.record(e.to_string());
            }
        }
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, RustlsError> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, RustlsError> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

fn is_validity_window_error(err: &RustlsError) -> bool {
    matches!(
        err,
        RustlsError::InvalidCertificate(
            CertificateError::Expired
                | CertificateError::ExpiredContext { .. }
                | CertificateError::NotValidYet
                | CertificateError::NotValidYetContext { .. }
        )
    )
}

/// Builds per-probe TLS connectors
pub struct TlsClient {
    provider: Arc<CryptoProvider>,
    webpki: Arc<WebPkiServerVerifier>,
}

impl TlsClient {
    pub fn new() -> Result<Self> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let roots = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let webpki = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider.clone())
            .build()
            .context("Failed to build certificate verifier")?;

        Ok(Self { provider, webpki })
    }

    /// Creates a connector whose verifier reports into the returned finding
    pub fn connector(&self) -> Result<(TlsConnector, ChainFinding), RustlsError> {
        let finding = ChainFinding::default();
        let verifier = RecordingVerifier {
            inner: Arc::clone(&self.webpki),
            finding: finding.clone(),
        };

        let config = ClientConfig::builder_with_provider(Arc::clone(&self.provider))
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(verifier))
            .with_no_client_auth();

        Ok((TlsConnector::from(Arc::new(config)), finding))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity_window_errors_are_not_chain_findings() {
        assert!(is_validity_window_error(&RustlsError::InvalidCertificate(
            CertificateError::Expired
        )));
        assert!(is_validity_window_error(&RustlsError::InvalidCertificate(
            CertificateError::NotValidYet
        )));
        let time = UnixTime::since_unix_epoch(std::time::Duration::from_secs(1_800_000_000));
        let boundary = UnixTime::since_unix_epoch(std::time::Duration::from_secs(1_700_000_000));
        assert!(is_validity_window_error(&RustlsError::InvalidCertificate(
            CertificateError::ExpiredContext {
                time,
                not_after: boundary,
            }
        )));
        assert!(is_validity_window_error(&RustlsError::InvalidCertificate(
            CertificateError::NotValidYetContext {
                time: boundary,
                not_before: time,
            }
        )));
        assert!(!is_validity_window_error(&RustlsError::InvalidCertificate(
            CertificateError::UnknownIssuer
        )));
        assert!(!is_validity_window_error(&RustlsError::NoCertificatesPresented));
        assert!(!is_validity_window_error(&RustlsError::InvalidCertificate(
            CertificateError::NotValidForName
        )));
    }

    #[test]
    fn test_finding_is_taken_once() {
        let finding = ChainFinding::default();
        assert!(finding.take().is_none());
        finding.record("invalid peer certificate: UnknownIssuer".to_string());
        assert!(finding.take().is_some());
        assert!(finding.take().is_none());
    }

    #[test]
    fn test_connector_builds() {
        let client = TlsClient::new().unwrap();
        assert!(client.connector().is_ok());
    }
}
