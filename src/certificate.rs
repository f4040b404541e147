//! Leaf certificate inspection and status classification

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use x509_parser::prelude::*;

use crate::error::ProbeError;

/// Outcome of a certificate probe
///
/// The set is closed. `Expired`, `ConnectionError` and `Timeout` fail a run;
/// `ExpiringSoon` and `NotYetValid` are warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Status {
    Valid,
    ExpiringSoon,
    Expired,
    NotYetValid,
    ConnectionError,
    Timeout,
}

impl Status {
    /// All statuses, in report order
    pub const ALL: [Status; 6] = [
        Status::Expired,
        Status::ConnectionError,
        Status::Timeout,
        Status::NotYetValid,
        Status::ExpiringSoon,
        Status::Valid,
    ];

    /// Whether this status makes the run fail
    pub fn is_failure(self) -> bool {
        matches!(self, Status::Expired | Status::ConnectionError | Status::Timeout)
    }

    /// Whether this status is reported as a warning
    pub fn is_warning(self) -> bool {
        matches!(self, Status::ExpiringSoon | Status::NotYetValid)
    }

    pub fn label(self) -> &'static str {
        match self {
            Status::Valid => "valid",
            Status::ExpiringSoon => "expiring soon",
            Status::Expired => "expired",
            Status::NotYetValid => "not yet valid",
            Status::ConnectionError => "connection error",
            Status::Timeout => "timeout",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classifies a validity window against `now`
///
/// A certificate whose `not_after` equals `now` is already expired. A
/// certificate expiring within `warning_horizon` (inclusive) is expiring soon.
pub fn classify(
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    now: DateTime<Utc>,
    warning_horizon: Duration,
) -> Status {
    if not_after <= now {
        Status::Expired
    } else if not_before > now {
        Status::NotYetValid
    } else if not_after - now <= warning_horizon {
        Status::ExpiringSoon
    } else {
        Status::Valid
    }
}

/// Identity and validity window of a leaf certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafCertificate {
    pub subject: String,
    pub issuer: String,
    pub serial: String,
    pub dns_names: Vec<String>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

impl LeafCertificate {
    /// Parses a DER-encoded certificate
    pub fn from_der(der: &[u8]) -> Result<Self, ProbeError> {
        let (_, cert) =
            parse_x509_certificate(der).map_err(|e| ProbeError::CertificateParse(e.to_string()))?;

        let validity = cert.validity();
        let not_before = to_utc(validity.not_before.timestamp())?;
        let not_after = to_utc(validity.not_after.timestamp())?;

        let mut dns_names = Vec::new();
        if let Ok(Some(san)) = cert.subject_alternative_name() {
            for name in &san.value.general_names {
                if let GeneralName::DNSName(dns) = name {
                    dns_names.push(dns.to_string());
                }
            }
        }

        Ok(Self {
            subject: display_name(cert.subject()),
            issuer: display_name(cert.issuer()),
            serial: cert.raw_serial_as_string(),
            dns_names,
            not_before,
            not_after,
        })
    }
}

fn to_utc(timestamp: i64) -> Result<DateTime<Utc>, ProbeError> {
    Utc.timestamp_opt(timestamp, 0)
        .single()
        .ok_or_else(|| ProbeError::CertificateParse(format!("timestamp out of range: {}", timestamp)))
}

/// Common name when present, full distinguished name otherwise
fn display_name(name: &X509Name<'_>) -> String {
    name.iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(String::from)
        .unwrap_or_else(|| name.to_string())
}
