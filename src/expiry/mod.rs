// Certificate expiry calculation
// Reads notAfter from a PEM certificate and turns it into whole days remaining

use chrono::{DateTime, Utc};
use thiserror::Error;
use x509_parser::error::{PEMError, X509Error};
use x509_parser::pem::parse_x509_pem;

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Error)]
pub enum ExpiryError {
    #[error("no PEM certificate found: {0}")]
    Pem(#[from] x509_parser::nom::Err<PEMError>),

    #[error("invalid X.509 certificate: {0}")]
    X509(#[from] x509_parser::nom::Err<X509Error>),

    #[error("expiration timestamp {0} is out of range")]
    Timestamp(i64),
}

/// Expiration time of the first certificate in a PEM bundle
pub fn not_after(pem_bytes: &[u8]) -> Result<DateTime<Utc>, ExpiryError> {
    let (_, pem) = parse_x509_pem(pem_bytes)?;
    let cert = pem.parse_x509()?;

    let timestamp = cert.validity().not_after.timestamp();
    DateTime::from_timestamp(timestamp, 0).ok_or(ExpiryError::Timestamp(timestamp))
}

/// Whole days between `now` and `expiry`, rounded toward negative infinity.
/// An already expired certificate yields a negative count.
pub fn days_until_expiry(expiry: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expiry - now).num_seconds().div_euclid(SECONDS_PER_DAY)
}

/// A certificate is due once its remaining days reach the threshold (inclusive)
pub fn is_due(days_until_expiry: i64, threshold_days: u32) -> bool {
    days_until_expiry <= i64::from(threshold_days)
}
