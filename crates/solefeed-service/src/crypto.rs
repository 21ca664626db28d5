//! Cryptographic utilities.
//!
//! HMAC/SHA-256 helpers, constant-time key comparison for the API key
//! extractors, and AWS Signature Version 4 request signing for the product
//! API.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Compute raw HMAC-SHA256.
///
/// # Panics
///
/// Never in practice: HMAC accepts keys of any length (RFC 2104).
#[must_use]
pub fn hmac_sha256(key: &[u8], message: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC-SHA256 accepts any key size");
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

/// Compute HMAC-SHA256 and return the hex-encoded result (64 characters).
#[must_use]
pub fn hmac_sha256_hex(key: &[u8], message: &[u8]) -> String {
    hex::encode(hmac_sha256(key, message))
}

/// Hex-encoded SHA-256 digest.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Constant-time string comparison.
///
/// Returns `false` early only on a length mismatch.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

// ============================================================================
// AWS Signature Version 4
// ============================================================================

const SIGV4_ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Credentials and scope for SigV4 signing.
#[derive(Debug, Clone)]
pub struct SigV4Scope<'a> {
    /// Access key ID.
    pub access_key: &'a str,
    /// Secret access key.
    pub secret_key: &'a str,
    /// Region, e.g. `us-east-1`.
    pub region: &'a str,
    /// Service name, e.g. `ProductAdvertisingAPI`.
    pub service: &'a str,
}

/// Derive the SigV4 signing key for one day, region and service.
#[must_use]
pub fn sigv4_signing_key(secret_key: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// Build the `Authorization` header for a request with no query string.
///
/// `headers` are the headers to sign; names are lowercased and sorted here.
/// `amz_date` is the `x-amz-date` value (`YYYYMMDD'T'HHMMSS'Z'`) and must also
/// appear in `headers`.
#[must_use]
pub fn sigv4_authorization(
    scope: &SigV4Scope<'_>,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
    payload: &[u8],
    amz_date: &str,
) -> String {
    let mut headers: Vec<(String, &str)> = headers
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.trim()))
        .collect();
    headers.sort_by(|a, b| a.0.cmp(&b.0));

    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect();
    let signed_headers = headers
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical_request = format!(
        "{method}\n{path}\n\n{canonical_headers}\n{signed_headers}\n{}",
        sha256_hex(payload)
    );

    let date = amz_date.get(..8).unwrap_or(amz_date);
    let credential_scope = format!(
        "{date}/{}/{}/aws4_request",
        scope.region, scope.service
    );
    let string_to_sign = format!(
        "{SIGV4_ALGORITHM}\n{amz_date}\n{credential_scope}\n{}",
        sha256_hex(canonical_request.as_bytes())
    );

    let signing_key = sigv4_signing_key(scope.secret_key, date, scope.region, scope.service);
    let signature = hmac_sha256_hex(&signing_key, string_to_sign.as_bytes());

    format!(
        "{SIGV4_ALGORITHM} Credential={}/{credential_scope}, \
         SignedHeaders={signed_headers}, Signature={signature}",
        scope.access_key
    )
}
