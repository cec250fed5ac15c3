//! AWS Signature Version 4 for single object requests.
//!
//! Covers what one PUT needs: no query string, caller-chosen signed headers,
//! and a precomputed payload hash.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

use super::UploadError;

type HmacSha256 = Hmac<Sha256>;

pub(crate) const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Formats `time` as the `x-amz-date` header value.
pub(crate) fn amz_date(time: &DateTime<Utc>) -> String {
    time.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Key material and scope of a signature.
pub(crate) struct SigningKey<'a> {
    pub access_key_id: &'a str,
    pub secret_access_key: &'a SecretString,
    pub region: &'a str,
    pub service: &'a str,
}

/// The parts of a request covered by the signature.
pub(crate) struct CanonicalRequest<'a> {
    pub method: &'a str,
    /// Unencoded absolute path.
    pub path: &'a str,
    /// Headers to sign; names are lowercased here.
    pub headers: &'a [(&'a str, String)],
    pub payload_sha256: &'a str,
}

impl CanonicalRequest<'_> {
    fn signed_headers(&self) -> Vec<(String, &str)> {
        let mut headers: Vec<(String, &str)> = self
            .headers
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value.trim()))
            .collect();
        headers.sort_by(|a, b| a.0.cmp(&b.0));
        headers
    }

    fn render(&self, headers: &[(String, &str)]) -> String {
        let mut canonical = String::new();
        let _ = writeln!(canonical, "{}", self.method);
        let _ = writeln!(canonical, "{}", uri_encode_path(self.path));
        // Empty query string.
        canonical.push('\n');
        for (name, value) in headers {
            let _ = writeln!(canonical, "{name}:{value}");
        }
        canonical.push('\n');
        let _ = writeln!(canonical, "{}", header_list(headers));
        canonical.push_str(self.payload_sha256);
        canonical
    }
}

/// Computes the `Authorization` header value.
pub(crate) fn authorization(
    key: &SigningKey<'_>,
    request: &CanonicalRequest<'_>,
    time: &DateTime<Utc>,
) -> Result<String, UploadError> {
    let date = time.format("%Y%m%d").to_string();
    let scope = format!("{date}/{}/{}/aws4_request", key.region, key.service);

    let headers = request.signed_headers();
    let canonical = request.render(&headers);
    let string_to_sign = format!(
        "{ALGORITHM}\n{}\n{scope}\n{}",
        amz_date(time),
        hex::encode(Sha256::digest(canonical.as_bytes()))
    );

    let secret = format!("AWS4{}", key.secret_access_key.expose_secret());
    let date_key = hmac(secret.as_bytes(), date.as_bytes())?;
    let region_key = hmac(&date_key, key.region.as_bytes())?;
    let service_key = hmac(&region_key, key.service.as_bytes())?;
    let signing_key = hmac(&service_key, b"aws4_request")?;
    let signature = hex::encode(hmac(&signing_key, string_to_sign.as_bytes())?);

    Ok(format!(
        "{ALGORITHM} Credential={}/{scope}, SignedHeaders={}, Signature={signature}",
        key.access_key_id,
        header_list(&headers)
    ))
}

fn header_list(headers: &[(String, &str)]) -> String {
    headers
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";")
}

fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>, UploadError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|err| UploadError::InvalidRequest(format!("invalid signing key: {err}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Percent-encodes everything but unreserved characters and `/`.
pub(crate) fn uri_encode_path(path: &str) -> String {
    let mut encoded = String::with_capacity(path.len());
    for byte in path.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                encoded.push(char::from(byte));
            },
            _ => {
                let _ = write!(encoded, "%{byte:02X}");
            },
        }
    }
    encoded
}
