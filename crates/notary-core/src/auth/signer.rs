//! ES256 bearer token minting.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::ApiKey;
use super::error::AuthError;

/// Audience claim expected by the notary service.
pub const AUDIENCE: &str = "appstoreconnect-v1";

/// Token lifetime used when the caller does not pick one.
pub const DEFAULT_TOKEN_HORIZON: Duration = Duration::from_secs(10 * 60);

/// Longest lifetime the service accepts for API tokens.
pub const MAX_TOKEN_HORIZON: Duration = Duration::from_secs(20 * 60);

const PKCS8_LABEL: &str = "PRIVATE KEY";

/// JWT claims sent with every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer id of the API key.
    pub iss: String,
    /// Issued-at, Unix seconds.
    pub iat: u64,
    /// Expiration, Unix seconds.
    pub exp: u64,
    /// Fixed service audience.
    pub aud: String,
}

/// A signed bearer token valid for a single request.
pub struct SignedToken {
    value: SecretString,
    issued_at: u64,
    expires_at: u64,
}

impl SignedToken {
    /// Compact JWT serialization.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    /// Issue time, Unix seconds.
    #[must_use]
    pub const fn issued_at(&self) -> u64 {
        self.issued_at
    }

    /// Expiration time, Unix seconds.
    #[must_use]
    pub const fn expires_at(&self) -> u64 {
        self.expires_at
    }
}

impl fmt::Debug for SignedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedToken")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Signs a token for `api_key` expiring `horizon` from now.
///
/// # Errors
///
/// Returns an error when the horizon is zero or above
/// [`MAX_TOKEN_HORIZON`], or when the key material is not an unencrypted
/// PKCS#8 P-256 private key.
pub fn sign(api_key: &ApiKey, horizon: Duration) -> Result<SignedToken, AuthError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|error| AuthError::Clock {
            message: error.to_string(),
        })?
        .as_secs();
    sign_at(api_key, horizon, now)
}

/// Signs a token with [`DEFAULT_TOKEN_HORIZON`].
///
/// # Errors
///
/// See [`sign`].
pub fn sign_default(api_key: &ApiKey) -> Result<SignedToken, AuthError> {
    sign(api_key, DEFAULT_TOKEN_HORIZON)
}

pub(crate) fn sign_at(
    api_key: &ApiKey,
    horizon: Duration,
    now: u64,
) -> Result<SignedToken, AuthError> {
    let horizon_secs = horizon.as_secs();
    if horizon_secs == 0 || horizon > MAX_TOKEN_HORIZON {
        return Err(AuthError::InvalidHorizon {
            requested_secs: horizon_secs,
            max_secs: MAX_TOKEN_HORIZON.as_secs(),
        });
    }

    let der = decode_pkcs8_pem(api_key.private_key().expose_secret())?;
    let key = EncodingKey::from_ec_der(&der);

    let mut header = Header::new(Algorithm::ES256);
    header.kid = Some(api_key.key_id().to_string());

    let claims = Claims {
        iss: api_key.issuer_id().to_string(),
        iat: now,
        exp: now + horizon_secs,
        aud: AUDIENCE.to_string(),
    };

    let value =
        jsonwebtoken::encode(&header, &claims, &key).map_err(|error| AuthError::Jwt {
            message: error.to_string(),
        })?;

    Ok(SignedToken {
        value: SecretString::from(value),
        issued_at: claims.iat,
        expires_at: claims.exp,
    })
}

/// Strips the PEM armor and whitespace and returns the DER body.
fn decode_pkcs8_pem(pem: &str) -> Result<Vec<u8>, AuthError> {
    let mut body = String::with_capacity(pem.len());
    for line in pem.lines().map(str::trim) {
        if let Some(label) = line
            .strip_prefix("-----BEGIN ")
            .and_then(|rest| rest.strip_suffix("-----"))
        {
            if label != PKCS8_LABEL {
                return Err(AuthError::UnsupportedKeyFormat {
                    message: format!("expected PEM label '{PKCS8_LABEL}', found '{label}'"),
                });
            }
            continue;
        }
        if line.starts_with("-----") {
            continue;
        }
        body.extend(line.chars().filter(|c| !c.is_whitespace()));
    }

    if body.is_empty() {
        return Err(AuthError::UnsupportedKeyFormat {
            message: "PEM body is empty".to_string(),
        });
    }

    Ok(STANDARD.decode(body)?)
}
