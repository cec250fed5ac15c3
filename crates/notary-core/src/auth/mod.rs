//! Credential signing for the notary service.
//!
//! Every authorized call carries a short-lived ES256 JSON Web Token built
//! from an App Store Connect API key triple:
//!
//! | Claim / header | Value |
//! |----------------|-------|
//! | `kid` (header) | API key id |
//! | `iss` | issuer id |
//! | `aud` | `appstoreconnect-v1` |
//! | `iat` / `exp` | now / now + horizon (default 10 minutes) |
//!
//! Tokens are minted per request and never cached.
//!
//! # Example
//!
//! ```rust,no_run
//! use notary_core::auth::{ApiKey, sign_default};
//! use secrecy::SecretString;
//!
//! let pem = std::fs::read_to_string("AuthKey_ABC123.p8").unwrap();
//! let key = ApiKey::new("issuer-uuid", "ABC123", SecretString::from(pem)).unwrap();
//! let token = sign_default(&key).unwrap();
//! assert!(token.expires_at() > token.issued_at());
//! ```

mod error;
mod signer;

use std::fmt;

use secrecy::{ExposeSecret, SecretString};

pub use error::AuthError;
pub use signer::{
    AUDIENCE, Claims, DEFAULT_TOKEN_HORIZON, MAX_TOKEN_HORIZON, SignedToken, sign, sign_default,
};

/// Long-lived API key triple issued by App Store Connect.
///
/// The private key is the PEM contents of the downloaded `.p8` file.
#[derive(Clone)]
pub struct ApiKey {
    issuer_id: String,
    key_id: String,
    private_key: SecretString,
}

impl ApiKey {
    /// Creates an API key.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidInput`] when any part of the triple is
    /// blank.
    pub fn new(
        issuer_id: impl Into<String>,
        key_id: impl Into<String>,
        private_key: SecretString,
    ) -> Result<Self, AuthError> {
        let issuer_id = issuer_id.into();
        if issuer_id.trim().is_empty() {
            return Err(AuthError::InvalidInput {
                field: "issuer_id",
                reason: "must not be empty".to_string(),
            });
        }

        let key_id = key_id.into();
        if key_id.trim().is_empty() {
            return Err(AuthError::InvalidInput {
                field: "key_id",
                reason: "must not be empty".to_string(),
            });
        }

        if private_key.expose_secret().trim().is_empty() {
            return Err(AuthError::InvalidInput {
                field: "private_key",
                reason: "must not be empty".to_string(),
            });
        }

        Ok(Self {
            issuer_id,
            key_id,
            private_key,
        })
    }

    /// Issuer id (team-level UUID).
    #[must_use]
    pub fn issuer_id(&self) -> &str {
        &self.issuer_id
    }

    /// Key id, sent as the JWT `kid` header.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub(crate) const fn private_key(&self) -> &SecretString {
        &self.private_key
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKey")
            .field("issuer_id", &self.issuer_id)
            .field("key_id", &self.key_id)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}
