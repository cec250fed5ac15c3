//! Credential signing error types.

use thiserror::Error;

/// Errors raised while turning an API key into a signed bearer token.
///
/// Every variant is a configuration problem: retrying with the same key
/// material cannot succeed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// Invalid input field on the API key.
    #[error("invalid input for field {field}: {reason}")]
    InvalidInput {
        /// The field name.
        field: &'static str,
        /// The reason it is invalid.
        reason: String,
    },

    /// The private key is not PEM armored PKCS#8.
    #[error("unsupported private key format: {message}")]
    UnsupportedKeyFormat {
        /// What was found instead.
        message: String,
    },

    /// The PEM body is not valid base64.
    #[error("private key is not valid base64: {0}")]
    KeyEncoding(#[from] base64::DecodeError),

    /// Requested token lifetime is outside the accepted window.
    #[error("token horizon {requested_secs}s must be between 1s and {max_secs}s")]
    InvalidHorizon {
        /// Requested lifetime in seconds.
        requested_secs: u64,
        /// Maximum accepted lifetime in seconds.
        max_secs: u64,
    },

    /// The system clock reads before the Unix epoch.
    #[error("system clock error: {message}")]
    Clock {
        /// Error message.
        message: String,
    },

    /// JWT encoding or ECDSA signing failed (non-EC or corrupt key).
    #[error("failed to sign token: {message}")]
    Jwt {
        /// Error message from the JWT library.
        message: String,
    },
}
