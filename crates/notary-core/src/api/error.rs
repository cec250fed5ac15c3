//! Notary API error types.

use thiserror::Error;

use super::models::ErrorResponse;
use crate::auth::AuthError;

/// Longest raw response body kept in an error message.
const MAX_ERROR_BODY_LEN: usize = 512;

/// A response lacked a field the client cannot proceed without.
///
/// This is a service contract violation, never a transient condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("notary service response is missing required field {field}")]
pub struct MissingField {
    /// JSON path of the missing field.
    pub field: &'static str,
}

/// How a failed call should be treated by the status poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The service answered with a 5xx status.
    ServerError,
    /// The transport gave up waiting (connect or request timeout).
    Timeout,
    /// Anything else; never retried.
    Fatal,
}

/// Errors that can occur while talking to the notary service.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    /// The bearer token could not be signed.
    #[error("failed to sign request: {0}")]
    Auth(#[from] AuthError),

    /// The service answered with a non-2xx status.
    #[error("notary API error ({status}): {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Human readable reason, from the structured body when available.
        message: String,
        /// Structured error body, when the service sent one.
        error: Option<ErrorResponse>,
    },

    /// The request timed out before a response arrived.
    #[error("request to {url} timed out: {message}")]
    Timeout {
        /// Target URL.
        url: String,
        /// Transport error message.
        message: String,
    },

    /// Connection or protocol failure.
    #[error("transport error for {url}: {message}")]
    Transport {
        /// Target URL.
        url: String,
        /// Transport error message.
        message: String,
    },

    /// A response body could not be decoded.
    #[error("failed to decode {what}: {message}")]
    Decode {
        /// What was being decoded.
        what: &'static str,
        /// Decoder error message.
        message: String,
    },

    /// A response lacked a required field.
    #[error(transparent)]
    MissingField(#[from] MissingField),

    /// Invalid client configuration.
    #[error("invalid client configuration: {0}")]
    Configuration(String),
}

impl ApiError {
    /// Builds a status error from a non-2xx response body.
    #[must_use]
    pub fn from_status(status: u16, body: &[u8]) -> Self {
        let error = serde_json::from_slice::<ErrorResponse>(body)
            .ok()
            .filter(ErrorResponse::has_content);

        let message = match &error {
            Some(error) => error.to_string(),
            None if body.is_empty() => format!("HTTP {status}"),
            None => {
                let text = String::from_utf8_lossy(body);
                text.chars().take(MAX_ERROR_BODY_LEN).collect()
            },
        };

        Self::Status {
            status,
            message,
            error,
        }
    }

    /// Maps a `reqwest` failure for `url`, keeping timeouts distinct.
    #[must_use]
    pub fn from_transport(url: &str, error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
                message: error.to_string(),
            }
        } else {
            Self::Transport {
                url: url.to_string(),
                message: error.to_string(),
            }
        }
    }

    /// HTTP status code, when the service answered.
    #[must_use]
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classifies this error for the polling policy.
    #[must_use]
    pub const fn failure_class(&self) -> FailureClass {
        match self {
            Self::Status { status, .. } if *status >= 500 && *status <= 599 => {
                FailureClass::ServerError
            },
            Self::Timeout { .. } => FailureClass::Timeout,
            _ => FailureClass::Fatal,
        }
    }
}
