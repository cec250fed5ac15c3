//! Versioned notarization log document.
//!
//! The document carries a `logFormatVersion` discriminator. Only version 1
//! is understood; any other value (or none) fails decoding instead of being
//! coerced into the known shape.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::models::{SubmissionStatus, lenient_status, null_as_empty};

/// Name of the discriminator field.
pub const LOG_FORMAT_VERSION_FIELD: &str = "logFormatVersion";

/// Audit log produced by the service for a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LogDocument {
    /// `logFormatVersion: 1`.
    V1(LogV1),
}

/// Version 1 log body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogV1 {
    /// Service job id (equal to the submission id).
    pub job_id: Option<String>,
    /// Final status.
    #[serde(default, deserialize_with = "lenient_status")]
    pub status: Option<SubmissionStatus>,
    /// One-line verdict summary.
    pub status_summary: Option<String>,
    /// Numeric status code.
    pub status_code: Option<i64>,
    /// Uploaded archive file name.
    pub archive_filename: Option<String>,
    /// ISO 8601 upload date.
    pub upload_date: Option<String>,
    /// SHA-256 of the uploaded archive.
    pub sha256: Option<String>,
    /// Code directory hashes included in the ticket.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub ticket_contents: Vec<TicketContent>,
    /// Problems found during inspection.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub issues: Vec<Issue>,
}

/// A ticket entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketContent {
    /// Path inside the archive.
    pub path: Option<String>,
    /// Digest algorithm of `cdhash`.
    pub digest_algorithm: Option<String>,
    /// Code directory hash.
    pub cdhash: Option<String>,
    /// Architecture.
    pub arch: Option<String>,
}

/// An inspection issue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    /// `error` or `warning`.
    pub severity: Option<String>,
    /// Issue code.
    pub code: Option<String>,
    /// Offending path.
    pub path: Option<String>,
    /// Description.
    pub message: Option<String>,
    /// Documentation link.
    pub doc_url: Option<String>,
    /// Architecture.
    pub architecture: Option<String>,
}

impl LogDocument {
    /// Decodes a document from raw JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed JSON, a missing discriminator, or an
    /// unsupported version.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Format version of this document.
    #[must_use]
    pub const fn version(&self) -> u32 {
        match self {
            Self::V1(_) => 1,
        }
    }

    /// Final status recorded in the log.
    #[must_use]
    pub fn status(&self) -> Option<SubmissionStatus> {
        match self {
            Self::V1(log) => log.status,
        }
    }

    /// Inspection issues; empty when there were none.
    #[must_use]
    pub fn issues(&self) -> &[Issue] {
        match self {
            Self::V1(log) => &log.issues,
        }
    }

    /// Version 1 body.
    #[must_use]
    pub const fn as_v1(&self) -> Option<&LogV1> {
        match self {
            Self::V1(log) => Some(log),
        }
    }
}

impl<'de> Deserialize<'de> for LogDocument {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let version = match value.get(LOG_FORMAT_VERSION_FIELD) {
            Some(Value::Number(number)) => number.to_string(),
            Some(Value::String(text)) => text.clone(),
            Some(other) => {
                return Err(D::Error::custom(format!(
                    "invalid {LOG_FORMAT_VERSION_FIELD}: {other}"
                )));
            },
            None => return Err(D::Error::missing_field(LOG_FORMAT_VERSION_FIELD)),
        };

        match version.as_str() {
            "1" => serde_json::from_value(value)
                .map(Self::V1)
                .map_err(D::Error::custom),
            other => Err(D::Error::custom(format!(
                "unsupported log format version '{other}'"
            ))),
        }
    }
}

impl Serialize for LogDocument {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        #[derive(Serialize)]
        struct Tagged<'a, T> {
            #[serde(rename = "logFormatVersion")]
            version: u32,
            #[serde(flatten)]
            body: &'a T,
        }

        match self {
            Self::V1(log) => Tagged {
                version: 1,
                body: log,
            }
            .serialize(serializer),
        }
    }
}
