//! Wire models for the notary service.
//!
//! Response records keep every field optional the way the service documents
//! them; the `into_*` conversions decide which fields are required and turn
//! absences into [`MissingField`] errors.

use std::fmt;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};

use super::error::MissingField;
use crate::storage::UploadCredentials;

/// Deserializes `null` or an absent key as an empty vector.
pub(crate) fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Deserializes a status leniently: `null` or absent is `None`, and any
/// value that is not a known status string is [`SubmissionStatus::Unknown`].
pub(crate) fn lenient_status<'de, D>(
    deserializer: D,
) -> Result<Option<SubmissionStatus>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<serde_json::Value>::deserialize(deserializer)?
        .filter(|value| !value.is_null())
        .map(|value| SubmissionStatus::deserialize(value).unwrap_or(SubmissionStatus::Unknown)))
}

/// Returns true when `value` is a 64 digit hexadecimal string.
#[must_use]
pub fn is_sha256_hex(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

// =============================================================================
// Submission status
// =============================================================================

/// Status of a notarization submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubmissionStatus {
    /// Notarization succeeded.
    Accepted,
    /// The service is still inspecting the artifact.
    #[serde(rename = "In Progress")]
    InProgress,
    /// The artifact failed inspection.
    Invalid,
    /// The service refused the artifact.
    Rejected,
    /// Status was absent or not recognized.
    #[serde(other)]
    Unknown,
}

impl SubmissionStatus {
    /// Returns true when no further polling is useful.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Accepted | Self::Invalid | Self::Rejected)
    }

    /// Wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "Accepted",
            Self::InProgress => "In Progress",
            Self::Invalid => "Invalid",
            Self::Rejected => "Rejected",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Submit
// =============================================================================

/// Body of the submit call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubmissionRequest {
    /// SHA-256 of the exact bytes that will be uploaded, 64 hex digits.
    pub sha256: String,
    /// File name reported back in status and log responses.
    pub submission_name: String,
    /// Completion notifications, in order; sent as `[]` when empty.
    #[serde(default)]
    pub notifications: Vec<Notification>,
}

impl NewSubmissionRequest {
    /// Creates a request without notifications.
    #[must_use]
    pub fn new(sha256: impl Into<String>, submission_name: impl Into<String>) -> Self {
        Self {
            sha256: sha256.into(),
            submission_name: submission_name.into(),
            notifications: Vec::new(),
        }
    }

    /// Appends a notification target.
    #[must_use]
    pub fn with_notification(mut self, notification: Notification) -> Self {
        self.notifications.push(notification);
        self
    }
}

/// A notification the service sends when notarization finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Delivery channel; the service only supports `webhook`.
    pub channel: String,
    /// URL the service calls on completion.
    pub target: String,
}

impl Notification {
    /// Creates a webhook notification for `target`.
    #[must_use]
    pub fn webhook(target: impl Into<String>) -> Self {
        Self {
            channel: "webhook".to_string(),
            target: target.into(),
        }
    }
}

/// Response to the submit call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewSubmissionResponse {
    /// Submission id and upload credentials.
    pub data: Option<NewSubmissionData>,
}

/// Data section of [`NewSubmissionResponse`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewSubmissionData {
    /// Submission id.
    pub id: Option<String>,
    /// Resource type.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Storage upload credentials.
    pub attributes: Option<UploadAttributes>,
}

/// One-time storage credentials returned by the submit call.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadAttributes {
    /// Access key id.
    pub aws_access_key_id: Option<String>,
    /// Secret access key.
    pub aws_secret_access_key: Option<String>,
    /// Session token.
    pub aws_session_token: Option<String>,
    /// Destination bucket.
    pub bucket: Option<String>,
    /// Destination object key.
    pub object: Option<String>,
}

impl fmt::Debug for UploadAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadAttributes")
            .field("aws_access_key_id", &self.aws_access_key_id)
            .field("bucket", &self.bucket)
            .field("object", &self.object)
            .finish_non_exhaustive()
    }
}

/// A submission ready for upload.
#[derive(Debug, Clone)]
pub struct SubmissionHandle {
    /// Service-issued submission id.
    pub id: String,
    /// Single-use storage credentials scoped to this submission.
    pub upload_credentials: UploadCredentials,
}

impl NewSubmissionResponse {
    /// Extracts the submission id and upload credentials.
    ///
    /// # Errors
    ///
    /// Returns [`MissingField`] naming the first absent field.
    pub fn into_handle(self) -> Result<SubmissionHandle, MissingField> {
        let data = self.data.ok_or(MissingField { field: "data" })?;
        let id = non_empty(data.id, "data.id")?;
        let attributes = data.attributes.ok_or(MissingField {
            field: "data.attributes",
        })?;

        let upload_credentials = UploadCredentials {
            access_key_id: non_empty(
                attributes.aws_access_key_id,
                "data.attributes.awsAccessKeyId",
            )?,
            secret_access_key: SecretString::from(non_empty(
                attributes.aws_secret_access_key,
                "data.attributes.awsSecretAccessKey",
            )?),
            session_token: SecretString::from(non_empty(
                attributes.aws_session_token,
                "data.attributes.awsSessionToken",
            )?),
            bucket: non_empty(attributes.bucket, "data.attributes.bucket")?,
            object_key: non_empty(attributes.object, "data.attributes.object")?,
        };

        Ok(SubmissionHandle {
            id,
            upload_credentials,
        })
    }
}

fn non_empty(value: Option<String>, field: &'static str) -> Result<String, MissingField> {
    value
        .filter(|value| !value.trim().is_empty())
        .ok_or(MissingField { field })
}

// =============================================================================
// Status
// =============================================================================

/// Response to the get-status call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmissionResponse {
    /// Submission data.
    pub data: Option<SubmissionData>,
}

/// Data section of [`SubmissionResponse`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmissionData {
    /// Submission id.
    pub id: Option<String>,
    /// Resource type.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Status attributes.
    pub attributes: Option<SubmissionAttributes>,
}

/// Status attributes of a submission.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionAttributes {
    /// ISO 8601 creation date.
    pub created_date: Option<String>,
    /// Submission name.
    pub name: Option<String>,
    /// Current status.
    #[serde(default, deserialize_with = "lenient_status")]
    pub status: Option<SubmissionStatus>,
}

/// Status of one submission as seen by the poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// Submission id.
    pub id: String,
    /// Current status; [`SubmissionStatus::Unknown`] when absent.
    pub status: SubmissionStatus,
    /// ISO 8601 creation date.
    pub created_date: Option<String>,
    /// Submission name.
    pub name: Option<String>,
}

impl SubmissionResponse {
    /// Flattens the response, defaulting the id to `requested_id`.
    #[must_use]
    pub fn into_report(self, requested_id: &str) -> StatusReport {
        let data = self.data.unwrap_or_default();
        let attributes = data.attributes.unwrap_or_default();
        StatusReport {
            id: data.id.unwrap_or_else(|| requested_id.to_string()),
            status: attributes.status.unwrap_or(SubmissionStatus::Unknown),
            created_date: attributes.created_date,
            name: attributes.name,
        }
    }
}

// =============================================================================
// Submission list
// =============================================================================

/// Response to the list-submissions call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmissionListResponse {
    /// Previous submissions, most recent first.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub data: Vec<SubmissionListEntry>,
}

/// One entry of [`SubmissionListResponse`].
#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionListEntry {
    /// Submission id.
    pub id: String,
    /// Resource type.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Status attributes.
    #[serde(default)]
    pub attributes: SubmissionAttributes,
}

/// A previous submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionSummary {
    /// Submission id.
    pub id: String,
    /// Submission name.
    pub name: Option<String>,
    /// ISO 8601 creation date.
    pub created_date: Option<String>,
    /// Status at listing time.
    pub status: SubmissionStatus,
}

impl SubmissionListResponse {
    /// Flattens the response, preserving order.
    #[must_use]
    pub fn into_summaries(self) -> Vec<SubmissionSummary> {
        self.data
            .into_iter()
            .map(|entry| SubmissionSummary {
                id: entry.id,
                name: entry.attributes.name,
                created_date: entry.attributes.created_date,
                status: entry
                    .attributes
                    .status
                    .unwrap_or(SubmissionStatus::Unknown),
            })
            .collect()
    }
}

// =============================================================================
// Log pointer
// =============================================================================

/// Response to the get-log call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmissionLogUrlResponse {
    /// Log location data.
    pub data: Option<SubmissionLogUrlData>,
}

/// Data section of [`SubmissionLogUrlResponse`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmissionLogUrlData {
    /// Submission id.
    pub id: Option<String>,
    /// Resource type.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Log location attributes.
    pub attributes: Option<SubmissionLogUrlAttributes>,
}

/// Log location attributes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionLogUrlAttributes {
    /// Short-lived URL serving the JSON log document.
    pub developer_log_url: Option<String>,
}

/// Where to download the log document of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPointer {
    /// Short-lived, unauthenticated URL.
    pub developer_log_url: String,
}

impl SubmissionLogUrlResponse {
    /// Extracts the log URL.
    ///
    /// # Errors
    ///
    /// Returns [`MissingField`] when the URL is absent.
    pub fn into_pointer(self) -> Result<LogPointer, MissingField> {
        let url = self
            .data
            .and_then(|data| data.attributes)
            .and_then(|attributes| attributes.developer_log_url);
        Ok(LogPointer {
            developer_log_url: non_empty(url, "data.attributes.developerLogUrl")?,
        })
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Structured error body sent by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error name.
    pub name: Option<String>,
    /// Reason for the error.
    pub description: Option<String>,
    /// Additional labels.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub label: Vec<String>,
}

impl ErrorResponse {
    /// Returns true when at least one field was populated.
    #[must_use]
    pub fn has_content(&self) -> bool {
        self.name.is_some() || self.description.is_some() || !self.label.is_empty()
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, &self.description) {
            (Some(name), Some(description)) => write!(f, "{name}: {description}")?,
            (Some(only), None) | (None, Some(only)) => f.write_str(only)?,
            (None, None) => f.write_str("unspecified error")?,
        }
        if !self.label.is_empty() {
            write!(f, " [{}]", self.label.join(", "))?;
        }
        Ok(())
    }
}
