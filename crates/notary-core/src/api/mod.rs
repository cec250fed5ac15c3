//! Submission API client.
//!
//! [`NotaryApi`] is the seam the poller and the orchestrator depend on;
//! [`NotaryClient`] implements it over HTTPS with `reqwest`.
//!
//! # Endpoints
//!
//! | Operation | Request |
//! |-----------|---------|
//! | [`NotaryApi::submit`] | `POST {base}/notary/v2/submissions` |
//! | [`NotaryApi::get_status`] | `GET {base}/notary/v2/submissions/{id}` |
//! | [`NotaryApi::get_log_pointer`] | `GET {base}/notary/v2/submissions/{id}/logs` |
//! | [`NotaryApi::fetch_log`] | `GET {developer_log_url}` (no auth) |
//! | [`NotaryApi::list_previous_submissions`] | `GET {base}/notary/v2/submissions` |
//!
//! Every authenticated call carries a freshly signed bearer token.

mod client;
mod error;
mod log;
mod models;

use std::sync::Arc;

use async_trait::async_trait;

pub use client::{API_PREFIX, DEFAULT_BASE_URL, NotaryClient};
pub use error::{ApiError, FailureClass, MissingField};
pub use log::{Issue, LOG_FORMAT_VERSION_FIELD, LogDocument, LogV1, TicketContent};
pub use models::{
    ErrorResponse, LogPointer, NewSubmissionData, NewSubmissionRequest, NewSubmissionResponse,
    Notification, StatusReport, SubmissionAttributes, SubmissionData, SubmissionHandle,
    SubmissionListEntry, SubmissionListResponse, SubmissionLogUrlAttributes,
    SubmissionLogUrlData, SubmissionLogUrlResponse, SubmissionResponse, SubmissionStatus,
    SubmissionSummary, UploadAttributes, is_sha256_hex,
};

/// Operations of the notary service used by the submission lifecycle.
#[async_trait]
pub trait NotaryApi: Send + Sync {
    /// Registers a new submission and returns its id and upload credentials.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure, non-2xx status, or an
    /// undecodable body.
    async fn submit(
        &self,
        request: &NewSubmissionRequest,
    ) -> Result<NewSubmissionResponse, ApiError>;

    /// Fetches the current status of a submission.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`]; use [`ApiError::failure_class`] to tell
    /// transient failures apart.
    async fn get_status(&self, submission_id: &str) -> Result<StatusReport, ApiError>;

    /// Fetches the location of the submission log.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::MissingField`] when the response has no URL.
    async fn get_log_pointer(&self, submission_id: &str) -> Result<LogPointer, ApiError>;

    /// Downloads and decodes the log document at `pointer`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Decode`] for an unsupported log format version.
    async fn fetch_log(&self, pointer: &LogPointer) -> Result<LogDocument, ApiError>;

    /// Resolves the log location and downloads the document.
    ///
    /// # Errors
    ///
    /// Propagates failures of either step.
    async fn get_log(&self, submission_id: &str) -> Result<LogDocument, ApiError> {
        let pointer = self.get_log_pointer(submission_id).await?;
        self.fetch_log(&pointer).await
    }

    /// Lists previous submissions of the team, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure or non-2xx status.
    async fn list_previous_submissions(&self) -> Result<Vec<SubmissionSummary>, ApiError>;
}

#[async_trait]
impl<T: NotaryApi + ?Sized> NotaryApi for Arc<T> {
    async fn submit(
        &self,
        request: &NewSubmissionRequest,
    ) -> Result<NewSubmissionResponse, ApiError> {
        (**self).submit(request).await
    }

    async fn get_status(&self, submission_id: &str) -> Result<StatusReport, ApiError> {
        (**self).get_status(submission_id).await
    }

    async fn get_log_pointer(&self, submission_id: &str) -> Result<LogPointer, ApiError> {
        (**self).get_log_pointer(submission_id).await
    }

    async fn fetch_log(&self, pointer: &LogPointer) -> Result<LogDocument, ApiError> {
        (**self).fetch_log(pointer).await
    }

    async fn get_log(&self, submission_id: &str) -> Result<LogDocument, ApiError> {
        (**self).get_log(submission_id).await
    }

    async fn list_previous_submissions(&self) -> Result<Vec<SubmissionSummary>, ApiError> {
        (**self).list_previous_submissions().await
    }
}
