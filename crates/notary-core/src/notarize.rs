//! Submission lifecycle.
//!
//! [`Notarizer`] sequences one notarization run:
//!
//! 1. validate and hash the artifact (no network work on failure),
//! 2. create the submission and extract its upload credentials,
//! 3. upload the artifact,
//! 4. poll until a verdict or the deadline,
//! 5. fetch the log document, whatever the polling outcome.
//!
//! Rejections (`Invalid`, `Rejected`) are returned as a normal result. A
//! timed-out poll yields a result without a status so the log can still be
//! inspected.

use std::path::Path;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::{
    ApiError, LogDocument, MissingField, NewSubmissionRequest, NotaryApi, NotaryClient,
    SubmissionStatus,
};
use crate::artifact::{Artifact, ArtifactError};
use crate::poller::{InvalidPollingConfig, PollOutcome, PollingConfig, poll_submission};
use crate::storage::{S3Uploader, StorageUploader, UploadError};

/// Errors that end a notarization run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NotaryError {
    /// The artifact was rejected locally or could not be read.
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    /// The polling configuration is unusable.
    #[error(transparent)]
    InvalidConfig(#[from] InvalidPollingConfig),

    /// A service call failed and was not absorbed by the polling policy.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The submit response lacked a required field.
    #[error(transparent)]
    MissingField(#[from] MissingField),

    /// The artifact upload failed.
    #[error("upload via {uploader} failed: {source}")]
    Upload {
        /// Uploader name.
        uploader: &'static str,
        /// Underlying error.
        #[source]
        source: UploadError,
    },

    /// The run was cancelled while polling.
    #[error("notarization of submission {submission_id} was cancelled")]
    Cancelled {
        /// Submission created before cancellation.
        submission_id: String,
    },
}

/// Outcome of a notarization run.
#[derive(Debug)]
pub struct NotarizationResult {
    /// Service-issued submission id.
    pub submission_id: String,
    /// Terminal status; `None` when polling timed out.
    pub status: Option<SubmissionStatus>,
    /// Log document, or the error raised while fetching it.
    pub log: Result<LogDocument, ApiError>,
}

impl NotarizationResult {
    /// Returns true when the service accepted the artifact.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        self.status == Some(SubmissionStatus::Accepted)
    }

    /// Returns true when polling ended without a verdict.
    #[must_use]
    pub const fn timed_out(&self) -> bool {
        self.status.is_none()
    }
}

/// Drives the submission lifecycle over an API client and an uploader.
#[derive(Debug, Clone)]
pub struct Notarizer<A, U> {
    api: A,
    uploader: U,
}

impl<A: NotaryApi, U: StorageUploader> Notarizer<A, U> {
    /// Creates an orchestrator.
    #[must_use]
    pub const fn new(api: A, uploader: U) -> Self {
        Self { api, uploader }
    }

    /// API client in use.
    #[must_use]
    pub const fn api(&self) -> &A {
        &self.api
    }

    /// Uploader in use.
    #[must_use]
    pub const fn uploader(&self) -> &U {
        &self.uploader
    }

    /// Notarizes the artifact at `path`.
    ///
    /// # Errors
    ///
    /// See [`NotaryError`]. Log fetch failures are not errors; they are
    /// stored in [`NotarizationResult::log`].
    pub async fn notarize(
        &self,
        path: impl AsRef<Path> + Send,
        config: &PollingConfig,
    ) -> Result<NotarizationResult, NotaryError> {
        self.notarize_with_cancellation(path, config, CancellationToken::new())
            .await
    }

    /// Notarizes the artifact at `path`, stopping at the next polling wait
    /// once `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`NotaryError::Cancelled`] when cancelled, otherwise as
    /// [`Notarizer::notarize`].
    pub async fn notarize_with_cancellation(
        &self,
        path: impl AsRef<Path> + Send,
        config: &PollingConfig,
        cancel: CancellationToken,
    ) -> Result<NotarizationResult, NotaryError> {
        config.validate()?;
        let artifact = Artifact::open(path).await?;
        info!(
            file = %artifact.file_name(),
            size = artifact.size(),
            sha256 = %artifact.sha256(),
            "artifact ready"
        );

        let request = NewSubmissionRequest::new(artifact.sha256(), artifact.file_name());
        let handle = self.api.submit(&request).await?.into_handle()?;
        let submission_id = handle.id;
        info!(submission_id = %submission_id, "submission created");

        self.uploader
            .upload(&handle.upload_credentials, &artifact)
            .await
            .map_err(|source| NotaryError::Upload {
                uploader: self.uploader.name(),
                source,
            })?;

        let status = match poll_submission(&self.api, &submission_id, config, &cancel).await? {
            PollOutcome::Terminal(status) => Some(status),
            PollOutcome::TimedOut => None,
            PollOutcome::Cancelled => return Err(NotaryError::Cancelled { submission_id }),
        };

        let log = self.api.get_log(&submission_id).await;
        if let Err(error) = &log {
            warn!(submission_id = %submission_id, error = %error, "failed to fetch log");
        }

        info!(
            submission_id = %submission_id,
            status = status.map_or("timed out", SubmissionStatus::as_str),
            "notarization finished"
        );

        Ok(NotarizationResult {
            submission_id,
            status,
            log,
        })
    }
}

impl NotaryClient {
    /// Notarizes `path`, uploading through [`S3Uploader`] in this client's
    /// storage region.
    ///
    /// # Errors
    ///
    /// See [`Notarizer::notarize`].
    pub async fn notarize(
        &self,
        path: impl AsRef<Path> + Send,
        config: &PollingConfig,
    ) -> Result<NotarizationResult, NotaryError> {
        self.notarizer().notarize(path, config).await
    }

    /// Builds a [`Notarizer`] uploading through this client's upload pool.
    #[must_use]
    pub fn notarizer(&self) -> Notarizer<Self, S3Uploader> {
        let uploader = S3Uploader::new(self.upload_http_client().clone(), self.storage_region());
        Notarizer::new(self.clone(), uploader)
    }
}
