//! Object storage upload.
//!
//! The submit call hands back single-use credentials scoped to one bucket
//! and object key. A [`StorageUploader`] transfers the artifact there with a
//! single PUT; there are no retries because the credentials may not survive
//! a second attempt.
//!
//! The storage region is not part of the service response. It comes from
//! configuration and defaults to [`DEFAULT_STORAGE_REGION`], the region the
//! service has been observed to use. If the service ever moves its bucket,
//! uploads fail until the region is reconfigured.

mod s3;
mod sigv4;

use std::fmt;

use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;

pub use s3::S3Uploader;

use crate::artifact::Artifact;

/// Region the notary service stores submissions in.
pub const DEFAULT_STORAGE_REGION: &str = "us-west-2";

/// Short-lived credentials for one upload.
#[derive(Clone)]
pub struct UploadCredentials {
    /// Access key id.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: SecretString,
    /// Session token sent as `x-amz-security-token`.
    pub session_token: SecretString,
    /// Destination bucket.
    pub bucket: String,
    /// Destination object key.
    pub object_key: String,
}

impl fmt::Debug for UploadCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("session_token", &"[REDACTED]")
            .field("bucket", &self.bucket)
            .field("object_key", &self.object_key)
            .finish()
    }
}

/// Upload failures. All of them end the lifecycle run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UploadError {
    /// The artifact could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Artifact path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The request could not be sent or the connection failed.
    #[error("upload to {url} failed: {message}")]
    Transport {
        /// Destination URL.
        url: String,
        /// Transport error message.
        message: String,
    },

    /// Storage answered with a non-2xx status.
    #[error("storage rejected upload with status {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// The request could not be signed or addressed.
    #[error("invalid upload request: {0}")]
    InvalidRequest(String),
}

/// Transfers an artifact to the storage location of a submission.
#[async_trait]
pub trait StorageUploader: Send + Sync {
    /// Uploads `artifact` with `credentials`.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError`]; callers must not retry with the same
    /// credentials.
    async fn upload(
        &self,
        credentials: &UploadCredentials,
        artifact: &Artifact,
    ) -> Result<(), UploadError>;

    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;
}
