//! Signed single-PUT uploader for S3.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH};
use reqwest::{Body, Url};
use secrecy::ExposeSecret;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use super::sigv4::{self, CanonicalRequest, SigningKey};
use super::{DEFAULT_STORAGE_REGION, StorageUploader, UploadCredentials, UploadError};
use crate::artifact::Artifact;

const SERVICE: &str = "s3";
const MAX_ERROR_BODY_LEN: usize = 512;

/// Uploads artifacts with one SigV4-signed PUT, streaming the file.
#[derive(Debug, Clone)]
pub struct S3Uploader {
    http: reqwest::Client,
    region: String,
    endpoint: Option<String>,
}

impl S3Uploader {
    /// Creates an uploader for `region` using `http`.
    #[must_use]
    pub fn new(http: reqwest::Client, region: impl Into<String>) -> Self {
        Self {
            http,
            region: region.into(),
            endpoint: None,
        }
    }

    /// Creates an uploader for [`DEFAULT_STORAGE_REGION`].
    #[must_use]
    pub fn with_default_region(http: reqwest::Client) -> Self {
        Self::new(http, DEFAULT_STORAGE_REGION)
    }

    /// Sends uploads to `endpoint` using path-style addressing
    /// (`{endpoint}/{bucket}/{key}`) instead of the regional S3 host.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into().trim_end_matches('/').to_string());
        self
    }

    /// Region used in the signature scope.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Returns the unencoded request path and the full URL of an object.
    fn locate(&self, credentials: &UploadCredentials) -> Result<(String, Url), UploadError> {
        let key = credentials.object_key.trim_start_matches('/');
        let (path, origin) = match &self.endpoint {
            Some(endpoint) => (format!("/{}/{key}", credentials.bucket), endpoint.clone()),
            None => (
                format!("/{key}"),
                format!(
                    "https://{}.s3.{}.amazonaws.com",
                    credentials.bucket, self.region
                ),
            ),
        };

        let url = format!("{origin}{}", sigv4::uri_encode_path(&path));
        let url = Url::parse(&url)
            .map_err(|err| UploadError::InvalidRequest(format!("invalid object URL {url}: {err}")))?;
        Ok((path, url))
    }
}

/// `Host` header value as the HTTP client will send it.
fn host_header(url: &Url) -> Result<String, UploadError> {
    let host = url
        .host_str()
        .ok_or_else(|| UploadError::InvalidRequest(format!("object URL {url} has no host")))?;
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

#[async_trait]
impl StorageUploader for S3Uploader {
    async fn upload(
        &self,
        credentials: &UploadCredentials,
        artifact: &Artifact,
    ) -> Result<(), UploadError> {
        let (path, url) = self.locate(credentials)?;
        let io_error = |source| UploadError::Io {
            path: artifact.path().display().to_string(),
            source,
        };

        let file = tokio::fs::File::open(artifact.path())
            .await
            .map_err(io_error)?;
        let size = file.metadata().await.map_err(io_error)?.len();
        if size != artifact.size() {
            return Err(UploadError::InvalidRequest(format!(
                "{} changed after hashing ({} bytes, now {size})",
                artifact.path().display(),
                artifact.size()
            )));
        }

        let now = Utc::now();
        let amz_date = sigv4::amz_date(&now);
        let session_token = credentials.session_token.expose_secret();
        let headers = [
            ("host", host_header(&url)?),
            ("x-amz-content-sha256", artifact.sha256().to_string()),
            ("x-amz-date", amz_date.clone()),
            ("x-amz-security-token", session_token.to_string()),
        ];
        let authorization = sigv4::authorization(
            &SigningKey {
                access_key_id: &credentials.access_key_id,
                secret_access_key: &credentials.secret_access_key,
                region: &self.region,
                service: SERVICE,
            },
            &CanonicalRequest {
                method: "PUT",
                path: &path,
                headers: &headers,
                payload_sha256: artifact.sha256(),
            },
            &now,
        )?;

        info!(
            bucket = %credentials.bucket,
            object_key = %credentials.object_key,
            size,
            "uploading artifact"
        );
        debug!(url = %url, region = %self.region, "sending signed PUT");

        let response = self
            .http
            .put(url.clone())
            .header("x-amz-content-sha256", artifact.sha256())
            .header("x-amz-date", amz_date)
            .header("x-amz-security-token", session_token)
            .header(AUTHORIZATION, authorization)
            .header(CONTENT_LENGTH, size)
            .body(Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await
            .map_err(|err| UploadError::Transport {
                url: url.to_string(),
                message: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_LEN).collect(),
            });
        }

        info!(object_key = %credentials.object_key, "upload complete");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "s3"
    }
}
