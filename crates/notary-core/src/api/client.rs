//! `reqwest` implementation of [`NotaryApi`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::RequestBuilder;
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::error::ApiError;
use super::log::LogDocument;
use super::models::{
    LogPointer, NewSubmissionRequest, NewSubmissionResponse, StatusReport, SubmissionListResponse,
    SubmissionLogUrlResponse, SubmissionResponse, SubmissionSummary,
};
use super::NotaryApi;
use crate::auth::{self, ApiKey, AuthError, DEFAULT_TOKEN_HORIZON, MAX_TOKEN_HORIZON};
use crate::storage::DEFAULT_STORAGE_REGION;
use crate::transport::{self, TransportConfig};

/// Production service root.
pub const DEFAULT_BASE_URL: &str = "https://appstoreconnect.apple.com";

/// Versioned path prefix of every endpoint.
pub const API_PREFIX: &str = "notary/v2";

const JSON: &str = "application/json";

/// HTTPS client for the notary service.
///
/// Stateless apart from configuration; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct NotaryClient {
    api_key: ApiKey,
    base_url: String,
    http: reqwest::Client,
    upload_http: reqwest::Client,
    transport: TransportConfig,
    token_horizon: Duration,
    storage_region: String,
}

impl NotaryClient {
    /// Creates a client for the production service.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Configuration`] if the HTTP client cannot be
    /// built.
    pub fn new(api_key: ApiKey) -> Result<Self, ApiError> {
        let transport = TransportConfig::default();
        let http = transport.build_client()?;
        let upload_http = transport.build_upload_client()?;
        Ok(Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            http,
            upload_http,
            transport,
            token_horizon: DEFAULT_TOKEN_HORIZON,
            storage_region: DEFAULT_STORAGE_REGION.to_string(),
        })
    }

    /// Points the client at another service root.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Replaces the transport settings and rebuilds both HTTP clients.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Configuration`] if an HTTP client cannot be
    /// built.
    pub fn with_transport(mut self, transport: TransportConfig) -> Result<Self, ApiError> {
        self.http = transport.build_client()?;
        self.upload_http = transport.build_upload_client()?;
        self.transport = transport;
        Ok(self)
    }

    /// Uses a caller-supplied HTTP client for API calls; transport retry
    /// settings still apply. Uploads keep their own client.
    #[must_use]
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Sets the lifetime of the per-request bearer tokens.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidHorizon`] (wrapped) when `horizon` is zero
    /// or above [`MAX_TOKEN_HORIZON`].
    pub fn with_token_horizon(mut self, horizon: Duration) -> Result<Self, ApiError> {
        if horizon.is_zero() || horizon > MAX_TOKEN_HORIZON {
            return Err(AuthError::InvalidHorizon {
                requested_secs: horizon.as_secs(),
                max_secs: MAX_TOKEN_HORIZON.as_secs(),
            }
            .into());
        }
        self.token_horizon = horizon;
        Ok(self)
    }

    /// Sets the object storage region used for uploads.
    #[must_use]
    pub fn with_storage_region(mut self, region: impl Into<String>) -> Self {
        self.storage_region = region.into();
        self
    }

    /// Service root.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Object storage region used for uploads.
    #[must_use]
    pub fn storage_region(&self) -> &str {
        &self.storage_region
    }

    /// HTTP client for API calls.
    #[must_use]
    pub const fn http_client(&self) -> &reqwest::Client {
        &self.http
    }

    /// HTTP client for artifact uploads, without the API request timeout.
    #[must_use]
    pub const fn upload_http_client(&self) -> &reqwest::Client {
        &self.upload_http
    }

    /// Transport settings.
    #[must_use]
    pub const fn transport(&self) -> &TransportConfig {
        &self.transport
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{API_PREFIX}/{path}", self.base_url)
    }

    /// Signs a fresh token and attaches it.
    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, ApiError> {
        let token = auth::sign(&self.api_key, self.token_horizon)?;
        Ok(request.bearer_auth(token.expose()).header(ACCEPT, JSON))
    }

    /// Sends a request and returns the raw body of a 2xx response.
    async fn execute<F>(&self, url: &str, build: F) -> Result<Vec<u8>, ApiError>
    where
        F: Fn() -> Result<RequestBuilder, ApiError> + Send + Sync,
    {
        let response = transport::send_with_retry(&self.transport, url, build).await?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|error| ApiError::from_transport(url, &error))?;

        debug!(url = %url, status = status.as_u16(), bytes = body.len(), "received response");

        if !status.is_success() {
            return Err(ApiError::from_status(status.as_u16(), &body));
        }
        Ok(body.to_vec())
    }
}

/// Decodes a JSON body without looking at the declared content type.
fn decode<T: DeserializeOwned>(what: &'static str, body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|error| ApiError::Decode {
        what,
        message: error.to_string(),
    })
}

#[async_trait]
impl NotaryApi for NotaryClient {
    async fn submit(
        &self,
        request: &NewSubmissionRequest,
    ) -> Result<NewSubmissionResponse, ApiError> {
        let url = self.endpoint("submissions");
        info!(submission_name = %request.submission_name, "creating submission");

        let body = self
            .execute(&url, || Ok(self.authorized(self.http.post(&url))?.json(request)))
            .await?;
        decode("submission response", &body)
    }

    async fn get_status(&self, submission_id: &str) -> Result<StatusReport, ApiError> {
        let url = self.endpoint(&format!("submissions/{submission_id}"));
        let body = self
            .execute(&url, || self.authorized(self.http.get(&url)))
            .await?;
        let response: SubmissionResponse = decode("submission status", &body)?;
        Ok(response.into_report(submission_id))
    }

    async fn get_log_pointer(&self, submission_id: &str) -> Result<LogPointer, ApiError> {
        let url = self.endpoint(&format!("submissions/{submission_id}/logs"));
        let body = self
            .execute(&url, || self.authorized(self.http.get(&url)))
            .await?;
        let response: SubmissionLogUrlResponse = decode("log location", &body)?;
        Ok(response.into_pointer()?)
    }

    async fn fetch_log(&self, pointer: &LogPointer) -> Result<LogDocument, ApiError> {
        let url = pointer.developer_log_url.as_str();
        // Pre-signed URL: sending a bearer token here would be rejected.
        let body = self.execute(url, || Ok(self.http.get(url))).await?;
        LogDocument::from_slice(&body).map_err(|error| ApiError::Decode {
            what: "log document",
            message: error.to_string(),
        })
    }

    async fn list_previous_submissions(&self) -> Result<Vec<SubmissionSummary>, ApiError> {
        let url = self.endpoint("submissions");
        let body = self
            .execute(&url, || self.authorized(self.http.get(&url)))
            .await?;
        let response: SubmissionListResponse = decode("submission list", &body)?;
        Ok(response.into_summaries())
    }
}
