//! HTTP transport settings shared by the API client and the uploader.
//!
//! Transport-level retries only cover 5xx answers and connection/timeout
//! failures, with exponential backoff (5s, 25s, 125s, ... capped at ten
//! minutes by default). They are independent of the status polling policy.

use std::time::Duration;

use reqwest::{RequestBuilder, Response};
use tracing::{debug, warn};

use crate::api::ApiError;

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default whole-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const USER_AGENT: &str = concat!("notary-core/", env!("CARGO_PKG_VERSION"));

/// Transport configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// TCP/TLS connect timeout.
    pub connect_timeout: Duration,
    /// Timeout for a whole API request, body included.
    pub request_timeout: Duration,
    /// Timeout for a whole artifact upload; `None` leaves only the connect
    /// timeout, so large uploads on slow links are not cut off.
    pub upload_timeout: Option<Duration>,
    /// Extra attempts after a retryable failure.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub retry_base_delay: Duration,
    /// Growth factor between consecutive retry delays.
    pub retry_multiplier: u32,
    /// Upper bound for any single retry delay.
    pub retry_max_delay: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            upload_timeout: None,
            max_retries: 4,
            retry_base_delay: Duration::from_secs(5),
            retry_multiplier: 5,
            retry_max_delay: Duration::from_secs(10 * 60),
        }
    }
}

impl TransportConfig {
    /// Default timeouts without transport retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (zero based).
    #[must_use]
    pub fn retry_delay(&self, retry: u32) -> Duration {
        let factor = self.retry_multiplier.max(1).saturating_pow(retry);
        self.retry_base_delay
            .saturating_mul(factor)
            .min(self.retry_max_delay)
    }

    /// Builds a `reqwest` client with these timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Configuration`] if the TLS backend cannot be
    /// initialized.
    pub fn build_client(&self) -> Result<reqwest::Client, ApiError> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|error| ApiError::Configuration(error.to_string()))
    }

    /// Builds the `reqwest` client used for artifact uploads.
    ///
    /// Only the connect timeout and `upload_timeout` apply; the API request
    /// timeout would also bound the time spent streaming the body.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Configuration`] if the TLS backend cannot be
    /// initialized.
    pub fn build_upload_client(&self) -> Result<reqwest::Client, ApiError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .user_agent(USER_AGENT);
        if let Some(timeout) = self.upload_timeout {
            builder = builder.timeout(timeout);
        }
        builder
            .build()
            .map_err(|error| ApiError::Configuration(error.to_string()))
    }
}

/// Sends the request produced by `build`, retrying per `config`.
///
/// `build` runs once per attempt so each attempt carries fresh credentials.
/// The last response is returned as-is, error status included; callers turn
/// non-2xx answers into errors.
pub(crate) async fn send_with_retry<F>(
    config: &TransportConfig,
    url: &str,
    build: F,
) -> Result<Response, ApiError>
where
    F: Fn() -> Result<RequestBuilder, ApiError> + Send + Sync,
{
    let mut retry = 0;
    loop {
        let request = build()?;
        debug!(url = %url, attempt = retry + 1, "sending request");

        let retryable = match request.send().await {
            Ok(response) if response.status().is_server_error() && retry < config.max_retries => {
                format!("HTTP {}", response.status())
            },
            Ok(response) => return Ok(response),
            Err(error) if (error.is_timeout() || error.is_connect()) && retry < config.max_retries => {
                error.to_string()
            },
            Err(error) => return Err(ApiError::from_transport(url, &error)),
        };

        let delay = config.retry_delay(retry);
        warn!(
            url = %url,
            reason = %retryable,
            delay_secs = delay.as_secs(),
            "retrying request"
        );
        tokio::time::sleep(delay).await;
        retry += 1;
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn test_retry_delays_grow_and_cap() {
        let config = TransportConfig::default();
        assert_eq!(config.retry_delay(0), Duration::from_secs(5));
        assert_eq!(config.retry_delay(1), Duration::from_secs(25));
        assert_eq!(config.retry_delay(2), Duration::from_secs(125));
        assert_eq!(config.retry_delay(3), Duration::from_secs(600));
        assert_eq!(config.retry_delay(40), Duration::from_secs(600));
    }

    #[tokio::test]
    async fn test_retries_server_errors_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let config = TransportConfig {
            retry_base_delay: Duration::from_millis(1),
            ..TransportConfig::default()
        };
        let client = config.build_client().unwrap();
        let url = format!("{}/flaky", server.uri());

        let response = send_with_retry(&config, &url, || Ok(client.get(&url)))
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_no_retry_returns_first_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let config = TransportConfig::no_retry();
        let client = config.build_client().unwrap();
        let url = format!("{}/down", server.uri());

        let response = send_with_retry(&config, &url, || Ok(client.get(&url)))
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 500);
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let config = TransportConfig::default();
        let client = config.build_client().unwrap();
        let url = format!("{}/missing", server.uri());

        let response = send_with_retry(&config, &url, || Ok(client.get(&url)))
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 404);
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }
}
