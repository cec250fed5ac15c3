//! TOML configuration.
//!
//! ```toml
//! base_url = "https://appstoreconnect.apple.com"   # optional
//! storage_region = "us-west-2"                      # optional
//!
//! [api_key]
//! issuer_id = "69a6de70-03db-47e3-e053-5b8c7c11a4d1"
//! key_id = "2X9R4HXF34"
//! private_key_path = "AuthKey_2X9R4HXF34.p8"       # or private_key_env = "NOTARY_PRIVATE_KEY"
//!
//! [polling]
//! timeout_secs = 3600
//! polling_period_secs = 30
//! ignore_server_error = true
//! ignore_timeout_errors = true
//! retry_delay_after_failure_secs = 300
//!
//! [transport]
//! connect_timeout_secs = 15
//! request_timeout_secs = 60
//! max_retries = 4
//! # upload_timeout_secs = 3600                     # unset: no limit
//! ```
//!
//! A relative `private_key_path` is resolved against the directory of the
//! configuration file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::api::{ApiError, DEFAULT_BASE_URL, NotaryClient};
use crate::auth::{ApiKey, AuthError};
use crate::poller::{self, PollingConfig};
use crate::storage::DEFAULT_STORAGE_REGION;
use crate::transport::{self, TransportConfig};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotaryConfig {
    /// Service root.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Object storage region for uploads.
    #[serde(default = "default_storage_region")]
    pub storage_region: String,

    /// API key location.
    pub api_key: ApiKeyConfig,

    /// Polling policy.
    #[serde(default)]
    pub polling: PollingSection,

    /// HTTP transport settings.
    #[serde(default)]
    pub transport: TransportSection,

    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

/// `[api_key]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyConfig {
    /// Issuer id.
    pub issuer_id: String,

    /// Key id.
    pub key_id: String,

    /// Path of the `.p8` private key file.
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,

    /// Environment variable holding the PEM private key.
    #[serde(default)]
    pub private_key_env: Option<String>,
}

/// `[polling]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingSection {
    /// Overall deadline in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Seconds between status requests.
    #[serde(default = "default_polling_period_secs")]
    pub polling_period_secs: u64,

    /// Keep polling after 5xx answers.
    #[serde(default = "default_true")]
    pub ignore_server_error: bool,

    /// Keep polling after transport timeouts.
    #[serde(default = "default_true")]
    pub ignore_timeout_errors: bool,

    /// Seconds to wait after an ignored failure.
    #[serde(default = "default_retry_delay_after_failure_secs")]
    pub retry_delay_after_failure_secs: u64,
}

/// `[transport]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSection {
    /// Connect timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Retries after 5xx answers or connection failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Whole-upload timeout in seconds; unset means no limit.
    #[serde(default)]
    pub upload_timeout_secs: Option<u64>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_storage_region() -> String {
    DEFAULT_STORAGE_REGION.to_string()
}

const fn default_true() -> bool {
    true
}

const fn default_timeout_secs() -> u64 {
    poller::DEFAULT_TIMEOUT.as_secs()
}

const fn default_polling_period_secs() -> u64 {
    poller::DEFAULT_POLLING_PERIOD.as_secs()
}

const fn default_retry_delay_after_failure_secs() -> u64 {
    poller::DEFAULT_RETRY_DELAY_AFTER_FAILURE.as_secs()
}

const fn default_connect_timeout_secs() -> u64 {
    transport::DEFAULT_CONNECT_TIMEOUT.as_secs()
}

const fn default_request_timeout_secs() -> u64 {
    transport::DEFAULT_REQUEST_TIMEOUT.as_secs()
}

const fn default_max_retries() -> u32 {
    4
}

impl Default for PollingSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            polling_period_secs: default_polling_period_secs(),
            ignore_server_error: true,
            ignore_timeout_errors: true,
            retry_delay_after_failure_secs: default_retry_delay_after_failure_secs(),
        }
    }
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            upload_timeout_secs: None,
        }
    }
}

impl NotaryConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&content)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or a value is rejected.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] describing the first problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.base_url.starts_with("https://") || self.base_url.starts_with("http://")) {
            return Err(ConfigError::Validation(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        if self.storage_region.trim().is_empty() {
            return Err(ConfigError::Validation(
                "storage_region must not be empty".to_string(),
            ));
        }
        match (&self.api_key.private_key_path, &self.api_key.private_key_env) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::Validation(
                    "set only one of api_key.private_key_path and api_key.private_key_env"
                        .to_string(),
                ));
            },
            (None, None) => {
                return Err(ConfigError::Validation(
                    "api_key.private_key_path or api_key.private_key_env is required".to_string(),
                ));
            },
            _ => {},
        }
        if self.transport.connect_timeout_secs == 0
            || self.transport.request_timeout_secs == 0
            || self.transport.upload_timeout_secs == Some(0)
        {
            return Err(ConfigError::Validation(
                "transport timeouts must be greater than zero".to_string(),
            ));
        }
        self.polling_config()
            .validate()
            .map_err(|error| ConfigError::Validation(error.to_string()))
    }

    /// Loads the private key and builds the API key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key file or variable cannot be read, or the
    /// triple is incomplete.
    pub fn api_key(&self) -> Result<ApiKey, ConfigError> {
        let pem = if let Some(path) = &self.api_key.private_key_path {
            let path = self.resolve(path);
            std::fs::read_to_string(&path).map_err(|source| ConfigError::Io { path, source })?
        } else if let Some(name) = &self.api_key.private_key_env {
            std::env::var(name).map_err(|_| {
                ConfigError::Validation(format!("environment variable {name} is not set"))
            })?
        } else {
            return Err(ConfigError::Validation(
                "no private key source configured".to_string(),
            ));
        };

        Ok(ApiKey::new(
            self.api_key.issuer_id.clone(),
            self.api_key.key_id.clone(),
            SecretString::from(pem),
        )?)
    }

    /// Polling policy described by the `[polling]` section.
    #[must_use]
    pub fn polling_config(&self) -> PollingConfig {
        let polling = &self.polling;
        PollingConfig {
            timeout: Duration::from_secs(polling.timeout_secs),
            polling_period: Duration::from_secs(polling.polling_period_secs),
            ignore_server_error: polling.ignore_server_error,
            ignore_timeout_errors: polling.ignore_timeout_errors,
            retry_delay_after_failure: Duration::from_secs(polling.retry_delay_after_failure_secs),
        }
    }

    /// Transport settings described by the `[transport]` section.
    #[must_use]
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            connect_timeout: Duration::from_secs(self.transport.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.transport.request_timeout_secs),
            upload_timeout: self.transport.upload_timeout_secs.map(Duration::from_secs),
            max_retries: self.transport.max_retries,
            ..TransportConfig::default()
        }
    }

    /// Builds a client from this configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be loaded or the HTTP client cannot
    /// be built.
    pub fn client(&self) -> Result<NotaryClient, ConfigError> {
        let client = NotaryClient::new(self.api_key()?)?
            .with_transport(self.transport_config())?
            .with_base_url(&self.base_url)
            .with_storage_region(&self.storage_region);
        Ok(client)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File being read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Validation error.
    #[error("configuration validation failed: {0}")]
    Validation(String),

    /// The API key triple is incomplete.
    #[error("invalid API key: {0}")]
    Auth(#[from] AuthError),

    /// The client could not be built.
    #[error("failed to build client: {0}")]
    Client(#[from] ApiError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
            [api_key]
            issuer_id = "issuer"
            key_id = "KEY123"
            private_key_env = "NOTARY_PRIVATE_KEY"
        "#;

        let config = NotaryConfig::from_toml(toml).unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.storage_region, "us-west-2");
        assert_eq!(config.polling_config(), PollingConfig::default());
        assert_eq!(config.transport_config(), TransportConfig::default());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            base_url = "http://127.0.0.1:8080"
            storage_region = "eu-west-1"

            [api_key]
            issuer_id = "issuer"
            key_id = "KEY123"
            private_key_path = "/etc/notary/AuthKey_KEY123.p8"

            [polling]
            timeout_secs = 600
            polling_period_secs = 10
            ignore_server_error = false
            retry_delay_after_failure_secs = 60

            [transport]
            request_timeout_secs = 120
            max_retries = 0
            upload_timeout_secs = 3600
        "#;

        let config = NotaryConfig::from_toml(toml).unwrap();
        assert_eq!(config.storage_region, "eu-west-1");

        let polling = config.polling_config();
        assert_eq!(polling.timeout, Duration::from_secs(600));
        assert_eq!(polling.polling_period, Duration::from_secs(10));
        assert!(!polling.ignore_server_error);
        assert!(polling.ignore_timeout_errors);
        assert_eq!(polling.retry_delay_after_failure, Duration::from_secs(60));

        let transport = config.transport_config();
        assert_eq!(transport.request_timeout, Duration::from_secs(120));
        assert_eq!(transport.connect_timeout, Duration::from_secs(15));
        assert_eq!(transport.max_retries, 0);
        assert_eq!(transport.upload_timeout, Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_rejects_zero_upload_timeout() {
        let toml = r#"
            [api_key]
            issuer_id = "issuer"
            key_id = "KEY123"
            private_key_env = "NOTARY_PRIVATE_KEY"

            [transport]
            upload_timeout_secs = 0
        "#;

        assert!(matches!(
            NotaryConfig::from_toml(toml),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_rejects_two_key_sources() {
        let toml = r#"
            [api_key]
            issuer_id = "issuer"
            key_id = "KEY123"
            private_key_path = "key.p8"
            private_key_env = "NOTARY_PRIVATE_KEY"
        "#;
        assert!(matches!(
            NotaryConfig::from_toml(toml),
            Err(ConfigError::Validation(msg)) if msg.contains("only one")
        ));
    }

    #[test]
    fn test_rejects_missing_key_source() {
        let toml = r#"
            [api_key]
            issuer_id = "issuer"
            key_id = "KEY123"
        "#;
        assert!(matches!(
            NotaryConfig::from_toml(toml),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_rejects_zero_polling_period() {
        let toml = r#"
            [api_key]
            issuer_id = "issuer"
            key_id = "KEY123"
            private_key_env = "NOTARY_PRIVATE_KEY"

            [polling]
            polling_period_secs = 0
        "#;
        assert!(matches!(
            NotaryConfig::from_toml(toml),
            Err(ConfigError::Validation(msg)) if msg.contains("polling_period")
        ));
    }

    #[test]
    fn test_rejects_missing_api_key_section() {
        assert!(matches!(
            NotaryConfig::from_toml("storage_region = \"us-west-2\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_relative_key_path_resolves_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("AuthKey_KEY123.p8"),
            include_str!("../tests/fixtures/ec_private.pem"),
        )
        .unwrap();
        let config_path = dir.path().join("notary.toml");
        std::fs::write(
            &config_path,
            r#"
                [api_key]
                issuer_id = "issuer"
                key_id = "KEY123"
                private_key_path = "AuthKey_KEY123.p8"
            "#,
        )
        .unwrap();

        let config = NotaryConfig::from_file(&config_path).unwrap();
        let key = config.api_key().unwrap();
        assert_eq!(key.key_id(), "KEY123");

        let client = config.client().unwrap();
        assert_eq!(client.base_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn test_missing_key_file_names_path() {
        let toml = r#"
            [api_key]
            issuer_id = "issuer"
            key_id = "KEY123"
            private_key_path = "/nonexistent/notary/AuthKey.p8"
        "#;
        let config = NotaryConfig::from_toml(toml).unwrap();
        match config.api_key() {
            Err(ConfigError::Io { path, .. }) => {
                assert_eq!(path, PathBuf::from("/nonexistent/notary/AuthKey.p8"));
            },
            other => panic!("expected Io error, got {other:?}"),
        }
    }

    #[test]
    fn test_unset_key_variable() {
        let toml = r#"
            [api_key]
            issuer_id = "issuer"
            key_id = "KEY123"
            private_key_env = "NOTARY_CORE_TEST_UNSET_KEY_VARIABLE"
        "#;
        let config = NotaryConfig::from_toml(toml).unwrap();
        assert!(matches!(
            config.api_key(),
            Err(ConfigError::Validation(msg)) if msg.contains("NOTARY_CORE_TEST_UNSET_KEY_VARIABLE")
        ));
    }
}
