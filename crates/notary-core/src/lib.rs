//! Client for the notarization service.
//!
//! The crate submits an artifact for inspection, uploads it to the storage
//! location the service designates, polls until a verdict is reached, and
//! retrieves the structured log.
//!
//! # Modules
//!
//! - [`auth`]: per-request ES256 bearer tokens
//! - [`api`]: service endpoints ([`api::NotaryApi`], [`api::NotaryClient`])
//! - [`storage`]: artifact upload ([`storage::StorageUploader`], [`storage::S3Uploader`])
//! - [`artifact`]: extension validation and hashing
//! - [`poller`]: status polling with deadline, failure policy and cancellation
//! - [`notarize`]: the lifecycle orchestrator ([`notarize::Notarizer`])
//! - [`config`]: TOML configuration
//! - [`transport`]: shared HTTP timeouts and 5xx retry
//!
//! # Example
//!
//! ```rust,no_run
//! use notary_core::api::NotaryClient;
//! use notary_core::auth::ApiKey;
//! use notary_core::poller::PollingConfig;
//! use secrecy::SecretString;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let pem = std::fs::read_to_string("AuthKey_2X9R4HXF34.p8")?;
//! let key = ApiKey::new("issuer-uuid", "2X9R4HXF34", SecretString::from(pem))?;
//! let client = NotaryClient::new(key)?;
//!
//! let result = client.notarize("build/App.zip", &PollingConfig::default()).await?;
//! println!("{} -> {:?}", result.submission_id, result.status);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod artifact;
pub mod auth;
pub mod config;
pub mod notarize;
pub mod poller;
pub mod storage;
pub mod transport;

pub use api::{ApiError, LogDocument, NotaryApi, NotaryClient, SubmissionStatus};
pub use artifact::Artifact;
pub use config::{ConfigError, NotaryConfig};
pub use notarize::{NotarizationResult, Notarizer, NotaryError};
pub use poller::{PollOutcome, PollingConfig, StatusPoller};
