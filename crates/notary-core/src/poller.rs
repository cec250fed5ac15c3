//! Status polling.
//!
//! The poller asks for the submission status until the service reports a
//! terminal verdict, the overall deadline passes, or the caller cancels.
//!
//! # Deadline handling
//!
//! The deadline is tracked internally rather than by wrapping the loop in
//! `tokio::time::timeout`: a status request is never raced against it. Only
//! the wait between requests is raced against the deadline and the
//! cancellation token, so
//!
//! - at least one status request is always made, and
//! - a terminal status returned by a request that finished after the
//!   deadline is still reported as terminal.
//!
//! # Failure policy
//!
//! | Failure | Flag | Action when set |
//! |---------|------|-----------------|
//! | 5xx answer | `ignore_server_error` | wait `retry_delay_after_failure` |
//! | transport timeout | `ignore_timeout_errors` | wait `retry_delay_after_failure` |
//! | anything else | | fail |

use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::{ApiError, FailureClass, NotaryApi, SubmissionStatus};

/// Default overall deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Default wait between status requests.
pub const DEFAULT_POLLING_PERIOD: Duration = Duration::from_secs(30);

/// Default wait after an ignored failure.
pub const DEFAULT_RETRY_DELAY_AFTER_FAILURE: Duration = Duration::from_secs(5 * 60);

/// Polling policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingConfig {
    /// Overall deadline, measured from the first status request.
    pub timeout: Duration,
    /// Wait after a non-terminal status.
    pub polling_period: Duration,
    /// Keep polling after a 5xx answer.
    pub ignore_server_error: bool,
    /// Keep polling after a transport timeout.
    pub ignore_timeout_errors: bool,
    /// Wait after an ignored failure.
    pub retry_delay_after_failure: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            polling_period: DEFAULT_POLLING_PERIOD,
            ignore_server_error: true,
            ignore_timeout_errors: true,
            retry_delay_after_failure: DEFAULT_RETRY_DELAY_AFTER_FAILURE,
        }
    }
}

/// A polling configuration value was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid polling configuration: {field} {reason}")]
pub struct InvalidPollingConfig {
    /// Offending field.
    pub field: &'static str,
    /// Why it was rejected.
    pub reason: &'static str,
}

impl PollingConfig {
    /// Checks that every period is non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPollingConfig`] naming the first zero period.
    pub fn validate(&self) -> Result<(), InvalidPollingConfig> {
        let periods = [
            ("timeout", self.timeout),
            ("polling_period", self.polling_period),
            ("retry_delay_after_failure", self.retry_delay_after_failure),
        ];
        for (field, value) in periods {
            if value.is_zero() {
                return Err(InvalidPollingConfig {
                    field,
                    reason: "must be greater than zero",
                });
            }
        }
        Ok(())
    }
}

/// How a polling run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The service reported a terminal status.
    Terminal(SubmissionStatus),
    /// The deadline passed while waiting.
    TimedOut,
    /// The cancellation token fired while waiting.
    Cancelled,
}

/// Polls one submission until it settles.
#[derive(Debug, Clone)]
pub struct StatusPoller<A> {
    api: A,
    config: PollingConfig,
}

impl<A: NotaryApi> StatusPoller<A> {
    /// Creates a poller.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPollingConfig`] when `config` has a zero period.
    pub fn new(api: A, config: PollingConfig) -> Result<Self, InvalidPollingConfig> {
        config.validate()?;
        Ok(Self { api, config })
    }

    /// Runs the polling loop in the current task.
    ///
    /// # Errors
    ///
    /// Returns the first [`ApiError`] the policy does not absorb.
    pub async fn poll(
        &self,
        submission_id: &str,
        cancel: &CancellationToken,
    ) -> Result<PollOutcome, ApiError> {
        poll_submission(&self.api, submission_id, &self.config, cancel).await
    }
}

impl<A: NotaryApi + 'static> StatusPoller<A> {
    /// Runs the polling loop as a background task.
    #[must_use]
    pub fn spawn(self, submission_id: impl Into<String>) -> PollHandle {
        let submission_id = submission_id.into();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move { self.poll(&submission_id, &token).await });
        PollHandle { cancel, task }
    }
}

/// Failure of a background polling task.
#[derive(Debug, Error)]
pub enum PollError {
    /// The loop stopped on an API error.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The task panicked or was aborted.
    #[error("polling task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Handle to a background polling task.
#[derive(Debug)]
pub struct PollHandle {
    cancel: CancellationToken,
    task: JoinHandle<Result<PollOutcome, ApiError>>,
}

impl PollHandle {
    /// Asks the task to stop at its next wait.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this task.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Waits for the task to finish.
    ///
    /// # Errors
    ///
    /// Returns [`PollError`] when the loop failed or the task did not
    /// complete.
    pub async fn join(self) -> Result<PollOutcome, PollError> {
        Ok(self.task.await??)
    }
}

/// Polls `submission_id` with `config` until it settles.
///
/// # Errors
///
/// Returns the first [`ApiError`] the policy does not absorb.
pub async fn poll_submission<A: NotaryApi + ?Sized>(
    api: &A,
    submission_id: &str,
    config: &PollingConfig,
    cancel: &CancellationToken,
) -> Result<PollOutcome, ApiError> {
    let started = Instant::now();
    // A timeout too large to represent means no deadline.
    let deadline = started.checked_add(config.timeout);
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let delay = match api.get_status(submission_id).await {
            Ok(report) if report.status.is_terminal() => {
                info!(
                    submission_id = %submission_id,
                    status = %report.status,
                    attempt,
                    elapsed_secs = started.elapsed().as_secs(),
                    "submission reached terminal status"
                );
                return Ok(PollOutcome::Terminal(report.status));
            },
            Ok(report) => {
                if report.status == SubmissionStatus::InProgress {
                    info!(submission_id = %submission_id, attempt, "submission in progress");
                } else {
                    warn!(
                        submission_id = %submission_id,
                        attempt,
                        status = %report.status,
                        "submission status not recognized, continuing to poll"
                    );
                }
                config.polling_period
            },
            Err(error) => {
                let ignored = match error.failure_class() {
                    FailureClass::ServerError => config.ignore_server_error,
                    FailureClass::Timeout => config.ignore_timeout_errors,
                    FailureClass::Fatal => false,
                };
                if !ignored {
                    return Err(error);
                }
                warn!(
                    submission_id = %submission_id,
                    attempt,
                    error = %error,
                    delay_secs = config.retry_delay_after_failure.as_secs(),
                    "status request failed, retrying"
                );
                config.retry_delay_after_failure
            },
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                info!(submission_id = %submission_id, "polling cancelled");
                return Ok(PollOutcome::Cancelled);
            }
            () = wait_for_deadline(deadline) => {
                warn!(
                    submission_id = %submission_id,
                    timeout_secs = config.timeout.as_secs(),
                    "polling deadline exceeded"
                );
                return Ok(PollOutcome::TimedOut);
            }
            () = tokio::time::sleep(delay) => {}
        }
    }
}

async fn wait_for_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;
    use crate::api::{
        LogDocument, LogPointer, NewSubmissionRequest, NewSubmissionResponse, StatusReport,
        SubmissionSummary,
    };

    /// Answers status requests from a script, then reports `In Progress`.
    struct ScriptedStatus {
        script: Mutex<VecDeque<Result<SubmissionStatus, ApiError>>>,
        calls: AtomicUsize,
        latency: Duration,
    }

    impl ScriptedStatus {
        fn new(script: Vec<Result<SubmissionStatus, ApiError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
                latency: Duration::ZERO,
            }
        }

        fn with_latency(mut self, latency: Duration) -> Self {
            self.latency = latency;
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NotaryApi for ScriptedStatus {
        async fn submit(
            &self,
            _request: &NewSubmissionRequest,
        ) -> Result<NewSubmissionResponse, ApiError> {
            unimplemented!("not used by the poller")
        }

        async fn get_status(&self, submission_id: &str) -> Result<StatusReport, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(SubmissionStatus::InProgress));
            next.map(|status| StatusReport {
                id: submission_id.to_string(),
                status,
                created_date: None,
                name: None,
            })
        }

        async fn get_log_pointer(&self, _submission_id: &str) -> Result<LogPointer, ApiError> {
            unimplemented!("not used by the poller")
        }

        async fn fetch_log(&self, _pointer: &LogPointer) -> Result<LogDocument, ApiError> {
            unimplemented!("not used by the poller")
        }

        async fn list_previous_submissions(&self) -> Result<Vec<SubmissionSummary>, ApiError> {
            unimplemented!("not used by the poller")
        }
    }

    fn server_error() -> ApiError {
        ApiError::from_status(503, b"")
    }

    fn timeout_error() -> ApiError {
        ApiError::Timeout {
            url: "https://appstoreconnect.apple.com/notary/v2/submissions/id".to_string(),
            message: "operation timed out".to_string(),
        }
    }

    #[test]
    fn test_default_policy() {
        let config = PollingConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(3600));
        assert_eq!(config.polling_period, Duration::from_secs(30));
        assert_eq!(config.retry_delay_after_failure, Duration::from_secs(300));
        assert!(config.ignore_server_error);
        assert!(config.ignore_timeout_errors);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_periods() {
        let config = PollingConfig {
            polling_period: Duration::ZERO,
            ..PollingConfig::default()
        };
        assert_eq!(config.validate().unwrap_err().field, "polling_period");

        let config = PollingConfig {
            timeout: Duration::ZERO,
            ..PollingConfig::default()
        };
        assert_eq!(config.validate().unwrap_err().field, "timeout");
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_one_period_per_non_terminal_status() {
        let api = ScriptedStatus::new(vec![
            Ok(SubmissionStatus::InProgress),
            Ok(SubmissionStatus::InProgress),
            Ok(SubmissionStatus::Accepted),
        ]);
        let started = Instant::now();

        let outcome = poll_submission(
            &api,
            "sub-1",
            &PollingConfig::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, PollOutcome::Terminal(SubmissionStatus::Accepted));
        assert_eq!(api.calls(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_status_keeps_polling() {
        let api = ScriptedStatus::new(vec![
            Ok(SubmissionStatus::Unknown),
            Ok(SubmissionStatus::Invalid),
        ]);

        let outcome = poll_submission(
            &api,
            "sub-1",
            &PollingConfig::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, PollOutcome::Terminal(SubmissionStatus::Invalid));
        assert_eq!(api.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignored_server_error_waits_retry_delay() {
        let api = ScriptedStatus::new(vec![Err(server_error()), Ok(SubmissionStatus::Accepted)]);
        let started = Instant::now();

        let outcome = poll_submission(
            &api,
            "sub-1",
            &PollingConfig::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, PollOutcome::Terminal(SubmissionStatus::Accepted));
        assert_eq!(started.elapsed(), DEFAULT_RETRY_DELAY_AFTER_FAILURE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_propagates_when_not_ignored() {
        let api = ScriptedStatus::new(vec![Err(server_error()), Ok(SubmissionStatus::Accepted)]);
        let config = PollingConfig {
            ignore_server_error: false,
            ..PollingConfig::default()
        };
        let started = Instant::now();

        let error = poll_submission(&api, "sub-1", &config, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(error.status_code(), Some(503));
        assert_eq!(api.calls(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_error_follows_its_own_flag() {
        let config = PollingConfig {
            ignore_server_error: true,
            ignore_timeout_errors: false,
            ..PollingConfig::default()
        };
        let api = ScriptedStatus::new(vec![Err(timeout_error())]);
        let error = poll_submission(&api, "sub-1", &config, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(error, ApiError::Timeout { .. }));

        let config = PollingConfig {
            ignore_timeout_errors: true,
            ..config
        };
        let api = ScriptedStatus::new(vec![Err(timeout_error()), Ok(SubmissionStatus::Rejected)]);
        let outcome = poll_submission(&api, "sub-1", &config, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Terminal(SubmissionStatus::Rejected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_errors_are_never_ignored() {
        let api = ScriptedStatus::new(vec![Err(ApiError::from_status(401, b""))]);
        let error = poll_submission(
            &api,
            "sub-1",
            &PollingConfig::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(error.status_code(), Some(401));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_ends_wait() {
        let api = ScriptedStatus::new(Vec::new());
        let config = PollingConfig {
            timeout: Duration::from_secs(100),
            ..PollingConfig::default()
        };
        let started = Instant::now();

        let outcome = poll_submission(&api, "sub-1", &config, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::TimedOut);
        assert_eq!(started.elapsed(), Duration::from_secs(100));
        // Requests at 0, 30, 60 and 90 seconds.
        assert_eq!(api.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_timeout_means_no_deadline() {
        for timeout in [Duration::MAX, Duration::from_secs(u64::MAX)] {
            let api = ScriptedStatus::new(vec![
                Ok(SubmissionStatus::InProgress),
                Ok(SubmissionStatus::InProgress),
                Ok(SubmissionStatus::Accepted),
            ]);
            let config = PollingConfig {
                timeout,
                ..PollingConfig::default()
            };
            config.validate().unwrap();

            let outcome = poll_submission(&api, "sub-1", &config, &CancellationToken::new())
                .await
                .unwrap();

            assert_eq!(outcome, PollOutcome::Terminal(SubmissionStatus::Accepted));
            assert_eq!(api.calls(), 3);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_is_made_even_with_tiny_timeout() {
        let api = ScriptedStatus::new(Vec::new());
        let config = PollingConfig {
            timeout: Duration::from_millis(1),
            ..PollingConfig::default()
        };

        let outcome = poll_submission(&api, "sub-1", &config, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::TimedOut);
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_after_deadline_is_reported() {
        let api = ScriptedStatus::new(vec![Ok(SubmissionStatus::Accepted)])
            .with_latency(Duration::from_secs(10));
        let config = PollingConfig {
            timeout: Duration::from_secs(1),
            ..PollingConfig::default()
        };

        let outcome = poll_submission(&api, "sub-1", &config, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::Terminal(SubmissionStatus::Accepted));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_poller_can_be_cancelled() {
        let api = Arc::new(ScriptedStatus::new(Vec::new()));
        let poller = StatusPoller::new(Arc::clone(&api), PollingConfig::default()).unwrap();
        let handle = poller.spawn("sub-1");

        tokio::time::sleep(Duration::from_secs(45)).await;
        handle.cancel();

        assert_eq!(handle.join().await.unwrap(), PollOutcome::Cancelled);
        assert_eq!(api.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_poller_reports_api_error() {
        let api = Arc::new(ScriptedStatus::new(vec![Err(ApiError::from_status(
            404, b"",
        ))]));
        let handle = StatusPoller::new(api, PollingConfig::default())
            .unwrap()
            .spawn("missing");

        assert!(matches!(
            handle.join().await,
            Err(PollError::Api(ApiError::Status { status: 404, .. }))
        ));
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = PollingConfig {
            retry_delay_after_failure: Duration::ZERO,
            ..PollingConfig::default()
        };
        assert!(StatusPoller::new(ScriptedStatus::new(Vec::new()), config).is_err());
    }
}
