//! Command implementations.
//!
//! Commands return a process exit code; errors bubble up through `anyhow`
//! and exit with status 1.

pub mod notarize;
pub mod submissions;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use notary_core::api::SubmissionStatus;
use notary_core::{LogDocument, NotaryConfig, PollingConfig};

/// Accepted, or a command without a verdict succeeded.
pub const EXIT_OK: u8 = 0;

/// The service returned `Invalid` or `Rejected`.
pub const EXIT_REJECTED: u8 = 2;

/// Polling ended without a verdict.
pub const EXIT_TIMED_OUT: u8 = 3;

/// Interrupted by the user.
pub const EXIT_CANCELLED: u8 = 130;

/// Loads the configuration file.
pub fn load_config(path: &Path) -> Result<NotaryConfig> {
    NotaryConfig::from_file(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

/// Overrides the polling deadline when `timeout_secs` is set.
pub fn with_timeout(polling: PollingConfig, timeout_secs: Option<u64>) -> PollingConfig {
    match timeout_secs {
        Some(secs) => PollingConfig {
            timeout: Duration::from_secs(secs),
            ..polling
        },
        None => polling,
    }
}

/// Exit code for a polling verdict; `None` means timed out.
pub const fn exit_code(status: Option<SubmissionStatus>) -> u8 {
    match status {
        Some(SubmissionStatus::Accepted) => EXIT_OK,
        Some(SubmissionStatus::Invalid | SubmissionStatus::Rejected) => EXIT_REJECTED,
        Some(SubmissionStatus::InProgress | SubmissionStatus::Unknown) | None => EXIT_TIMED_OUT,
    }
}

/// Prints the human readable part of a log document.
pub fn print_log_summary(log: &LogDocument) {
    let Some(v1) = log.as_v1() else {
        println!("log format version {}", log.version());
        return;
    };

    if let Some(summary) = &v1.status_summary {
        println!("Summary: {summary}");
    }
    if let Some(archive) = &v1.archive_filename {
        println!("Archive: {archive}");
    }
    if !v1.ticket_contents.is_empty() {
        println!("Ticket entries: {}", v1.ticket_contents.len());
    }
    if v1.issues.is_empty() {
        println!("Issues: none");
        return;
    }

    println!("Issues:");
    for issue in &v1.issues {
        println!(
            "  [{}] {}{}",
            issue.severity.as_deref().unwrap_or("unknown"),
            issue.message.as_deref().unwrap_or("(no message)"),
            issue
                .path
                .as_deref()
                .map(|path| format!(" ({path})"))
                .unwrap_or_default()
        );
        if let Some(url) = &issue.doc_url {
            println!("      {url}");
        }
    }
}
