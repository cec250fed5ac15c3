//! `notary notarize`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use notary_core::{NotarizationResult, NotaryClient, NotaryError, PollingConfig};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{EXIT_CANCELLED, exit_code, print_log_summary, with_timeout};

/// Arguments of `notary notarize`.
#[derive(Args, Debug)]
pub struct NotarizeArgs {
    /// Artifact to notarize (.zip or .dmg)
    pub file: PathBuf,

    /// Overall polling deadline in seconds (defaults to the configured value)
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Runs a full notarization and prints the verdict.
///
/// Ctrl-C stops polling; the submission keeps running on the service side.
pub async fn run(
    client: &NotaryClient,
    args: &NotarizeArgs,
    polling: PollingConfig,
) -> Result<u8> {
    let polling = with_timeout(polling, args.timeout_secs);
    let cancel = CancellationToken::new();
    let _interrupt = spawn_interrupt_handler(cancel.clone());

    let result = match client
        .notarizer()
        .notarize_with_cancellation(&args.file, &polling, cancel)
        .await
    {
        Ok(result) => result,
        Err(NotaryError::Cancelled { submission_id }) => {
            eprintln!("Cancelled; submission {submission_id} is still being processed");
            return Ok(EXIT_CANCELLED);
        },
        Err(error) => {
            return Err(error)
                .with_context(|| format!("failed to notarize {}", args.file.display()));
        },
    };

    if args.json {
        println!("{}", render_json(&result)?);
    } else {
        print_result(&result);
    }

    Ok(exit_code(result.status))
}

/// Cancels `token` on the first Ctrl-C. Aborted when the guard drops.
pub(crate) fn spawn_interrupt_handler(token: CancellationToken) -> AbortOnDrop {
    AbortOnDrop(tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("interrupt received, stopping");
                token.cancel();
            },
            Err(error) => warn!(error = %error, "failed to listen for interrupt"),
        }
    }))
}

/// Aborts the wrapped task when dropped.
pub(crate) struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn render_json(result: &NotarizationResult) -> Result<String> {
    let (log, log_error) = match &result.log {
        Ok(log) => (Some(log), None),
        Err(error) => (None, Some(error.to_string())),
    };
    let value = json!({
        "submission_id": result.submission_id,
        "status": result.status,
        "timed_out": result.timed_out(),
        "log": log,
        "log_error": log_error,
    });
    serde_json::to_string_pretty(&value).context("failed to serialize result")
}

fn print_result(result: &NotarizationResult) {
    println!("Submission: {}", result.submission_id);
    match result.status {
        Some(status) => println!("Status: {}", status.as_str()),
        None => println!("Status: no verdict before the deadline"),
    }
    match &result.log {
        Ok(log) => print_log_summary(log),
        Err(error) => println!("Log unavailable: {error}"),
    }
}
