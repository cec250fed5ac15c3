//! Commands that inspect existing submissions.

use anyhow::{Context, Result};
use notary_core::api::{StatusReport, SubmissionSummary};
use notary_core::{NotaryApi, NotaryClient, PollOutcome, PollingConfig, StatusPoller};
use tracing::info;

use super::notarize::spawn_interrupt_handler;
use super::{EXIT_CANCELLED, EXIT_OK, exit_code, print_log_summary};

/// Prints the current status of one submission.
pub async fn status(client: &NotaryClient, id: &str) -> Result<u8> {
    let report = client
        .get_status(id)
        .await
        .with_context(|| format!("failed to get status of {id}"))?;
    print_report(&report);
    Ok(EXIT_OK)
}

/// Polls a submission in the background until it settles.
pub async fn wait(client: &NotaryClient, id: &str, polling: PollingConfig) -> Result<u8> {
    let poller =
        StatusPoller::new(client.clone(), polling).context("invalid polling configuration")?;
    let handle = poller.spawn(id);
    let _interrupt = spawn_interrupt_handler(handle.cancellation_token());

    let outcome = handle
        .join()
        .await
        .with_context(|| format!("failed to poll {id}"))?;

    match outcome {
        PollOutcome::Terminal(status) => {
            println!("Submission: {id}");
            println!("Status: {}", status.as_str());
            Ok(exit_code(Some(status)))
        },
        PollOutcome::TimedOut => {
            println!("Submission: {id}");
            println!("Status: no verdict before the deadline");
            Ok(exit_code(None))
        },
        PollOutcome::Cancelled => {
            info!(submission_id = %id, "polling cancelled");
            Ok(EXIT_CANCELLED)
        },
    }
}

/// Downloads and prints the log of one submission.
pub async fn log(client: &NotaryClient, id: &str, json: bool) -> Result<u8> {
    let log = client
        .get_log(id)
        .await
        .with_context(|| format!("failed to get log of {id}"))?;

    if json {
        let rendered = serde_json::to_string_pretty(&log).context("failed to serialize log")?;
        println!("{rendered}");
    } else {
        print_log_summary(&log);
    }
    Ok(EXIT_OK)
}

/// Lists previous submissions, most recent first.
pub async fn history(client: &NotaryClient, json: bool) -> Result<u8> {
    let summaries = client
        .list_previous_submissions()
        .await
        .context("failed to list submissions")?;

    if json {
        let rendered =
            serde_json::to_string_pretty(&summaries).context("failed to serialize submissions")?;
        println!("{rendered}");
    } else if summaries.is_empty() {
        println!("No submissions");
    } else {
        println!("{}", format_table(&summaries));
    }
    Ok(EXIT_OK)
}

fn print_report(report: &StatusReport) {
    println!("Submission: {}", report.id);
    if let Some(name) = &report.name {
        println!("Name: {name}");
    }
    if let Some(created) = &report.created_date {
        println!("Created: {created}");
    }
    println!("Status: {}", report.status.as_str());
}

fn format_table(summaries: &[SubmissionSummary]) -> String {
    let mut lines = vec![format!(
        "{:<38} {:<12} {:<26} {}",
        "ID", "STATUS", "CREATED", "NAME"
    )];
    for summary in summaries {
        lines.push(format!(
            "{:<38} {:<12} {:<26} {}",
            summary.id,
            summary.status.as_str(),
            summary.created_date.as_deref().unwrap_or("-"),
            summary.name.as_deref().unwrap_or("-"),
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use notary_core::SubmissionStatus;

    use super::*;

    #[test]
    fn test_format_table_keeps_order() {
        let summaries = vec![
            SubmissionSummary {
                id: "b".to_string(),
                name: Some("b.zip".to_string()),
                created_date: Some("2022-06-08T01:38:09.498Z".to_string()),
                status: SubmissionStatus::Rejected,
            },
            SubmissionSummary {
                id: "a".to_string(),
                name: None,
                created_date: None,
                status: SubmissionStatus::InProgress,
            },
        ];

        let table = format_table(&summaries);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("ID"));
        assert!(lines[1].starts_with('b'));
        assert!(lines[1].contains("Rejected"));
        assert!(lines[2].starts_with('a'));
        assert!(lines[2].contains("In Progress"));
        assert!(lines[2].ends_with('-'));
    }
}
