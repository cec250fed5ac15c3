//! notary - notarization service client
//!
//! Submits artifacts for notarization and inspects previous submissions.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;

/// notary - notarization service client
#[derive(Parser, Debug)]
#[command(name = "notary")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "notary.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Submit an artifact and wait for the verdict
    Notarize(commands::notarize::NotarizeArgs),

    /// Show the current status of a submission
    Status {
        /// Submission id
        id: String,
    },

    /// Poll a submission until it reaches a verdict
    Wait {
        /// Submission id
        id: String,

        /// Overall deadline in seconds (defaults to the configured value)
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Download and print the log of a submission
    Log {
        /// Submission id
        id: String,

        /// Print the raw log document as JSON
        #[arg(long)]
        json: bool,
    },

    /// List previous submissions
    #[command(alias = "ls")]
    History {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = commands::load_config(&cli.config)?;
    let client = config
        .client()
        .with_context(|| format!("failed to set up client from {}", cli.config.display()))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    let command = cli.command;
    let exit_code = runtime.block_on(async move {
        match command {
            Commands::Notarize(args) => {
                commands::notarize::run(&client, &args, config.polling_config()).await
            },
            Commands::Status { id } => commands::submissions::status(&client, &id).await,
            Commands::Wait { id, timeout_secs } => {
                let polling = commands::with_timeout(config.polling_config(), timeout_secs);
                commands::submissions::wait(&client, &id, polling).await
            },
            Commands::Log { id, json } => commands::submissions::log(&client, &id, json).await,
            Commands::History { json } => commands::submissions::history(&client, json).await,
        }
    })?;

    if exit_code != commands::EXIT_OK {
        std::process::exit(i32::from(exit_code));
    }
    Ok(())
}
