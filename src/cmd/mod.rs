use std::{path::PathBuf, process::ExitCode, time::Duration};

use anyhow::{Context, Result};
use blob_store::{AzureBlobConfig, BlobstoreClient};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

mod delete;
mod exists;
mod get;
mod put;

/// Arguments shared by every subcommand.
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Path to the blobstore JSON configuration file
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: PathBuf,

    /// Cancel the operation if it has not finished after this many seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Emit logs as JSON on stderr
    #[arg(long)]
    pub structured_logging: bool,
}

impl GlobalArgs {
    /// A token cancelled on Ctrl-C or when the `--timeout` deadline passes.
    fn cancellation_token(&self) -> CancellationToken {
        let cancel = CancellationToken::new();

        tokio::spawn({
            let cancel = cancel.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, cancelling operation");
                    cancel.cancel();
                }
            }
        });

        if let Some(timeout) = self.timeout {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(timeout)).await;
                warn!(timeout_secs = timeout, "deadline exceeded, cancelling operation");
                cancel.cancel();
            });
        }

        cancel
    }
}

/// How a successful command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    BlobMissing,
}

impl From<Status> for ExitCode {
    fn from(status: Status) -> Self {
        match status {
            Status::Success => ExitCode::SUCCESS,
            // BOSH blobstore CLIs report a missing blob with exit code 3.
            Status::BlobMissing => ExitCode::from(3),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Fetch a blob into a local file
    Get(get::Args),
    /// Upload a local file as a blob
    Put(put::Args),
    /// Delete a blob; succeeds if it does not exist
    Delete(delete::Args),
    /// Check whether a blob exists; exits with 3 if it does not
    Exists(exists::Args),
}

#[derive(Debug, Parser)]
#[command(name = "azure-blobstore-cli")]
#[command(version, about = "BOSH blobstore CLI for Azure Blob Storage", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global_args: GlobalArgs,
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub async fn run(self) -> Result<Status> {
        let config_path = &self.global_args.config;
        let config = AzureBlobConfig::from_path(config_path)
            .with_context(|| format!("invalid blobstore config {}", config_path.display()))?;
        debug!(?config, "loaded blobstore config");

        let client = BlobstoreClient::new(config)?;
        let cancel = self.global_args.cancellation_token();
        self.command.run(&client, &cancel).await
    }
}

impl Commands {
    pub async fn run(self, client: &BlobstoreClient, cancel: &CancellationToken) -> Result<Status> {
        match self {
            Commands::Get(args) => args.run(client, cancel).await,
            Commands::Put(args) => args.run(client, cancel).await,
            Commands::Delete(args) => args.run(client, cancel).await,
            Commands::Exists(args) => args.run(client, cancel).await,
        }
    }
}
