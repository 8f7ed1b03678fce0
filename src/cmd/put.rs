use std::path::PathBuf;

use anyhow::{Context, Result};
use blob_store::BlobstoreClient;
use clap::Args as ClapArgs;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::Status;

#[derive(Debug, ClapArgs)]
pub struct Args {
    /// Local file to upload
    local: PathBuf,

    /// Key of the blob in the container; replaced if it exists
    remote: String,
}

impl Args {
    pub async fn run(self, client: &BlobstoreClient, cancel: &CancellationToken) -> Result<Status> {
        let Self { local, remote } = self;

        let mut file = tokio::fs::File::open(&local)
            .await
            .with_context(|| format!("failed to open {}", local.display()))?;
        let size_bytes = client.store(cancel, &mut file, &remote).await?;

        info!(remote = %remote, local = %local.display(), size_bytes, "stored blob");
        Ok(Status::Success)
    }
}
