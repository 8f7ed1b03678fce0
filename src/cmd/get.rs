use std::path::PathBuf;

use anyhow::{Context, Result};
use blob_store::BlobstoreClient;
use clap::Args as ClapArgs;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::Status;

#[derive(Debug, ClapArgs)]
pub struct Args {
    /// Key of the blob in the container
    remote: String,

    /// Local file to write the blob to; replaced if it exists
    local: PathBuf,
}

impl Args {
    pub async fn run(self, client: &BlobstoreClient, cancel: &CancellationToken) -> Result<Status> {
        let Self { remote, local } = self;

        let mut file = tokio::fs::File::create(&local)
            .await
            .with_context(|| format!("failed to create {}", local.display()))?;
        let size_bytes = client.fetch(cancel, &remote, &mut file).await?;

        info!(remote = %remote, local = %local.display(), size_bytes, "fetched blob");
        Ok(Status::Success)
    }
}
