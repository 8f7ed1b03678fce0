use anyhow::Result;
use blob_store::BlobstoreClient;
use clap::Args as ClapArgs;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::Status;

#[derive(Debug, ClapArgs)]
pub struct Args {
    /// Key of the blob in the container
    remote: String,
}

impl Args {
    pub async fn run(self, client: &BlobstoreClient, cancel: &CancellationToken) -> Result<Status> {
        client.remove(cancel, &self.remote).await?;
        info!(remote = %self.remote, "deleted blob");
        Ok(Status::Success)
    }
}
