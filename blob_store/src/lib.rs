//! Azure Blob Storage adapter for the BOSH blobstore CLI.
//!
//! A JSON payload is resolved into an [`AzureBlobConfig`], whose credentials
//! mode decides how the [`BlobstoreClient`] authenticates:
//!
//! - `static`: account name and access key from the configuration
//! - `env_or_profile`: credentials discovered from the environment
//! - `none`: anonymous, read-only access to public containers
//!
//! ```rust,no_run
//! use blob_store::{AzureBlobConfig, BlobstoreClient};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = AzureBlobConfig::from_path("/var/vcap/jobs/director/config/blobstore.json")?;
//! let client = BlobstoreClient::new(config)?;
//! let cancel = CancellationToken::new();
//!
//! if !client.exists(&cancel, "package-blob-id").await? {
//!     let mut tarball = tokio::fs::File::open("package.tgz").await?;
//!     client.store(&cancel, &mut tarball, "package-blob-id").await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Transfers, retries and chunked uploads are handled by [`object_store`].

mod client;
mod config;
mod error;

pub use client::BlobstoreClient;
pub use config::{
    AzureBlobConfig, CredentialsSource, DEFAULT_BLOCK_SIZE, DEFAULT_PARALLELISM, MAX_BLOCK_SIZE,
};
pub use error::{BlobError, ConfigError};
