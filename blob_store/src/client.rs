//! Blob operations against an Azure Blob Storage container.

use std::{future::Future, sync::Arc};

use futures::StreamExt;
use object_store::{
    azure::{AzureConfigKey, MicrosoftAzureBuilder},
    path::Path,
    ClientConfigKey, ObjectStore, WriteMultipart,
};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::{io::ReaderStream, sync::CancellationToken};
use tracing::{debug, warn};

use crate::{AzureBlobConfig, BlobError, CredentialsSource};

const USER_AGENT: &str = "bosh-azureblobcli";

/// Fetches, stores, removes and checks blobs in the configured container.
pub struct BlobstoreClient {
    object_store: Arc<dyn ObjectStore>,
    config: AzureBlobConfig,
}

impl BlobstoreClient {
    /// Builds an Azure client for the container named in `config`.
    ///
    /// `static` signs requests with the configured account key, `none` sends
    /// them unsigned (the account name comes from `AZURE_STORAGE_ACCOUNT_NAME`)
    /// and `env_or_profile` leaves credential discovery to the `AZURE_*`
    /// environment.
    pub fn new(config: AzureBlobConfig) -> Result<Self, BlobError> {
        Self::with_environment(config, MicrosoftAzureBuilder::from_env())
    }

    /// Like [`BlobstoreClient::new`], but `none` and `env_or_profile` start
    /// from `environment` instead of the process environment. `static` ignores
    /// it so that ambient credentials never override the configured key.
    pub fn with_environment(
        config: AzureBlobConfig,
        environment: MicrosoftAzureBuilder,
    ) -> Result<Self, BlobError> {
        let builder = match config.credentials_source() {
            CredentialsSource::Static => MicrosoftAzureBuilder::new()
                .with_account(config.storage_account_name())
                .with_access_key(config.storage_account_access_key()),
            CredentialsSource::None => environment.with_skip_signature(true),
            CredentialsSource::EnvOrProfile => environment,
        };

        let object_store = builder
            .with_container_name(config.container_name())
            .with_config(AzureConfigKey::Client(ClientConfigKey::UserAgent), USER_AGENT)
            .build()
            .map_err(|source| BlobError::ClientBuild {
                container: config.container_name().to_string(),
                source,
            })?;

        debug!(
            container = %config.container_name(),
            credentials_source = %config.credentials_source(),
            "created azure blobstore client"
        );

        Ok(Self::from_object_store(Arc::new(object_store), config))
    }

    /// Wraps an already built object store, e.g. a local or in-memory one.
    pub fn from_object_store(object_store: Arc<dyn ObjectStore>, config: AzureBlobConfig) -> Self {
        Self {
            object_store,
            config,
        }
    }

    pub fn config(&self) -> &AzureBlobConfig {
        &self.config
    }

    /// Streams the blob at `key` into `dest` and returns the bytes written.
    ///
    /// A missing blob is reported as a [`BlobError::Transfer`] like any other
    /// failure; callers cannot tell it apart from a network error.
    pub async fn fetch<W>(
        &self,
        cancel: &CancellationToken,
        key: &str,
        dest: &mut W,
    ) -> Result<u64, BlobError>
    where
        W: AsyncWrite + Unpin,
    {
        debug!(container = %self.config.container_name(), key, "fetching blob");
        let location = Path::from(key);
        cancellable(cancel, key, async move {
            let result = self
                .object_store
                .get(&location)
                .await
                .map_err(|e| BlobError::transfer(key, e))?;

            let mut stream = result.into_stream();
            let mut size_bytes = 0;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| BlobError::transfer(key, e))?;
                dest.write_all(&chunk)
                    .await
                    .map_err(|e| BlobError::transfer(key, e))?;
                size_bytes += chunk.len() as u64;
            }
            dest.flush().await.map_err(|e| BlobError::transfer(key, e))?;
            Ok(size_bytes)
        })
        .await
    }

    /// Uploads everything read from `source` to `key`, replacing any existing
    /// blob, and returns the bytes uploaded.
    ///
    /// The data is sent in blocks of the configured size with at most the
    /// configured number of blocks in flight.
    pub async fn store<R>(
        &self,
        cancel: &CancellationToken,
        source: &mut R,
        key: &str,
    ) -> Result<u64, BlobError>
    where
        R: AsyncRead + Unpin,
    {
        let block_size = self.config.block_size();
        let parallelism = self.config.parallelism();
        debug!(
            container = %self.config.container_name(),
            key,
            block_size,
            parallelism,
            "storing blob"
        );
        let location = Path::from(key);
        cancellable(cancel, key, async move {
            let upload = self
                .object_store
                .put_multipart(&location)
                .await
                .map_err(|e| BlobError::transfer(key, e))?;
            let mut writer = WriteMultipart::new_with_chunk_size(upload, block_size);

            match write_blocks(&mut writer, source, parallelism).await {
                Ok(size_bytes) => {
                    writer
                        .finish()
                        .await
                        .map_err(|e| BlobError::transfer(key, e))?;
                    Ok(size_bytes)
                }
                Err(e) => {
                    if let Err(abort_err) = writer.abort().await {
                        warn!(key, "failed to abort multipart upload: {}", abort_err);
                    }
                    Err(BlobError::transfer(key, e))
                }
            }
        })
        .await
    }

    /// Deletes the blob at `key`. Deleting a blob that does not exist succeeds.
    pub async fn remove(&self, cancel: &CancellationToken, key: &str) -> Result<(), BlobError> {
        debug!(container = %self.config.container_name(), key, "removing blob");
        let location = Path::from(key);
        cancellable(cancel, key, async move {
            match self.object_store.delete(&location).await {
                Ok(()) => Ok(()),
                Err(e) if is_not_found(&e) => {
                    debug!(key, "blob already absent");
                    Ok(())
                }
                Err(e) => Err(BlobError::request(key, e)),
            }
        })
        .await
    }

    /// Reports whether a blob exists at `key`.
    pub async fn exists(&self, cancel: &CancellationToken, key: &str) -> Result<bool, BlobError> {
        debug!(container = %self.config.container_name(), key, "checking blob");
        let location = Path::from(key);
        cancellable(cancel, key, async move {
            match self.object_store.head(&location).await {
                Ok(_) => Ok(true),
                Err(e) if is_not_found(&e) => Ok(false),
                Err(e) => Err(BlobError::request(key, e)),
            }
        })
        .await
    }
}

/// The single place where a "blob does not exist" failure is recognised.
fn is_not_found(err: &object_store::Error) -> bool {
    matches!(err, object_store::Error::NotFound { .. })
}

async fn write_blocks<R>(
    writer: &mut WriteMultipart,
    source: &mut R,
    parallelism: usize,
) -> anyhow::Result<u64>
where
    R: AsyncRead + Unpin,
{
    // WriteMultipart groups the reads into `block_size` parts.
    let mut blocks = ReaderStream::new(source);
    let mut size_bytes = 0;
    while let Some(block) = blocks.next().await {
        let block = block?;
        writer.wait_for_capacity(parallelism).await?;
        size_bytes += block.len() as u64;
        writer.write(&block);
    }
    Ok(size_bytes)
}

async fn cancellable<T>(
    cancel: &CancellationToken,
    key: &str,
    op: impl Future<Output = Result<T, BlobError>>,
) -> Result<T, BlobError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(BlobError::Cancelled {
            key: key.to_string(),
        }),
        result = op => result,
    }
}
