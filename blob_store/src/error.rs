//! Error types for configuration resolution and blob operations.

use std::path::PathBuf;

/// Errors raised while loading and validating an [`AzureBlobConfig`].
///
/// [`AzureBlobConfig`]: crate::AzureBlobConfig
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("malformed configuration: {source}")]
    MalformedConfig { source: anyhow::Error },

    #[error("failed to read configuration file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("container_name must be set")]
    MissingContainer,

    #[error("storage_account_name and storage_account_access_key must be provided")]
    MissingStaticCredentials,

    #[error(
        "can't use storage_account_name and storage_account_access_key with \
         {credentials_source} credentials_source"
    )]
    CredentialsConflict { credentials_source: &'static str },

    #[error("invalid credentials_source: {0}")]
    UnknownCredentialsSource(String),
}

/// Errors raised by [`BlobstoreClient`] operations.
///
/// A missing blob is never reported as an error by `remove` or `exists`.
/// `fetch` reports it as a plain [`BlobError::Transfer`].
///
/// [`BlobstoreClient`]: crate::BlobstoreClient
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BlobError {
    #[error("failed to build client for container {container}: {source}")]
    ClientBuild {
        container: String,
        source: object_store::Error,
    },

    #[error("transfer of blob {key} failed: {source}")]
    Transfer { key: String, source: anyhow::Error },

    #[error("request for blob {key} failed: {source}")]
    Request {
        key: String,
        source: object_store::Error,
    },

    #[error("operation on blob {key} was cancelled")]
    Cancelled { key: String },
}

impl BlobError {
    pub(crate) fn transfer(key: &str, source: impl Into<anyhow::Error>) -> Self {
        BlobError::Transfer {
            key: key.to_string(),
            source: source.into(),
        }
    }

    pub(crate) fn request(key: &str, source: object_store::Error) -> Self {
        BlobError::Request {
            key: key.to_string(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
