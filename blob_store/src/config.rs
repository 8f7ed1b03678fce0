//! Blobstore configuration and credentials-mode resolution.

use std::{fmt, path::Path};

use figment::{
    providers::{Format, Json},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Block size used for uploads when the configuration leaves it at zero.
pub const DEFAULT_BLOCK_SIZE: u64 = 4 * 1024 * 1024;

/// Largest block Azure accepts in a single Put Block request.
pub const MAX_BLOCK_SIZE: u64 = 4000 * 1024 * 1024;

/// Concurrent block uploads when the configuration leaves it at zero.
pub const DEFAULT_PARALLELISM: u16 = 16;

/// How the client authenticates against the storage account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialsSource {
    /// `storage_account_name` and `storage_account_access_key` from the
    /// configuration.
    Static,
    /// Credentials discovered from `AZURE_*` environment variables or a
    /// managed identity.
    EnvOrProfile,
    /// Anonymous access; only public containers can be read.
    None,
}

impl CredentialsSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialsSource::Static => "static",
            CredentialsSource::EnvOrProfile => "env_or_profile",
            CredentialsSource::None => "none",
        }
    }
}

impl fmt::Display for CredentialsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The payload as written by the operator, before any validation.
///
/// Absent and `null` fields both mean "unset".
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    storage_account_name: Option<String>,
    storage_account_access_key: Option<String>,
    container_name: Option<String>,
    credentials_source: Option<String>,
    block_size: Option<u64>,
    parallelism: Option<u16>,
}

/// Validated blobstore configuration.
///
/// Only [`AzureBlobConfig::resolve`] builds one, so a value of this type
/// always has a container name and credentials consistent with its
/// [`CredentialsSource`].
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct AzureBlobConfig {
    storage_account_name: String,
    storage_account_access_key: String,
    container_name: String,
    credentials_source: CredentialsSource,
    block_size: u64,
    parallelism: u16,
}

impl AzureBlobConfig {
    /// Reads and resolves the JSON configuration file at `path`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let payload = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::resolve(&payload)
    }

    /// Parses a JSON payload and resolves its credentials mode.
    ///
    /// An empty or absent `credentials_source` is inferred from the
    /// credentials present: both fields give `static`, neither gives `none`,
    /// and exactly one of them is rejected.
    pub fn resolve(payload: &[u8]) -> Result<Self, ConfigError> {
        let payload = std::str::from_utf8(payload).map_err(|e| ConfigError::MalformedConfig {
            source: anyhow::Error::from(e),
        })?;
        let raw: RawConfig = Figment::new()
            .merge(Json::string(payload))
            .extract()
            .map_err(malformed)?;

        let container_name = raw.container_name.unwrap_or_default();
        if container_name.is_empty() {
            return Err(ConfigError::MissingContainer);
        }

        let storage_account_name = raw.storage_account_name.unwrap_or_default();
        let storage_account_access_key = raw.storage_account_access_key.unwrap_or_default();
        let credentials_source = resolve_credentials_source(
            raw.credentials_source.as_deref().unwrap_or_default(),
            &storage_account_name,
            &storage_account_access_key,
        )?;

        Ok(AzureBlobConfig {
            storage_account_name,
            storage_account_access_key,
            container_name,
            credentials_source,
            block_size: raw.block_size.unwrap_or_default(),
            parallelism: raw.parallelism.unwrap_or_default(),
        })
    }

    pub fn storage_account_name(&self) -> &str {
        &self.storage_account_name
    }

    pub fn storage_account_access_key(&self) -> &str {
        &self.storage_account_access_key
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    pub fn credentials_source(&self) -> CredentialsSource {
        self.credentials_source
    }

    /// Upload block size in bytes, falling back to [`DEFAULT_BLOCK_SIZE`] and
    /// capped at [`MAX_BLOCK_SIZE`].
    pub fn block_size(&self) -> usize {
        let block_size = match self.block_size {
            0 => DEFAULT_BLOCK_SIZE,
            n => n.min(MAX_BLOCK_SIZE),
        };
        usize::try_from(block_size).unwrap_or(usize::MAX)
    }

    /// Maximum blocks in flight during an upload, falling back to
    /// [`DEFAULT_PARALLELISM`].
    pub fn parallelism(&self) -> usize {
        match self.parallelism {
            0 => DEFAULT_PARALLELISM as usize,
            n => n as usize,
        }
    }
}

// Keeps the access key out of logs.
impl fmt::Debug for AzureBlobConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = if self.storage_account_access_key.is_empty() {
            ""
        } else {
            "<redacted>"
        };
        f.debug_struct("AzureBlobConfig")
            .field("storage_account_name", &self.storage_account_name)
            .field("storage_account_access_key", &key)
            .field("container_name", &self.container_name)
            .field("credentials_source", &self.credentials_source)
            .field("block_size", &self.block_size)
            .field("parallelism", &self.parallelism)
            .finish()
    }
}

// Reports the field name alone; figment's own message prefixes it with the
// profile ("default.container_name").
fn malformed(err: figment::Error) -> ConfigError {
    let source = if err.path.is_empty() {
        anyhow::anyhow!("{}", err.kind)
    } else {
        anyhow::anyhow!("{} for field `{}`", err.kind, err.path.join("."))
    };
    ConfigError::MalformedConfig { source }
}

fn resolve_credentials_source(
    literal: &str,
    account_name: &str,
    access_key: &str,
) -> Result<CredentialsSource, ConfigError> {
    let has_name = !account_name.is_empty();
    let has_key = !access_key.is_empty();

    match literal {
        "static" => {
            if has_name && has_key {
                Ok(CredentialsSource::Static)
            } else {
                Err(ConfigError::MissingStaticCredentials)
            }
        }
        "env_or_profile" | "none" => {
            let source = if literal == "none" {
                CredentialsSource::None
            } else {
                CredentialsSource::EnvOrProfile
            };
            if has_name || has_key {
                Err(ConfigError::CredentialsConflict {
                    credentials_source: source.as_str(),
                })
            } else {
                Ok(source)
            }
        }
        "" => match (has_name, has_key) {
            (true, true) => Ok(CredentialsSource::Static),
            (false, false) => Ok(CredentialsSource::None),
            _ => Err(ConfigError::MissingStaticCredentials),
        },
        other => Err(ConfigError::UnknownCredentialsSource(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn resolve(json: &str) -> Result<AzureBlobConfig, ConfigError> {
        AzureBlobConfig::resolve(json.as_bytes())
    }

    #[test]
    fn test_missing_container() {
        let err =
            resolve(r#"{"storage_account_name": "name", "storage_account_access_key": "key"}"#)
                .unwrap_err();
        assert!(matches!(err, ConfigError::MissingContainer));
        assert_eq!(err.to_string(), "container_name must be set");

        let err = resolve(r#"{"container_name": "", "storage_account_name": "name"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::MissingContainer));
    }

    #[test]
    fn test_uses_given_container() {
        let config = resolve(
            r#"{"storage_account_name": "name", "storage_account_access_key": "key", "container_name": "some-container"}"#,
        )
        .unwrap();
        assert_eq!(config.container_name(), "some-container");
    }

    #[test]
    fn test_malformed_payload() {
        let err = resolve("invalid-json").unwrap_err();
        assert!(matches!(err, ConfigError::MalformedConfig { .. }));

        let err = resolve(r#"{"container_name": "c", "block_size": "large"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::MalformedConfig { .. }));

        let err = AzureBlobConfig::resolve(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, ConfigError::MalformedConfig { .. }));
    }

    #[test]
    fn test_malformed_payload_names_plain_field() {
        let err = resolve(r#"{"container_name": "c", "parallelism": "many"}"#).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("`parallelism`"), "{message}");
        assert!(!message.contains("default."), "{message}");
    }

    #[test]
    fn test_null_fields_are_unset() {
        let err = resolve(r#"{"container_name": null}"#).unwrap_err();
        assert!(matches!(err, ConfigError::MissingContainer));

        let config = resolve(r#"{"container_name": "c", "credentials_source": null}"#).unwrap();
        assert_eq!(config.credentials_source(), CredentialsSource::None);

        let config = resolve(
            r#"{"container_name": "c", "credentials_source": null, "storage_account_name": null, "storage_account_access_key": null, "block_size": null, "parallelism": null}"#,
        )
        .unwrap();
        assert_eq!(config.credentials_source(), CredentialsSource::None);
        assert_eq!(config.block_size(), DEFAULT_BLOCK_SIZE as usize);
        assert_eq!(config.parallelism(), DEFAULT_PARALLELISM as usize);

        let err = resolve(
            r#"{"container_name": "c", "storage_account_name": null, "storage_account_access_key": "key"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingStaticCredentials));

        let config = resolve(
            r#"{"container_name": "c", "credentials_source": "env_or_profile", "storage_account_name": null}"#,
        )
        .unwrap();
        assert_eq!(config.credentials_source(), CredentialsSource::EnvOrProfile);
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let config = resolve(r#"{"container_name": "c", "region": "westeurope"}"#).unwrap();
        assert_eq!(config.credentials_source(), CredentialsSource::None);
    }

    #[test]
    fn test_unset_source_infers_static() {
        let config = resolve(
            r#"{"storage_account_name": "name", "storage_account_access_key": "key", "container_name": "some-container"}"#,
        )
        .unwrap();
        assert_eq!(config.credentials_source(), CredentialsSource::Static);
        assert_eq!(config.storage_account_name(), "name");
        assert_eq!(config.storage_account_access_key(), "key");
    }

    #[test]
    fn test_unset_source_infers_none() {
        let config = resolve(r#"{"container_name": "some-container"}"#).unwrap();
        assert_eq!(config.credentials_source(), CredentialsSource::None);

        let config = resolve(r#"{"container_name": "some-container", "credentials_source": ""}"#)
            .unwrap();
        assert_eq!(config.credentials_source(), CredentialsSource::None);
    }

    #[test]
    fn test_unset_source_rejects_partial_credentials() {
        let err = resolve(
            r#"{"storage_account_access_key": "key", "container_name": "some-container"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingStaticCredentials));

        let err = resolve(r#"{"container_name": "c", "storage_account_name": "some_id"}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingStaticCredentials));
        assert_eq!(
            err.to_string(),
            "storage_account_name and storage_account_access_key must be provided"
        );
    }

    #[test]
    fn test_static_source_requires_both_credentials() {
        for json in [
            r#"{"container_name": "c", "credentials_source": "static"}"#,
            r#"{"container_name": "c", "credentials_source": "static", "storage_account_name": "some_id"}"#,
            r#"{"container_name": "c", "credentials_source": "static", "storage_account_access_key": "some_secret"}"#,
        ] {
            let err = resolve(json).unwrap_err();
            assert!(matches!(err, ConfigError::MissingStaticCredentials), "{json}");
        }

        let config = resolve(
            r#"{"container_name": "c", "credentials_source": "static", "storage_account_name": "some_id", "storage_account_access_key": "some_secret"}"#,
        )
        .unwrap();
        assert_eq!(config.credentials_source(), CredentialsSource::Static);
    }

    #[test]
    fn test_env_or_profile_rejects_credentials() {
        let config = resolve(r#"{"container_name": "c", "credentials_source": "env_or_profile"}"#)
            .unwrap();
        assert_eq!(config.credentials_source(), CredentialsSource::EnvOrProfile);

        for json in [
            r#"{"container_name": "c", "credentials_source": "env_or_profile", "storage_account_name": "some_id"}"#,
            r#"{"container_name": "c", "credentials_source": "env_or_profile", "storage_account_access_key": "some_secret"}"#,
            r#"{"container_name": "c", "credentials_source": "env_or_profile", "storage_account_name": "some_id", "storage_account_access_key": "some_secret"}"#,
        ] {
            let err = resolve(json).unwrap_err();
            assert!(
                matches!(
                    err,
                    ConfigError::CredentialsConflict {
                        credentials_source: "env_or_profile"
                    }
                ),
                "{json}"
            );
        }

        let err = resolve(
            r#"{"container_name": "c", "credentials_source": "env_or_profile", "storage_account_name": "some_id"}"#,
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "can't use storage_account_name and storage_account_access_key with env_or_profile \
             credentials_source"
        );
    }

    #[test]
    fn test_none_rejects_credentials() {
        let config = resolve(r#"{"container_name": "c", "credentials_source": "none"}"#).unwrap();
        assert_eq!(config.credentials_source(), CredentialsSource::None);

        let err = resolve(
            r#"{"container_name": "c", "credentials_source": "none", "storage_account_name": "some_id"}"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::CredentialsConflict {
                credentials_source: "none"
            }
        ));
        assert_eq!(
            err.to_string(),
            "can't use storage_account_name and storage_account_access_key with none \
             credentials_source"
        );
    }

    #[test]
    fn test_unknown_source() {
        let err = resolve(r#"{"container_name": "c", "credentials_source": "magical_unicorns"}"#)
            .unwrap_err();
        match &err {
            ConfigError::UnknownCredentialsSource(value) => assert_eq!(value, "magical_unicorns"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.to_string(), "invalid credentials_source: magical_unicorns");

        // Literals are matched exactly.
        let err =
            resolve(r#"{"container_name": "c", "credentials_source": "Static"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownCredentialsSource(_)));
    }

    #[test]
    fn test_container_checked_before_credentials() {
        let err = resolve(r#"{"credentials_source": "magical_unicorns"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::MissingContainer));
    }

    #[test]
    fn test_serialized_config_resolves_to_same_value() {
        let config = resolve(
            r#"{"container_name": "c", "credentials_source": "static", "storage_account_name": "some_id", "storage_account_access_key": "some_secret", "block_size": 1024}"#,
        )
        .unwrap();

        let json = serde_json::to_vec(&config).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(value["container_name"], "c");
        assert_eq!(value["credentials_source"], "static");

        let reparsed = AzureBlobConfig::resolve(&json).unwrap();
        assert_eq!(reparsed, config);
    }

    #[test]
    fn test_transfer_hint_defaults() {
        let config = resolve(r#"{"container_name": "c"}"#).unwrap();
        assert_eq!(config.block_size(), DEFAULT_BLOCK_SIZE as usize);
        assert_eq!(config.parallelism(), DEFAULT_PARALLELISM as usize);

        let config = resolve(r#"{"container_name": "c", "block_size": 1048576, "parallelism": 4}"#)
            .unwrap();
        assert_eq!(config.block_size(), 1048576);
        assert_eq!(config.parallelism(), 4);

        let config =
            resolve(r#"{"container_name": "c", "block_size": 18446744073709551615}"#).unwrap();
        assert_eq!(config.block_size(), MAX_BLOCK_SIZE as usize);
    }

    #[test]
    fn test_debug_redacts_access_key() {
        let config = resolve(
            r#"{"container_name": "c", "storage_account_name": "some_id", "storage_account_access_key": "some_secret"}"#,
        )
        .unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("some_secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_from_path() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(
            br#"{"container_name": "from-file", "credentials_source": "env_or_profile"}"#,
        )
        .unwrap();

        let config = AzureBlobConfig::from_path(file.path()).unwrap();
        assert_eq!(config.container_name(), "from-file");
        assert_eq!(config.credentials_source(), CredentialsSource::EnvOrProfile);

        let missing = file.path().with_extension("missing");
        let err = AzureBlobConfig::from_path(&missing).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
