use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Identifies which backend a [`CloudStorage`](super::CloudStorage) is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderTag {
    Azure,
    Gcs,
    S3,
    Local,
}

impl fmt::Display for ProviderTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderTag::Azure => "Azure",
            ProviderTag::Gcs => "GCS",
            ProviderTag::S3 => "S3",
            ProviderTag::Local => "Local",
        };
        f.write_str(name)
    }
}

impl FromStr for ProviderTag {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "azure" => Ok(ProviderTag::Azure),
            "gcs" | "gcp" | "google" => Ok(ProviderTag::Gcs),
            "s3" | "aws" => Ok(ProviderTag::S3),
            "local" | "fs" => Ok(ProviderTag::Local),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

/// Per-provider configuration. The variant must match the [`ProviderTag`]
/// handed to the factory alongside it.
#[derive(Debug, Clone)]
pub enum ProviderConfig {
    Azure(AzureConfig),
    Gcs(GcsConfig),
    S3(S3Config),
    Local(LocalConfig),
}

impl From<AzureConfig> for ProviderConfig {
    fn from(c: AzureConfig) -> Self {
        ProviderConfig::Azure(c)
    }
}

impl From<GcsConfig> for ProviderConfig {
    fn from(c: GcsConfig) -> Self {
        ProviderConfig::Gcs(c)
    }
}

impl From<S3Config> for ProviderConfig {
    fn from(c: S3Config) -> Self {
        ProviderConfig::S3(c)
    }
}

impl From<LocalConfig> for ProviderConfig {
    fn from(c: LocalConfig) -> Self {
        ProviderConfig::Local(c)
    }
}

#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureConfig {
    /// Storage account connection string (`AccountName=...;AccountKey=...`).
    #[serde(default)]
    pub connection_string: String,
    #[serde(default)]
    pub container: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcsConfig {
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub project_id: String,
    /// Path to a service account JSON key. Also used to sign URLs.
    #[serde(default)]
    pub key_file_path: String,
    /// Override for the storage API origin, e.g. a storage emulator.
    #[serde(default)]
    pub endpoint: Option<String>,
}

#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Config {
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub access_key_id: String,
    #[serde(default)]
    pub secret_access_key: String,
    #[serde(default)]
    pub session_token: Option<String>,
    /// S3-compatible endpoint (MinIO, LocalStack). Selects path-style addressing.
    #[serde(default)]
    pub endpoint: Option<String>,
}

#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalConfig {
    /// Directory objects are stored under.
    #[serde(default)]
    pub root: String,
    /// Public prefix signed URLs are issued against (e.g. `http://localhost:8080/static`).
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub signing_key: String,
}

/// Options applied to every operation issued through a facade.
#[derive(Debug, Clone, Default)]
pub struct StorageOptions {
    /// Upper bound on a single operation, including every backend round trip it makes.
    pub operation_timeout: Option<Duration>,
}

fn require(value: &str, field: &'static str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField { field });
    }
    Ok(())
}

impl AzureConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        require(&self.connection_string, "Connection String parameter")?;
        require(&self.container, "Container parameter")
    }
}

impl GcsConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        require(&self.bucket, "Bucket")?;
        require(&self.project_id, "Project")?;
        require(&self.key_file_path, "Key File Path")
    }
}

impl S3Config {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        require(&self.bucket, "Bucket parameter")?;
        require(&self.region, "Region parameter")?;
        require(&self.access_key_id, "Access Key Id parameter")?;
        require(&self.secret_access_key, "Secret Access Key parameter")
    }
}

impl LocalConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        require(&self.root, "Root parameter")?;
        require(&self.base_url, "Base URL parameter")?;
        require(&self.signing_key, "Signing Key parameter")
    }
}

// Secrets stay out of logs.

impl fmt::Debug for AzureConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureConfig")
            .field("connection_string", &"<redacted>")
            .field("container", &self.container)
            .finish()
    }
}

impl fmt::Debug for S3Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Config")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl fmt::Debug for LocalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalConfig")
            .field("root", &self.root)
            .field("base_url", &self.base_url)
            .field("signing_key", &"<redacted>")
            .finish()
    }
}
