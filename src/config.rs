use std::time::Duration;

use thiserror::Error;

use crate::object_store::{
    self as obj, AzureConfig, GcsConfig, LocalConfig, LocalUrlSigner, ProviderConfig, ProviderTag,
    S3Config, StorageOptions,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
    #[error(transparent)]
    Storage(#[from] obj::ConfigError),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub intake: IntakeConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub provider: ProviderTag,
    pub backend: ProviderConfig,
    pub options: StorageOptions,
}

#[derive(Debug, Clone)]
pub struct IntakeConfig {
    /// Maximum upload size in bytes
    pub max_upload_size: usize,
    /// MIME types accepted by `POST /files`
    pub allowed_content_types: Vec<String>,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            max_upload_size: 5 * 1024 * 1024, // 5MB
            allowed_content_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "application/pdf".to_string(),
            ],
        }
    }
}

impl IntakeConfig {
    pub fn is_allowed(&self, content_type: &str) -> bool {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        self.allowed_content_types.iter().any(|t| *t == essence)
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_address = var("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:8080".to_string());

        let mut intake = IntakeConfig::default();
        if let Some(size) = var("MAX_UPLOAD_SIZE") {
            intake.max_upload_size = size.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!("MAX_UPLOAD_SIZE '{size}' is not a number"))
            })?;
        }
        if let Some(types) = var("ALLOWED_CONTENT_TYPES") {
            intake.allowed_content_types = types
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
        }

        let provider: ProviderTag = var("STORAGE_PROVIDER")
            .unwrap_or_else(|| "local".to_string())
            .parse()?;

        let operation_timeout = match var("OPERATION_TIMEOUT_SECS") {
            Some(secs) => Some(Duration::from_secs(secs.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "OPERATION_TIMEOUT_SECS '{secs}' is not a number"
                ))
            })?)),
            None => None,
        };

        let backend = match provider {
            ProviderTag::Azure => ProviderConfig::Azure(AzureConfig {
                connection_string: var("AZURE_CONNECTION_STRING").unwrap_or_default(),
                container: var("AZURE_CONTAINER").unwrap_or_default(),
            }),
            ProviderTag::Gcs => ProviderConfig::Gcs(GcsConfig {
                bucket: var("GCS_BUCKET").unwrap_or_default(),
                project_id: var("GCS_PROJECT_ID").unwrap_or_default(),
                key_file_path: var("GCS_KEY_FILE_PATH").unwrap_or_default(),
                endpoint: var("GCS_ENDPOINT"),
            }),
            ProviderTag::S3 => ProviderConfig::S3(S3Config {
                bucket: var("S3_BUCKET").unwrap_or_default(),
                region: var("S3_REGION").unwrap_or_else(|| "us-east-1".to_string()),
                access_key_id: var("AWS_ACCESS_KEY_ID").unwrap_or_default(),
                secret_access_key: var("AWS_SECRET_ACCESS_KEY").unwrap_or_default(),
                session_token: var("AWS_SESSION_TOKEN"),
                endpoint: var("S3_ENDPOINT"),
            }),
            ProviderTag::Local => {
                let signing_key = var("LOCAL_SIGNING_KEY").unwrap_or_else(|| {
                    tracing::warn!(
                        "LOCAL_SIGNING_KEY not set; signed URLs will not survive a restart"
                    );
                    uuid::Uuid::new_v4().to_string()
                });
                ProviderConfig::Local(LocalConfig {
                    root: var("LOCAL_STORAGE_PATH").unwrap_or_else(|| "./files".to_string()),
                    base_url: var("LOCAL_BASE_URL")
                        .unwrap_or_else(|| "http://localhost:8080/static".to_string()),
                    signing_key,
                })
            }
        };

        let config = Config {
            server: ServerConfig { bind_address },
            storage: StorageConfig {
                provider,
                backend,
                options: StorageOptions { operation_timeout },
            },
            intake,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.bind_address.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "BIND_ADDRESS cannot be empty".to_string(),
            ));
        }

        if self.intake.max_upload_size == 0 {
            return Err(ConfigError::ValidationError(
                "MAX_UPLOAD_SIZE must be greater than zero".to_string(),
            ));
        }

        if self.intake.allowed_content_types.is_empty() {
            return Err(ConfigError::ValidationError(
                "ALLOWED_CONTENT_TYPES cannot be empty".to_string(),
            ));
        }

        if self.storage.options.operation_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::ValidationError(
                "OPERATION_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Verifier for `/static` URLs. Only the local provider issues those.
    pub fn url_verifier(&self) -> Option<LocalUrlSigner> {
        match &self.storage.backend {
            ProviderConfig::Local(c) => Some(LocalUrlSigner::new(&c.base_url, &c.signing_key)),
            _ => None,
        }
    }
}
