use std::time::Duration;

use ::object_store::gcp::GoogleCloudStorageBuilder;
use ::object_store::ClientOptions;
use serde_json::Value;

use super::{ConfigError, GcsConfig, ProviderTag, RemoteStore};

/// V4 signed URLs are capped at seven days.
const MAX_SIGNED_URL: Duration = Duration::from_secs(7 * 24 * 3600);

/// Read and sanity-check a service account key file, pointing it at `endpoint`
/// when one is configured.
fn service_account_key(config: &GcsConfig) -> Result<String, ConfigError> {
    let raw = std::fs::read_to_string(&config.key_file_path).map_err(|e| {
        ConfigError::Invalid(format!(
            "Key File Path '{}' could not be read: {e}",
            config.key_file_path
        ))
    })?;
    let mut key: Value = serde_json::from_str(&raw).map_err(|e| {
        ConfigError::Invalid(format!("Key file is not a service account key: {e}"))
    })?;

    for field in ["client_email", "private_key", "private_key_id"] {
        if !key[field].is_string() {
            return Err(ConfigError::Invalid(format!(
                "Key file is not a service account key: missing {field}"
            )));
        }
    }

    if let Some(endpoint) = config.endpoint.as_deref().filter(|e| !e.trim().is_empty()) {
        url::Url::parse(endpoint)
            .map_err(|e| ConfigError::Invalid(format!("GCS endpoint '{endpoint}': {e}")))?;
        key["gcs_base_url"] = Value::String(endpoint.trim_end_matches('/').to_string());
    }
    Ok(key.to_string())
}

/// Build a Google Cloud Storage client. The service account key both
/// authorizes requests and signs read URLs locally.
pub(crate) fn build(config: GcsConfig) -> Result<RemoteStore, ConfigError> {
    config.validate()?;
    let key = service_account_key(&config)?;

    let allow_http = config
        .endpoint
        .as_deref()
        .is_some_and(|e| e.trim().starts_with("http://"));

    let client = GoogleCloudStorageBuilder::new()
        .with_bucket_name(&config.bucket)
        .with_service_account_key(key)
        .with_client_options(ClientOptions::new().with_allow_http(allow_http))
        .build()
        .map_err(|e| ConfigError::Invalid(format!("failed to build GCS client: {e}")))?;

    Ok(RemoteStore::new(ProviderTag::Gcs, client, Some(MAX_SIGNED_URL)))
}
