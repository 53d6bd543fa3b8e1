use std::time::Duration;

use ::object_store::aws::AmazonS3Builder;

use super::{ConfigError, ProviderTag, RemoteStore, S3Config};

/// SigV4 presigned URLs are capped at seven days.
const MAX_PRESIGN: Duration = Duration::from_secs(7 * 24 * 3600);

/// Build an S3 (or S3-compatible) client. AWS buckets are addressed virtual-hosted
/// style; a custom endpoint switches to path style so MinIO and LocalStack work
/// without DNS tricks.
pub(crate) fn build(config: S3Config) -> Result<RemoteStore, ConfigError> {
    config.validate()?;

    let mut builder = AmazonS3Builder::new()
        .with_bucket_name(&config.bucket)
        .with_region(&config.region)
        .with_access_key_id(&config.access_key_id)
        .with_secret_access_key(&config.secret_access_key);

    if let Some(token) = config.session_token.as_deref().filter(|t| !t.is_empty()) {
        builder = builder.with_token(token);
    }

    if let Some(endpoint) = config.endpoint.as_deref().filter(|e| !e.trim().is_empty()) {
        let url = url::Url::parse(endpoint)
            .map_err(|e| ConfigError::Invalid(format!("S3 endpoint '{endpoint}': {e}")))?;
        if url.host_str().is_none() {
            return Err(ConfigError::Invalid(format!(
                "S3 endpoint '{endpoint}' has no host"
            )));
        }
        builder = builder
            .with_endpoint(endpoint.trim_end_matches('/'))
            .with_virtual_hosted_style_request(false)
            .with_allow_http(url.scheme() == "http");
    } else {
        builder = builder.with_virtual_hosted_style_request(true);
    }

    let client = builder
        .build()
        .map_err(|e| ConfigError::Invalid(format!("failed to build S3 client: {e}")))?;

    Ok(RemoteStore::new(ProviderTag::S3, client, Some(MAX_PRESIGN)))
}
