use std::collections::HashMap;

use ::object_store::azure::MicrosoftAzureBuilder;
use base64::Engine;

use super::{AzureConfig, ConfigError, ProviderTag, RemoteStore};

/// Well-known Azurite development account.
const DEV_ACCOUNT: &str = "devstoreaccount1";
const DEV_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
const DEV_BLOB_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";

/// Account credentials and blob endpoint extracted from a connection string.
#[derive(Debug, PartialEq)]
struct Account {
    name: String,
    /// Base64 account key, checked to decode.
    key: String,
    endpoint: String,
}

impl Account {
    fn from_connection_string(connection_string: &str) -> Result<Self, ConfigError> {
        let parts: HashMap<String, String> = connection_string
            .split(';')
            .filter_map(|part| part.split_once('='))
            .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
            .collect();

        if parts
            .get("usedevelopmentstorage")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
        {
            return Self::from_parts(DEV_ACCOUNT, DEV_ACCOUNT_KEY, DEV_BLOB_ENDPOINT.to_string());
        }

        let name = parts
            .get("accountname")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| invalid("Connection String is missing AccountName"))?;
        let key = parts
            .get("accountkey")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| invalid("Connection String is missing AccountKey"))?;

        let endpoint = match parts.get("blobendpoint") {
            Some(endpoint) => endpoint.clone(),
            None => {
                let protocol = parts
                    .get("defaultendpointsprotocol")
                    .map(String::as_str)
                    .unwrap_or("https");
                let suffix = parts
                    .get("endpointsuffix")
                    .map(String::as_str)
                    .unwrap_or("core.windows.net");
                format!("{protocol}://{name}.blob.{suffix}")
            }
        };

        Self::from_parts(name, key, endpoint)
    }

    fn from_parts(name: &str, key: &str, endpoint: String) -> Result<Self, ConfigError> {
        base64::engine::general_purpose::STANDARD
            .decode(key)
            .map_err(|e| invalid(&format!("AccountKey is not valid base64: {e}")))?;
        Ok(Self {
            name: name.to_string(),
            key: key.to_string(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid(message.to_string())
}

/// Build an Azure Blob Storage client for one container. Requests are signed
/// with the account key, which also issues the service SAS read URLs.
pub(crate) fn build(config: AzureConfig) -> Result<RemoteStore, ConfigError> {
    config.validate()?;

    let account = Account::from_connection_string(&config.connection_string)?;
    let endpoint = url::Url::parse(&account.endpoint)
        .map_err(|e| invalid(&format!("BlobEndpoint '{}': {e}", account.endpoint)))?;
    if endpoint.host_str().is_none() {
        return Err(invalid(&format!(
            "BlobEndpoint '{}' has no host",
            account.endpoint
        )));
    }

    let client = MicrosoftAzureBuilder::new()
        .with_account(&account.name)
        .with_access_key(&account.key)
        .with_container_name(&config.container)
        .with_endpoint(account.endpoint.clone())
        .with_allow_http(endpoint.scheme() == "http")
        .build()
        .map_err(|e| invalid(&format!("failed to build Azure client: {e}")))?;

    Ok(RemoteStore::new(ProviderTag::Azure, client, None))
}
