use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use ring::hmac;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use super::{
    check_expiry, ConfigError, LocalConfig, ObjectMeta, ObjectStore, ObjectStoreError,
    ProviderTag, UploadBody,
};

/// Sidecar directory under the root holding per-object metadata and in-progress uploads.
const METADATA_DIR: &str = ".metadata";
const UPLOADS_DIR: &str = ".uploads";
const NOT_FOUND: &str = "The specified key does not exist.";

/// RFC 3986 unreserved characters stay as-is, everything else is escaped.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Encodes each `/`-separated segment of an object key, keeping the separators.
fn uri_encode_path(key: &str) -> String {
    key.split('/')
        .map(|segment| utf8_percent_encode(segment, URI_COMPONENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Serialize, Deserialize)]
struct Sidecar {
    content_type: String,
}

/// Issues and verifies HMAC-signed URLs for the local backend.
#[derive(Clone)]
pub struct LocalUrlSigner {
    base_url: String,
    key: hmac::Key,
}

impl LocalUrlSigner {
    pub fn new(base_url: &str, signing_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            key: hmac::Key::new(hmac::HMAC_SHA256, signing_key.as_bytes()),
        }
    }

    /// URL for `key` that stops verifying after `expires_at` (unix seconds).
    pub fn sign(&self, key: &str, expires_at: i64) -> String {
        format!(
            "{}/{}?expires={expires_at}&signature={}",
            self.base_url,
            uri_encode_path(key),
            self.signature(key, expires_at)
        )
    }

    pub fn verify(&self, key: &str, expires_at: i64, signature: &str, now: DateTime<Utc>) -> bool {
        if expires_at < now.timestamp() {
            return false;
        }
        let Ok(tag) = hex::decode(signature) else {
            return false;
        };
        hmac::verify(&self.key, Self::message(key, expires_at).as_bytes(), &tag).is_ok()
    }

    fn signature(&self, key: &str, expires_at: i64) -> String {
        hex::encode(hmac::sign(&self.key, Self::message(key, expires_at).as_bytes()))
    }

    fn message(key: &str, expires_at: i64) -> String {
        format!("{key}\n{expires_at}")
    }
}

/// Local filesystem object store for development and testing.
pub struct LocalStore {
    base_path: PathBuf,
    signer: LocalUrlSigner,
}

impl LocalStore {
    pub fn new(config: LocalConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let base_path = PathBuf::from(&config.root);
        std::fs::create_dir_all(base_path.join(METADATA_DIR).join(UPLOADS_DIR)).map_err(|e| {
            ConfigError::Invalid(format!("Root '{}' is not usable: {e}", config.root))
        })?;

        Ok(Self {
            base_path,
            signer: LocalUrlSigner::new(&config.base_url, &config.signing_key),
        })
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, ObjectStoreError> {
        validate_key(key)?;
        Ok(self.base_path.join(key))
    }

    /// Metadata of the regular file stored under `key`. Directories, which only
    /// exist as parents of deeper keys, are not objects.
    async fn file_metadata(&self, path: &Path) -> Result<std::fs::Metadata, ObjectStoreError> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => Ok(meta),
            Ok(_) => Err(ObjectStoreError::NotFound(NOT_FOUND.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ObjectStoreError::NotFound(NOT_FOUND.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn sidecar_path(&self, key: &str) -> PathBuf {
        self.base_path
            .join(METADATA_DIR)
            .join(format!("{key}.json"))
    }

    async fn write_sidecar(
        &self,
        key: &str,
        content_type: Option<&str>,
    ) -> Result<(), ObjectStoreError> {
        let path = self.sidecar_path(key);
        match content_type {
            Some(content_type) => {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                let json = serde_json::to_vec(&Sidecar {
                    content_type: content_type.to_string(),
                })
                .map_err(|e| ObjectStoreError::Decode(e.to_string()))?;
                tokio::fs::write(&path, json).await?;
            }
            None => remove_if_present(&path).await?,
        }
        Ok(())
    }

    async fn content_type(&self, key: &str) -> Option<String> {
        let stored = tokio::fs::read(self.sidecar_path(key))
            .await
            .ok()
            .and_then(|data| serde_json::from_slice::<Sidecar>(&data).ok())
            .map(|s| s.content_type);
        stored.or_else(|| mime_guess::from_path(key).first().map(|m| m.to_string()))
    }

    /// Every object key under the root, sorted.
    async fn walk_keys(&self) -> Result<Vec<String>, ObjectStoreError> {
        let mut keys = Vec::new();
        let mut pending = vec![(self.base_path.clone(), String::new())];

        while let Some((dir, rel)) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().to_string();
                if rel.is_empty() && name == METADATA_DIR {
                    continue;
                }
                let key = if rel.is_empty() {
                    name
                } else {
                    format!("{rel}/{name}")
                };
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push((entry.path(), key));
                } else if file_type.is_file() {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    fn provider(&self) -> ProviderTag {
        ProviderTag::Local
    }

    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        let path = self.object_path(key)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(
        &self,
        key: &str,
        body: UploadBody,
        content_type: Option<&str>,
    ) -> Result<(), ObjectStoreError> {
        let path = self.object_path(key)?;
        let staging = self
            .base_path
            .join(METADATA_DIR)
            .join(UPLOADS_DIR)
            .join(uuid::Uuid::new_v4().to_string());

        let stored = async {
            let mut file = tokio::fs::File::create(&staging).await?;
            match body {
                UploadBody::Bytes(data) => file.write_all(&data).await?,
                UploadBody::Stream { mut stream, .. } => {
                    while let Some(chunk) = stream.next().await {
                        file.write_all(&chunk?).await?;
                    }
                }
            }
            file.sync_all().await?;
            drop(file);

            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::rename(&staging, &path).await
        }
        .await;

        if let Err(e) = stored {
            if let Err(cleanup) = remove_if_present(&staging).await {
                tracing::warn!(error = %cleanup, staging = %staging.display(), "Failed to remove staged upload");
            }
            return Err(e.into());
        }
        self.write_sidecar(key, content_type).await
    }

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        let path = self.object_path(key)?;
        self.file_metadata(&path).await?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ObjectStoreError::NotFound(NOT_FOUND.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        let path = self.object_path(key)?;
        self.file_metadata(&path).await?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ObjectStoreError::NotFound(NOT_FOUND.to_string()));
            }
            Err(e) => return Err(e.into()),
        }
        remove_if_present(&self.sidecar_path(key)).await
    }

    async fn head(&self, key: &str) -> Result<ObjectMeta, ObjectStoreError> {
        let path = self.object_path(key)?;
        let meta = self.file_metadata(&path).await?;

        Ok(ObjectMeta {
            key: key.to_string(),
            size: meta.len(),
            last_modified: DateTime::<Utc>::from(meta.modified()?),
            content_type: self.content_type(key).await,
        })
    }

    async fn list(
        &self,
        prefix: Option<&str>,
        max_keys: usize,
    ) -> Result<Vec<ObjectMeta>, ObjectStoreError> {
        let prefix = prefix.unwrap_or("");
        let keys: Vec<String> = self
            .walk_keys()
            .await?
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .take(max_keys)
            .collect();

        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            match self.head(&key).await {
                Ok(meta) => entries.push(meta),
                // Deleted between the walk and the stat.
                Err(ObjectStoreError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(entries)
    }

    async fn signed_url(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, ObjectStoreError> {
        validate_key(key)?;
        let secs = check_expiry(expires_in, None)?;
        let expires_at = Utc::now().timestamp() + secs as i64;
        Ok(self.signer.sign(key, expires_at))
    }
}

/// Keys are `/`-separated segments, each non-empty and neither `.` nor `..`,
/// and stay out of the sidecar directory. Checked on the raw string so that no
/// two distinct keys name the same file.
fn validate_key(key: &str) -> Result<(), ObjectStoreError> {
    if key.is_empty() {
        return Err(ObjectStoreError::InvalidArgument("key must not be empty".to_string()));
    }
    for (i, segment) in key.split('/').enumerate() {
        match segment {
            "" => {
                return Err(ObjectStoreError::InvalidArgument(format!(
                    "key '{key}' must not contain empty segments"
                )));
            }
            "." | ".." => {
                return Err(ObjectStoreError::InvalidArgument(format!(
                    "key '{key}' must not contain '.' or '..' segments"
                )));
            }
            METADATA_DIR if i == 0 => {
                return Err(ObjectStoreError::InvalidArgument(format!(
                    "key '{key}' uses the reserved {METADATA_DIR} prefix"
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

async fn remove_if_present(path: &Path) -> Result<(), ObjectStoreError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
