use std::sync::Arc;
use std::time::Duration;

use ::object_store::buffered::BufWriter;
use ::object_store::path::Path;
use ::object_store::signer::Signer;
use ::object_store::{Attribute, Attributes, GetOptions, PutOptions, PutPayload};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use http::Method;
use tokio::io::AsyncWriteExt;

use super::{check_expiry, ObjectMeta, ObjectStore, ObjectStoreError, ProviderTag, UploadBody};

/// Metadata lookups in flight at once while typing a listing.
const HEAD_CONCURRENCY: usize = 8;

/// Adapter over an `object_store` client for S3, Azure and GCS.
///
/// Request signing, retries and response parsing live in the client; this type maps
/// keys onto its paths and carries the content type as an object attribute.
pub struct RemoteStore {
    provider: ProviderTag,
    store: Arc<dyn ::object_store::ObjectStore>,
    signer: Arc<dyn Signer>,
    /// Longest signed URL lifetime the provider accepts.
    max_signed_url: Option<Duration>,
}

impl RemoteStore {
    pub(crate) fn new<S>(provider: ProviderTag, store: S, max_signed_url: Option<Duration>) -> Self
    where
        S: ::object_store::ObjectStore + Signer,
    {
        let store = Arc::new(store);
        Self::from_parts(provider, store.clone(), store, max_signed_url)
    }

    pub fn from_parts(
        provider: ProviderTag,
        store: Arc<dyn ::object_store::ObjectStore>,
        signer: Arc<dyn Signer>,
        max_signed_url: Option<Duration>,
    ) -> Self {
        Self {
            provider,
            store,
            signer,
            max_signed_url,
        }
    }

    async fn content_type(&self, path: &Path) -> Result<Option<String>, ObjectStoreError> {
        let options = GetOptions {
            head: true,
            ..Default::default()
        };
        let result = self.store.get_opts(path, options).await?;
        Ok(content_type_of(&result.attributes))
    }
}

fn path(key: &str) -> Result<Path, ObjectStoreError> {
    if key.is_empty() {
        return Err(ObjectStoreError::InvalidArgument(
            "key must not be empty".to_string(),
        ));
    }
    // Path parsing would silently drop these.
    if key.starts_with('/') || key.ends_with('/') {
        return Err(ObjectStoreError::InvalidArgument(format!(
            "key '{key}' must not start or end with '/'"
        )));
    }
    Ok(Path::parse(key).map_err(::object_store::Error::from)?)
}

fn content_type_of(attributes: &Attributes) -> Option<String> {
    attributes.get(&Attribute::ContentType).map(|v| {
        let value: &str = v.as_ref();
        value.to_string()
    })
}

/// Directory the backend is asked to list for a raw string `prefix`.
/// Listings are per path segment, so a partial final segment is filtered locally.
fn list_root(prefix: &str) -> Result<Option<Path>, ObjectStoreError> {
    match prefix.rsplit_once('/') {
        Some((dir, _)) if !dir.is_empty() => Ok(Some(path(dir)?)),
        Some(_) => Err(ObjectStoreError::InvalidArgument(format!(
            "prefix '{prefix}' must not start with '/'"
        ))),
        None => Ok(None),
    }
}

#[async_trait]
impl ObjectStore for RemoteStore {
    fn provider(&self) -> ProviderTag {
        self.provider
    }

    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        match self.store.head(&path(key)?).await {
            Ok(_) => Ok(true),
            Err(::object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(
        &self,
        key: &str,
        body: UploadBody,
        content_type: Option<&str>,
    ) -> Result<(), ObjectStoreError> {
        let location = path(key)?;
        let mut attributes = Attributes::new();
        if let Some(content_type) = content_type {
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
        }

        match body {
            UploadBody::Bytes(data) => {
                let options = PutOptions {
                    attributes,
                    ..Default::default()
                };
                self.store
                    .put_opts(&location, PutPayload::from(data), options)
                    .await?;
            }
            UploadBody::Stream { mut stream, .. } => {
                // Small bodies go out as one PUT, larger ones switch to a multipart upload.
                let mut writer =
                    BufWriter::new(Arc::clone(&self.store), location).with_attributes(attributes);
                let written = async {
                    while let Some(chunk) = stream.next().await {
                        writer.put(chunk?).await?;
                    }
                    Ok::<_, ObjectStoreError>(())
                }
                .await;

                if let Err(e) = written {
                    if let Err(abort) = writer.abort().await {
                        tracing::debug!(error = %abort, "Failed to abort partial upload");
                    }
                    return Err(e);
                }
                writer.shutdown().await?;
            }
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        let result = self.store.get(&path(key)?).await?;
        Ok(result.bytes().await?)
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        let location = path(key)?;
        // Deletes of absent objects succeed on every provider, so look first.
        self.store.head(&location).await?;
        self.store.delete(&location).await?;
        Ok(())
    }

    async fn head(&self, key: &str) -> Result<ObjectMeta, ObjectStoreError> {
        let options = GetOptions {
            head: true,
            ..Default::default()
        };
        let result = self.store.get_opts(&path(key)?, options).await?;
        Ok(ObjectMeta {
            key: key.to_string(),
            size: result.meta.size,
            last_modified: result.meta.last_modified,
            content_type: content_type_of(&result.attributes),
        })
    }

    async fn list(
        &self,
        prefix: Option<&str>,
        max_keys: usize,
    ) -> Result<Vec<ObjectMeta>, ObjectStoreError> {
        let prefix = prefix.unwrap_or("");
        let root = list_root(prefix)?;

        let mut listing = self.store.list(root.as_ref());
        let mut entries = Vec::new();
        while entries.len() < max_keys {
            let Some(meta) = listing.try_next().await? else {
                break;
            };
            let key = meta.location.to_string();
            if !key.starts_with(prefix) {
                continue;
            }
            entries.push(ObjectMeta {
                key,
                size: meta.size,
                last_modified: meta.last_modified,
                content_type: None,
            });
        }

        // Listings carry no content type; fetch it per entry, dropping objects
        // deleted since they were listed.
        futures::stream::iter(entries)
            .map(|mut meta| async move {
                let location = path(&meta.key)?;
                match self.content_type(&location).await {
                    Ok(content_type) => {
                        meta.content_type = content_type;
                        Ok(Some(meta))
                    }
                    Err(e) if e.is_not_found() => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .buffered(HEAD_CONCURRENCY)
            .try_filter_map(|meta| futures::future::ready(Ok(meta)))
            .try_collect()
            .await
    }

    async fn signed_url(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, ObjectStoreError> {
        check_expiry(expires_in, self.max_signed_url)?;
        let url = self
            .signer
            .signed_url(Method::GET, &path(key)?, expires_in)
            .await?;
        Ok(url.to_string())
    }
}
