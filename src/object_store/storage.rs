use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::{
    azure, gcs, s3, ConfigError, FileMetadata, ListOptions, LocalStore, ObjectStore,
    ObjectStoreError, Operation, ProviderConfig, ProviderTag, StorageError, StorageOptions,
    UploadBody, DEFAULT_SIGNED_URL_TTL,
};

/// Caller-facing storage handle. Owns exactly one backend adapter, selected once at
/// construction; every operation has the same signature whatever the backend.
pub struct CloudStorage {
    store: Box<dyn ObjectStore>,
    options: StorageOptions,
    shutdown: CancellationToken,
}

impl CloudStorage {
    /// Validate `config` against `tag` and build the matching adapter.
    ///
    /// Fails with [`ConfigError::CredentialsRequired`] when `config` belongs to a
    /// different provider, and with [`ConfigError::MissingField`] when a required
    /// field is empty. No network I/O happens here.
    pub fn new(tag: ProviderTag, config: impl Into<ProviderConfig>) -> Result<Self, ConfigError> {
        Self::with_options(tag, config, StorageOptions::default())
    }

    pub fn with_options(
        tag: ProviderTag,
        config: impl Into<ProviderConfig>,
        options: StorageOptions,
    ) -> Result<Self, ConfigError> {
        let store: Box<dyn ObjectStore> = match (tag, config.into()) {
            (ProviderTag::Azure, ProviderConfig::Azure(c)) => Box::new(azure::build(c)?),
            (ProviderTag::Gcs, ProviderConfig::Gcs(c)) => Box::new(gcs::build(c)?),
            (ProviderTag::S3, ProviderConfig::S3(c)) => Box::new(s3::build(c)?),
            (ProviderTag::Local, ProviderConfig::Local(c)) => Box::new(LocalStore::new(c)?),
            (provider, _) => return Err(ConfigError::CredentialsRequired { provider }),
        };

        tracing::debug!(provider = %tag, "Storage backend constructed");
        Ok(Self::from_store(store, options))
    }

    /// Wrap an already-constructed adapter.
    pub fn from_store(store: Box<dyn ObjectStore>, options: StorageOptions) -> Self {
        Self {
            store,
            options,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn provider(&self) -> ProviderTag {
        self.store.provider()
    }

    /// Cancelling this token fails every in-flight and future operation on this handle.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Borrow this handle with an additional per-call cancellation token.
    pub fn scoped(&self, token: CancellationToken) -> ScopedStorage<'_> {
        ScopedStorage {
            storage: self,
            token,
        }
    }

    pub async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        self.exists_in(key, None).await
    }

    /// Write `body` under `key`, replacing any existing object, and return a
    /// signed read URL for it.
    pub async fn upload_file(
        &self,
        key: &str,
        body: impl Into<UploadBody>,
        content_type: Option<&str>,
    ) -> Result<String, StorageError> {
        self.upload_in(key, body.into(), content_type, None).await
    }

    pub async fn download_file(&self, key: &str) -> Result<Bytes, StorageError> {
        self.download_in(key, None).await
    }

    /// Content together with the content type stored alongside it.
    pub async fn download_file_with_type(
        &self,
        key: &str,
    ) -> Result<(Bytes, Option<String>), StorageError> {
        self.download_typed_in(key, None).await
    }

    /// Returns `true` once the object is gone. An absent key is an error, not `false`.
    pub async fn delete_file(&self, key: &str) -> Result<bool, StorageError> {
        self.delete_in(key, None).await
    }

    /// Metadata lookup, full download and fresh signed URL in one record.
    /// `size` is the length of the downloaded content.
    pub async fn get_file(&self, key: &str) -> Result<FileMetadata, StorageError> {
        self.get_file_in(key, None).await
    }

    pub async fn get_files_list(
        &self,
        options: ListOptions,
    ) -> Result<Vec<FileMetadata>, StorageError> {
        self.list_in(options, None).await
    }

    /// A fresh signed read URL, valid for `expires_in` (default one hour).
    pub async fn get_signed_url(
        &self,
        key: &str,
        expires_in: Option<Duration>,
    ) -> Result<String, StorageError> {
        self.signed_url_in(key, expires_in, None).await
    }

    async fn exists_in(
        &self,
        key: &str,
        scope: Option<&CancellationToken>,
    ) -> Result<bool, StorageError> {
        self.guard(Operation::Exists, key, scope, self.store.exists(key))
            .await
    }

    async fn upload_in(
        &self,
        key: &str,
        body: UploadBody,
        content_type: Option<&str>,
        scope: Option<&CancellationToken>,
    ) -> Result<String, StorageError> {
        self.guard(Operation::Upload, key, scope, async {
            tracing::debug!(content_length = ?body.content_length(), "Uploading");
            self.store.put(key, body, content_type).await?;
            self.store.signed_url(key, DEFAULT_SIGNED_URL_TTL).await
        })
        .await
    }

    async fn download_in(
        &self,
        key: &str,
        scope: Option<&CancellationToken>,
    ) -> Result<Bytes, StorageError> {
        self.guard(Operation::Download, key, scope, self.store.get(key))
            .await
    }

    async fn download_typed_in(
        &self,
        key: &str,
        scope: Option<&CancellationToken>,
    ) -> Result<(Bytes, Option<String>), StorageError> {
        self.guard(Operation::Download, key, scope, async {
            let meta = self.store.head(key).await?;
            let data = self.store.get(key).await?;
            Ok((data, meta.content_type))
        })
        .await
    }

    async fn delete_in(
        &self,
        key: &str,
        scope: Option<&CancellationToken>,
    ) -> Result<bool, StorageError> {
        self.guard(Operation::Delete, key, scope, async {
            self.store.delete(key).await?;
            Ok(true)
        })
        .await
    }

    async fn get_file_in(
        &self,
        key: &str,
        scope: Option<&CancellationToken>,
    ) -> Result<FileMetadata, StorageError> {
        self.guard(Operation::GetFile, key, scope, async {
            let mut meta = self.store.head(key).await?;
            let data = self.store.get(key).await?;
            meta.size = data.len() as u64;
            let url = self.store.signed_url(key, DEFAULT_SIGNED_URL_TTL).await?;
            Ok(FileMetadata::new(meta, url))
        })
        .await
    }

    async fn list_in(
        &self,
        options: ListOptions,
        scope: Option<&CancellationToken>,
    ) -> Result<Vec<FileMetadata>, StorageError> {
        let prefix = options.prefix.as_deref().unwrap_or("");
        self.guard(Operation::List, prefix, scope, async {
            if options.max_keys == 0 {
                return Ok(Vec::new());
            }
            let entries = self
                .store
                .list(options.prefix.as_deref(), options.max_keys)
                .await?;

            let mut files = Vec::with_capacity(entries.len());
            for meta in entries {
                let url = self
                    .store
                    .signed_url(&meta.key, DEFAULT_SIGNED_URL_TTL)
                    .await?;
                files.push(FileMetadata::new(meta, url));
            }
            Ok(files)
        })
        .await
    }

    async fn signed_url_in(
        &self,
        key: &str,
        expires_in: Option<Duration>,
        scope: Option<&CancellationToken>,
    ) -> Result<String, StorageError> {
        let expires_in = expires_in.unwrap_or(DEFAULT_SIGNED_URL_TTL);
        self.guard(
            Operation::SignedUrl,
            key,
            scope,
            self.store.signed_url(key, expires_in),
        )
        .await
    }

    /// Run one operation under the facade's cancellation token, the optional
    /// per-call token and the configured timeout, wrapping backend failures.
    async fn guard<T, F>(
        &self,
        operation: Operation,
        key: &str,
        scope: Option<&CancellationToken>,
        fut: F,
    ) -> Result<T, StorageError>
    where
        F: Future<Output = Result<T, ObjectStoreError>>,
    {
        let span = tracing::info_span!(
            "storage",
            op = %operation,
            provider = %self.provider(),
            key = %key
        );

        let bounded = async {
            match self.options.operation_timeout {
                Some(timeout) => match tokio::time::timeout(timeout, fut).await {
                    Ok(result) => result.map_err(|e| StorageError::wrap(operation, e)),
                    Err(_) => Err(StorageError::TimedOut { operation, timeout }),
                },
                None => fut.await.map_err(|e| StorageError::wrap(operation, e)),
            }
        };

        let scope_cancelled = async {
            match scope {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };

        let result = async {
            tokio::select! {
                result = bounded => result,
                _ = self.shutdown.cancelled() => Err(StorageError::Cancelled { operation }),
                _ = scope_cancelled => Err(StorageError::Cancelled { operation }),
            }
        }
        .instrument(span.clone())
        .await;

        if let Err(ref e) = result {
            span.in_scope(|| tracing::warn!(error = %e, "Storage operation failed"));
        }
        result
    }
}

/// A [`CloudStorage`] borrowed together with a caller-supplied cancellation token.
pub struct ScopedStorage<'a> {
    storage: &'a CloudStorage,
    token: CancellationToken,
}

impl ScopedStorage<'_> {
    pub async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        self.storage.exists_in(key, Some(&self.token)).await
    }

    pub async fn upload_file(
        &self,
        key: &str,
        body: impl Into<UploadBody>,
        content_type: Option<&str>,
    ) -> Result<String, StorageError> {
        self.storage
            .upload_in(key, body.into(), content_type, Some(&self.token))
            .await
    }

    pub async fn download_file(&self, key: &str) -> Result<Bytes, StorageError> {
        self.storage.download_in(key, Some(&self.token)).await
    }

    pub async fn download_file_with_type(
        &self,
        key: &str,
    ) -> Result<(Bytes, Option<String>), StorageError> {
        self.storage.download_typed_in(key, Some(&self.token)).await
    }

    pub async fn delete_file(&self, key: &str) -> Result<bool, StorageError> {
        self.storage.delete_in(key, Some(&self.token)).await
    }

    pub async fn get_file(&self, key: &str) -> Result<FileMetadata, StorageError> {
        self.storage.get_file_in(key, Some(&self.token)).await
    }

    pub async fn get_files_list(
        &self,
        options: ListOptions,
    ) -> Result<Vec<FileMetadata>, StorageError> {
        self.storage.list_in(options, Some(&self.token)).await
    }

    pub async fn get_signed_url(
        &self,
        key: &str,
        expires_in: Option<Duration>,
    ) -> Result<String, StorageError> {
        self.storage
            .signed_url_in(key, expires_in, Some(&self.token))
            .await
    }
}
