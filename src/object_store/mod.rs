mod azure;
mod config;
mod error;
mod gcs;
mod local;
mod remote;
mod s3;
mod storage;

pub use config::{
    AzureConfig, GcsConfig, LocalConfig, ProviderConfig, ProviderTag, S3Config, StorageOptions,
};
pub use error::{ConfigError, Operation, StorageError};
pub use local::{LocalStore, LocalUrlSigner};
pub use remote::RemoteStore;
pub use storage::{CloudStorage, ScopedStorage};

use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::Serialize;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Default lifetime of a signed URL.
pub const DEFAULT_SIGNED_URL_TTL: Duration = Duration::from_secs(3600);

/// Default upper bound for [`CloudStorage::get_files_list`].
pub const DEFAULT_MAX_KEYS: usize = 1000;

/// Failure reported by a backend adapter. Display is the backend's own message.
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    NotFound(String),
    /// Failure from an S3, Azure or GCS client, kept with its own classification.
    #[error("{0}")]
    Remote(#[from] ::object_store::Error),
    #[error("{0}")]
    Decode(String),
    #[error("{0}")]
    InvalidArgument(String),
}

impl ObjectStoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ObjectStoreError::NotFound(_)
                | ObjectStoreError::Remote(::object_store::Error::NotFound { .. })
        )
    }

    /// Whether the caller, rather than the backend, is at fault.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            ObjectStoreError::InvalidArgument(_)
                | ObjectStoreError::Remote(::object_store::Error::InvalidPath { .. })
        )
    }
}

/// Metadata reported by a backend for a single object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub content_type: Option<String>,
}

/// Result record of [`CloudStorage::get_file`] and [`CloudStorage::get_files_list`].
/// Built fresh on every call, including the signed URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileMetadata {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    /// `None` when the object was stored without a content type.
    pub content_type: Option<String>,
    pub url: String,
}

impl FileMetadata {
    pub(crate) fn new(meta: ObjectMeta, url: String) -> Self {
        Self {
            key: meta.key,
            size: meta.size,
            last_modified: meta.last_modified,
            content_type: meta.content_type,
            url,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ListOptions {
    pub max_keys: usize,
    pub prefix: Option<String>,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            max_keys: DEFAULT_MAX_KEYS,
            prefix: None,
        }
    }
}

impl ListOptions {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            ..Default::default()
        }
    }
}

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Content handed to an upload: either a size-capped buffer or an incremental source
/// that is forwarded to the backend chunk by chunk.
pub enum UploadBody {
    Bytes(Bytes),
    Stream {
        stream: ByteStream,
        /// Total length, when known.
        content_length: Option<u64>,
    },
}

impl UploadBody {
    pub fn from_stream<S>(stream: S, content_length: Option<u64>) -> Self
    where
        S: Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static,
    {
        UploadBody::Stream {
            stream: Box::pin(stream),
            content_length,
        }
    }

    pub fn from_reader<R>(reader: R, content_length: Option<u64>) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self::from_stream(tokio_util::io::ReaderStream::new(reader), content_length)
    }

    pub fn content_length(&self) -> Option<u64> {
        match self {
            UploadBody::Bytes(data) => Some(data.len() as u64),
            UploadBody::Stream { content_length, .. } => *content_length,
        }
    }
}

impl fmt::Debug for UploadBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadBody::Bytes(data) => f.debug_tuple("Bytes").field(&data.len()).finish(),
            UploadBody::Stream { content_length, .. } => f
                .debug_struct("Stream")
                .field("content_length", content_length)
                .finish(),
        }
    }
}

impl From<Bytes> for UploadBody {
    fn from(data: Bytes) -> Self {
        UploadBody::Bytes(data)
    }
}

impl From<Vec<u8>> for UploadBody {
    fn from(data: Vec<u8>) -> Self {
        UploadBody::Bytes(Bytes::from(data))
    }
}

impl From<&'static [u8]> for UploadBody {
    fn from(data: &'static [u8]) -> Self {
        UploadBody::Bytes(Bytes::from_static(data))
    }
}

impl From<&'static str> for UploadBody {
    fn from(data: &'static str) -> Self {
        UploadBody::Bytes(Bytes::from_static(data.as_bytes()))
    }
}

/// Abstraction over object storage backends.
/// Every method talks to exactly one backend; error wrapping, cancellation and
/// signed-URL composition happen in [`CloudStorage`].
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn provider(&self) -> ProviderTag;
    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError>;
    /// Resolves once the backend has durably stored the object.
    async fn put(
        &self,
        key: &str,
        body: UploadBody,
        content_type: Option<&str>,
    ) -> Result<(), ObjectStoreError>;
    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError>;
    /// Fails with [`ObjectStoreError::NotFound`] when the key is absent.
    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError>;
    async fn head(&self, key: &str) -> Result<ObjectMeta, ObjectStoreError>;
    /// Up to `max_keys` entries in backend-native order.
    async fn list(
        &self,
        prefix: Option<&str>,
        max_keys: usize,
    ) -> Result<Vec<ObjectMeta>, ObjectStoreError>;
    async fn signed_url(&self, key: &str, expires_in: Duration)
        -> Result<String, ObjectStoreError>;
}

/// Signed URL lifetimes must be positive and, where the backend caps them, at most a week.
pub(crate) fn check_expiry(
    expires_in: Duration,
    max: Option<Duration>,
) -> Result<u64, ObjectStoreError> {
    let secs = expires_in.as_secs();
    if secs == 0 {
        return Err(ObjectStoreError::InvalidArgument(
            "expiration must be at least one second".to_string(),
        ));
    }
    if let Some(max) = max {
        if expires_in > max {
            return Err(ObjectStoreError::InvalidArgument(format!(
                "expiration must not exceed {} seconds",
                max.as_secs()
            )));
        }
    }
    Ok(secs)
}
