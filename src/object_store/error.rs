use std::fmt;
use std::time::Duration;

use thiserror::Error;

use super::config::ProviderTag;
use super::ObjectStoreError;

/// Raised synchronously while constructing a [`CloudStorage`](super::CloudStorage).
/// No backend client handle exists when one of these is returned.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be provided")]
    MissingField { field: &'static str },
    #[error("{provider} credentials are required. Configuration is incorrect or must be provided")]
    CredentialsRequired { provider: ProviderTag },
    #[error("Unknown storage provider: {0}")]
    UnknownProvider(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// The operation families exposed by the facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Exists,
    Upload,
    Download,
    Delete,
    GetFile,
    List,
    SignedUrl,
}

impl Operation {
    /// Verb phrase used in the "Failed to ..." prefix.
    pub fn verb(&self) -> &'static str {
        match self {
            Operation::Exists => "check if file exists",
            Operation::Upload => "upload file",
            Operation::Download => "download file",
            Operation::Delete => "delete file",
            Operation::GetFile => "get file",
            Operation::List => "list files",
            Operation::SignedUrl => "generate signed URL",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Exists => "exists",
            Operation::Upload => "upload_file",
            Operation::Download => "download_file",
            Operation::Delete => "delete_file",
            Operation::GetFile => "get_file",
            Operation::List => "get_files_list",
            Operation::SignedUrl => "get_signed_url",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation-scoped failure returned by every facade call.
///
/// The wrapped [`ObjectStoreError`] keeps the backend's message verbatim, so
/// `to_string()` reads e.g. `Failed to download file: The specified key does not exist.`
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to check if file exists: {0}")]
    Exists(#[source] ObjectStoreError),
    #[error("Failed to upload file: {0}")]
    Upload(#[source] ObjectStoreError),
    #[error("Failed to download file: {0}")]
    Download(#[source] ObjectStoreError),
    #[error("Failed to delete file: {0}")]
    Delete(#[source] ObjectStoreError),
    #[error("Failed to get file: {0}")]
    Metadata(#[source] ObjectStoreError),
    #[error("Failed to list files: {0}")]
    List(#[source] ObjectStoreError),
    #[error("Failed to generate signed URL: {0}")]
    SignedUrl(#[source] ObjectStoreError),
    #[error("Failed to {}: operation was cancelled", .operation.verb())]
    Cancelled { operation: Operation },
    #[error("Failed to {}: operation timed out after {timeout:?}", .operation.verb())]
    TimedOut {
        operation: Operation,
        timeout: Duration,
    },
}

impl StorageError {
    pub(crate) fn wrap(operation: Operation, source: ObjectStoreError) -> Self {
        match operation {
            Operation::Exists => StorageError::Exists(source),
            Operation::Upload => StorageError::Upload(source),
            Operation::Download => StorageError::Download(source),
            Operation::Delete => StorageError::Delete(source),
            Operation::GetFile => StorageError::Metadata(source),
            Operation::List => StorageError::List(source),
            Operation::SignedUrl => StorageError::SignedUrl(source),
        }
    }

    pub fn operation(&self) -> Operation {
        match self {
            StorageError::Exists(_) => Operation::Exists,
            StorageError::Upload(_) => Operation::Upload,
            StorageError::Download(_) => Operation::Download,
            StorageError::Delete(_) => Operation::Delete,
            StorageError::Metadata(_) => Operation::GetFile,
            StorageError::List(_) => Operation::List,
            StorageError::SignedUrl(_) => Operation::SignedUrl,
            StorageError::Cancelled { operation } | StorageError::TimedOut { operation, .. } => {
                *operation
            }
        }
    }

    /// The backend failure behind this error, if the backend produced one.
    pub fn backend(&self) -> Option<&ObjectStoreError> {
        match self {
            StorageError::Exists(e)
            | StorageError::Upload(e)
            | StorageError::Download(e)
            | StorageError::Delete(e)
            | StorageError::Metadata(e)
            | StorageError::List(e)
            | StorageError::SignedUrl(e) => Some(e),
            StorageError::Cancelled { .. } | StorageError::TimedOut { .. } => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.backend().is_some_and(ObjectStoreError::is_not_found)
    }
}
