//! cloud-store - One storage interface over Azure Blob Storage, Google Cloud Storage,
//! Amazon S3 and the local filesystem
//!
//! This crate provides:
//! - `CloudStorage`, a facade bound to one backend at construction, exposing
//!   exists / upload / download / delete / metadata / list / signed URL
//! - Operation-scoped errors, cancellation and per-call deadlines
//! - An HTTP intake surface (multipart upload with size and type checks)

pub mod api;
pub mod config;
pub mod object_store;
#[cfg(test)]
pub mod testutil;

use config::Config;
use crate::object_store::{CloudStorage, LocalUrlSigner};

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub storage: CloudStorage,
    /// Present when the local provider is active; validates `/static` URLs.
    pub url_verifier: Option<LocalUrlSigner>,
}
