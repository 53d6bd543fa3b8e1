use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::{content_type_for, inline_disposition};
use crate::api::response::{ApiError, AppQuery, JSend};
use crate::object_store::{FileMetadata, ListOptions, DEFAULT_MAX_KEYS};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub key: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub count: usize,
    pub items: Vec<FileMetadata>,
}

#[derive(Debug, Serialize)]
pub struct ExistsResponse {
    pub exists: bool,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

#[derive(Debug, Serialize)]
pub struct SignedUrlResponse {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct ListFilesParams {
    #[serde(default = "default_max_keys")]
    pub max_keys: usize,
    #[serde(default)]
    pub prefix: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SignedUrlParams {
    /// Lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<u64>,
}

fn default_max_keys() -> usize {
    DEFAULT_MAX_KEYS
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn create_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<JSend<UploadResponse>>, ApiError> {
    let intake = &state.config.intake;
    let mut file_data = None;
    let mut file_name: Option<String> = None;
    let mut file_content_type: Option<String> = None;
    let mut key: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            too_large(intake.max_upload_size)
        } else {
            ApiError::bad_request(format!("Invalid multipart data: {e}"))
        }
    })? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "file" => {
                file_name = field.file_name().map(|s| s.to_string());
                file_content_type = field.content_type().map(|s| s.to_string());

                let data = field.bytes().await.map_err(|e| {
                    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                        too_large(intake.max_upload_size)
                    } else {
                        ApiError::bad_request(format!("Failed to read file: {e}"))
                    }
                })?;

                if data.len() > intake.max_upload_size {
                    return Err(too_large(intake.max_upload_size));
                }
                file_data = Some(data);
            }
            "key" => {
                key = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("Invalid key: {e}")))?,
                );
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    let file_data = file_data.ok_or_else(|| ApiError::bad_request("file field is required"))?;

    // Determine MIME type: from multipart Content-Type, or guess from filename
    let content_type = file_content_type
        .filter(|ct| ct != "application/octet-stream")
        .or_else(|| {
            file_name
                .as_deref()
                .and_then(|n| mime_guess::from_path(n).first())
                .map(|m| m.to_string())
        })
        .unwrap_or_else(|| "application/octet-stream".to_string());

    if !intake.is_allowed(&content_type) {
        return Err(ApiError::unsupported_media_type("Unsupported file type"));
    }

    let key = match key.map(|k| k.trim().to_string()) {
        Some(k) if !k.is_empty() => k,
        _ => uuid::Uuid::new_v4().to_string(),
    };
    let byte_size = file_data.len();

    let url = state
        .storage
        .upload_file(&key, file_data, Some(&content_type))
        .await?;

    tracing::debug!(key = %key, byte_size, content_type = %content_type, "Uploaded file");

    Ok(JSend::success(UploadResponse { key, url }))
}

pub async fn list_files(
    State(state): State<Arc<AppState>>,
    AppQuery(params): AppQuery<ListFilesParams>,
) -> Result<Json<JSend<ListResponse>>, ApiError> {
    let items = state
        .storage
        .get_files_list(ListOptions {
            max_keys: params.max_keys,
            prefix: params.prefix.filter(|p| !p.is_empty()),
        })
        .await?;

    Ok(JSend::success(ListResponse {
        count: items.len(),
        items,
    }))
}

pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<JSend<FileMetadata>>, ApiError> {
    let file = state.storage.get_file(&key).await?;
    Ok(JSend::success(file))
}

pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<JSend<DeleteResponse>>, ApiError> {
    let deleted = state.storage.delete_file(&key).await?;

    tracing::debug!(key = %key, "Deleted file");
    Ok(JSend::success(DeleteResponse { deleted }))
}

pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let (data, content_type) = state.storage.download_file_with_type(&key).await?;

    let mut response = (StatusCode::OK, data).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type_for(&key, content_type.as_deref()));
    if let Some((name, value)) = inline_disposition(&key) {
        headers.insert(name, value);
    }

    Ok(response)
}

pub async fn file_exists(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<JSend<ExistsResponse>>, ApiError> {
    let exists = state.storage.exists(&key).await?;
    Ok(JSend::success(ExistsResponse { exists }))
}

pub async fn signed_url(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    AppQuery(params): AppQuery<SignedUrlParams>,
) -> Result<Json<JSend<SignedUrlResponse>>, ApiError> {
    let url = state
        .storage
        .get_signed_url(&key, params.expires_in.map(Duration::from_secs))
        .await?;
    Ok(JSend::success(SignedUrlResponse { url }))
}

// ============================================================================
// Helpers
// ============================================================================

fn too_large(limit: usize) -> ApiError {
    ApiError::payload_too_large(format!(
        "File exceeds maximum upload size of {limit} bytes"
    ))
}
