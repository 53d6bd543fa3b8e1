use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

use super::{content_type_for, inline_disposition};
use crate::api::response::{ApiError, AppQuery};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SignatureParams {
    pub expires: i64,
    pub signature: String,
}

/// Serve file content behind a local signed URL.
/// Route: GET /static/*key?expires=&signature=
pub async fn serve_static(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    AppQuery(params): AppQuery<SignatureParams>,
) -> Result<Response, ApiError> {
    let verifier = state
        .url_verifier
        .as_ref()
        .ok_or_else(|| ApiError::not_found("Signed URLs are not served by this provider"))?;

    if !verifier.verify(&key, params.expires, &params.signature, Utc::now()) {
        return Err(ApiError::forbidden("Invalid or expired signature"));
    }

    let (data, content_type) = state.storage.download_file_with_type(&key).await?;

    let mut response = (StatusCode::OK, data).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type_for(&key, content_type.as_deref()));
    if let Some((name, value)) = inline_disposition(&key) {
        headers.insert(name, value);
    }

    // Never outlive the signature
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("private, no-store"),
    );

    Ok(response)
}
