mod files;
mod health;
mod static_files;

pub use files::{
    create_file, delete_file, download_file, file_exists, get_file, list_files, signed_url,
};
pub use health::health;
pub use static_files::serve_static;

use axum::http::{header, HeaderValue};

/// Content type for raw content responses: the one stored with the object, else a
/// guess from the key's extension.
fn content_type_for(key: &str, stored: Option<&str>) -> HeaderValue {
    stored
        .and_then(|ct| HeaderValue::from_str(ct).ok())
        .or_else(|| {
            mime_guess::from_path(key)
                .first()
                .and_then(|m| HeaderValue::from_str(m.as_ref()).ok())
        })
        .unwrap_or(HeaderValue::from_static("application/octet-stream"))
}

/// `inline` disposition naming the key's last segment.
fn inline_disposition(key: &str) -> Option<(header::HeaderName, HeaderValue)> {
    let filename = key.rsplit('/').next().unwrap_or(key);
    HeaderValue::from_str(&format!("inline; filename=\"{filename}\""))
        .ok()
        .map(|value| (header::CONTENT_DISPOSITION, value))
}
