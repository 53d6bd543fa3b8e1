//! Shared test helpers for cloud-store API tests.

use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;

use crate::config::{Config, IntakeConfig, ServerConfig, StorageConfig};
use crate::object_store::{
    CloudStorage, LocalConfig, ProviderConfig, ProviderTag, StorageOptions,
};
use crate::AppState;

pub const TEST_BASE_URL: &str = "http://localhost:8080/static";
const BOUNDARY: &str = "cloud-store-test-boundary";

/// Create a test AppState backed by a local store in a temporary directory.
pub fn test_state(temp_dir: &tempfile::TempDir) -> Arc<AppState> {
    let backend = ProviderConfig::Local(LocalConfig {
        root: temp_dir.path().join("files").to_string_lossy().to_string(),
        base_url: TEST_BASE_URL.to_string(),
        signing_key: "test-signing-key".to_string(),
    });

    let config = Config {
        server: ServerConfig {
            bind_address: "127.0.0.1:0".to_string(),
        },
        storage: StorageConfig {
            provider: ProviderTag::Local,
            backend: backend.clone(),
            options: StorageOptions::default(),
        },
        intake: IntakeConfig {
            max_upload_size: 1024, // 1KB for tests
            ..Default::default()
        },
    };

    let storage = CloudStorage::new(ProviderTag::Local, backend)
        .expect("Failed to create test storage");
    let url_verifier = config.url_verifier();

    Arc::new(AppState {
        config,
        storage,
        url_verifier,
    })
}

/// `POST /files` with a single `file` part and an optional `key` part.
pub fn multipart_request(
    key: Option<&str>,
    file_name: &str,
    content_type: &str,
    data: &[u8],
) -> Request<Body> {
    let mut body = Vec::new();
    if let Some(key) = key {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"key\"\r\n\r\n{key}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
             Content-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::post("/files")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("Failed to build multipart request")
}

pub async fn body_json(resp: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body");
    serde_json::from_slice(&bytes).expect("Response body is not JSON")
}
