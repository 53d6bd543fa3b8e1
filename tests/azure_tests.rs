mod common;

use std::collections::HashMap;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use base64::Engine;
use cloud_store::object_store::{
    AzureConfig, CloudStorage, ListOptions, ProviderTag, StorageError, UploadBody,
};
use tokio_util::sync::CancellationToken;

use common::{Bucket, FORBIDDEN_KEY, SLOW_KEY};

const ACCOUNT: &str = "devstoreaccount1";
const ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
const CONTAINER: &str = "photos";

fn azure_error(status: StatusCode, code: &str, message: &str) -> Response {
    let body = format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
         <Error><Code>{code}</Code><Message>{message}\nRequestId:0f1e2d3c\nTime:2024-01-15T10:30:00.0000000Z</Message></Error>"
    );
    (status, [(header::CONTENT_TYPE, "application/xml")], body).into_response()
}

/// Recompute the Shared Key signature the way the service does.
fn signature_matches(
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    query: &HashMap<String, String>,
) -> bool {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string()
    };

    let content_length = match header_str("content-length").as_str() {
        "0" => String::new(),
        other => other.to_string(),
    };

    let mut ms_headers: Vec<(String, String)> = headers
        .iter()
        .filter(|(name, _)| name.as_str().starts_with("x-ms-"))
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or("").trim().to_string(),
            )
        })
        .collect();
    ms_headers.sort();
    let canonical_headers: String = ms_headers
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect();

    let mut params: Vec<(String, String)> = query
        .iter()
        .map(|(k, v)| (k.to_lowercase(), v.clone()))
        .collect();
    params.sort();
    let mut canonical_resource = format!("/{ACCOUNT}{}", uri.path());
    for (name, value) in params {
        canonical_resource.push_str(&format!("\n{name}:{value}"));
    }

    let string_to_sign = format!(
        "{method}\n\n\n{content_length}\n\n{}\n\n\n\n\n\n\n{canonical_headers}{canonical_resource}",
        header_str("content-type")
    );

    let engine = base64::engine::general_purpose::STANDARD;
    let key = ring::hmac::Key::new(ring::hmac::HMAC_SHA256, &engine.decode(ACCOUNT_KEY).unwrap());
    let expected = engine.encode(ring::hmac::sign(&key, string_to_sign.as_bytes()).as_ref());

    header_str("authorization") == format!("SharedKey {ACCOUNT}:{expected}")
}

async fn blob(
    State(bucket): State<Bucket>,
    Path((account, container, key)): Path<(String, String, String)>,
    Query(params): Query<HashMap<String, String>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if account != ACCOUNT || container != CONTAINER {
        return azure_error(StatusCode::NOT_FOUND, "ContainerNotFound", "The specified container does not exist.");
    }
    if !signature_matches(&method, &uri, &headers, &params) {
        return azure_error(
            StatusCode::FORBIDDEN,
            "AuthenticationFailed",
            "Server failed to authenticate the request.",
        );
    }
    if key == FORBIDDEN_KEY {
        return azure_error(
            StatusCode::FORBIDDEN,
            "AuthorizationPermissionMismatch",
            "This request is not authorized to perform this operation using this permission.",
        );
    }
    if key == SLOW_KEY {
        tokio::time::sleep(Duration::from_secs(30)).await;
    }

    match method {
        Method::PUT => {
            if headers.get("x-ms-blob-type").and_then(|v| v.to_str().ok()) != Some("BlockBlob") {
                return azure_error(StatusCode::BAD_REQUEST, "MissingRequiredHeader", "x-ms-blob-type");
            }
            let content_type = headers
                .get("x-ms-blob-content-type")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());
            let etag = common::etag(&body);
            bucket.put(&key, body, content_type);
            (StatusCode::CREATED, [(header::ETAG, etag)]).into_response()
        }
        Method::GET | Method::HEAD => match bucket.get(&key) {
            Some(obj) => common::object_response(obj),
            None if method == Method::HEAD => StatusCode::NOT_FOUND.into_response(),
            None => azure_error(StatusCode::NOT_FOUND, "BlobNotFound", "The specified blob does not exist."),
        },
        Method::DELETE => match bucket.remove(&key) {
            Some(_) => StatusCode::ACCEPTED.into_response(),
            None => azure_error(StatusCode::NOT_FOUND, "BlobNotFound", "The specified blob does not exist."),
        },
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

async fn list(
    State(bucket): State<Bucket>,
    Path((account, container)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    if account != ACCOUNT || container != CONTAINER {
        return azure_error(StatusCode::NOT_FOUND, "ContainerNotFound", "The specified container does not exist.");
    }
    if params.get("restype").map(String::as_str) != Some("container")
        || params.get("comp").map(String::as_str) != Some("list")
    {
        return azure_error(StatusCode::BAD_REQUEST, "InvalidQueryParameterValue", "comp");
    }
    if !signature_matches(&method, &uri, &headers, &params) {
        return azure_error(
            StatusCode::FORBIDDEN,
            "AuthenticationFailed",
            "Server failed to authenticate the request.",
        );
    }

    let prefix = params.get("prefix").cloned().unwrap_or_default();
    let max_results: usize = params
        .get("maxresults")
        .and_then(|v| v.parse().ok())
        .unwrap_or(5000);
    let (page, more) = bucket.page(
        &prefix,
        params.get("marker").map(String::as_str),
        max_results,
    );

    let mut xml = format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
         <EnumerationResults ServiceEndpoint=\"http://127.0.0.1/{ACCOUNT}/\" ContainerName=\"{CONTAINER}\">\
         <Prefix>{prefix}</Prefix><MaxResults>{max_results}</MaxResults><Blobs>"
    );
    for (key, obj) in &page {
        xml.push_str(&format!(
            "<Blob><Name>{key}</Name><Properties>\
             <Creation-Time>{modified}</Creation-Time>\
             <Last-Modified>{modified}</Last-Modified>\
             <Etag>{}</Etag>\
             <Content-Length>{}</Content-Length>\
             <Content-Type>{}</Content-Type>\
             <BlobType>BlockBlob</BlobType></Properties><Metadata /></Blob>",
            common::etag(&obj.data).replace('"', "&quot;"),
            obj.data.len(),
            obj.content_type.clone().unwrap_or_default(),
            modified = common::http_date(obj.last_modified),
        ));
    }
    xml.push_str("</Blobs>");
    if let Some((last, _)) = page.last().filter(|_| more) {
        xml.push_str(&format!("<NextMarker>{last}</NextMarker>"));
    }
    xml.push_str("</EnumerationResults>");

    (StatusCode::OK, [(header::CONTENT_TYPE, "application/xml")], xml).into_response()
}

async fn fake_azure() -> (String, Bucket) {
    let bucket = Bucket::default();
    let router = Router::new()
        .route("/:account/:container", any(list))
        .route("/:account/:container/*key", any(blob))
        .with_state(bucket.clone());
    (common::serve(router).await, bucket)
}

fn config(origin: &str, key: &str) -> AzureConfig {
    AzureConfig {
        connection_string: format!(
            "DefaultEndpointsProtocol=http;AccountName={ACCOUNT};AccountKey={key};\
             BlobEndpoint={origin}/{ACCOUNT};"
        ),
        container: CONTAINER.to_string(),
    }
}

async fn storage() -> (String, Bucket, CloudStorage) {
    let (origin, bucket) = fake_azure().await;
    let storage = CloudStorage::new(ProviderTag::Azure, config(&origin, ACCOUNT_KEY)).unwrap();
    (origin, bucket, storage)
}

#[tokio::test]
async fn test_upload_download_and_metadata() {
    let (origin, bucket, storage) = storage().await;
    let data = common::content(383767);

    let url = storage
        .upload_file("skyline", data.clone(), Some("image/jpeg"))
        .await
        .unwrap();
    assert!(url.starts_with(&format!("{origin}/{ACCOUNT}/{CONTAINER}/skyline?")));
    assert!(url.contains("sr=b"));
    assert!(url.contains("sp=r"));
    assert!(url.contains("sig="));
    assert_eq!(bucket.len(), 1);
    assert_eq!(
        bucket.get("skyline").unwrap().content_type.as_deref(),
        Some("image/jpeg")
    );

    assert!(storage.exists("skyline").await.unwrap());
    assert!(!storage.exists("other").await.unwrap());
    assert_eq!(storage.download_file("skyline").await.unwrap(), data);

    let file = storage.get_file("skyline").await.unwrap();
    assert_eq!(file.size, 383767);
    assert_eq!(file.content_type.as_deref(), Some("image/jpeg"));
    assert_eq!(file.last_modified, common::fixed_time());
}

#[tokio::test]
async fn test_wrong_account_key_is_rejected() {
    let (origin, _bucket) = fake_azure().await;
    let wrong_key = base64::engine::general_purpose::STANDARD.encode(b"not-the-account-key");
    let storage = CloudStorage::new(ProviderTag::Azure, config(&origin, &wrong_key)).unwrap();

    let err = storage
        .upload_file("skyline", Bytes::from("x"), Some("image/jpeg"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Upload(_)));
    assert!(err.to_string().starts_with("Failed to upload file: "));
    assert!(err
        .to_string()
        .contains("Server failed to authenticate the request."));
}

#[tokio::test]
async fn test_delete_absent_blob_fails() {
    let (_origin, _bucket, storage) = storage().await;
    storage
        .upload_file("photos/2024/sky line.jpg", Bytes::from("x"), None)
        .await
        .unwrap();

    assert!(storage.delete_file("photos/2024/sky line.jpg").await.unwrap());

    let err = storage
        .delete_file("photos/2024/sky line.jpg")
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Delete(_)));
    assert!(err.is_not_found());
    assert!(err.to_string().starts_with("Failed to delete file: "));
}

#[tokio::test]
async fn test_list_follows_markers() {
    let (_origin, bucket, storage) = storage().await;
    for key in ["2024/a.png", "2024/b.png", "2024/c.png", "2025/d.png", "2025/e.png"] {
        bucket.put(key, Bytes::from("png"), Some("image/png".to_string()));
    }

    let all = storage.get_files_list(ListOptions::default()).await.unwrap();
    assert_eq!(all.len(), 5);
    assert!(all
        .iter()
        .all(|f| f.content_type.as_deref() == Some("image/png")));
    assert!(all.iter().all(|f| f.url.contains("sig=")));

    let prefixed = storage
        .get_files_list(ListOptions::with_prefix("2024/"))
        .await
        .unwrap();
    let keys: Vec<&str> = prefixed.iter().map(|f| f.key.as_str()).collect();
    assert_eq!(keys, vec!["2024/a.png", "2024/b.png", "2024/c.png"]);
    assert_eq!(prefixed[0].size, 3);
    assert_eq!(prefixed[0].last_modified, common::fixed_time());
}

#[tokio::test]
async fn test_permission_error_message_is_kept() {
    let (_origin, _bucket, storage) = storage().await;

    let err = storage.download_file(FORBIDDEN_KEY).await.unwrap_err();
    assert!(!err.is_not_found());
    assert!(err.to_string().starts_with("Failed to download file: "));
    assert!(err
        .to_string()
        .contains("This request is not authorized to perform this operation"));

    let err = storage.download_file("missing").await.unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().contains("The specified blob does not exist."));
}

#[tokio::test]
async fn test_streamed_upload_without_length() {
    let (_origin, bucket, storage) = storage().await;
    let chunks = vec![Ok::<_, std::io::Error>(Bytes::from("ab")), Ok(Bytes::from("c"))];

    storage
        .upload_file(
            "stream",
            UploadBody::from_stream(futures::stream::iter(chunks), None),
            Some("text/plain"),
        )
        .await
        .unwrap();
    let stored = bucket.get("stream").unwrap();
    assert_eq!(stored.data, Bytes::from("abc"));
    assert_eq!(stored.content_type.as_deref(), Some("text/plain"));
}

#[tokio::test]
async fn test_scoped_cancellation() {
    let (_origin, _bucket, storage) = storage().await;
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let err = storage
        .scoped(token)
        .download_file(SLOW_KEY)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Cancelled { .. }));
    assert_eq!(
        err.to_string(),
        "Failed to download file: operation was cancelled"
    );

    // The unscoped handle is unaffected
    assert!(!storage.exists("skyline").await.unwrap());
}
