//! In-process fake backends shared by the adapter integration tests.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};

/// Objects per list page served by the fakes, so pagination is exercised.
pub const PAGE_SIZE: usize = 2;

/// Key the fakes answer with a 403 and a vendor error document.
pub const FORBIDDEN_KEY: &str = "forbidden.jpg";

/// Key the fakes never answer in time.
pub const SLOW_KEY: &str = "slow.jpg";

#[derive(Clone)]
pub struct FakeObject {
    pub data: Bytes,
    pub content_type: Option<String>,
    pub last_modified: DateTime<Utc>,
}

#[derive(Clone, Default)]
pub struct Bucket {
    objects: Arc<Mutex<BTreeMap<String, FakeObject>>>,
}

impl Bucket {
    pub fn put(&self, key: &str, data: Bytes, content_type: Option<String>) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            FakeObject {
                data,
                content_type,
                last_modified: fixed_time(),
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<FakeObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn remove(&self, key: &str) -> Option<FakeObject> {
        self.objects.lock().unwrap().remove(key)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    /// One page of keys (lexicographic) matching `prefix`, strictly after `after`,
    /// plus whether more remain.
    pub fn page(
        &self,
        prefix: &str,
        after: Option<&str>,
        limit: usize,
    ) -> (Vec<(String, FakeObject)>, bool) {
        let objects = self.objects.lock().unwrap();
        let mut matching = objects
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .filter(|(k, _)| after.map_or(true, |a| k.as_str() > a));

        let page: Vec<(String, FakeObject)> = matching
            .by_ref()
            .take(limit.min(PAGE_SIZE))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let more = matching.next().is_some();
        (page, more)
    }
}

pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap()
}

/// Serve `router` on an ephemeral loopback port and return its origin.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// Deterministic test content of `len` bytes.
pub fn content(len: usize) -> Bytes {
    Bytes::from((0..len).map(|i| (i * 31 % 251) as u8).collect::<Vec<u8>>())
}

/// Quoted entity tag derived from the object body.
pub fn etag(data: &[u8]) -> String {
    let digest = ring::digest::digest(&ring::digest::SHA256, data);
    format!("\"{}\"", hex::encode(&digest.as_ref()[..8]))
}

/// HTTP-date as sent in `Last-Modified`.
pub fn http_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// GET/HEAD answer for a stored object. Hyper drops the body on HEAD but keeps
/// the headers.
pub fn object_response(obj: FakeObject) -> Response {
    let mut response = (StatusCode::OK, Body::from(obj.data.clone())).into_response();
    let headers = response.headers_mut();
    headers.insert(header::ETAG, etag(&obj.data).parse().unwrap());
    headers.insert(
        header::LAST_MODIFIED,
        http_date(obj.last_modified).parse().unwrap(),
    );
    headers.insert(header::CONTENT_LENGTH, obj.data.len().into());
    if let Some(content_type) = obj.content_type {
        headers.insert(header::CONTENT_TYPE, content_type.parse().unwrap());
    }
    response
}

/// `ListBucketResult` document in the S3 list-type=2 shape, also spoken by the
/// GCS XML API. The continuation token is the last key of the page.
pub fn list_bucket_result(
    bucket: &str,
    prefix: &str,
    page: &[(String, FakeObject)],
    more: bool,
) -> String {
    let mut xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <ListBucketResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
         <Name>{bucket}</Name><Prefix>{prefix}</Prefix><KeyCount>{}</KeyCount>\
         <IsTruncated>{more}</IsTruncated>",
        page.len()
    );
    for (key, obj) in page {
        xml.push_str(&format!(
            "<Contents><Key>{key}</Key>\
             <LastModified>{}</LastModified>\
             <ETag>{}</ETag><Size>{}</Size><StorageClass>STANDARD</StorageClass></Contents>",
            obj.last_modified.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            etag(&obj.data).replace('"', "&quot;"),
            obj.data.len(),
        ));
    }
    if let Some((last, _)) = page.last().filter(|_| more) {
        xml.push_str(&format!(
            "<NextContinuationToken>{last}</NextContinuationToken>"
        ));
    }
    xml.push_str("</ListBucketResult>");
    xml
}
